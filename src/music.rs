use rand::Rng;
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aac", "m4a"];

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Audio files directly inside `dir`, sorted. Missing dir yields nothing.
pub fn list_tracks(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut tracks: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_audio(path))
        .collect();
    tracks.sort();
    tracks
}

pub fn pick_random_track<R: Rng + ?Sized>(dir: &Path, rng: &mut R) -> Option<PathBuf> {
    list_tracks(dir).choose(rng).cloned()
}
