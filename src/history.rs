//! Append-only history of accepted quotes, one per line.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File-backed quote history. All reads and appends go through one lock so
/// concurrent runs cannot interleave writes.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<HashSet<String>> {
        let _guard = self.lock.lock().await;
        self.read_set().await
    }

    pub async fn contains(&self, text: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.read_set().await?.contains(text.trim()))
    }

    /// Appends `text` unless it is already present. Returns `false` for a
    /// duplicate.
    pub async fn append(&self, text: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let text = text.trim();
        if text.is_empty() || self.read_set().await?.contains(text) {
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open history: {}", self.path.display()))?;
        file.write_all(format!("{}\n", text).as_bytes()).await?;
        file.flush().await?;
        Ok(true)
    }

    async fn read_set(&self) -> Result<HashSet<String>> {
        if fs::metadata(&self.path).await.is_err() {
            return Ok(HashSet::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read history: {}", self.path.display()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
