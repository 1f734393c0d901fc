use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "gemini_api_key", default)]
    pub gemini_key: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_token_file")]
    pub token_file: String,
    #[serde(default = "default_client_secrets_file")]
    pub client_secrets_file: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_font_file")]
    pub font_file: String,
    #[serde(default = "default_music_dir")]
    pub music_dir: String,

    #[serde(default = "default_wrap_chars")]
    pub wrap_chars: usize,
    #[serde(default = "default_dedup")]
    pub dedup: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_public")]
    pub public: bool,
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/oauth2callback".to_string()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_history_file() -> String {
    "quotes_cache.txt".to_string()
}

fn default_token_file() -> String {
    "tokens.json".to_string()
}

fn default_client_secrets_file() -> String {
    "client_secrets.json".to_string()
}

fn default_output_file() -> String {
    "output.mp4".to_string()
}

fn default_font_file() -> String {
    "Poppins-Regular.ttf".to_string()
}

fn default_music_dir() -> String {
    "trending_songs".to_string()
}

fn default_wrap_chars() -> usize {
    25
}

fn default_dedup() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    8
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_public() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_key: String::new(),
            gemini_model: default_gemini_model(),
            gemini_base_url: default_gemini_base_url(),
            listen: default_listen(),
            redirect_uri: default_redirect_uri(),
            base_dir: default_base_dir(),
            history_file: default_history_file(),
            token_file: default_token_file(),
            client_secrets_file: default_client_secrets_file(),
            output_file: default_output_file(),
            font_file: default_font_file(),
            music_dir: default_music_dir(),
            wrap_chars: default_wrap_chars(),
            dedup: default_dedup(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            public: default_public(),
        }
    }
}

impl Config {
    /// Reads `path` if it exists, then applies environment overrides and
    /// validates the result.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.gemini_key = v;
        }
        if let Some(v) = lookup("QUOTE_SHORTS_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = lookup("QUOTE_SHORTS_BASE_DIR") {
            self.base_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("QUOTE_SHORTS_REDIRECT_URI") {
            self.redirect_uri = v;
        }
        if let Some(v) = lookup("QUOTE_SHORTS_PUBLIC") {
            self.public = !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini_key.trim().is_empty() {
            anyhow::bail!("config: gemini_api_key missing (set GEMINI_API_KEY)");
        }
        if self.wrap_chars == 0 {
            anyhow::bail!("config: wrap_chars must be positive");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("config: max_attempts must be positive");
        }
        Ok(())
    }

    pub fn history_path(&self) -> PathBuf {
        self.base_dir.join(&self.history_file)
    }

    pub fn token_path(&self) -> PathBuf {
        self.base_dir.join(&self.token_file)
    }

    pub fn client_secrets_path(&self) -> PathBuf {
        self.base_dir.join(&self.client_secrets_file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.base_dir.join(&self.output_file)
    }

    pub fn font_path(&self) -> PathBuf {
        self.base_dir.join(&self.font_file)
    }

    pub fn music_path(&self) -> PathBuf {
        self.base_dir.join(&self.music_dir)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn privacy_status(&self) -> &'static str {
        if self.public { "public" } else { "private" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"gemini_api_key":"k","wrap_chars":30}"#).unwrap();
        assert_eq!(cfg.gemini_key, "k");
        assert_eq!(cfg.wrap_chars, 30);
        assert_eq!(cfg.history_file, "quotes_cache.txt");
        assert_eq!(cfg.max_attempts, 8);
        assert!(cfg.dedup);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.apply_env(|key| match key {
            "GEMINI_API_KEY" => Some("from-env".to_string()),
            "QUOTE_SHORTS_BASE_DIR" => Some("/srv/shorts".to_string()),
            "QUOTE_SHORTS_PUBLIC" => Some("false".to_string()),
            _ => None,
        });
        assert_eq!(cfg.gemini_key, "from-env");
        assert_eq!(cfg.output_path(), PathBuf::from("/srv/shorts/output.mp4"));
        assert_eq!(cfg.privacy_status(), "private");
    }

    #[test]
    fn missing_key_fails_validation() {
        assert!(Config::default().validate().is_err());
    }

    #[tokio::test]
    async fn load_reads_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"gemini_api_key":"abc","music_dir":"songs"}"#)
            .await
            .unwrap();
        let cfg = Config::load(&path).await.unwrap();
        assert_eq!(cfg.music_dir, "songs");
    }
}
