//! Stored OAuth identities, one per publishing account.

use crate::logw;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_S: i64 = 60;

/// Authorized-user credentials in the JSON shape Google's client libraries
/// write, so existing token files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

pub fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl IdentityRecord {
    /// Whether the access token must be refreshed before use at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (None, _) => true,
            (Some(token), _) if token.is_empty() => true,
            (Some(_), Some(expiry)) => expiry - Duration::seconds(EXPIRY_SKEW_S) <= now,
            (Some(_), None) => false,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Parses a token file. A single object counts as a one-element list;
/// anything unparseable counts as empty.
pub fn parse_records(content: &str) -> Vec<IdentityRecord> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(err) => {
            logw(format!("Token store is not valid JSON ({}); treating as empty.", err));
            return Vec::new();
        }
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => {
            logw("Token store is neither a list nor an object; treating as empty.");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<IdentityRecord>(item) {
            Ok(record) => Some(record),
            Err(err) => {
                logw(format!("Skipping malformed identity #{}: {}", idx, err));
                None
            }
        })
        .collect()
}

/// JSON-array token file. Every operation holds the store lock and writes
/// go through a temp file that is renamed over the target.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<IdentityRecord>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Appends `record` and returns its index.
    pub async fn append(&self, record: IdentityRecord) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        records.push(record);
        self.write(&records).await?;
        Ok(records.len() - 1)
    }

    /// Replaces the record at `index`. Out-of-range indices are ignored.
    pub async fn replace(&self, index: usize, record: IdentityRecord) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        let Some(slot) = records.get_mut(index) else {
            return Ok(false);
        };
        *slot = record;
        self.write(&records).await?;
        Ok(true)
    }

    /// Creates an empty list file if none exists.
    pub async fn ensure_exists(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if fs::metadata(&self.path).await.is_err() {
            self.write(&[]).await?;
        }
        Ok(())
    }

    async fn read(&self) -> Result<Vec<IdentityRecord>> {
        if fs::metadata(&self.path).await.is_err() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read token store: {}", self.path.display()))?;
        Ok(parse_records(&content))
    }

    async fn write(&self, records: &[IdentityRecord]) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to write token store: {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Token store writer panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str) -> IdentityRecord {
        IdentityRecord {
            token: Some(token.to_string()),
            refresh_token: Some(format!("refresh-{}", token)),
            token_uri: default_token_uri(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
            expiry: None,
        }
    }

    #[test]
    fn parses_google_authorized_user_json() {
        let raw = r#"[{"token":"ya29","refresh_token":"1//r","token_uri":"https://oauth2.googleapis.com/token",
            "client_id":"c","client_secret":"s","scopes":["x"],"universe_domain":"googleapis.com",
            "account":"","expiry":"2030-01-01T00:00:00.123456Z"}]"#;
        let records = parse_records(raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].access_token(), Some("ya29"));
        assert!(records[0].expiry.is_some());
    }

    #[test]
    fn single_object_is_one_record() {
        let raw = r#"{"token":"a","refresh_token":"b"}"#;
        assert_eq!(parse_records(raw).len(), 1);
    }

    #[test]
    fn malformed_json_is_empty() {
        assert!(parse_records("{not json").is_empty());
        assert!(parse_records("42").is_empty());
        assert!(parse_records("").is_empty());
    }

    #[test]
    fn refresh_needed_for_missing_or_expiring_tokens() {
        let now = Utc::now();
        let mut r = record("a");
        assert!(!r.needs_refresh(now));

        r.expiry = Some(now + Duration::seconds(30));
        assert!(r.needs_refresh(now));

        r.expiry = Some(now + Duration::hours(1));
        assert!(!r.needs_refresh(now));

        r.token = None;
        assert!(r.needs_refresh(now));
    }

    #[tokio::test]
    async fn append_and_replace_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::new(&path);
        assert!(store.is_empty().await.unwrap());

        assert_eq!(store.append(record("a")).await.unwrap(), 0);
        assert_eq!(store.append(record("b")).await.unwrap(), 1);
        assert!(store.replace(1, record("c")).await.unwrap());
        assert!(!store.replace(5, record("d")).await.unwrap());

        let reloaded = TokenStore::new(&path).load().await.unwrap();
        let tokens: Vec<_> = reloaded.iter().filter_map(|r| r.access_token()).collect();
        assert_eq!(tokens, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_overwritten_on_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "garbage").await.unwrap();
        let store = TokenStore::new(&path);

        assert!(store.load().await.unwrap().is_empty());
        store.append(record("fresh")).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.trim_start().starts_with('['));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ensure_exists_creates_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::new(&path);
        store.ensure_exists().await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap().trim(), "[]");
    }
}
