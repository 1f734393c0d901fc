use crate::error::PublishError;
use crate::identity::TokenStore;
use crate::metadata::VideoMetadata;
use crate::youtube::VideoHost;
use crate::{logi, logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, video: &Path, metadata: &VideoMetadata) -> Result<PublishReport>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityOutcome {
    Uploaded { video_id: String },
    RefreshFailed { reason: String },
    UploadFailed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    /// One entry per stored identity, in store order.
    pub outcomes: Vec<(usize, IdentityOutcome)>,
}

impl PublishReport {
    pub fn uploaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, IdentityOutcome::Uploaded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.uploaded()
    }
}

/// Publishes under every stored identity in order. A failing identity is
/// recorded and skipped; the run only fails when the store is empty or
/// nothing got through.
pub struct IdentityPublisher<H> {
    host: H,
    store: Arc<TokenStore>,
}

impl<H: VideoHost> IdentityPublisher<H> {
    pub fn new(host: H, store: Arc<TokenStore>) -> Self {
        Self { host, store }
    }

    async fn publish_one(&self, index: usize, video: &Path, metadata: &VideoMetadata) -> IdentityOutcome {
        let records = match self.store.load().await {
            Ok(records) => records,
            Err(err) => {
                return IdentityOutcome::RefreshFailed {
                    reason: format!("{:#}", err),
                };
            }
        };
        let Some(mut record) = records.into_iter().nth(index) else {
            return IdentityOutcome::RefreshFailed {
                reason: "identity disappeared from the store".to_string(),
            };
        };

        if record.needs_refresh(Utc::now()) {
            logi(format!("Refreshing credentials for identity #{}", index));
            match self.host.refresh(&record).await {
                Ok(refreshed) => {
                    if let Err(err) = self.store.replace(index, refreshed.clone()).await {
                        logw(format!("Could not persist refreshed token #{}: {:#}", index, err));
                    }
                    record = refreshed;
                }
                Err(err) => {
                    return IdentityOutcome::RefreshFailed {
                        reason: format!("{:#}", err),
                    };
                }
            }
        }

        match self.host.upload(&record, video, metadata).await {
            Ok(video_id) => IdentityOutcome::Uploaded { video_id },
            Err(err) => IdentityOutcome::UploadFailed {
                reason: format!("{:#}", err),
            },
        }
    }
}

#[async_trait]
impl<H: VideoHost> Publisher for IdentityPublisher<H> {
    async fn publish(&self, video: &Path, metadata: &VideoMetadata) -> Result<PublishReport> {
        let count = self.store.len().await?;
        if count == 0 {
            return Err(PublishError::NoIdentities.into());
        }

        let mut report = PublishReport::default();
        for index in 0..count {
            let outcome = self.publish_one(index, video, metadata).await;
            match &outcome {
                IdentityOutcome::Uploaded { video_id } => {
                    logok(format!("Identity #{} uploaded video {}", index, video_id))
                }
                IdentityOutcome::RefreshFailed { reason } => {
                    logw(format!("Identity #{} skipped (credentials): {}", index, reason))
                }
                IdentityOutcome::UploadFailed { reason } => {
                    logw(format!("Identity #{} upload failed: {}", index, reason))
                }
            }
            report.outcomes.push((index, outcome));
        }

        if report.uploaded() == 0 {
            return Err(PublishError::AllIdentitiesFailed { attempted: count }.into());
        }
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::{IdentityRecord, default_token_uri};
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records calls; tokens listed in `fail_uploads` / `fail_refresh` fail.
    #[derive(Default)]
    pub(crate) struct FakeHost {
        pub uploads: Mutex<Vec<String>>,
        pub refreshes: Mutex<u32>,
        pub fail_uploads: HashSet<String>,
        pub fail_refresh: bool,
    }

    #[async_trait]
    impl VideoHost for Arc<FakeHost> {
        async fn refresh(&self, record: &IdentityRecord) -> Result<IdentityRecord> {
            *self.refreshes.lock().unwrap() += 1;
            if self.fail_refresh {
                anyhow::bail!("invalid_grant");
            }
            let mut fresh = record.clone();
            fresh.token = Some(format!("fresh-{}", record.refresh_token.clone().unwrap_or_default()));
            fresh.expiry = Some(Utc::now() + Duration::hours(1));
            Ok(fresh)
        }

        async fn upload(&self, record: &IdentityRecord, video: &Path, _metadata: &VideoMetadata) -> Result<String> {
            assert!(video.exists());
            let token = record.access_token().unwrap_or_default().to_string();
            if self.fail_uploads.contains(&token) {
                anyhow::bail!("quota exceeded");
            }
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(token);
            Ok(format!("vid{}", uploads.len()))
        }
    }

    pub(crate) fn record(token: Option<&str>, expiry: Option<chrono::DateTime<Utc>>) -> IdentityRecord {
        IdentityRecord {
            token: token.map(str::to_string),
            refresh_token: Some(format!("r-{}", token.unwrap_or("none"))),
            token_uri: default_token_uri(),
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            scopes: Vec::new(),
            expiry,
        }
    }

    pub(crate) fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "t".to_string(),
            description: "d".to_string(),
            tags: Vec::new(),
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
        }
    }

    async fn setup(records: Vec<IdentityRecord>) -> (tempfile::TempDir, Arc<TokenStore>, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::new(dir.path().join("tokens.json")));
        for r in records {
            store.append(r).await.unwrap();
        }
        let video = dir.path().join("output.mp4");
        tokio::fs::write(&video, b"video").await.unwrap();
        (dir, store, video)
    }

    #[tokio::test]
    async fn empty_store_is_an_error_without_upload() {
        let (_dir, store, video) = setup(Vec::new()).await;
        let host = Arc::new(FakeHost::default());
        let publisher = IdentityPublisher::new(Arc::clone(&host), store);

        let err = publisher.publish(&video, &metadata()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PublishError>(), Some(PublishError::NoIdentities)));
        assert!(host.uploads.lock().unwrap().is_empty());
        assert_eq!(*host.refreshes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn uploads_once_per_identity_in_order() {
        let (_dir, store, video) = setup(vec![record(Some("a"), None), record(Some("b"), None)]).await;
        let host = Arc::new(FakeHost::default());
        let publisher = IdentityPublisher::new(Arc::clone(&host), store);

        let report = publisher.publish(&video, &metadata()).await.unwrap();
        assert_eq!(report.uploaded(), 2);
        assert_eq!(*host.uploads.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn expired_identity_is_refreshed_and_persisted() {
        let expired = Utc::now() - Duration::minutes(5);
        let (_dir, store, video) = setup(vec![record(Some("old"), Some(expired))]).await;
        let host = Arc::new(FakeHost::default());
        let publisher = IdentityPublisher::new(Arc::clone(&host), Arc::clone(&store));

        publisher.publish(&video, &metadata()).await.unwrap();
        assert_eq!(*host.uploads.lock().unwrap(), vec!["fresh-r-old"]);
        let stored = store.load().await.unwrap();
        assert_eq!(stored[0].access_token(), Some("fresh-r-old"));
    }

    #[tokio::test]
    async fn failing_identity_does_not_block_others() {
        let (_dir, store, video) = setup(vec![
            record(Some("bad"), None),
            record(None, None),
            record(Some("good"), None),
        ])
        .await;
        let host = Arc::new(FakeHost {
            fail_uploads: HashSet::from(["bad".to_string()]),
            fail_refresh: true,
            ..Default::default()
        });
        let publisher = IdentityPublisher::new(Arc::clone(&host), store);

        let report = publisher.publish(&video, &metadata()).await.unwrap();
        assert_eq!(report.uploaded(), 1);
        assert_eq!(report.failed(), 2);
        assert!(matches!(report.outcomes[0].1, IdentityOutcome::UploadFailed { .. }));
        assert!(matches!(report.outcomes[1].1, IdentityOutcome::RefreshFailed { .. }));
        assert_eq!(*host.uploads.lock().unwrap(), vec!["good"]);
    }

    #[tokio::test]
    async fn all_failures_surface_as_error() {
        let (_dir, store, video) = setup(vec![record(Some("bad"), None)]).await;
        let host = Arc::new(FakeHost {
            fail_uploads: HashSet::from(["bad".to_string()]),
            ..Default::default()
        });
        let publisher = IdentityPublisher::new(host, store);

        let err = publisher.publish(&video, &metadata()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PublishError>(),
            Some(PublishError::AllIdentitiesFailed { attempted: 1 })
        ));
    }
}
