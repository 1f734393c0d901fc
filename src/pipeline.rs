use crate::composer::VideoComposer;
use crate::metadata::{self, VideoMetadata};
use crate::publish::{PublishReport, Publisher};
use crate::quote::Quote;
use crate::source::QuoteSource;
use crate::{logi, logok};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub quote: Quote,
    pub video: PathBuf,
    pub metadata: VideoMetadata,
    pub report: PublishReport,
}

/// quote -> render -> publish. Runs are serialised because every run
/// writes the same output file.
pub struct Pipeline {
    source: Arc<dyn QuoteSource>,
    composer: Arc<dyn VideoComposer>,
    publisher: Arc<dyn Publisher>,
    privacy_status: String,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        composer: Arc<dyn VideoComposer>,
        publisher: Arc<dyn Publisher>,
        privacy_status: impl Into<String>,
    ) -> Self {
        Self {
            source,
            composer,
            publisher,
            privacy_status: privacy_status.into(),
            run_lock: Mutex::new(()),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        let _guard = self.run_lock.lock().await;

        logi("Fetching quote...");
        let quote = self.source.fetch_quote().await.context("Quote fetch failed")?;

        let video = self.composer.compose(&quote).await.context("Video render failed")?;
        logok(format!("Video ready: {}", video.display()));

        let metadata = {
            let mut rng = StdRng::from_entropy();
            metadata::generate_metadata(&quote, &self.privacy_status, &mut rng)
        };
        logi(format!("Publishing \"{}\"", metadata.title));
        let report = self.publisher.publish(&video, &metadata).await?;
        logok(format!(
            "Publish finished: {} uploaded, {} failed",
            report.uploaded(),
            report.failed()
        ));

        Ok(RunOutcome {
            quote,
            video,
            metadata,
            report,
        })
    }
}
