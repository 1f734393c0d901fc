//! Builds the concrete pipeline from configuration.

use crate::api::gemini::GeminiClient;
use crate::composer::{ComposerSettings, QuoteVideoComposer};
use crate::config::Config;
use crate::ffmpeg::FfmpegEncoder;
use crate::history::HistoryStore;
use crate::identity::TokenStore;
use crate::layout::OverlayStyle;
use crate::logw;
use crate::oauth::OAuthClient;
use crate::pipeline::Pipeline;
use crate::publish::IdentityPublisher;
use crate::server::{AppState, Authorizer};
use crate::source::{RetryPolicy, UniqueQuoteSource};
use crate::youtube::YouTubeClient;
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct App {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<TokenStore>,
    pub oauth: Option<OAuthClient>,
}

impl App {
    pub async fn build(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        // Resumable uploads answer 308 without a Location; never follow it.
        let upload_http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build upload HTTP client")?;

        let oauth = match OAuthClient::from_client_secrets_file(
            http.clone(),
            &cfg.client_secrets_path(),
            &cfg.redirect_uri,
        )
        .await
        {
            Ok(client) => Some(client),
            Err(err) => {
                logw(format!("OAuth disabled: {:#}", err));
                None
            }
        };

        let history = Arc::new(HistoryStore::new(cfg.history_path()));
        let store = Arc::new(TokenStore::new(cfg.token_path()));
        store.ensure_exists().await?;

        let policy = RetryPolicy {
            max_attempts: cfg.max_attempts,
            backoff: cfg.backoff(),
        };
        let source = UniqueQuoteSource::new(GeminiClient::new(http.clone(), cfg), history, policy, cfg.dedup);

        let composer = QuoteVideoComposer::new(
            FfmpegEncoder::new(),
            ComposerSettings {
                output: cfg.output_path(),
                font: cfg.font_path(),
                music_dir: cfg.music_path(),
                wrap_chars: cfg.wrap_chars,
                style: OverlayStyle::default(),
            },
        );

        // Without client secrets, stored identities can still upload; only
        // refreshing needs the client credentials from the records.
        let refresh_client = oauth
            .clone()
            .unwrap_or_else(|| OAuthClient::new(http.clone(), "", "", cfg.redirect_uri.clone()));
        let publisher = IdentityPublisher::new(YouTubeClient::new(upload_http, refresh_client), Arc::clone(&store));

        let pipeline = Arc::new(Pipeline::new(
            Arc::new(source),
            Arc::new(composer),
            Arc::new(publisher),
            cfg.privacy_status(),
        ));

        Ok(Self { pipeline, store, oauth })
    }

    pub fn into_state(self) -> AppState {
        let authorizer = self.oauth.map(|client| Arc::new(client) as Arc<dyn Authorizer>);
        AppState::new(self.pipeline, self.store, authorizer)
    }
}
