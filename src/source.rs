use crate::api::gemini::{QUOTE_PROMPT, TextGenerator};
use crate::error::QuoteError;
use crate::history::HistoryStore;
use crate::quote::Quote;
use crate::{logi, logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self) -> Result<Quote>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Asks a generator for quotes until one has an acceptable length and,
/// when `dedup` is on, is absent from the history. Accepted quotes are
/// appended to the history before being returned.
pub struct UniqueQuoteSource<G> {
    generator: G,
    history: Arc<HistoryStore>,
    policy: RetryPolicy,
    dedup: bool,
    prompt: String,
}

impl<G: TextGenerator> UniqueQuoteSource<G> {
    pub fn new(generator: G, history: Arc<HistoryStore>, policy: RetryPolicy, dedup: bool) -> Self {
        Self {
            generator,
            history,
            policy,
            dedup,
            prompt: QUOTE_PROMPT.to_string(),
        }
    }

    async fn try_once(&self) -> Result<Option<Quote>> {
        let Some(raw) = self.generator.generate(&self.prompt).await? else {
            return Ok(None);
        };
        let Some(quote) = Quote::parse(&raw) else {
            logw("Generated quote was empty after cleaning.");
            return Ok(None);
        };

        if !quote.has_acceptable_length() {
            logw(format!("Rejected quote ({} words): {}", quote.word_count(), quote.text));
            return Ok(None);
        }

        if self.dedup && self.history.contains(&quote.text).await? {
            logw(format!("Rejected quote (already used): {}", quote.text));
            return Ok(None);
        }

        if !self.history.append(&quote.text).await? && self.dedup {
            // Another run accepted the same text between the check and the append.
            return Ok(None);
        }
        Ok(Some(quote))
    }
}

#[async_trait]
impl<G: TextGenerator> QuoteSource for UniqueQuoteSource<G> {
    async fn fetch_quote(&self) -> Result<Quote> {
        for attempt in 1..=self.policy.max_attempts {
            match self.try_once().await {
                Ok(Some(quote)) => {
                    logok(format!("Accepted quote on attempt {}: {}", attempt, quote.text));
                    return Ok(quote);
                }
                Ok(None) => {}
                Err(err) => logw(format!("Quote attempt {} failed: {:#}", attempt, err)),
            }

            if attempt < self.policy.max_attempts {
                let delay = self.policy.delay_after(attempt);
                logi(format!("Retrying quote fetch in {} ms", delay.as_millis()));
                tokio::time::sleep(delay).await;
            }
        }

        Err(QuoteError::SourceExhausted {
            attempts: self.policy.max_attempts,
        }
        .into())
    }
}
