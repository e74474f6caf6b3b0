// src/services/session.rs

//! Fetch sessions with bounded retry.
//!
//! A [`PageSource`] knows how to open a transport session, load the raw
//! markup for one identifier and close the session again. [`FetchSession`]
//! wraps one opened session, retries navigation a bounded number of times,
//! and closes the session exactly once when it goes out of scope.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::CrawlerConfig;
use crate::utils::http;

/// Anything that can produce raw page markup for an identifier.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Per-session transport state (a client, a browser tab, a test cursor).
    type Session: Send;

    /// Open a new session.
    async fn open(&self) -> Result<Self::Session>;

    /// Load the markup for one identifier.
    async fn load(&self, session: &mut Self::Session, identifier: &str) -> Result<String>;

    /// Release a session. Called once per successful `open`.
    fn close(&self, session: Self::Session);
}

/// Bounded retry with a fixed back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }
}

impl From<&CrawlerConfig> for RetryPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self::new(config.retry_count, config.retry_delay())
    }
}

/// One acquired session. Closed on drop.
pub struct FetchSession<'a, S: PageSource> {
    source: &'a S,
    session: Option<S::Session>,
    retry: RetryPolicy,
    page: Option<String>,
}

impl<'a, S: PageSource> FetchSession<'a, S> {
    /// Open a session on `source`.
    pub async fn acquire(source: &'a S, retry: RetryPolicy) -> Result<Self> {
        let session = source.open().await?;
        Ok(Self {
            source,
            session: Some(session),
            retry,
            page: None,
        })
    }

    /// Load `target`, retrying on failure.
    ///
    /// Returns false once every attempt has failed.
    pub async fn navigate(&mut self, target: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let attempts = self.retry.attempts;

        for attempt in 1..=attempts {
            match self.source.load(session, target).await {
                Ok(markup) => {
                    self.page = Some(markup);
                    return true;
                }
                Err(e) => {
                    log::warn!(
                        "Retrying ({}/{}) to load {}: {}",
                        attempt,
                        attempts,
                        target,
                        e
                    );
                    if attempt < attempts && !self.retry.backoff.is_zero() {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        self.page = None;
        false
    }

    /// Markup loaded by the last successful navigation.
    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }

    /// Close the session now.
    pub fn release(self) {
        drop(self);
    }
}

impl<S: PageSource> Drop for FetchSession<'_, S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.source.close(session);
        }
    }
}

/// Production source: plain HTTP GET against the detail page template.
pub struct HttpSource {
    config: CrawlerConfig,
}

impl HttpSource {
    pub fn new(config: CrawlerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageSource for HttpSource {
    type Session = reqwest::Client;

    async fn open(&self) -> Result<Self::Session> {
        http::create_client(&self.config)
    }

    async fn load(&self, session: &mut Self::Session, identifier: &str) -> Result<String> {
        let url = http::detail_url(&self.config.url_template, identifier)?;
        log::debug!("GET {}", url);
        http::fetch_text(session, url).await
    }

    fn close(&self, _session: Self::Session) {
        log::debug!("HTTP session closed");
    }
}
