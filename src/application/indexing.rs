//! Search-engine URL notifications.
//!
//! [`IndexingService`] wraps an [`IndexingClient`] and never fails its
//! caller: mutations schedule a submission and move on, so every outcome is
//! folded into a [`SubmissionResult`] and logged.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

const METRIC_SUBMITTED: &str = "inkpost_indexing_submitted_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NotificationType {
    #[default]
    #[serde(rename = "URL_UPDATED")]
    UrlUpdated,
    #[serde(rename = "URL_DELETED")]
    UrlDeleted,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::UrlUpdated => "URL_UPDATED",
            NotificationType::UrlDeleted => "URL_DELETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingOutcome {
    Submitted { notify_time: Option<String> },
    RateLimited,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexingError {
    #[error("failed to sign service-account assertion: {0}")]
    Signing(String),
    #[error("access token request failed: {0}")]
    Token(String),
    #[error("indexing API returned {code} {status}: {message}")]
    Api {
        code: u16,
        message: String,
        status: String,
    },
    #[error("indexing transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait IndexingClient: Send + Sync {
    async fn publish(
        &self,
        url: &str,
        kind: NotificationType,
    ) -> Result<IndexingOutcome, IndexingError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Submitted { notify_time: Option<String> },
    RateLimited,
    NotConfigured,
    InvalidUrl,
    Failed { message: String },
}

impl SubmissionResult {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionResult::Submitted { .. })
    }
}

#[derive(Clone)]
pub struct IndexingService {
    client: Option<Arc<dyn IndexingClient>>,
    public_url: String,
    submit_delay: Duration,
}

impl IndexingService {
    pub fn new(
        client: Option<Arc<dyn IndexingClient>>,
        public_url: impl Into<String>,
        submit_delay: Duration,
    ) -> Self {
        Self {
            client,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            submit_delay,
        }
    }

    /// A service that skips every submission.
    pub fn disabled(public_url: impl Into<String>) -> Self {
        Self::new(None, public_url, Duration::ZERO)
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Canonical public URL of a post.
    pub fn post_url(&self, slug: &str) -> String {
        format!("{}/blog/{slug}", self.public_url)
    }

    pub async fn submit(&self, url: &str, kind: NotificationType) -> SubmissionResult {
        let Some(client) = self.client.as_ref() else {
            warn!(
                target: "inkpost::indexing",
                url,
                "indexing credentials not configured; skipping submission"
            );
            return SubmissionResult::NotConfigured;
        };

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            warn!(target: "inkpost::indexing", url, "refusing to submit non-http URL");
            return SubmissionResult::InvalidUrl;
        }

        match client.publish(url, kind).await {
            Ok(IndexingOutcome::Submitted { notify_time }) => {
                counter!(METRIC_SUBMITTED, "result" => "submitted").increment(1);
                info!(
                    target: "inkpost::indexing",
                    url,
                    kind = kind.as_str(),
                    "URL submitted for indexing"
                );
                SubmissionResult::Submitted { notify_time }
            }
            Ok(IndexingOutcome::RateLimited) => {
                counter!(METRIC_SUBMITTED, "result" => "rate_limited").increment(1);
                warn!(
                    target: "inkpost::indexing",
                    url,
                    "indexing quota exhausted; the URL will be picked up on the next crawl"
                );
                SubmissionResult::RateLimited
            }
            Err(err) => {
                counter!(METRIC_SUBMITTED, "result" => "failed").increment(1);
                error!(
                    target: "inkpost::indexing",
                    url,
                    kind = kind.as_str(),
                    error = %err,
                    "indexing submission failed"
                );
                SubmissionResult::Failed {
                    message: err.to_string(),
                }
            }
        }
    }

    /// Submit `urls` one after another, pausing between requests.
    ///
    /// Returns how many were accepted.
    pub async fn submit_batch(&self, urls: &[String], kind: NotificationType) -> usize {
        let mut submitted = 0;
        for (index, url) in urls.iter().enumerate() {
            if self.submit(url, kind).await.is_submitted() {
                submitted += 1;
            }
            if index + 1 < urls.len() && !self.submit_delay.is_zero() {
                tokio::time::sleep(self.submit_delay).await;
            }
        }
        submitted
    }

    /// Fire-and-forget submission used by mutations.
    pub fn schedule(&self, url: String, kind: NotificationType) {
        if !self.is_configured() {
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            service.submit(&url, kind).await;
        });
    }
}
