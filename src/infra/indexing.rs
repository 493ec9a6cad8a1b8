//! Google Indexing API client.
//!
//! A service-account JWT (RS256) is exchanged for an OAuth2 access token,
//! which is reused until shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::indexing::{
    IndexingClient, IndexingError, IndexingOutcome, NotificationType,
};
use crate::config::{IndexingSettings, ServiceAccountCredentials};
use crate::infra::error::InfraError;

pub const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: NotificationType,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    url_notification_metadata: Option<NotificationMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationMetadata {
    #[serde(default)]
    latest_update: Option<LatestNotification>,
    #[serde(default)]
    latest_remove: Option<LatestNotification>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestNotification {
    #[serde(default)]
    notify_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct GoogleIndexingClient {
    http: Client,
    client_email: String,
    signing_key: EncodingKey,
    token_url: String,
    endpoint: String,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleIndexingClient {
    pub fn new(
        credentials: &ServiceAccountCredentials,
        settings: &IndexingSettings,
    ) -> Result<Self, InfraError> {
        let signing_key = EncodingKey::from_rsa_pem(credentials.private_key_pem.as_bytes())
            .map_err(|err| {
                InfraError::configuration(format!("indexing.private_key is not an RSA PEM: {err}"))
            })?;
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            http,
            client_email: credentials.client_email.clone(),
            signing_key,
            token_url: settings.token_url.clone(),
            endpoint: settings.endpoint.clone(),
            token: Mutex::new(None),
        })
    }

    /// Build a client when credentials are configured.
    pub fn from_settings(settings: &IndexingSettings) -> Result<Option<Self>, InfraError> {
        settings
            .credentials
            .as_ref()
            .map(|credentials| Self::new(credentials, settings))
            .transpose()
    }

    fn sign_assertion(&self) -> Result<String, IndexingError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            scope: INDEXING_SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|err| IndexingError::Signing(err.to_string()))
    }

    async fn access_token(&self) -> Result<String, IndexingError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.refresh_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let assertion = self.sign_assertion()?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|err| IndexingError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexingError::Token(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| IndexingError::Token(format!("malformed token response: {err}")))?;

        let lifetime = token_lifetime(token.expires_in);
        let refresh_at = Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(
            target: "inkpost::indexing",
            expires_in = lifetime.as_secs(),
            "obtained indexing access token"
        );

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl IndexingClient for GoogleIndexingClient {
    async fn publish(
        &self,
        url: &str,
        kind: NotificationType,
    ) -> Result<IndexingOutcome, IndexingError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&PublishRequest { url, kind })
            .send()
            .await
            .map_err(|err| IndexingError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(IndexingOutcome::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|err| IndexingError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: PublishResponse = serde_json::from_str(&body).unwrap_or_default();
        let notify_time = parsed.url_notification_metadata.and_then(|metadata| {
            metadata
                .latest_update
                .and_then(|latest| latest.notify_time)
                .or_else(|| metadata.latest_remove.and_then(|latest| latest.notify_time))
        });

        Ok(IndexingOutcome::Submitted { notify_time })
    }
}

/// Token lifetimes are capped at the assertion lifetime we asked for.
fn token_lifetime(expires_in: Option<u64>) -> Duration {
    let max = ASSERTION_LIFETIME_SECS as u64;
    Duration::from_secs(expires_in.map_or(max, |secs| secs.min(max)))
}

fn api_error(status: StatusCode, body: &str) -> IndexingError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => IndexingError::Api {
            code: error.code.unwrap_or(status.as_u16()),
            message: error.message.unwrap_or_else(|| body.to_string()),
            status: error
                .status
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
        },
        Err(_) => IndexingError::Api {
            code: status.as_u16(),
            message: body.to_string(),
            status: status.canonical_reason().unwrap_or("").to_string(),
        },
    }
}
