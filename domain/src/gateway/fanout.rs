use crate::counter::CounterUpdate;
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use log::*;
use serde::Serialize;
use service::config::Config;

/// GRIP header carried by requests the fan-out proxy forwards to us.
/// Its presence selects the delegated delivery mode.
pub const GRIP_SIG_HEADER: &str = "grip-sig";
/// GRIP instruction header telling the proxy to hold the connection open.
pub const GRIP_HOLD_HEADER: &str = "grip-hold";
/// GRIP instruction header naming the channel the held connection listens on.
pub const GRIP_CHANNEL_HEADER: &str = "grip-channel";

/// Provider-side channel name for a counter channel id.
pub fn grip_channel(channel_id: &str) -> String {
    format!("counter-{channel_id}")
}

/// Fastly API client for publishing counter updates to provider-held
/// streaming connections
pub struct FanoutClient {
    client: reqwest::Client,
    base_url: String,
    service_id: String,
}

/// Request payload for the provider publish endpoint
#[derive(Debug, Serialize)]
pub struct PublishRequest {
    pub items: Vec<PublishItem>,
}

/// One published item, targeting a provider channel
#[derive(Debug, Serialize)]
pub struct PublishItem {
    pub channel: String,
    pub formats: PublishFormats,
}

/// Format-specific payloads for a published item
#[derive(Debug, Serialize)]
pub struct PublishFormats {
    #[serde(rename = "http-stream")]
    pub http_stream: HttpStreamFormat,
}

/// The http-stream format: raw content appended to every held connection
#[derive(Debug, Serialize)]
pub struct HttpStreamFormat {
    pub content: String,
}

impl FanoutClient {
    /// Create a new Fastly client with authentication
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let service_id = config.fastly_service_id().ok_or_else(|| {
            warn!("Failed to get Fastly service ID from config");
            Error {
                source: None,
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
            }
        })?;

        let client = build_client(config).await?;
        let base_url = config.fastly_api_base_url().to_string();

        Ok(Self {
            client,
            base_url,
            service_id,
        })
    }

    /// Publish one counter update to the provider channel for `channel_id`.
    ///
    /// Fire-and-forget from the caller's perspective: no retry, no
    /// dead-lettering, and overlapping publishes to the same channel carry
    /// no ordering guarantee.
    pub async fn publish(&self, channel_id: &str, update: &CounterUpdate) -> Result<(), Error> {
        let url = format!("{}/service/{}/publish/", self.base_url, self.service_id);

        let request = PublishRequest {
            items: vec![PublishItem {
                channel: grip_channel(channel_id),
                formats: PublishFormats {
                    http_stream: HttpStreamFormat {
                        content: update.sse_frame()?,
                    },
                },
            }],
        };

        debug!(
            "Publishing value {} for channel {channel_id} to {url}",
            update.value
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to send publish request: {e:?}");
                Error {
                    source: Some(Box::new(e)),
                    error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Provider accepted update for channel {channel_id}: {status}");
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Provider rejected update for channel {channel_id}: {status} - {error_text}");
            Err(Error {
                source: None,
                error_kind: DomainErrorKind::External(ExternalErrorKind::Rejected),
            })
        }
    }
}

/// Build HTTP client with Fastly authentication
async fn build_client(config: &Config) -> Result<reqwest::Client, Error> {
    let headers = build_auth_headers(config).await?;

    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .default_headers(headers)
        .build()?)
}

/// Build authentication headers for the Fastly API
async fn build_auth_headers(config: &Config) -> Result<reqwest::header::HeaderMap, Error> {
    let api_key = config.fastly_key().ok_or_else(|| {
        warn!("Failed to get Fastly API key from config");
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
        }
    })?;

    let mut headers = reqwest::header::HeaderMap::new();
    let mut auth_header = reqwest::header::HeaderValue::from_str(&api_key).map_err(|err| {
        warn!("Failed to create Fastly-Key header value: {err:?}");
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "Failed to create Fastly-Key header value".to_string(),
            )),
        }
    })?;
    auth_header.set_sensitive(true);
    headers.insert(
        reqwest::header::HeaderName::from_static("fastly-key"),
        auth_header,
    );

    headers.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    Ok(headers)
}
