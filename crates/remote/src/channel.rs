//! Message-channel store client.
//!
//! Each slice is posted as a message with one attachment; the attachment URL
//! returned by the API is the slice locator. Downloads are plain GETs of that
//! URL and carry no credentials.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::store::{RemoteError, RemoteStore, StoreFuture};
use crate::types::{MessagePayload, MessageResponse};

const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";
const USER_AGENT: &str = concat!("cake/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole-request budget; an 8 MB slice needs well under this on a slow link.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Nonces are 19-digit decimals.
const NONCE_MIN: u64 = 1_000_000_000_000_000_000;
const NONCE_MAX: u64 = 9_999_999_999_999_999_999;

/// Credentials and destination for [`ChannelStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Value of the `Authorization` header for posting.
    pub token: String,
    /// Channel that receives the slice messages.
    pub channel: String,
    /// API root, without a trailing slash.
    pub api_base: String,
    pub connect_timeout: Duration,
    /// Upper bound on one request, body transfer included. A stalled
    /// request fails with [`RemoteError::Transport`].
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl StoreConfig {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            channel: channel.into(),
            ..Self::default()
        }
    }

    /// Overrides the API root (self-hosted gateways, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// `true` when both token and channel are set.
    pub fn can_upload(&self) -> bool {
        !self.token.is_empty() && !self.channel.is_empty()
    }
}

/// Message-channel backed [`RemoteStore`].
pub struct ChannelStore {
    http: reqwest::Client,
    config: StoreConfig,
    auth: HeaderValue,
}

impl ChannelStore {
    /// Creates a client. The token is only checked for header validity here;
    /// a missing token or channel fails on the first `put`.
    pub fn new(config: StoreConfig) -> Result<Self, RemoteError> {
        let mut auth = HeaderValue::from_str(&config.token)
            .map_err(|_| RemoteError::InvalidConfig("token is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteError::InvalidConfig(e.to_string()))?;

        Ok(Self { http, config, auth })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/channels/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.channel
        )
    }

    /// Posts one slice as a message attachment named `<label>.slice`.
    async fn post_slice(&self, payload: &[u8], label: u64) -> Result<String, RemoteError> {
        if !self.config.can_upload() {
            return Err(RemoteError::InvalidConfig(
                "token and channel are required to upload".into(),
            ));
        }

        let message = MessagePayload {
            content: label.to_string(),
            nonce: fresh_nonce().to_string(),
            tts: false,
        };
        let payload_json =
            serde_json::to_string(&message).map_err(|e| RemoteError::Transport(e.to_string()))?;

        let part = Part::bytes(payload.to_vec()).file_name(format!("{label}.slice"));
        let form = Form::new()
            .text("payload_json", payload_json)
            .part("files[0]", part);

        let resp = self
            .http
            .post(self.messages_url())
            .header(AUTHORIZATION, self.auth.clone())
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        let message: MessageResponse =
            serde_json::from_slice(&body).map_err(|e| RemoteError::Rejected {
                status: status.as_u16(),
                body: format!("unexpected response body: {e}"),
            })?;

        let url = message
            .attachment_url()
            .ok_or_else(|| RemoteError::Rejected {
                status: status.as_u16(),
                body: "response carried no attachment".into(),
            })?
            .to_string();

        debug!(label, message_id = %message.id, "slice posted");
        Ok(url)
    }

    /// Downloads an attachment by URL.
    async fn download(&self, locator: &str) -> Result<Vec<u8>, RemoteError> {
        let resp = self.http.get(locator).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

impl RemoteStore for ChannelStore {
    fn put<'a>(&'a self, payload: &'a [u8], label: u64) -> StoreFuture<'a, String> {
        Box::pin(self.post_slice(payload, label))
    }

    fn get<'a>(&'a self, locator: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(self.download(locator))
    }
}

fn fresh_nonce() -> u64 {
    rand::thread_rng().gen_range(NONCE_MIN..=NONCE_MAX)
}
