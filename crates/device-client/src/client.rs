//! Pendant controller API client.
//!
//! Async HTTP client using `reqwest`. The session cookie (if any) is issued
//! by the console's login flow and passed in through [`ClientConfig`].

use std::time::Duration;

use pendant_protocol::{
    ApiError, ApiResponse, FirmwareBeginRequest, SettingsData, UploadAck, endpoints,
};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the device client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure: connection refused, reset, timeout, bad TLS.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The device rejected the session (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Non-success status without a parseable envelope.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The device answered with a negative acknowledgment.
    #[error("rejected by device: {0}")]
    Rejected(#[from] ApiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty response")]
    EmptyResponse,

    #[error("invalid session cookie")]
    InvalidCookie,

    #[error("invalid device URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Rejection details when the device answered with a negative ack.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

/// Connection settings for [`DeviceClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Device base URL, e.g. `http://192.168.1.10`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Raw `Cookie` header value from the login flow.
    pub session_cookie: Option<String>,
}

impl ClientConfig {
    /// Config for `base_url` with the default timeout and no session.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            session_cookie: None,
        }
    }
}

/// Pendant controller API client.
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
}

impl DeviceClient {
    /// Creates a client for the device at `config.base_url`.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }

        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie).map_err(|_| ClientError::InvalidCookie)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Device base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Announces a firmware transfer (`POST /api/firmware/begin`).
    ///
    /// The device erases its update partition before acknowledging.
    pub async fn firmware_begin(&self, req: &FirmwareBeginRequest) -> Result<(), ClientError> {
        debug!(target_id = %req.target, name = %req.name, size = req.size, "firmware begin");
        let resp = self
            .http
            .post(self.url(endpoints::FIRMWARE_BEGIN))
            .json(req)
            .send()
            .await?;
        read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    /// Writes one chunk at `offset` (`POST /api/firmware/upload?offset=N`).
    pub async fn firmware_upload(&self, offset: u64, data: Vec<u8>) -> Result<UploadAck, ClientError> {
        let len = data.len() as u64;
        trace!(offset, len, "firmware upload");
        let resp = self
            .http
            .post(self.url(endpoints::FIRMWARE_UPLOAD))
            .query(&[("offset", offset)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        let ack = read_envelope::<UploadAck>(resp).await?;
        // Older firmware acks without a data block.
        Ok(ack.unwrap_or(UploadAck {
            offset,
            written: len,
        }))
    }

    /// Asks the device to reboot (`POST /api/reboot`).
    ///
    /// The device may drop the connection before answering; callers that
    /// only need the request issued should ignore the result.
    pub async fn reboot(&self) -> Result<(), ClientError> {
        debug!("reboot requested");
        let resp = self.http.post(self.url(endpoints::REBOOT)).send().await?;
        read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    /// Liveness probe (`GET /api/dashboard`).
    ///
    /// Any HTTP response, including 401, means the device is answering and
    /// returns its status code. Only transport failures are errors.
    pub async fn probe(&self) -> Result<u16, ClientError> {
        let resp = self.http.get(self.url(endpoints::DASHBOARD)).send().await?;
        let status = resp.status().as_u16();
        trace!(status, "liveness probe answered");
        Ok(status)
    }

    /// Reads the settings block (`GET /api/settings`).
    pub async fn settings(&self) -> Result<SettingsData, ClientError> {
        let resp = self.http.get(self.url(endpoints::SETTINGS)).send().await?;
        read_envelope::<SettingsData>(resp)
            .await?
            .ok_or(ClientError::EmptyResponse)
    }

    /// Current firmware version string reported by the device.
    pub async fn firmware_version(&self) -> Result<String, ClientError> {
        Ok(self.settings().await?.ver.firmware)
    }
}

/// Decodes the `{ack, data, error}` envelope of a device reply.
async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<Option<T>, ClientError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    let body = resp.bytes().await?;
    match serde_json::from_slice::<ApiResponse<T>>(&body) {
        Ok(envelope) => Ok(envelope.into_result()?),
        Err(e) if status.is_success() => Err(ClientError::Json(e)),
        Err(_) => Err(ClientError::Api {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        }),
    }
}
