use serde::{Deserialize, Serialize};

/// Error details carried by a negative acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("device error {code}: {message}")]
pub struct ApiError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Envelope for every device API reply.
///
/// `ack == false` means the request was rejected; `error` then carries the
/// reason. Successful replies may carry a typed `data` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T = serde_json::Value> {
    pub ack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Creates a positive acknowledgment.
    pub fn ok(data: Option<T>) -> Self {
        Self {
            ack: true,
            data,
            error: None,
        }
    }

    /// Creates a negative acknowledgment.
    pub fn fail(code: i32, message: impl Into<String>) -> Self {
        Self {
            ack: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Converts the envelope into a `Result`.
    ///
    /// A negative ack without an `error` object is still a rejection; it
    /// maps to code 0 with an empty message so the caller's fallback text
    /// applies.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.ack {
            Ok(self.data)
        } else {
            Err(self.error.unwrap_or(ApiError {
                code: 0,
                message: String::new(),
            }))
        }
    }
}
