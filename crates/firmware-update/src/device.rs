//! Device link trait.
//!
//! `DeviceLink` is implemented by the host application to bridge the
//! update flow to the real HTTP client. Keeping it a trait lets the state
//! machine run against mocks in tests.

use std::future::Future;
use std::pin::Pin;

use pendant_protocol::{ApiError, UploadAck};
use pendant_transfer::TransferRequest;

/// Boxed future returned by [`DeviceLink`] methods.
pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LinkError>> + Send + 'a>>;

/// Failure of a single device call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The device answered with a negative acknowledgment.
    #[error("rejected by device: {0}")]
    Rejected(ApiError),

    /// The device refused the session cookie.
    #[error("unauthorized")]
    Unauthorized,

    /// No response: connection refused, reset, or timed out.
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device answered, but not with a usable reply.
    #[error("{0}")]
    Other(String),
}

/// Abstract connection to the pendant controller.
pub trait DeviceLink: Send + Sync {
    /// Opens a transfer session for `request`.
    fn begin_transfer(&self, request: &TransferRequest) -> LinkFuture<'_, ()>;

    /// Writes one chunk at `offset`.
    fn upload_chunk(&self, offset: u64, data: Vec<u8>) -> LinkFuture<'_, UploadAck>;

    /// Asks the device to reboot into the new image.
    fn request_reboot(&self) -> LinkFuture<'_, ()>;

    /// Liveness probe. Any HTTP response means the device is back.
    fn probe_liveness(&self) -> LinkFuture<'_, ()>;

    /// Reads the currently running firmware version.
    fn current_version(&self) -> LinkFuture<'_, String>;
}
