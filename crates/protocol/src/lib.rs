//! Wire types for the pendant controller HTTP API.
//!
//! Every API call answers with the same JSON envelope
//! (`{"ack": bool, "data"?: T, "error"?: {code, message}}`), modelled by
//! [`ApiResponse`].

pub mod constants;
pub mod envelope;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{CHUNK_SIZE, ErrorCode, MAX_IMAGE_NAME_LEN, endpoints};
pub use envelope::{ApiError, ApiResponse};
pub use types::{DeviceVersion, FirmwareBeginRequest, SettingsData, TargetId, UploadAck};
