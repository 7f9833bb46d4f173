//! Firmware image chunking and sequential chunk delivery.
//!
//! [`ChunkPlan`] partitions an image into fixed-size `[start, end)` ranges;
//! [`ChunkScheduler`] drives those chunks through a caller-supplied send
//! function one at a time, reporting [`TransferProgress`] after every
//! acknowledged chunk.

mod chunked;
mod progress;
mod scheduler;
mod types;
mod validation;

pub use chunked::{ChunkJob, ChunkPlan, checksum_bytes};
pub use progress::TransferProgress;
pub use scheduler::{ChunkScheduler, ScheduleError};
pub use types::{FirmwareImage, TransferRequest};
pub use validation::validate_image_name;

/// Default chunk size, the device protocol constant (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = pendant_protocol::CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid image name: {0}")]
    InvalidName(String),

    #[error("firmware image is empty")]
    EmptyImage,
}
