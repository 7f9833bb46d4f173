//! Update action errors.

use crate::types::UpdateState;

/// An operator action that was refused by the state machine.
///
/// Device failures are not reported here; they surface as an error
/// message on the snapshot and an [`UpdateEvent::Failed`](crate::UpdateEvent).
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("update in progress ({0})")]
    Busy(UpdateState),

    #[error("no firmware image selected")]
    NoImage,

    #[error("invalid firmware image: {0}")]
    InvalidImage(#[from] pendant_transfer::TransferError),

    #[error("reboot not available in state {0}")]
    NotReady(UpdateState),

    #[error("no upload in progress")]
    NotUploading,
}
