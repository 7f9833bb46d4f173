use std::fmt;
use std::time::Duration;

use pendant_protocol::TargetId;
use pendant_transfer::TransferProgress;

use crate::reconnect::ReconnectConfig;

/// Delay between the reboot request and the first reconnect probe.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(3000);

/// Phase of a firmware update.
///
/// A failed step returns to `Idle` with an error message; there is no
/// separate failed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UpdateState {
    #[default]
    Idle,
    Uploading,
    Success,
    Rebooting,
    Reconnecting,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Success => "success",
            Self::Rebooting => "rebooting",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Returns `true` while an update or its recovery is underway.
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the updater, for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSnapshot {
    pub state: UpdateState,
    /// Chunk-based upload progress; meaningful only while uploading.
    pub progress_percent: u8,
    /// Message of the last failure, cleared when a new action starts.
    pub error_message: Option<String>,
    /// Name of the selected image, if any.
    pub selected_image: Option<String>,
    /// Firmware version last reported by the device.
    pub current_version: Option<String>,
}

/// Events emitted by the updater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// The updater entered a new state.
    StateChanged { state: UpdateState },
    /// Upload progress changed.
    Progress(TransferProgress),
    /// A step failed; the updater is back in `Idle`.
    Failed {
        message: String,
        /// Offset of the chunk that failed, for transfer failures.
        offset: Option<u64>,
    },
    /// The upload was cancelled before it finished.
    Cancelled,
    /// A reconnect probe is about to be sent (1-based).
    ReconnectAttempt { attempt: u32, max_attempts: u32 },
    /// The device answered after the reboot. The host should drop its
    /// cached session and re-initialize (log in again, reload views).
    SessionReset,
}

/// Updater settings.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Component the image is written to.
    pub target: TargetId,
    /// Wait after the reboot request before probing.
    pub settle_delay: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            target: TargetId::Controller,
            settle_delay: DEFAULT_SETTLE_DELAY,
            reconnect: ReconnectConfig::default(),
        }
    }
}
