use std::fmt;

use serde::{Deserialize, Serialize};

/// Upgradeable unit on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TargetId {
    /// The pendant/controller main firmware image.
    #[default]
    #[serde(rename = "controller")]
    Controller,
}

impl TargetId {
    /// Value sent in the `target` field of the begin request.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
        }
    }

    /// Human-readable label shown next to the target selector.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Controller => "Pendant",
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/firmware/begin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareBeginRequest {
    pub target: TargetId,
    pub name: String,
    pub size: u64,
}

/// Payload of a positive chunk-upload acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    /// Offset the device wrote at.
    pub offset: u64,
    /// Bytes written from this chunk.
    pub written: u64,
}

/// Version block of the settings reply (`data.ver`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVersion {
    #[serde(default)]
    pub firmware: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hardware: String,
    #[serde(default)]
    pub serial: String,
}

/// Subset of `GET /api/settings` this console reads.
///
/// The `system` and `network` blocks are owned by the settings screens and
/// are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsData {
    pub ver: DeviceVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<serde_json::Value>,
}
