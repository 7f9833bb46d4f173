/// Firmware chunk size in bytes.
///
/// Shared with the device firmware's receive buffer. Changing it requires a
/// matching firmware change.
pub const CHUNK_SIZE: usize = 4096;

/// Longest image name the device stores (its name buffer is 64 bytes with NUL).
pub const MAX_IMAGE_NAME_LEN: usize = 63;

/// HTTP API paths served by the device.
pub mod endpoints {
    /// Starts a firmware transfer (`POST`, JSON body).
    pub const FIRMWARE_BEGIN: &str = "/api/firmware/begin";
    /// Writes one chunk (`POST`, octet-stream body, `?offset=N`).
    pub const FIRMWARE_UPLOAD: &str = "/api/firmware/upload";
    /// Requests a device reboot (`POST`).
    pub const REBOOT: &str = "/api/reboot";
    /// Dashboard snapshot; used as the liveness probe (`GET`).
    pub const DASHBOARD: &str = "/api/dashboard";
    /// System/version/network settings (`GET`).
    pub const SETTINGS: &str = "/api/settings";
}

/// Error codes reported by the device in negative acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Parameter validation failed (e.g. unsupported target, bad offset).
    InvalidParam,
    /// The resource is busy or conflicts with another operation.
    Conflict,
    /// Erasing the firmware partition failed.
    FlashErase,
    /// Writing to the firmware partition failed.
    FlashWrite,
}

impl ErrorCode {
    /// Numeric code as sent on the wire.
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidParam => 1001,
            Self::Conflict => 1002,
            Self::FlashErase => 2000,
            Self::FlashWrite => 2001,
        }
    }

    /// Maps a wire code back to a known variant.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(Self::InvalidParam),
            1002 => Some(Self::Conflict),
            2000 => Some(Self::FlashErase),
            2001 => Some(Self::FlashWrite),
            _ => None,
        }
    }
}
