//! Firmware update flow for the pendant controller.
//!
//! This crate holds the **business logic** of a firmware update: it owns
//! the upload state machine and the reconnect supervisor. It has no HTTP
//! dependency; the host application provides a [`DeviceLink`] that bridges
//! to the actual device client.
//!
//! # Lifecycle
//!
//! 1. **Select** — pick and validate an image (`Idle`)
//! 2. **Upload** — begin the transfer, stream 4 KiB chunks (`Uploading`)
//! 3. **Confirm** — image written, waiting for the operator (`Success`)
//! 4. **Reboot** — request a reboot, let the device settle (`Rebooting`)
//! 5. **Reconnect** — poll the device until it answers (`Reconnecting`)

pub mod device;
pub mod error;
pub mod messages;
pub mod reconnect;
pub mod types;
pub mod updater;

pub use device::{DeviceLink, LinkError, LinkFuture};
pub use error::ActionError;
pub use messages::{Catalog, Language, MessageCatalog, MessageKey};
pub use reconnect::{ReconnectAttempts, ReconnectConfig, ReconnectOutcome, supervise};
pub use types::{UpdateEvent, UpdateSnapshot, UpdateState, UpdaterConfig};
pub use updater::FirmwareUpdater;
