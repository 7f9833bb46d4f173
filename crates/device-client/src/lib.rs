//! HTTP client for the pendant controller.
//!
//! A thin RPC wrapper over the device's firmware, reboot, settings and
//! liveness endpoints. It has no session or retry logic: every call maps
//! to exactly one HTTP request and the transport's own timeout applies.

pub mod client;

pub use client::{ClientConfig, ClientError, DeviceClient};
