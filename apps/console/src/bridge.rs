//! Bridge between `DeviceClient` and the `DeviceLink` trait.

use pendant_device_client::{ClientError, DeviceClient};
use pendant_firmware_update::{DeviceLink, LinkError, LinkFuture};
use pendant_protocol::UploadAck;
use pendant_transfer::TransferRequest;

/// Bridges the HTTP `DeviceClient` to the `DeviceLink` expected by the
/// firmware updater.
pub struct DeviceBridge {
    client: DeviceClient,
}

impl DeviceBridge {
    pub fn new(client: DeviceClient) -> Self {
        Self { client }
    }
}

/// Maps a client failure onto the updater's failure kinds.
fn link_error(err: ClientError) -> LinkError {
    match err {
        ClientError::Rejected(api) => LinkError::Rejected(api),
        ClientError::Unauthorized => LinkError::Unauthorized,
        ClientError::Http(e) if !(e.is_decode() || e.is_body()) => {
            LinkError::Unreachable(e.to_string())
        }
        other => LinkError::Other(other.to_string()),
    }
}

impl DeviceLink for DeviceBridge {
    fn begin_transfer(&self, request: &TransferRequest) -> LinkFuture<'_, ()> {
        let req = request.to_begin_request();
        Box::pin(async move { self.client.firmware_begin(&req).await.map_err(link_error) })
    }

    fn upload_chunk(&self, offset: u64, data: Vec<u8>) -> LinkFuture<'_, UploadAck> {
        Box::pin(async move {
            self.client
                .firmware_upload(offset, data)
                .await
                .map_err(link_error)
        })
    }

    fn request_reboot(&self) -> LinkFuture<'_, ()> {
        Box::pin(async move { self.client.reboot().await.map_err(link_error) })
    }

    fn probe_liveness(&self) -> LinkFuture<'_, ()> {
        Box::pin(async move {
            let status = self.client.probe().await.map_err(link_error)?;
            tracing::trace!(status, "liveness probe answered");
            Ok(())
        })
    }

    fn current_version(&self) -> LinkFuture<'_, String> {
        Box::pin(async move { self.client.firmware_version().await.map_err(link_error) })
    }
}
