use std::path::Path;

use pendant_protocol::{FirmwareBeginRequest, TargetId};

use crate::{TransferError, checksum_bytes, validate_image_name};

/// A firmware image selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    name: String,
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Wraps an in-memory image.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Reads an image from disk, naming it after the file.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, data })
    }

    /// File name sent to the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Hex SHA-256 of the image, for logs and display.
    pub fn digest(&self) -> String {
        checksum_bytes(&self.data)
    }
}

impl std::fmt::Debug for FirmwareImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareImage")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Validated description of a transfer, fixed once the transfer begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub target: TargetId,
    pub name: String,
    pub total_size: u64,
}

impl TransferRequest {
    /// Validates `image` and builds the request for `target`.
    pub fn new(target: TargetId, image: &FirmwareImage) -> Result<Self, TransferError> {
        validate_image_name(image.name())?;
        if image.size() == 0 {
            return Err(TransferError::EmptyImage);
        }
        Ok(Self {
            target,
            name: image.name().to_string(),
            total_size: image.size(),
        })
    }

    /// Body of the begin-transfer call.
    pub fn to_begin_request(&self) -> FirmwareBeginRequest {
        FirmwareBeginRequest {
            target: self.target,
            name: self.name.clone(),
            size: self.total_size,
        }
    }
}
