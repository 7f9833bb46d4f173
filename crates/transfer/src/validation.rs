use pendant_protocol::MAX_IMAGE_NAME_LEN;

use crate::TransferError;

/// Validates an image file name before it is sent in the begin request.
///
/// Rejects:
/// - Empty names
/// - Names longer than the device's name buffer
/// - Path separators (`/`, `\`) and NUL bytes
pub fn validate_image_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name.len() > MAX_IMAGE_NAME_LEN {
        return Err(TransferError::InvalidName(format!(
            "name longer than {MAX_IMAGE_NAME_LEN} bytes: {name}"
        )));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {name}"
        )));
    }

    if name.contains('\0') {
        return Err(TransferError::InvalidName("NUL byte not allowed".into()));
    }

    Ok(())
}
