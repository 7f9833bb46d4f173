/// Transfer progress recomputed after every acknowledged chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes acknowledged by the device so far.
    pub bytes_sent: u64,
    /// Total image size.
    pub total_size: u64,
    /// Chunk-based completion, 0..=100.
    pub percent: u8,
}

impl TransferProgress {
    /// Progress once every chunk has been acknowledged.
    pub fn complete(total_size: u64) -> Self {
        Self {
            bytes_sent: total_size,
            total_size,
            percent: 100,
        }
    }
}
