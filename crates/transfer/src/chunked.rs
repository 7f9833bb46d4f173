use std::ops::Range;

use sha2::{Digest, Sha256};

use crate::DEFAULT_CHUNK_SIZE;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Deterministic partition of a payload into fixed-size chunks.
///
/// Chunk `i` covers `[i * chunk_size, min((i + 1) * chunk_size, total_size))`.
/// Ranges are contiguous, non-overlapping and cover `[0, total_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Plans `total_size` bytes in chunks of `chunk_size`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (4 KiB) is used.
    pub fn new(total_size: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            total_size,
            chunk_size: chunk_size as u64,
        }
    }

    /// Total payload size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks: `ceil(total_size / chunk_size)`, 0 for an empty payload.
    pub fn total_chunks(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    /// Byte range of chunk `index`, or `None` past the last chunk.
    pub fn bounds(&self, index: u64) -> Option<Range<u64>> {
        if index >= self.total_chunks() {
            return None;
        }
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        Some(start..end)
    }

    /// Iterates all chunk ranges in ascending offset order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + use<> {
        let plan = *self;
        (0..plan.total_chunks()).filter_map(move |i| plan.bounds(i))
    }

    /// Progress after chunk `index` is acknowledged:
    /// `round((index + 1) / total_chunks * 100)`, half rounding up.
    ///
    /// Only the final chunk reports 100; earlier chunks are capped at 99 so
    /// that large images (more than 200 chunks) never look finished early.
    pub fn percent_after(&self, index: u64) -> u8 {
        let total = self.total_chunks();
        if total == 0 {
            return 100;
        }
        let done = (index + 1).min(total);
        if done == total {
            return 100;
        }
        ((done * 100 + total / 2) / total).min(99) as u8
    }
}

// ---------------------------------------------------------------------------
// ChunkJob
// ---------------------------------------------------------------------------

/// A single chunk handed to the send function.
///
/// Owned so the send future can move it into the request body; dropped
/// once the device acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkJob {
    /// Byte offset within the image.
    pub offset: u64,
    /// Raw chunk data (at most one chunk size).
    pub payload: Vec<u8>,
}
