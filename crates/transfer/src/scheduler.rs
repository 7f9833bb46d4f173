//! Sequential chunk delivery.
//!
//! One chunk is outstanding at a time: the next chunk is sliced only after
//! the previous send resolves. The first failure stops the run.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{ChunkJob, ChunkPlan, DEFAULT_CHUNK_SIZE, TransferProgress};

/// Why a scheduled transfer stopped before the last chunk.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError<E> {
    /// The send function failed (transport error or negative ack).
    #[error("chunk at offset {offset} failed: {source}")]
    Chunk {
        offset: u64,
        #[source]
        source: E,
    },

    /// Cancellation was requested; `offset` is the first chunk not sent.
    #[error("transfer cancelled at offset {offset}")]
    Cancelled { offset: u64 },
}

impl<E> ScheduleError<E> {
    /// Offset of the chunk that was not delivered.
    pub fn offset(&self) -> u64 {
        match self {
            Self::Chunk { offset, .. } | Self::Cancelled { offset } => *offset,
        }
    }
}

/// Splits a payload into chunks and sends them one by one.
#[derive(Debug, Clone, Copy)]
pub struct ChunkScheduler {
    chunk_size: usize,
}

impl Default for ChunkScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkScheduler {
    /// Creates a scheduler for `chunk_size`-byte chunks (0 = default).
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self { chunk_size }
    }

    /// Chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sends `payload` through `send`, chunk by chunk, in ascending order.
    ///
    /// The acknowledgment value returned by `send` is not inspected; any
    /// `Ok` counts as delivered.
    ///
    /// `on_progress` is called after every acknowledged chunk. `cancel` is
    /// checked before each chunk; a chunk already in flight always finishes.
    /// Returns the final progress (100%) once every chunk is acknowledged.
    pub async fn run<F, Fut, A, E, P>(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
        mut send: F,
        mut on_progress: P,
    ) -> Result<TransferProgress, ScheduleError<E>>
    where
        F: FnMut(ChunkJob) -> Fut,
        Fut: Future<Output = Result<A, E>>,
        P: FnMut(TransferProgress),
    {
        let total_size = payload.len() as u64;
        let plan = ChunkPlan::new(total_size, self.chunk_size);
        let total_chunks = plan.total_chunks();
        let mut bytes_sent: u64 = 0;

        debug!(total_size, total_chunks, chunk_size = self.chunk_size, "chunk transfer starting");

        for (index, range) in plan.ranges().enumerate() {
            let offset = range.start;
            if cancel.is_cancelled() {
                debug!(offset, "chunk transfer cancelled");
                return Err(ScheduleError::Cancelled { offset });
            }

            let job = ChunkJob {
                offset,
                payload: payload[range.start as usize..range.end as usize].to_vec(),
            };
            let len = job.payload.len() as u64;

            if let Err(source) = send(job).await {
                warn!(offset, index, "chunk send failed, aborting transfer");
                return Err(ScheduleError::Chunk { offset, source });
            }

            bytes_sent += len;
            let progress = TransferProgress {
                bytes_sent,
                total_size,
                percent: plan.percent_after(index as u64),
            };
            debug!(offset, len, percent = progress.percent, "chunk acknowledged");
            on_progress(progress);
        }

        Ok(TransferProgress::complete(total_size))
    }
}
