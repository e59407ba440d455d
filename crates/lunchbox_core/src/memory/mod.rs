//! Batch memory management
//!
//! Packs per-entity vertex data into one contiguous buffer mirrored on the
//! device. Occupied chunks and gaps form a doubly-linked chain in address
//! order; removal merges neighbouring gaps, allocation reuses gaps first-fit,
//! and defragmentation slides data down to reclaim them.

mod batch;
mod chunk;
mod error;
mod free_list;
mod manager;
mod sink;

pub use batch::{Batch, Pack};
pub use chunk::{Chunk, ChunkHandle, OwnerId};
pub use error::{BatchError, InvariantViolation, MemoryError, SinkError};
pub use manager::{BatchStats, MemoryManager, DEFAULT_QUICK_LIMIT};
pub use sink::{check_upload, DeviceSink, RecordingSink, COPY_ALIGNMENT};
