use crate::memory::{ChunkHandle, OwnerId};
use thiserror::Error;

/// Failures reported by a [`DeviceSink`](crate::memory::DeviceSink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("upload of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("upload range {offset}+{len} is not aligned to {alignment} bytes")]
    Misaligned { offset: u64, len: u64, alignment: u64 },

    #[error("device buffer has not been reserved")]
    NotReserved,

    #[error("device buffer is already reserved ({size} bytes)")]
    AlreadyReserved { size: u64 },
}

/// Errors returned by [`MemoryManager`](crate::memory::MemoryManager).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("batch is full: requested {requested} elements, {available} available at the tail")]
    BatchFull { requested: usize, available: usize },

    #[error("cannot allocate an empty blob")]
    EmptyData,

    #[error("blob of {len} elements is not a multiple of the record stride {stride}")]
    MisalignedData { len: usize, stride: usize },

    #[error("in-place rewrite needs {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("chunk handle {0:?} does not refer to a live chunk")]
    StaleHandle(ChunkHandle),

    #[error("chunk handle {0:?} refers to a gap")]
    NotOccupied(ChunkHandle),

    #[error("element size {size} is not a multiple of the 4 byte copy alignment")]
    UnalignedElement { size: usize },

    #[error("capacity and stride must both be non-zero")]
    ZeroCapacity,

    #[error("batch of {capacity} records of stride {stride} is too large to address")]
    CapacityOverflow { capacity: usize, stride: usize },

    #[error("device upload failed: {0}")]
    Device(#[from] SinkError),

    #[error("a previous device upload failed; the batch must be rebuilt")]
    Poisoned,
}

/// Errors returned by [`Batch`](crate::memory::Batch).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("owner {0} is not in this batch")]
    UnknownOwner(OwnerId),

    #[error("owner {0} is already in this batch")]
    DuplicateOwner(OwnerId),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Chain corruption detected by
/// [`MemoryManager::check_invariants`](crate::memory::MemoryManager::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("chunk {chunk} ends at {last} but its successor starts at {next_first}")]
    Discontinuity {
        chunk: u64,
        last: usize,
        next_first: usize,
    },

    #[error("chunks {first} and {second} are adjacent gaps")]
    AdjacentGaps { first: u64, second: u64 },

    #[error("tail chunk {chunk} is a gap")]
    GapAtTail { chunk: u64 },

    #[error("chain ends at {chain_end} but the write cursor is {write_cursor}")]
    CursorMismatch {
        chain_end: usize,
        write_cursor: usize,
    },

    #[error("free list holds {listed} gaps, chain holds {in_chain}")]
    FreeListMismatch { listed: usize, in_chain: usize },

    #[error("chunk {chunk} has a broken prev/next link")]
    BrokenLink { chunk: u64 },
}
