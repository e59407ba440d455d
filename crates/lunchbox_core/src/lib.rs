//! Lunchbox Engine Core
//!
//! Contains the fundamental batching systems:
//! - Batch memory management (chunk chain, free list, defragmentation)
//! - Generational entity handles used as batch owners
//! - Mesh vertex formats and packing

pub mod entity;
pub mod memory;
pub mod mesh;

pub use glam;

pub use entity::{Entity, EntityAllocator};
pub use memory::{
    Batch, BatchError, ChunkHandle, DeviceSink, MemoryError, MemoryManager, OwnerId, Pack,
    RecordingSink, SinkError,
};
pub use mesh::{MeshData, Vertex, VertexFormat};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
