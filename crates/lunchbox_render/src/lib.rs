//! Lunchbox Render System
//!
//! GPU-side storage for batches: the wgpu vertex buffer a
//! [`MemoryManager`](lunchbox_core::MemoryManager) mirrors into, and the
//! vertex layout matching the engine's interleaved format.

pub mod buffer;
pub mod device;

pub use buffer::{vertex_buffer_layout, GpuBatchBuffer};
pub use device::{request_headless, RenderError};
pub use wgpu;
