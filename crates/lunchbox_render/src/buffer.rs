//! wgpu-backed batch buffer
//!
//! One `VERTEX | COPY_DST` buffer per batch, created once at full capacity.
//! Every later write goes through `Queue::write_buffer` for exactly the
//! sub-range the memory manager changed.

use lunchbox_core::memory::{check_upload, DeviceSink, SinkError};
use lunchbox_core::Vertex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Shader locations of the interleaved position/uv/normal attributes.
const BATCH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x3];

/// Vertex buffer layout for batches packed from [`Vertex`] data.
pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &BATCH_ATTRIBUTES,
    }
}

/// Device sink writing into a wgpu vertex buffer.
pub struct GpuBatchBuffer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    label: String,
    buffer: Option<wgpu::Buffer>,
}

impl GpuBatchBuffer {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, label: impl Into<String>) -> Self {
        Self {
            device,
            queue,
            label: label.into(),
            buffer: None,
        }
    }

    /// Buffer to bind for drawing. `None` until the manager reserved it.
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    pub fn size(&self) -> u64 {
        self.buffer.as_ref().map_or(0, wgpu::Buffer::size)
    }
}

impl DeviceSink for GpuBatchBuffer {
    fn reserve(&mut self, size_bytes: u64) -> Result<(), SinkError> {
        if let Some(buffer) = &self.buffer {
            return Err(SinkError::AlreadyReserved {
                size: buffer.size(),
            });
        }
        check_upload(0, size_bytes, size_bytes)?;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label.as_str()),
            size: size_bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        debug!(label = %self.label, size_bytes, "batch vertex buffer created");
        self.buffer = Some(buffer);
        Ok(())
    }

    fn upload(&mut self, offset_bytes: u64, bytes: &[u8]) -> Result<(), SinkError> {
        let buffer = self.buffer.as_ref().ok_or(SinkError::NotReserved)?;
        check_upload(offset_bytes, bytes.len() as u64, buffer.size())?;

        self.queue.write_buffer(buffer, offset_bytes, bytes);
        trace!(label = %self.label, offset_bytes, len = bytes.len(), "queued buffer write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lunchbox_core::VertexFormat;

    #[test]
    fn test_layout_matches_vertex_format() {
        let layout = vertex_buffer_layout();
        let format = VertexFormat::POSITION_UV_NORMAL;

        assert_eq!(layout.array_stride, (format.stride() * 4) as u64);
        assert_eq!(layout.attributes.len(), 3);

        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 20]);
        assert_eq!(layout.attributes[1].format, wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn test_copy_alignment_matches_wgpu() {
        assert_eq!(lunchbox_core::memory::COPY_ALIGNMENT, wgpu::COPY_BUFFER_ALIGNMENT);
    }

    /// Software adapter first, then any adapter. `None` on machines without one.
    fn headless() -> Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
        pollster::block_on(crate::request_headless(true))
            .or_else(|_| pollster::block_on(crate::request_headless(false)))
            .map_err(|err| eprintln!("skipping GPU test: {err}"))
            .ok()
    }

    #[test]
    fn test_reserve_and_upload_contract() {
        let Some((device, queue)) = headless() else {
            return;
        };
        let mut sink = GpuBatchBuffer::new(device.clone(), queue, "contract");

        assert_eq!(sink.upload(0, &[0; 4]), Err(SinkError::NotReserved));
        assert!(sink.buffer().is_none());

        sink.reserve(64).unwrap();
        assert_eq!(sink.size(), 64);
        assert_eq!(sink.reserve(128), Err(SinkError::AlreadyReserved { size: 64 }));

        sink.upload(8, &[1; 16]).unwrap();
        assert!(matches!(
            sink.upload(64, &[0; 4]),
            Err(SinkError::OutOfBounds { .. })
        ));
        assert!(matches!(
            sink.upload(2, &[0; 4]),
            Err(SinkError::Misaligned { .. })
        ));
        device.poll(wgpu::Maintain::Wait);
    }

    #[test]
    fn test_batch_drives_gpu_buffer() {
        use lunchbox_core::glam::Vec3;
        use lunchbox_core::{Batch, MemoryManager, MeshData, OwnerId};

        let Some((device, queue)) = headless() else {
            return;
        };
        let stride = VertexFormat::POSITION_UV_NORMAL.stride();
        let sink = GpuBatchBuffer::new(device.clone(), queue, "batch");
        let mut batch = Batch::new(MemoryManager::<f32, _>::new(64, stride, sink).unwrap());
        assert_eq!(batch.manager().sink().size(), (64 * stride * 4) as u64);

        let quad = MeshData::quad(Vec3::ZERO, 1.0);
        batch.add(OwnerId::new(1), &quad).unwrap();
        batch.add(OwnerId::new(2), &quad.translated(Vec3::X)).unwrap();
        batch.remove(OwnerId::new(1)).unwrap();
        assert!(batch.defrag_full().unwrap());

        assert_eq!(batch.draw_range(), 0..quad.vertex_count() as u32);
        assert!(!batch.manager().is_poisoned());
        batch.manager().check_invariants().unwrap();
        device.poll(wgpu::Maintain::Wait);
    }
}
