//! Write targets that mirror a batch's staging buffer.

use crate::memory::SinkError;
use std::ops::Range;

/// Copy alignment required by the device for buffer writes, in bytes.
pub const COPY_ALIGNMENT: u64 = 4;

/// Device-side mirror of a batch buffer.
///
/// The manager calls [`reserve`](Self::reserve) once with the full buffer
/// size, then only issues sub-range [`upload`](Self::upload)s for bytes whose
/// content changed. There is no read-back.
pub trait DeviceSink {
    /// Allocate the device buffer. Called exactly once.
    fn reserve(&mut self, size_bytes: u64) -> Result<(), SinkError>;

    /// Overwrite `bytes.len()` bytes starting at `offset_bytes`.
    fn upload(&mut self, offset_bytes: u64, bytes: &[u8]) -> Result<(), SinkError>;
}

impl<S: DeviceSink + ?Sized> DeviceSink for Box<S> {
    fn reserve(&mut self, size_bytes: u64) -> Result<(), SinkError> {
        (**self).reserve(size_bytes)
    }

    fn upload(&mut self, offset_bytes: u64, bytes: &[u8]) -> Result<(), SinkError> {
        (**self).upload(offset_bytes, bytes)
    }
}

/// Validate an upload range against a reserved buffer of `size` bytes.
pub fn check_upload(offset: u64, len: u64, size: u64) -> Result<(), SinkError> {
    if offset % COPY_ALIGNMENT != 0 || len % COPY_ALIGNMENT != 0 {
        return Err(SinkError::Misaligned {
            offset,
            len,
            alignment: COPY_ALIGNMENT,
        });
    }
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(SinkError::OutOfBounds { offset, len, size }),
    }
}

/// Host-memory sink that keeps a byte-for-byte copy of the device buffer and
/// logs every upload range.
///
/// Used headless (no GPU) and to verify upload ranges in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    bytes: Option<Vec<u8>>,
    uploads: Vec<Range<u64>>,
    uploaded_bytes: u64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrored device contents. Empty before `reserve`.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }

    /// Byte ranges uploaded since the last [`clear_uploads`](Self::clear_uploads).
    pub fn uploads(&self) -> &[Range<u64>] {
        &self.uploads
    }

    pub fn clear_uploads(&mut self) {
        self.uploads.clear();
    }

    /// Running total over the sink's lifetime.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }
}

impl DeviceSink for RecordingSink {
    fn reserve(&mut self, size_bytes: u64) -> Result<(), SinkError> {
        if let Some(bytes) = &self.bytes {
            return Err(SinkError::AlreadyReserved {
                size: bytes.len() as u64,
            });
        }
        self.bytes = Some(vec![0; size_bytes as usize]);
        Ok(())
    }

    fn upload(&mut self, offset_bytes: u64, bytes: &[u8]) -> Result<(), SinkError> {
        let mirror = self.bytes.as_mut().ok_or(SinkError::NotReserved)?;
        let len = bytes.len() as u64;
        check_upload(offset_bytes, len, mirror.len() as u64)?;

        let start = offset_bytes as usize;
        mirror[start..start + bytes.len()].copy_from_slice(bytes);
        self.uploads.push(offset_bytes..offset_bytes + len);
        self.uploaded_bytes += len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_mirrors_uploads() {
        let mut sink = RecordingSink::new();
        assert_eq!(sink.upload(0, &[1, 2, 3, 4]), Err(SinkError::NotReserved));

        sink.reserve(16).unwrap();
        sink.upload(8, &[9, 9, 9, 9]).unwrap();

        assert_eq!(&sink.bytes()[8..12], &[9, 9, 9, 9]);
        assert_eq!(sink.uploads(), &[8..12]);
        assert_eq!(sink.uploaded_bytes(), 4);
        assert!(matches!(
            sink.reserve(16),
            Err(SinkError::AlreadyReserved { size: 16 })
        ));
    }

    #[test]
    fn test_check_upload_rejects_bad_ranges() {
        assert!(check_upload(0, 16, 16).is_ok());
        assert!(matches!(
            check_upload(2, 4, 16),
            Err(SinkError::Misaligned { .. })
        ));
        assert!(matches!(
            check_upload(12, 8, 16),
            Err(SinkError::OutOfBounds { .. })
        ));
    }
}
