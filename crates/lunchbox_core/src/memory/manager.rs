//! Batch memory manager
//!
//! Packs variable-length element blobs into one staging buffer that is
//! mirrored to a device buffer. Layout example:
//!
//! ```text
//! +----+----+-----+---+------+-----+-----------------+
//! | E1 | E2 | E4  |   |  E5  | E6  |                 |
//! +----+----+-----+---+------+-----+-----------------+
//!                   ^ gap               ^ write cursor
//! ```
//!
//! Every mutation keeps the device equal to staging on `[0, write_cursor)`,
//! uploading only the ranges whose content changed.

use crate::memory::chunk::{Chunk, ChunkChain, ChunkHandle, ChunkIndex, OwnerId};
use crate::memory::free_list::FreeList;
use crate::memory::{DeviceSink, InvariantViolation, MemoryError};
use bytemuck::Pod;
use lunchbox_metrics::Counter;
use std::ops::Range;
use tracing::{debug, error, trace, warn};

/// Records moved per [`MemoryManager::defrag_quick`] call unless overridden.
pub const DEFAULT_QUICK_LIMIT: usize = 300;

/// Summary of a manager's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    /// Elements held by occupied chunks.
    pub used: usize,
    /// Elements held by gaps below the write cursor.
    pub free: usize,
    pub gap_count: usize,
    pub chunk_count: usize,
    pub write_cursor: usize,
    pub element_capacity: usize,
}

impl BatchStats {
    /// Share of the laid-out region lost to gaps, in `0.0..=1.0`.
    pub fn fragmentation(&self) -> f64 {
        if self.write_cursor == 0 {
            0.0
        } else {
            self.free as f64 / self.write_cursor as f64
        }
    }
}

/// Allocator for one batch buffer of `capacity` records of `stride` elements.
pub struct MemoryManager<T: Pod, S: DeviceSink> {
    capacity: usize,
    stride: usize,
    chain: ChunkChain,
    free: FreeList,
    write_cursor: usize,
    staging: Vec<T>,
    sink: S,
    quick_limit: usize,
    poisoned: bool,
    counter: Counter,
}

impl<T: Pod, S: DeviceSink> MemoryManager<T, S> {
    /// Create a manager and reserve `capacity * stride` elements on `sink`.
    pub fn new(capacity: usize, stride: usize, mut sink: S) -> Result<Self, MemoryError> {
        if capacity == 0 || stride == 0 {
            return Err(MemoryError::ZeroCapacity);
        }
        let size = std::mem::size_of::<T>();
        if size == 0 || size as u64 % super::COPY_ALIGNMENT != 0 {
            return Err(MemoryError::UnalignedElement { size });
        }

        // Draw calls address records as u32.
        let overflow = MemoryError::CapacityOverflow { capacity, stride };
        if u32::try_from(capacity).is_err() {
            return Err(overflow);
        }
        let elements = capacity.checked_mul(stride).ok_or_else(|| overflow.clone())?;
        let size_bytes = elements
            .checked_mul(size)
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or(overflow)?;
        sink.reserve(size_bytes)?;
        debug!(capacity, stride, elements, "batch buffer reserved");

        Ok(Self {
            capacity,
            stride,
            chain: ChunkChain::new(),
            free: FreeList::new(),
            write_cursor: 0,
            staging: vec![T::zeroed(); elements],
            sink,
            quick_limit: DEFAULT_QUICK_LIMIT,
            poisoned: false,
            counter: Counter::new(),
        })
    }

    /// Records moved per `defrag_quick` call (at least one chunk always moves).
    pub fn with_quick_limit(mut self, records: usize) -> Self {
        self.quick_limit = records.max(1);
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn element_capacity(&self) -> usize {
        self.capacity * self.stride
    }

    #[inline]
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Records laid out so far (gaps included), i.e. the draw count.
    #[inline]
    pub fn record_count(&self) -> usize {
        self.write_cursor / self.stride
    }

    #[inline]
    pub fn quick_limit(&self) -> usize {
        self.quick_limit
    }

    #[inline]
    pub fn gap_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Staging contents of the laid-out region.
    pub fn staging(&self) -> &[T] {
        &self.staging[..self.write_cursor]
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    /// Chunks in address order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.chain.iter()
    }

    /// Current element range of an occupied chunk. Changes after defrag.
    pub fn range(&self, handle: ChunkHandle) -> Result<Range<usize>, MemoryError> {
        Ok(self.occupied(handle)?.1.range())
    }

    pub fn owner(&self, handle: ChunkHandle) -> Result<OwnerId, MemoryError> {
        let (_, chunk) = self.occupied(handle)?;
        chunk.owner().ok_or(MemoryError::NotOccupied(handle))
    }

    pub fn data(&self, handle: ChunkHandle) -> Result<&[T], MemoryError> {
        let range = self.range(handle)?;
        Ok(&self.staging[range])
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            write_cursor: self.write_cursor,
            element_capacity: self.element_capacity(),
            ..BatchStats::default()
        };
        for chunk in self.chain.iter() {
            stats.chunk_count += 1;
            if chunk.is_gap() {
                stats.gap_count += 1;
                stats.free += chunk.len();
            } else {
                stats.used += chunk.len();
            }
        }
        stats
    }

    /// Place `data` in the first gap that fits, or append it at the write
    /// cursor.
    pub fn allocate(&mut self, data: &[T], owner: OwnerId) -> Result<ChunkHandle, MemoryError> {
        self.ensure_healthy()?;
        let len = data.len();
        if len == 0 {
            return Err(MemoryError::EmptyData);
        }
        if len % self.stride != 0 {
            return Err(MemoryError::MisalignedData {
                len,
                stride: self.stride,
            });
        }

        let index = match self.free.first_fit(&self.chain, len) {
            Some(gap) => self.allocate_in_gap(gap, data, owner)?,
            None => self.allocate_at_tail(data, owner)?,
        };

        self.counter.increment("allocations", 1);
        self.debug_check();
        Ok(self.chain.handle(index))
    }

    fn allocate_in_gap(
        &mut self,
        gap: ChunkIndex,
        data: &[T],
        owner: OwnerId,
    ) -> Result<ChunkIndex, MemoryError> {
        let (start, gap_len, prev) = {
            let chunk = self.chain.get(gap);
            (chunk.first(), chunk.len(), chunk.prev())
        };
        self.write(start, data)?;

        let index = self
            .chain
            .insert(Chunk::create_occupied(start, data.len(), owner));
        if gap_len == data.len() {
            let next = self.chain.get(gap).next();
            self.free.remove(gap);
            self.chain.release(gap);
            self.chain.link(prev, Some(index));
            self.chain.link(Some(index), next);
        } else {
            self.chain.get_mut(gap).shrink_front(data.len());
            self.chain.link(prev, Some(index));
            self.chain.link(Some(index), Some(gap));
        }

        debug!(
            %owner,
            start,
            len = data.len(),
            exact = gap_len == data.len(),
            "allocated in gap"
        );
        Ok(index)
    }

    fn allocate_at_tail(&mut self, data: &[T], owner: OwnerId) -> Result<ChunkIndex, MemoryError> {
        let available = self.element_capacity() - self.write_cursor;
        if data.len() > available {
            warn!(
                %owner,
                requested = data.len(),
                available,
                "batch is full"
            );
            return Err(MemoryError::BatchFull {
                requested: data.len(),
                available,
            });
        }

        let start = self.write_cursor;
        self.write(start, data)?;

        let index = self
            .chain
            .insert(Chunk::create_occupied(start, data.len(), owner));
        let tail = self.chain.tail();
        self.chain.link_after(tail, index);
        self.write_cursor += data.len();

        debug!(%owner, start, len = data.len(), "allocated at tail");
        Ok(index)
    }

    /// Overwrite an occupied chunk with data of the same length.
    pub fn rewrite(&mut self, handle: ChunkHandle, data: &[T]) -> Result<(), MemoryError> {
        self.ensure_healthy()?;
        let range = self.range(handle)?;
        if range.len() != data.len() {
            return Err(MemoryError::LengthMismatch {
                expected: range.len(),
                actual: data.len(),
            });
        }
        self.write(range.start, data)
    }

    /// Release an occupied chunk, merging its span with neighbouring gaps.
    pub fn remove(&mut self, handle: ChunkHandle) -> Result<(), MemoryError> {
        self.ensure_healthy()?;
        let (index, chunk) = self.occupied(handle)?;
        let span = chunk.range();
        let (prev, next) = (chunk.prev(), chunk.next());
        let prev_gap = prev.filter(|&p| self.chain.get(p).is_gap());
        let next_gap = next.filter(|&n| self.chain.get(n).is_gap());

        self.chain.release(index);
        self.zero(span.clone());

        match next {
            None => {
                // Tail: the span and a trailing gap fold back into the cursor
                let mut reclaimed = span.len();
                let new_tail = match prev_gap {
                    Some(gap) => {
                        self.free.remove(gap);
                        let gap = self.chain.release(gap);
                        reclaimed += gap.len();
                        gap.prev()
                    }
                    None => prev,
                };
                self.chain.link(new_tail, None);
                self.write_cursor -= reclaimed;
                debug!(start = span.start, reclaimed, "removed tail chunk");
            }
            Some(following) if next_gap.is_some() => {
                match prev_gap {
                    Some(gap) => {
                        self.free.remove(following);
                        let absorbed = self.chain.release(following);
                        self.chain.get_mut(gap).grow_back(span.len() + absorbed.len());
                        self.chain.link(Some(gap), absorbed.next());
                    }
                    None => {
                        self.chain.get_mut(following).grow_front(span.len());
                        self.chain.link(prev, Some(following));
                    }
                }
                debug!(start = span.start, len = span.len(), "removed chunk before gap");
                self.upload(span)?;
            }
            Some(following) => {
                match prev_gap {
                    Some(gap) => {
                        self.chain.get_mut(gap).grow_back(span.len());
                        self.chain.link(Some(gap), Some(following));
                    }
                    None => {
                        let gap = self
                            .chain
                            .insert(Chunk::create_gap(span.start, span.len()));
                        self.chain.link(prev, Some(gap));
                        self.chain.link(Some(gap), Some(following));
                        self.free.push_back(gap);
                    }
                }
                debug!(start = span.start, len = span.len(), "removed chunk before data");
                self.upload(span)?;
            }
        }

        self.counter.increment("removals", 1);
        self.debug_check();
        Ok(())
    }

    /// Close the first listed gap by sliding at most `quick_limit` records
    /// of following data down into it.
    ///
    /// Returns `false` without touching anything when there are no gaps.
    pub fn defrag_quick(&mut self) -> Result<bool, MemoryError> {
        let limit = self.quick_limit.saturating_mul(self.stride);
        self.defrag_step(limit)
    }

    /// Close every gap.
    pub fn defrag_full(&mut self) -> Result<bool, MemoryError> {
        if self.free.is_empty() {
            return Ok(false);
        }
        while self.defrag_step(usize::MAX)? {}
        Ok(true)
    }

    fn defrag_step(&mut self, limit: usize) -> Result<bool, MemoryError> {
        self.ensure_healthy()?;
        let Some(gap) = self.free.pop_front() else {
            return Ok(false);
        };

        let removed = self.chain.release(gap);
        let (start, hole) = (removed.first(), removed.len());
        self.chain.link(removed.prev(), removed.next());

        let mut cursor = removed.next();
        let mut last_moved = removed.prev();
        let mut moved = 0;
        while let Some(index) = cursor {
            let chunk = self.chain.get(index);
            if chunk.is_gap() || (moved > 0 && moved >= limit) {
                break;
            }
            let (len, following) = (chunk.len(), chunk.next());
            self.chain.get_mut(index).shift(-(hole as isize));
            trace!(chunk = self.chain.get(index).id(), by = hole, "shifted down");
            moved += len;
            last_moved = Some(index);
            cursor = following;
        }

        self.staging
            .copy_within(start + hole..start + hole + moved, start);
        self.zero(start + moved..start + moved + hole);

        let upload_end = match cursor {
            None => {
                self.chain.link(last_moved, None);
                self.write_cursor -= hole;
                start + moved
            }
            Some(stop) if self.chain.get(stop).is_gap() => {
                self.chain.get_mut(stop).grow_front(hole);
                start + moved + hole
            }
            Some(stop) => {
                let bubble = self
                    .chain
                    .insert(Chunk::create_gap(start + moved, hole));
                self.chain.link(last_moved, Some(bubble));
                self.chain.link(Some(bubble), Some(stop));
                // Next quick step keeps sliding the same hole
                self.free.push_front(bubble);
                start + moved + hole
            }
        };

        debug!(start, hole, moved, reached_end = cursor.is_none(), "defrag step");
        self.counter.increment("defrag_steps", 1);
        self.counter.increment("defrag_moved", moved as u64);
        self.upload(start..upload_end)?;
        self.debug_check();
        Ok(true)
    }

    /// Drop every chunk. The device buffer is left as is; nothing below the
    /// write cursor remains.
    pub fn reset(&mut self) -> Result<(), MemoryError> {
        self.ensure_healthy()?;
        let end = self.write_cursor;
        self.zero(0..end);
        self.chain.clear();
        self.free.clear();
        self.write_cursor = 0;
        debug!(cleared = end, "batch reset");
        Ok(())
    }

    /// Walk the chain and verify contiguity, gap merging, free list
    /// membership and the write cursor.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut expected_first = 0;
        let mut prev: Option<ChunkIndex> = None;
        let mut prev_was_gap = false;
        let mut prev_id = 0;
        let mut gaps = 0;
        let mut visited = 0;
        let mut cursor = self.chain.head();

        while let Some(index) = cursor {
            let chunk = self.chain.get(index);
            visited += 1;
            if chunk.prev() != prev || visited > self.chain.live_count() {
                return Err(InvariantViolation::BrokenLink { chunk: chunk.id() });
            }
            if chunk.first() != expected_first {
                return Err(InvariantViolation::Discontinuity {
                    chunk: prev_id,
                    last: expected_first,
                    next_first: chunk.first(),
                });
            }
            if chunk.is_gap() {
                if prev_was_gap {
                    return Err(InvariantViolation::AdjacentGaps {
                        first: prev_id,
                        second: chunk.id(),
                    });
                }
                if !self.free.contains(index) {
                    return Err(InvariantViolation::FreeListMismatch {
                        listed: self.free.len(),
                        in_chain: gaps + 1,
                    });
                }
                gaps += 1;
            }

            expected_first = chunk.last();
            prev_was_gap = chunk.is_gap();
            prev_id = chunk.id();
            prev = Some(index);
            cursor = chunk.next();
        }

        if self.chain.tail() != prev {
            return Err(InvariantViolation::BrokenLink { chunk: prev_id });
        }
        if prev_was_gap {
            return Err(InvariantViolation::GapAtTail { chunk: prev_id });
        }
        if expected_first != self.write_cursor || self.write_cursor > self.element_capacity() {
            return Err(InvariantViolation::CursorMismatch {
                chain_end: expected_first,
                write_cursor: self.write_cursor,
            });
        }
        let listed_live = self
            .free
            .iter()
            .all(|gap| self.chain.try_get(gap).is_some_and(Chunk::is_gap));
        if gaps != self.free.len() || !listed_live {
            return Err(InvariantViolation::FreeListMismatch {
                listed: self.free.len(),
                in_chain: gaps,
            });
        }
        Ok(())
    }

    #[inline]
    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(violation) = self.check_invariants() {
                panic!("batch memory corrupted: {violation}");
            }
        }
    }

    fn ensure_healthy(&self) -> Result<(), MemoryError> {
        if self.poisoned {
            Err(MemoryError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn occupied(&self, handle: ChunkHandle) -> Result<(ChunkIndex, &Chunk), MemoryError> {
        let index = self
            .chain
            .resolve(handle)
            .ok_or(MemoryError::StaleHandle(handle))?;
        let chunk = self.chain.get(index);
        if chunk.is_gap() {
            return Err(MemoryError::NotOccupied(handle));
        }
        Ok((index, chunk))
    }

    fn write(&mut self, start: usize, data: &[T]) -> Result<(), MemoryError> {
        self.staging[start..start + data.len()].copy_from_slice(data);
        self.upload(start..start + data.len())
    }

    fn zero(&mut self, range: Range<usize>) {
        self.staging[range].fill(T::zeroed());
    }

    /// Push one staging range to the device. A failure poisons the manager.
    fn upload(&mut self, range: Range<usize>) -> Result<(), MemoryError> {
        if range.is_empty() {
            return Ok(());
        }
        let element = std::mem::size_of::<T>();
        let offset = (range.start * element) as u64;
        let bytes: &[u8] = bytemuck::cast_slice(&self.staging[range]);

        if let Err(err) = self.sink.upload(offset, bytes) {
            self.poisoned = true;
            error!(offset, len = bytes.len(), %err, "device upload failed, batch poisoned");
            return Err(err.into());
        }
        trace!(offset, len = bytes.len(), "uploaded");
        self.counter.increment("uploads", 1);
        self.counter.increment("upload_bytes", bytes.len() as u64);
        Ok(())
    }
}
