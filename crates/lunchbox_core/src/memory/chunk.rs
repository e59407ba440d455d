//! Chunk nodes and the arena-backed chain that orders them.
//!
//! The chain mirrors the layout of the batch buffer: walking `next` from the
//! head visits every region of `[0, write_cursor)` exactly once, in address
//! order. Nodes live in slots of a `Vec` and refer to each other by index, so
//! relinking never fights the borrow checker.

use std::fmt;
use std::ops::Range;

pub(crate) type ChunkIndex = u32;

/// Opaque key of whatever owns the data in an occupied chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Stable handle to an occupied chunk.
///
/// Offsets are not part of the handle: defragmentation moves chunks, the
/// handle keeps pointing at the same logical allocation. The generation
/// detects use after the chunk was removed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    index: ChunkIndex,
    generation: u32,
}

impl ChunkHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// One contiguous region `[first, last)` of a batch buffer.
#[derive(Debug, Clone)]
pub struct Chunk {
    first: usize,
    last: usize,
    owner: Option<OwnerId>,
    prev: Option<ChunkIndex>,
    next: Option<ChunkIndex>,
    id: u64,
}

impl Chunk {
    pub(crate) fn create_occupied(start: usize, length: usize, owner: OwnerId) -> Self {
        Self::new(start, length, Some(owner))
    }

    pub(crate) fn create_gap(start: usize, length: usize) -> Self {
        Self::new(start, length, None)
    }

    fn new(start: usize, length: usize, owner: Option<OwnerId>) -> Self {
        Self {
            first: start,
            last: start + length,
            owner,
            prev: None,
            next: None,
            id: 0,
        }
    }

    #[inline]
    pub fn first(&self) -> usize {
        self.first
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.last
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.last - self.first
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.first..self.last
    }

    #[inline]
    pub fn is_gap(&self) -> bool {
        self.owner.is_none()
    }

    #[inline]
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// Creation order within the owning manager. Diagnostic only.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn prev(&self) -> Option<ChunkIndex> {
        self.prev
    }

    pub(crate) fn next(&self) -> Option<ChunkIndex> {
        self.next
    }

    /// Give up `amount` elements at the low end.
    pub(crate) fn shrink_front(&mut self, amount: usize) {
        debug_assert!(amount <= self.len(), "shrink past chunk end");
        self.first += amount;
    }

    /// Absorb `amount` elements in front of the chunk.
    pub(crate) fn grow_front(&mut self, amount: usize) {
        debug_assert!(amount <= self.first, "grow below buffer start");
        self.first -= amount;
    }

    /// Absorb `amount` elements behind the chunk.
    pub(crate) fn grow_back(&mut self, amount: usize) {
        self.last += amount;
    }

    /// Translate both bounds.
    pub(crate) fn shift(&mut self, delta: isize) {
        self.first = self
            .first
            .checked_add_signed(delta)
            .expect("chunk shifted below buffer start");
        self.last = self
            .last
            .checked_add_signed(delta)
            .expect("chunk shifted below buffer start");
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk[{:05}]@({},{}) gap={}",
            self.id,
            self.first,
            self.last,
            self.is_gap()
        )
    }
}

struct Slot {
    generation: u32,
    chunk: Option<Chunk>,
}

/// Arena of chunk slots plus the head/tail of the ordered chain.
///
/// Vacant slots are recycled; their generation is bumped on release so
/// outstanding handles go stale.
pub(crate) struct ChunkChain {
    slots: Vec<Slot>,
    vacant: Vec<ChunkIndex>,
    head: Option<ChunkIndex>,
    tail: Option<ChunkIndex>,
    next_id: u64,
}

impl ChunkChain {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            head: None,
            tail: None,
            next_id: 0,
        }
    }

    #[inline]
    pub fn head(&self) -> Option<ChunkIndex> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<ChunkIndex> {
        self.tail
    }

    /// Store an unlinked chunk, stamping it with the next creation id.
    pub fn insert(&mut self, mut chunk: Chunk) -> ChunkIndex {
        chunk.id = self.next_id;
        self.next_id += 1;
        chunk.prev = None;
        chunk.next = None;

        if let Some(index) = self.vacant.pop() {
            self.slots[index as usize].chunk = Some(chunk);
            index
        } else {
            let index = self.slots.len() as ChunkIndex;
            self.slots.push(Slot {
                generation: 0,
                chunk: Some(chunk),
            });
            index
        }
    }

    /// Drop a chunk from the arena. Neighbours are not relinked.
    pub fn release(&mut self, index: ChunkIndex) -> Chunk {
        let slot = &mut self.slots[index as usize];
        let chunk = slot.chunk.take().expect("released a vacant chunk slot");
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(index);
        chunk
    }

    #[inline]
    pub fn get(&self, index: ChunkIndex) -> &Chunk {
        self.slots[index as usize]
            .chunk
            .as_ref()
            .expect("chunk index points at a vacant slot")
    }

    #[inline]
    pub fn get_mut(&mut self, index: ChunkIndex) -> &mut Chunk {
        self.slots[index as usize]
            .chunk
            .as_mut()
            .expect("chunk index points at a vacant slot")
    }

    pub fn try_get(&self, index: ChunkIndex) -> Option<&Chunk> {
        self.slots.get(index as usize)?.chunk.as_ref()
    }

    pub fn handle(&self, index: ChunkIndex) -> ChunkHandle {
        ChunkHandle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Map a handle back to a live slot, rejecting stale generations.
    pub fn resolve(&self, handle: ChunkHandle) -> Option<ChunkIndex> {
        let slot = self.slots.get(handle.index as usize)?;
        (slot.generation == handle.generation && slot.chunk.is_some()).then_some(handle.index)
    }

    /// Make `b` follow `a`. A missing `a` makes `b` the head, a missing `b`
    /// makes `a` the tail.
    pub fn link(&mut self, a: Option<ChunkIndex>, b: Option<ChunkIndex>) {
        match a {
            Some(a) => self.get_mut(a).next = b,
            None => self.head = b,
        }
        match b {
            Some(b) => self.get_mut(b).prev = a,
            None => self.tail = a,
        }
    }

    /// Splice unlinked `chunk` in directly after `anchor` (or at the head).
    pub fn link_after(&mut self, anchor: Option<ChunkIndex>, chunk: ChunkIndex) {
        let following = match anchor {
            Some(anchor) => self.get(anchor).next,
            None => self.head,
        };
        self.link(anchor, Some(chunk));
        self.link(Some(chunk), following);
    }

    /// Chunks in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> + '_ {
        std::iter::successors(self.head.map(|index| self.get(index)), move |chunk| {
            chunk.next.map(|index| self.get(index))
        })
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            if self.slots[index].chunk.is_some() {
                self.release(index as ChunkIndex);
            }
        }
        self.head = None;
        self.tail = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(raw: u64) -> OwnerId {
        OwnerId::new(raw)
    }

    #[test]
    fn test_bounds_mechanics() {
        let mut chunk = Chunk::create_gap(10, 20);
        assert_eq!(chunk.range(), 10..30);
        assert!(chunk.is_gap());

        chunk.shrink_front(5);
        assert_eq!(chunk.range(), 15..30);

        chunk.grow_front(15);
        assert_eq!(chunk.range(), 0..30);

        chunk.grow_back(2);
        assert_eq!(chunk.len(), 32);

        chunk.shift(4);
        assert_eq!(chunk.range(), 4..36);
        chunk.shift(-4);
        assert_eq!(chunk.range(), 0..32);
    }

    #[test]
    fn test_link_after_maintains_head_and_tail() {
        let mut chain = ChunkChain::new();
        let a = chain.insert(Chunk::create_occupied(0, 4, owner(1)));
        chain.link_after(None, a);
        let c = chain.insert(Chunk::create_occupied(4, 4, owner(3)));
        chain.link_after(Some(a), c);
        let b = chain.insert(Chunk::create_gap(4, 0));
        chain.link_after(Some(a), b);

        assert_eq!(chain.head(), Some(a));
        assert_eq!(chain.tail(), Some(c));
        let ids: Vec<u64> = chain.iter().map(Chunk::id).collect();
        assert_eq!(ids, vec![0, 2, 1]);
        assert_eq!(chain.get(b).prev(), Some(a));
        assert_eq!(chain.get(b).next(), Some(c));
    }

    #[test]
    fn test_released_slot_invalidates_handle() {
        let mut chain = ChunkChain::new();
        let a = chain.insert(Chunk::create_occupied(0, 8, owner(1)));
        let handle = chain.handle(a);
        assert_eq!(chain.resolve(handle), Some(a));

        chain.release(a);
        assert_eq!(chain.resolve(handle), None);

        let reused = chain.insert(Chunk::create_occupied(0, 8, owner(2)));
        assert_eq!(reused, a);
        assert_eq!(chain.resolve(handle), None);
        assert_eq!(chain.resolve(chain.handle(reused)), Some(reused));
        assert_eq!(chain.get(reused).id(), 1);
    }

    #[test]
    fn test_display() {
        let chunk = Chunk::create_occupied(0, 10, owner(1));
        assert_eq!(chunk.to_string(), "Chunk[00000]@(0,10) gap=false");
    }
}
