use crate::memory::chunk::{ChunkChain, ChunkIndex};
use std::collections::VecDeque;

/// Gap chunks in insertion order.
///
/// Allocation scans this instead of the whole chain. Every gap in the chain
/// appears here exactly once.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    gaps: VecDeque<ChunkIndex>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, gap: ChunkIndex) {
        debug_assert!(!self.contains(gap), "gap listed twice");
        self.gaps.push_back(gap);
    }

    pub fn push_front(&mut self, gap: ChunkIndex) {
        debug_assert!(!self.contains(gap), "gap listed twice");
        self.gaps.push_front(gap);
    }

    pub fn pop_front(&mut self) -> Option<ChunkIndex> {
        self.gaps.pop_front()
    }

    /// Returns false if `gap` was not listed.
    pub fn remove(&mut self, gap: ChunkIndex) -> bool {
        match self.gaps.iter().position(|&listed| listed == gap) {
            Some(position) => {
                self.gaps.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, gap: ChunkIndex) -> bool {
        self.gaps.contains(&gap)
    }

    /// First listed gap that can hold `len` elements.
    pub fn first_fit(&self, chain: &ChunkChain, len: usize) -> Option<ChunkIndex> {
        self.gaps
            .iter()
            .copied()
            .find(|&gap| chain.get(gap).len() >= len)
    }

    pub fn iter(&self) -> impl Iterator<Item = ChunkIndex> + '_ {
        self.gaps.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn clear(&mut self) {
        self.gaps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::chunk::Chunk;

    #[test]
    fn test_first_fit_uses_insertion_order() {
        let mut chain = ChunkChain::new();
        let small = chain.insert(Chunk::create_gap(0, 4));
        let large = chain.insert(Chunk::create_gap(10, 40));
        let medium = chain.insert(Chunk::create_gap(60, 12));

        let mut free = FreeList::new();
        free.push_back(small);
        free.push_back(large);
        free.push_back(medium);

        // Not best-fit: the 40 wide gap is listed before the 12 wide one
        assert_eq!(free.first_fit(&chain, 10), Some(large));
        assert_eq!(free.first_fit(&chain, 4), Some(small));
        assert_eq!(free.first_fit(&chain, 41), None);
    }

    #[test]
    fn test_front_insertion_and_removal() {
        let mut free = FreeList::new();
        free.push_back(1);
        free.push_back(2);
        free.push_front(3);

        assert!(free.remove(1));
        assert!(!free.remove(1));
        assert_eq!(free.iter().collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(free.pop_front(), Some(3));
        assert_eq!(free.len(), 1);
    }
}
