use crate::memory::{
    BatchError, BatchStats, ChunkHandle, DeviceSink, MemoryError, MemoryManager, OwnerId,
};
use bytemuck::Pod;
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, warn};

/// Anything that can flatten itself into batch elements.
pub trait Pack<T> {
    fn pack(&self) -> Vec<T>;
}

impl<T: Clone> Pack<T> for [T] {
    fn pack(&self) -> Vec<T> {
        self.to_vec()
    }
}

impl<T: Clone> Pack<T> for Vec<T> {
    fn pack(&self) -> Vec<T> {
        self.clone()
    }
}

/// Owner-facing façade over a [`MemoryManager`].
///
/// Maps each owner to exactly one chunk so callers deal in owners, never in
/// offsets.
pub struct Batch<T: Pod, S: DeviceSink> {
    manager: MemoryManager<T, S>,
    owners: HashMap<OwnerId, ChunkHandle>,
}

impl<T: Pod, S: DeviceSink> Batch<T, S> {
    pub fn new(manager: MemoryManager<T, S>) -> Self {
        Self {
            manager,
            owners: HashMap::new(),
        }
    }

    pub fn add<P>(&mut self, owner: impl Into<OwnerId>, source: &P) -> Result<ChunkHandle, BatchError>
    where
        P: Pack<T> + ?Sized,
    {
        let owner = owner.into();
        if self.owners.contains_key(&owner) {
            return Err(BatchError::DuplicateOwner(owner));
        }
        let data = source.pack();
        let handle = self.manager.allocate(&data, owner)?;
        self.owners.insert(owner, handle);
        Ok(handle)
    }

    pub fn remove(&mut self, owner: impl Into<OwnerId>) -> Result<(), BatchError> {
        let owner = owner.into();
        let Some(&handle) = self.owners.get(&owner) else {
            warn!(%owner, "remove of unknown owner");
            return Err(BatchError::UnknownOwner(owner));
        };
        self.manager.remove(handle)?;
        self.owners.remove(&owner);
        Ok(())
    }

    /// Re-pack an owner whose data changed.
    ///
    /// Same length rewrites in place. A different length frees the old chunk
    /// and allocates again; if that allocation fails the owner is dropped
    /// from the batch.
    pub fn refresh<P>(&mut self, owner: impl Into<OwnerId>, source: &P) -> Result<ChunkHandle, BatchError>
    where
        P: Pack<T> + ?Sized,
    {
        let owner = owner.into();
        let handle = *self
            .owners
            .get(&owner)
            .ok_or(BatchError::UnknownOwner(owner))?;
        let data = source.pack();

        if self.manager.range(handle)?.len() == data.len() {
            self.manager.rewrite(handle, &data)?;
            return Ok(handle);
        }

        self.manager.remove(handle)?;
        self.owners.remove(&owner);
        let handle = self.manager.allocate(&data, owner).inspect_err(|err| {
            warn!(%owner, %err, "owner dropped after failed re-allocation");
        })?;
        self.owners.insert(owner, handle);
        debug!(%owner, len = data.len(), "owner re-allocated");
        Ok(handle)
    }

    pub fn contains(&self, owner: impl Into<OwnerId>) -> bool {
        self.owners.contains_key(&owner.into())
    }

    pub fn handle(&self, owner: impl Into<OwnerId>) -> Option<ChunkHandle> {
        self.owners.get(&owner.into()).copied()
    }

    /// Current element range of an owner's data.
    pub fn range(&self, owner: impl Into<OwnerId>) -> Result<Range<usize>, BatchError> {
        let owner = owner.into();
        let handle = self.handle(owner).ok_or(BatchError::UnknownOwner(owner))?;
        Ok(self.manager.range(handle)?)
    }

    pub fn owners(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.owners.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Record range to hand to a draw call. Gaps hold zeros.
    pub fn draw_range(&self) -> Range<u32> {
        // The manager refuses capacities beyond u32::MAX records.
        let records = u32::try_from(self.manager.record_count()).unwrap_or(u32::MAX);
        0..records
    }

    pub fn defrag_quick(&mut self) -> Result<bool, MemoryError> {
        self.manager.defrag_quick()
    }

    pub fn defrag_full(&mut self) -> Result<bool, MemoryError> {
        self.manager.defrag_full()
    }

    pub fn stats(&self) -> BatchStats {
        self.manager.stats()
    }

    pub fn manager(&self) -> &MemoryManager<T, S> {
        &self.manager
    }

    /// Drop every owner.
    pub fn clear(&mut self) -> Result<(), MemoryError> {
        self.manager.reset()?;
        self.owners.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingSink;

    struct Quad {
        value: f32,
        records: usize,
    }

    impl Pack<f32> for Quad {
        fn pack(&self) -> Vec<f32> {
            vec![self.value; self.records * 2]
        }
    }

    fn batch(capacity: usize) -> Batch<f32, RecordingSink> {
        Batch::new(MemoryManager::new(capacity, 2, RecordingSink::new()).unwrap())
    }

    #[test]
    fn test_add_and_remove_by_owner() {
        let mut batch = batch(32);
        batch.add(OwnerId::new(1), &Quad { value: 1.0, records: 3 }).unwrap();
        batch.add(OwnerId::new(2), &Quad { value: 2.0, records: 2 }).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.range(OwnerId::new(2)).unwrap(), 6..10);
        assert_eq!(batch.draw_range(), 0..5);

        batch.remove(OwnerId::new(1)).unwrap();
        assert!(!batch.contains(OwnerId::new(1)));
        assert_eq!(batch.stats().gap_count, 1);
    }

    #[test]
    fn test_unknown_and_duplicate_owners() {
        let mut batch = batch(32);
        let owner = OwnerId::new(7);
        assert_eq!(batch.remove(owner), Err(BatchError::UnknownOwner(owner)));

        batch.add(owner, &[1.0f32, 2.0][..]).unwrap();
        assert_eq!(
            batch.add(owner, &[3.0f32, 4.0][..]),
            Err(BatchError::DuplicateOwner(owner))
        );
        assert_eq!(batch.manager().write_cursor(), 2);
    }

    #[test]
    fn test_full_batch_reports_without_recording_owner() {
        let mut batch = batch(2);
        let err = batch
            .add(OwnerId::new(1), &Quad { value: 1.0, records: 3 })
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::Memory(MemoryError::BatchFull { .. })
        ));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_handles_survive_defrag() {
        let mut batch = batch(32);
        batch.add(OwnerId::new(1), &Quad { value: 1.0, records: 2 }).unwrap();
        batch.add(OwnerId::new(2), &Quad { value: 2.0, records: 2 }).unwrap();
        batch.remove(OwnerId::new(1)).unwrap();

        assert!(batch.defrag_full().unwrap());
        assert_eq!(batch.range(OwnerId::new(2)).unwrap(), 0..4);
        let handle = batch.handle(OwnerId::new(2)).unwrap();
        assert_eq!(batch.manager().data(handle).unwrap(), &[2.0; 4]);
    }

    #[test]
    fn test_refresh_in_place_and_resized() {
        let mut batch = batch(32);
        let owner = OwnerId::new(1);
        let first = batch.add(owner, &Quad { value: 1.0, records: 2 }).unwrap();
        batch.add(OwnerId::new(2), &Quad { value: 2.0, records: 1 }).unwrap();

        let same = batch.refresh(owner, &Quad { value: 5.0, records: 2 }).unwrap();
        assert_eq!(same, first);
        assert_eq!(batch.manager().data(same).unwrap(), &[5.0; 4]);

        let grown = batch.refresh(owner, &Quad { value: 6.0, records: 3 }).unwrap();
        assert_ne!(grown, first);
        assert_eq!(batch.range(owner).unwrap(), 6..12);
        assert_eq!(batch.len(), 2);
        batch.manager().check_invariants().unwrap();
    }

    #[test]
    fn test_clear() {
        let mut batch = batch(8);
        batch.add(OwnerId::new(1), &Quad { value: 1.0, records: 4 }).unwrap();
        batch.clear().unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.draw_range(), 0..0);
    }
}
