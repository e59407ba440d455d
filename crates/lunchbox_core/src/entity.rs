//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that own mesh data inside a
//! batch. The generation counter keeps a recycled index from aliasing the
//! previous occupant's batch entry.

use crate::memory::OwnerId;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: slot in the owning collection
/// - Generation: incremented every time the slot is recycled
///
/// Example:
/// ```ignore
/// let mut entities = EntityAllocator::default();
/// let entity = entities.spawn();
/// batch.add(entity.into(), &mesh)?;
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl From<Entity> for OwnerId {
    fn from(entity: Entity) -> Self {
        OwnerId::new(entity.to_bits())
    }
}

/// Hands out entity handles, recycling despawned slots with a bumped generation.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl EntityAllocator {
    pub fn spawn(&mut self) -> Entity {
        if let Some(index) = self.free.pop() {
            Entity::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            Entity::new(index, 0)
        }
    }

    /// Returns false if `entity` was already despawned.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.generations[entity.index as usize];
        *slot = slot.wrapping_add(1);
        self.free.push(entity.index);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.generations
            .get(entity.index as usize)
            .is_some_and(|&generation| generation == entity.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_round_trip_into_owner() {
        let entity = Entity::new(7, 3);
        assert_eq!(Entity::from_bits(entity.to_bits()), entity);
        assert_eq!(OwnerId::from(entity).raw(), (3u64 << 32) | 7);
    }

    #[test]
    fn test_recycled_slot_gets_new_owner_id() {
        let mut entities = EntityAllocator::default();
        let first = entities.spawn();
        assert!(entities.despawn(first));
        assert!(!entities.despawn(first));

        let second = entities.spawn();
        assert_eq!(second.index(), first.index());
        assert_ne!(OwnerId::from(second), OwnerId::from(first));
        assert!(entities.is_alive(second));
        assert!(!entities.is_alive(first));
    }
}
