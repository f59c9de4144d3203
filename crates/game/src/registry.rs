use std::collections::HashMap;
use std::fmt;

/// Handle to one spawn instance. Ids are never reused, so a slot that is
/// reaped and filled again hands out a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("capacity exceeded ({capacity} slots in use)")]
    CapacityExceeded { capacity: usize },
}

#[derive(Debug)]
struct Slot<T> {
    id: EntityId,
    value: T,
    marked: bool,
}

/// Fixed-capacity slot table with two-phase removal.
#[derive(Debug)]
pub struct EntityRegistry<T> {
    slots: Vec<Option<Slot<T>>>,
    index: HashMap<EntityId, usize>,
    next_id: u32,
}

impl<T> EntityRegistry<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            index: HashMap::with_capacity(capacity),
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn create(&mut self, value: T) -> Result<EntityId, RegistryError> {
        self.create_with(|_| value)
    }

    pub fn create_with<F>(&mut self, build: F) -> Result<EntityId, RegistryError>
    where
        F: FnOnce(EntityId) -> T,
    {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity(),
            });
        };

        let id = EntityId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);

        self.slots[slot] = Some(Slot {
            id,
            value: build(id),
            marked: false,
        });
        self.index.insert(id, slot);

        Ok(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_ref().map(|s| &s.value)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut().map(|s| &mut s.value)
    }

    pub fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|s| (s.id, &s.value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.as_mut().map(|s| (s.id, &mut s.value)))
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn mark_for_removal(&mut self, id: EntityId) -> bool {
        let Some(&slot) = self.index.get(&id) else {
            return false;
        };
        match self.slots[slot].as_mut() {
            Some(entry) => {
                entry.marked = true;
                true
            }
            None => false,
        }
    }

    pub fn is_marked(&self, id: EntityId) -> bool {
        self.index
            .get(&id)
            .and_then(|&slot| self.slots[slot].as_ref())
            .is_some_and(|s| s.marked)
    }

    pub fn marked_count(&self) -> usize {
        self.slots.iter().flatten().filter(|s| s.marked).count()
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.index.remove(&id)?;
        self.slots[slot].take().map(|s| s.value)
    }

    pub fn reap(&mut self) -> Vec<(EntityId, T)> {
        let mut reaped = Vec::new();

        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.marked) {
                if let Some(entry) = slot.take() {
                    self.index.remove(&entry.id);
                    reaped.push((entry.id, entry.value));
                }
            }
        }

        reaped
    }
}
