//! Handle Registry
//!
//! Native resources live in process-wide tables. The host only ever sees an
//! `i64` token: `generation << 32 | (index + 1)`. Removing a resource bumps
//! its slot generation, so a token kept past `destroy` (or copied into
//! another object) resolves to [`BridgeError::DestroyedHandle`] even after the
//! slot is reused. Zero is never a live token.
//!
//! Lookup hands out an `Arc`, so a resource destroyed while a call still
//! uses it is freed when that call drops its reference.

use crate::error::{BridgeError, Result};
use crate::native::{NativeContext, NativeParser, NativeProgram};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

const MAX_GENERATION: u32 = 0x7FFF_FFFF;

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    /// Slots whose generations are used up; never handed out again
    retired: usize,
}

/// Generation-checked arena of shared resources
pub struct HandleTable<T> {
    inner: Mutex<Slots<T>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
                retired: 0,
            }),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots<T>> {
        // Only bookkeeping runs under this lock, so a poisoned table is still consistent
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn token(index: usize, generation: u32) -> i64 {
        (i64::from(generation) << 32) | (index as i64 + 1)
    }

    fn decode(token: i64) -> Option<(usize, u32)> {
        if token <= 0 {
            return None;
        }
        let index = (token & 0xFFFF_FFFF) as usize;
        let generation = (token >> 32) as u32;
        if index == 0 || generation == 0 {
            return None;
        }
        Some((index - 1, generation))
    }

    /// Store `value` and return its token
    pub fn insert(&self, value: T) -> i64 {
        let mut inner = self.slots();
        let value = Some(Arc::new(value));
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index];
            slot.value = value;
            return Self::token(index, slot.generation);
        }
        let index = inner.slots.len();
        inner.slots.push(Slot {
            generation: 1,
            value,
        });
        Self::token(index, 1)
    }

    /// Unregister the resource behind `token`
    ///
    /// Returns the resource so the caller decides when it is dropped; `None`
    /// for tokens that are already gone.
    pub fn remove(&self, token: i64) -> Option<Arc<T>> {
        let (index, generation) = Self::decode(token)?;
        let mut inner = self.slots();
        let slot = inner.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        if slot.generation >= MAX_GENERATION {
            inner.retired += 1;
        } else {
            slot.generation += 1;
            inner.free.push(index);
        }
        Some(value)
    }

    /// Resolve a live token
    pub fn get(&self, token: i64) -> Result<Arc<T>> {
        let (index, generation) = Self::decode(token).ok_or(BridgeError::DestroyedHandle)?;
        let inner = self.slots();
        inner
            .slots
            .get(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.clone())
            .ok_or(BridgeError::DestroyedHandle)
    }

    pub fn len(&self) -> usize {
        let inner = self.slots();
        inner.slots.len() - inner.free.len() - inner.retired
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive use of a resource for one call
///
/// A second use of the same resource, from another thread or re-entrantly
/// from a hit callback, fails instead of waiting.
pub fn lock<T>(resource: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    match resource.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(BridgeError::HandleBusy),
        // A panic mid-call was already reported; the native state is still usable
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
    }
}

/// Every native resource the bridge hands out
#[derive(Default)]
pub struct HandleRegistry {
    pub parsers: HandleTable<Mutex<NativeParser>>,
    pub programs: HandleTable<NativeProgram>,
    pub contexts: HandleTable<Mutex<NativeContext>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live resources across all tables
    pub fn live_count(&self) -> usize {
        self.parsers.len() + self.programs.len() + self.contexts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_never_zero() {
        let table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert!(a > 0 && b > 0);
        assert_ne!(a, b);
        assert_eq!(*table.get(a).unwrap(), "a");
        assert_eq!(table.get(0).err(), Some(BridgeError::DestroyedHandle));
        assert_eq!(table.get(-5).err(), Some(BridgeError::DestroyedHandle));
    }

    #[test]
    fn test_stale_token_after_slot_reuse() {
        let table = HandleTable::new();
        let old = table.insert(1);
        assert!(table.remove(old).is_some());
        assert!(table.remove(old).is_none());

        let new = table.insert(2);
        assert_ne!(old, new);
        assert_eq!(table.get(old).err(), Some(BridgeError::DestroyedHandle));
        assert_eq!(*table.get(new).unwrap(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_exhausted_slot_is_retired() {
        let table = HandleTable::new();
        let first = table.insert(1);
        table.remove(first);
        table.slots().slots[0].generation = MAX_GENERATION;

        let last = table.insert(2);
        assert_eq!(last, (i64::from(MAX_GENERATION) << 32) | 1);
        assert!(table.remove(last).is_some());
        assert!(table.is_empty());

        // a new slot is used, so the last token of the old one stays dead
        let next = table.insert(3);
        assert_eq!(next, (1 << 32) | 2);
        assert_eq!(table.get(last).err(), Some(BridgeError::DestroyedHandle));
        assert_eq!(table.get(first).err(), Some(BridgeError::DestroyedHandle));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_removed_resource_lives_while_in_use() {
        let table = HandleTable::new();
        let token = table.insert(String::from("in use"));
        let held = table.get(token).unwrap();
        let removed = table.remove(token).unwrap();
        drop(removed);
        assert_eq!(held.as_str(), "in use");
        assert!(table.is_empty());
    }

    #[test]
    fn test_lock_reports_busy() {
        let resource = Mutex::new(0);
        let guard = lock(&resource).unwrap();
        assert_eq!(lock(&resource).err(), Some(BridgeError::HandleBusy));
        drop(guard);
        assert!(lock(&resource).is_ok());
    }
}
