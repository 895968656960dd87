//! Generational arena for sandbox objects.

use std::fmt;
use std::num::NonZeroU32;

use rustc_hash::FxHashMap;

use nativebind_core::{ObjectId, Ownership, Variant};

/// A native object: its class and a property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeObject {
    pub class: String,
    pub ownership: Ownership,
    properties: FxHashMap<String, Variant>,
}

impl NativeObject {
    pub fn new(class: impl Into<String>, ownership: Ownership) -> Self {
        Self {
            class: class.into(),
            ownership,
            properties: FxHashMap::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.properties.get(name)
    }

    /// Property value, `Nil` if unset.
    pub fn get_or_nil(&self, name: &str) -> Variant {
        self.properties.get(name).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Variant>) {
        self.properties.insert(name.into(), value.into());
    }
}

struct HeapSlot {
    generation: NonZeroU32,
    value: Option<NativeObject>,
    ref_count: u32,
}

/// Objects are stored in a Vec with generation tracking. When an object is
/// freed its slot is reused with the next generation, so stale ids never
/// resolve.
#[derive(Default)]
pub struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object. RefCounted objects start with one reference.
    pub fn allocate(&mut self, value: NativeObject) -> ObjectId {
        let ref_count = u32::from(value.ownership == Ownership::RefCounted);
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.ref_count = ref_count;
            ObjectId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: NonZeroU32::MIN,
                value: Some(value),
                ref_count,
            });
            ObjectId::new(index, NonZeroU32::MIN)
        }
    }

    fn slot(&self, id: ObjectId) -> Option<&HeapSlot> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation() && slot.value.is_some())
    }

    fn slot_mut(&mut self, id: ObjectId) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation() && slot.value.is_some())
    }

    pub fn get(&self, id: ObjectId) -> Option<&NativeObject> {
        self.slot(id)?.value.as_ref()
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut NativeObject> {
        self.slot_mut(id)?.value.as_mut()
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.slot(id).is_some()
    }

    /// Increment the reference count; returns the new count.
    pub fn add_ref(&mut self, id: ObjectId) -> Option<u32> {
        let slot = self.slot_mut(id)?;
        slot.ref_count = slot.ref_count.saturating_add(1);
        Some(slot.ref_count)
    }

    /// Decrement the reference count, freeing at zero. Returns the remaining count.
    pub fn release(&mut self, id: ObjectId) -> Option<u32> {
        let slot = self.slot_mut(id)?;
        slot.ref_count = slot.ref_count.saturating_sub(1);
        let remaining = slot.ref_count;
        if remaining == 0 {
            self.free(id);
        }
        Some(remaining)
    }

    /// Free an object immediately. Returns `false` for stale ids.
    pub fn free(&mut self, id: ObjectId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        slot.value = None;
        slot.ref_count = 0;
        slot.generation = NonZeroU32::new(slot.generation.get().wrapping_add(1)).unwrap_or(NonZeroU32::MIN);
        self.free_list.push(id.index());
        self.live -= 1;
        true
    }

    pub fn ref_count(&self, id: ObjectId) -> Option<u32> {
        self.slot(id).map(|slot| slot.ref_count)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let mut heap = ObjectHeap::new();
        let first = heap.allocate(NativeObject::new("Node", Ownership::Manual));
        assert!(heap.free(first));
        let second = heap.allocate(NativeObject::new("Node", Ownership::Manual));

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(!heap.is_alive(first));
        assert!(heap.is_alive(second));
    }

    #[test]
    fn release_frees_at_zero() {
        let mut heap = ObjectHeap::new();
        let id = heap.allocate(NativeObject::new("Resource", Ownership::RefCounted));
        assert_eq!(heap.ref_count(id), Some(1));
        assert_eq!(heap.add_ref(id), Some(2));
        assert_eq!(heap.release(id), Some(1));
        assert_eq!(heap.release(id), Some(0));
        assert!(!heap.is_alive(id));
        assert_eq!(heap.release(id), None);
        assert!(heap.is_empty());
    }

    #[test]
    fn properties_default_to_nil() {
        let mut object = NativeObject::new("Node", Ownership::Manual);
        assert_eq!(object.get_or_nil("name"), Variant::Nil);
        object.set("name", "Player");
        assert_eq!(object.get("name"), Some(&Variant::from("Player")));
    }
}
