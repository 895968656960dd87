//! Name-to-slot index over a native class's virtual methods.

use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;

use crate::VirtualMethodInfo;

/// Dense index of one virtual method within a [`VirtualSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualSlot(u32);

impl VirtualSlot {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The virtual methods of one native class, indexed by slot.
///
/// Each slot also carries an "overridden anywhere" flag, set as soon as any
/// managed type's override table claims the slot. A slot that no managed type
/// overrides can be answered without touching a per-type table.
#[derive(Debug)]
pub struct VirtualSet {
    class: String,
    methods: Vec<VirtualMethodInfo>,
    by_name: FxHashMap<String, VirtualSlot>,
    overridden_anywhere: Vec<AtomicBool>,
}

impl VirtualSet {
    pub fn new(class: impl Into<String>, methods: Vec<VirtualMethodInfo>) -> Self {
        let mut by_name = FxHashMap::default();
        let mut unique = Vec::with_capacity(methods.len());
        for method in methods {
            // a redeclared virtual keeps its first slot
            if by_name.contains_key(&method.name) {
                continue;
            }
            by_name.insert(method.name.clone(), VirtualSlot(unique.len() as u32));
            unique.push(method);
        }
        let overridden_anywhere = unique.iter().map(|_| AtomicBool::new(false)).collect();
        Self {
            class: class.into(),
            methods: unique,
            by_name,
            overridden_anywhere,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn slot(&self, name: &str) -> Option<VirtualSlot> {
        self.by_name.get(name).copied()
    }

    pub fn method(&self, slot: VirtualSlot) -> Option<&VirtualMethodInfo> {
        self.methods.get(slot.index())
    }

    pub fn methods(&self) -> impl Iterator<Item = (VirtualSlot, &VirtualMethodInfo)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (VirtualSlot(i as u32), m))
    }

    /// Whether any managed type overrides this slot.
    #[inline]
    pub fn is_overridden_anywhere(&self, slot: VirtualSlot) -> bool {
        self.overridden_anywhere
            .get(slot.index())
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub(crate) fn mark_overridden(&self, slot: VirtualSlot) {
        if let Some(flag) = self.overridden_anywhere.get(slot.index()) {
            flag.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativebind_core::{MethodSignature, VariantType};

    fn node_virtuals() -> VirtualSet {
        VirtualSet::new(
            "Node",
            vec![
                VirtualMethodInfo::new("_ready", MethodSignature::void()),
                VirtualMethodInfo::new("_process", MethodSignature::new(vec![VariantType::Float], VariantType::Nil)),
            ],
        )
    }

    #[test]
    fn slots_follow_declaration_order() {
        let set = node_virtuals();
        assert_eq!(set.len(), 2);
        assert_eq!(set.slot("_ready").map(VirtualSlot::index), Some(0));
        assert_eq!(set.slot("_process").map(VirtualSlot::index), Some(1));
        assert_eq!(set.slot("_input"), None);
        assert_eq!(set.class(), "Node");
    }

    #[test]
    fn duplicate_names_keep_first_slot() {
        let set = VirtualSet::new(
            "Node",
            vec![
                VirtualMethodInfo::new("_ready", MethodSignature::void()),
                VirtualMethodInfo::new("_ready", MethodSignature::void()),
            ],
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn overridden_anywhere_starts_clear() {
        let set = node_virtuals();
        let slot = set.slot("_process").unwrap();
        assert!(!set.is_overridden_anywhere(slot));
        set.mark_overridden(slot);
        assert!(set.is_overridden_anywhere(slot));
        assert!(!set.is_overridden_anywhere(set.slot("_ready").unwrap()));
    }
}
