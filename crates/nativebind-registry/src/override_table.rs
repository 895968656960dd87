//! Per-managed-type override tables.
//!
//! An [`OverrideTable`] records which virtual methods of a native class a
//! concrete managed type redefines, as a bitset over the class's
//! [`VirtualSet`]. Tables are computed once per type and shared.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use nativebind_core::BridgeError;

use crate::{VirtualSet, VirtualSlot};

/// Which virtual slots one managed type overrides.
#[derive(Debug)]
pub struct OverrideTable {
    type_id: TypeId,
    type_name: &'static str,
    virtuals: Arc<VirtualSet>,
    bits: Vec<u64>,
    count: usize,
}

impl OverrideTable {
    /// Build a table from the names a managed type declares as overrides.
    ///
    /// Fails with `UnknownVirtual` if a name is not a virtual of the class.
    pub fn build(
        type_id: TypeId,
        type_name: &'static str,
        virtuals: Arc<VirtualSet>,
        overrides: &[&str],
    ) -> Result<Self, BridgeError> {
        let mut bits = vec![0u64; virtuals.len().div_ceil(64)];
        let mut count = 0;
        for name in overrides {
            let slot = virtuals.slot(name).ok_or_else(|| BridgeError::UnknownVirtual {
                class: virtuals.class().to_string(),
                method: (*name).to_string(),
            })?;
            let (word, mask) = Self::position(slot);
            if bits[word] & mask == 0 {
                bits[word] |= mask;
                count += 1;
            }
        }
        Ok(Self {
            type_id,
            type_name,
            virtuals,
            bits,
            count,
        })
    }

    #[inline]
    fn position(slot: VirtualSlot) -> (usize, u64) {
        (slot.index() / 64, 1u64 << (slot.index() % 64))
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn virtuals(&self) -> &Arc<VirtualSet> {
        &self.virtuals
    }

    /// Whether the slot is overridden. Slots no type overrides are rejected
    /// through the virtual set's global flags first.
    #[inline]
    pub fn is_overridden(&self, slot: VirtualSlot) -> bool {
        if !self.virtuals.is_overridden_anywhere(slot) {
            return false;
        }
        let (word, mask) = Self::position(slot);
        self.bits.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Whether the named virtual is overridden.
    pub fn has_override(&self, name: &str) -> Result<bool, BridgeError> {
        let slot = self.virtuals.slot(name).ok_or_else(|| BridgeError::UnknownVirtual {
            class: self.virtuals.class().to_string(),
            method: name.to_string(),
        })?;
        Ok(self.is_overridden(slot))
    }

    /// Number of overridden slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn overridden_names(&self) -> impl Iterator<Item = &str> {
        self.virtuals
            .methods()
            .filter(|(slot, _)| {
                let (word, mask) = Self::position(*slot);
                self.bits[word] & mask != 0
            })
            .map(|(_, m)| m.name.as_str())
    }

    /// Flag this table's overrides in the virtual set of a class derived
    /// from the one the table was built against.
    pub fn mark_in(&self, derived: &VirtualSet) {
        for name in self.overridden_names() {
            if let Some(slot) = derived.slot(name) {
                derived.mark_overridden(slot);
            }
        }
    }
}

/// Override tables keyed by managed type.
#[derive(Debug, Default)]
pub struct OverrideRegistry {
    tables: DashMap<TypeId, Arc<OverrideTable>, FxBuildHasher>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static OverrideRegistry {
        static GLOBAL: OnceLock<OverrideRegistry> = OnceLock::new();
        GLOBAL.get_or_init(OverrideRegistry::new)
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<OverrideTable>> {
        self.tables.get(&type_id).map(|t| Arc::clone(t.value()))
    }

    /// Get the table for a type, building it on first use.
    pub fn get_or_build(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        virtuals: &Arc<VirtualSet>,
        overrides: &[&str],
    ) -> Result<Arc<OverrideTable>, BridgeError> {
        if let Some(table) = self.get(type_id) {
            return Ok(table);
        }
        let built = Arc::new(OverrideTable::build(type_id, type_name, Arc::clone(virtuals), overrides)?);
        let table = Arc::clone(self.tables.entry(type_id).or_insert(built).value());
        for (slot, _) in virtuals.methods() {
            let (word, mask) = OverrideTable::position(slot);
            if table.bits[word] & mask != 0 {
                virtuals.mark_overridden(slot);
            }
        }
        tracing::debug!(
            type_name,
            class = virtuals.class(),
            overrides = table.len(),
            "built override table"
        );
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VirtualMethodInfo;
    use nativebind_core::{MethodSignature, VariantType};

    struct Player;
    struct Enemy;
    struct Plain;

    fn node_virtuals() -> Arc<VirtualSet> {
        Arc::new(VirtualSet::new(
            "Node",
            vec![
                VirtualMethodInfo::new("_ready", MethodSignature::void()),
                VirtualMethodInfo::new("_process", MethodSignature::new(vec![VariantType::Float], VariantType::Nil)),
                VirtualMethodInfo::new("_exit_tree", MethodSignature::void()),
            ],
        ))
    }

    #[test]
    fn table_answers_by_name() {
        let registry = OverrideRegistry::new();
        let virtuals = node_virtuals();
        let table = registry
            .get_or_build(TypeId::of::<Player>(), "Player", &virtuals, &["_process"])
            .unwrap();

        assert!(table.has_override("_process").unwrap());
        assert!(!table.has_override("_ready").unwrap());
        assert_eq!(table.len(), 1);
        assert_eq!(table.overridden_names().collect::<Vec<_>>(), vec!["_process"]);
    }

    #[test]
    fn unknown_virtual_fails_loudly() {
        let table = OverrideTable::build(TypeId::of::<Player>(), "Player", node_virtuals(), &["_proces"]);
        match table {
            Err(BridgeError::UnknownVirtual { class, method }) => {
                assert_eq!(class, "Node");
                assert_eq!(method, "_proces");
            }
            other => panic!("expected UnknownVirtual, got {other:?}"),
        }

        let empty = OverrideTable::build(TypeId::of::<Plain>(), "Plain", node_virtuals(), &[]).unwrap();
        assert!(matches!(
            empty.has_override("_input"),
            Err(BridgeError::UnknownVirtual { .. })
        ));
    }

    #[test]
    fn tables_are_cached_per_type() {
        let registry = OverrideRegistry::new();
        let virtuals = node_virtuals();
        let a = registry
            .get_or_build(TypeId::of::<Player>(), "Player", &virtuals, &["_ready"])
            .unwrap();
        let b = registry
            .get_or_build(TypeId::of::<Player>(), "Player", &virtuals, &["_ready"])
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn global_flags_track_any_override() {
        let registry = OverrideRegistry::new();
        let virtuals = node_virtuals();
        let ready = virtuals.slot("_ready").unwrap();
        let exit = virtuals.slot("_exit_tree").unwrap();

        registry
            .get_or_build(TypeId::of::<Plain>(), "Plain", &virtuals, &[])
            .unwrap();
        assert!(!virtuals.is_overridden_anywhere(ready));

        let enemy = registry
            .get_or_build(TypeId::of::<Enemy>(), "Enemy", &virtuals, &["_ready"])
            .unwrap();
        assert!(virtuals.is_overridden_anywhere(ready));
        assert!(!virtuals.is_overridden_anywhere(exit));
        assert!(enemy.is_overridden(ready));
        assert!(!enemy.is_overridden(exit));
    }

    #[test]
    fn wide_virtual_sets_span_words() {
        let methods = (0..70)
            .map(|i| VirtualMethodInfo::new(format!("_v{i}"), MethodSignature::void()))
            .collect();
        let virtuals = Arc::new(VirtualSet::new("Wide", methods));
        let registry = OverrideRegistry::new();
        let table = registry
            .get_or_build(TypeId::of::<Player>(), "Player", &virtuals, &["_v0", "_v65"])
            .unwrap();
        assert!(table.has_override("_v65").unwrap());
        assert!(!table.has_override("_v64").unwrap());
        assert_eq!(table.len(), 2);
    }
}
