use std::sync::Arc;

use bcopt_ir::LocalId;
use bcopt_types::{Lattice, Type};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;

/// Facts gathered while interpreting the blocks of one function.
///
/// Interpretation only ever adds to it. Callers running blocks in parallel
/// give each worker its own buffer and combine them with [`merge`](Self::merge).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectedInfo {
    /// Call targets in first-seen order.
    pub calls: IndexSet<Arc<str>>,
    /// Join of every type stored into each local static.
    pub local_statics: FxHashMap<LocalId, Type>,
    /// Some instruction needed the `$this` receiver.
    pub reads_this: bool,
}

impl CollectedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&mut self, name: &Arc<str>) {
        if !self.calls.contains(name) {
            self.calls.insert(name.clone());
        }
    }

    pub fn record_local_static(&mut self, local: LocalId, ty: &Type) {
        self.local_statics
            .entry(local)
            .and_modify(|seen| *seen = seen.join(ty))
            .or_insert_with(|| ty.clone());
    }

    pub fn merge(&mut self, other: CollectedInfo) {
        for name in other.calls {
            self.calls.insert(name);
        }
        for (local, ty) in other.local_statics {
            self.record_local_static(local, &ty);
        }
        self.reads_this |= other.reads_this;
    }
}
