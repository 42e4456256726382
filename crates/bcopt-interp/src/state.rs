use std::fmt;

use bcopt_ir::{ClsRefSlotId, Func, LocalId};
use bcopt_types::{Lattice, Type};

use crate::flags::{LocalSet, MAX_TRACKED_CLS_REF_SLOTS, MAX_TRACKED_LOCALS};

/// One evaluation-stack entry.
#[derive(Clone, Debug, PartialEq)]
pub struct StackElem {
    pub ty: Type,
    /// A local known to hold the same value.
    pub equiv_loc: Option<LocalId>,
}

impl StackElem {
    pub fn new(ty: Type) -> Self {
        StackElem {
            ty,
            equiv_loc: None,
        }
    }
}

/// The abstract machine at one program point.
///
/// Only the first [`MAX_TRACKED_LOCALS`] locals and
/// [`MAX_TRACKED_CLS_REF_SLOTS`] class-reference slots are stored. Reads of
/// anything beyond read as the top of their domain and writes are dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub locals: Vec<Type>,
    pub cls_ref_slots: Vec<Type>,
    pub stack: Vec<StackElem>,
    /// `$this` is known to be non-null.
    pub this_available: bool,
    /// Locals that may have been written since function entry.
    pub maybe_written: LocalSet,
}

impl State {
    /// Entry state of `func`: parameters hold their declared type, other
    /// locals are uninitialized.
    pub fn entry(func: &Func) -> Self {
        let num_locals = (func.num_locals as usize).min(MAX_TRACKED_LOCALS);
        let locals = (0..num_locals)
            .map(|idx| match func.params.get(idx) {
                Some(param) if param.by_ref => Type::cell(),
                Some(param) => param.type_constraint.clone().unwrap_or_else(Type::init_cell),
                None => Type::uninit(),
            })
            .collect();
        let num_slots = (func.num_cls_ref_slots as usize).min(MAX_TRACKED_CLS_REF_SLOTS);
        State {
            locals,
            cls_ref_slots: vec![Type::cls(); num_slots],
            stack: Vec::new(),
            this_available: false,
            maybe_written: LocalSet::new(),
        }
    }

    pub fn local(&self, local: LocalId) -> Type {
        self.locals
            .get(local.index())
            .cloned()
            .unwrap_or_else(Type::cell)
    }

    pub fn set_local(&mut self, local: LocalId, ty: Type) {
        if let Some(slot) = self.locals.get_mut(local.index()) {
            *slot = ty;
        }
    }

    pub fn cls_ref_slot(&self, slot: ClsRefSlotId) -> Type {
        self.cls_ref_slots
            .get(slot.index())
            .cloned()
            .unwrap_or_else(Type::cls)
    }

    pub fn set_cls_ref_slot(&mut self, slot: ClsRefSlotId, ty: Type) {
        if let Some(s) = self.cls_ref_slots.get_mut(slot.index()) {
            *s = ty;
        }
    }

    /// Forget every stack entry's equivalence with `local`.
    pub fn kill_equivs(&mut self, local: LocalId) {
        for elem in &mut self.stack {
            if elem.equiv_loc == Some(local) {
                elem.equiv_loc = None;
            }
        }
    }

    /// Join `other` into `self`, returning whether `self` changed.
    ///
    /// Both states must describe the same program point; in particular their
    /// stacks have the same depth.
    pub fn merge(&mut self, other: &State) -> bool {
        debug_assert_eq!(self.locals.len(), other.locals.len());
        debug_assert_eq!(self.stack.len(), other.stack.len(), "stack depth mismatch");

        let mut changed = false;
        for (a, b) in self.locals.iter_mut().zip(&other.locals) {
            changed |= join_into(a, b);
        }
        for (a, b) in self.cls_ref_slots.iter_mut().zip(&other.cls_ref_slots) {
            changed |= join_into(a, b);
        }
        for (a, b) in self.stack.iter_mut().zip(&other.stack) {
            changed |= join_into(&mut a.ty, &b.ty);
            if a.equiv_loc.is_some() && a.equiv_loc != b.equiv_loc {
                a.equiv_loc = None;
                changed = true;
            }
        }
        if self.this_available && !other.this_available {
            self.this_available = false;
            changed = true;
        }
        let written = self.maybe_written;
        self.maybe_written.union_with(&other.maybe_written);
        changed | (written != self.maybe_written)
    }
}

fn join_into(a: &mut Type, b: &Type) -> bool {
    let joined = a.join(b);
    if joined == *a {
        return false;
    }
    *a = joined;
    true
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("locals [")?;
        for (i, ty) in self.locals.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str("] stack [")?;
        for (i, elem) in self.stack.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", elem.ty)?;
            if let Some(l) = elem.equiv_loc {
                write!(f, "@L{l}")?;
            }
        }
        f.write_str("]")
    }
}
