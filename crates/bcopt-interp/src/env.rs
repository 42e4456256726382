use bcopt_ir::{Block, BlockId, Bytecode, Func, LocalId};
use bcopt_types::{Lattice, Type};
use tracing::debug;

use crate::collect::CollectedInfo;
use crate::context::Context;
use crate::flags::StepFlags;
use crate::index::Index;
use crate::interp::Interp;
use crate::state::{StackElem, State};

/// Callback receiving the state to merge into a successor block. `None`
/// asks for the block to be re-processed without offering a new state.
pub type PropagateFn<'p> = dyn FnMut(BlockId, Option<&State>) + 'p;

/// Everything one instruction's transfer function may touch.
///
/// Handlers start from conservative [`StepFlags`] and relax them through the
/// helpers here: an instruction stays a PEI unless it calls
/// [`nothrow`](Self::nothrow).
pub struct Env<'e, 'a> {
    pub index: &'a Index,
    pub ctx: Context,
    pub collect: &'e mut CollectedInfo,
    pub blk: &'a Block,
    pub state: &'e mut State,
    pub flags: StepFlags,
    propagate: &'e mut PropagateFn<'e>,
    unreachable: bool,
}

impl<'e, 'a> Env<'e, 'a> {
    pub(crate) fn new(interp: &'e mut Interp<'a>, propagate: &'e mut PropagateFn<'e>) -> Self {
        Env {
            index: interp.index,
            ctx: interp.ctx,
            collect: &mut *interp.collect,
            blk: interp.blk,
            state: &mut *interp.state,
            flags: StepFlags::default(),
            propagate,
            unreachable: false,
        }
    }

    pub fn func(&self) -> &'a Func {
        self.index.func(self.ctx.func)
    }

    // -- Stack --------------------------------------------------------------

    /// Pop the top of the stack. Underflow is malformed bytecode; it reads as
    /// an unknown value.
    pub fn pop(&mut self) -> StackElem {
        let elem = self.state.stack.pop();
        debug_assert!(elem.is_some(), "stack underflow");
        elem.unwrap_or_else(|| StackElem::new(Type::init_cell()))
    }

    pub fn pop_ty(&mut self) -> Type {
        self.pop().ty
    }

    pub fn push(&mut self, ty: Type) {
        self.state.stack.push(StackElem::new(ty));
    }

    pub fn push_equiv(&mut self, ty: Type, local: LocalId) {
        self.state.stack.push(StackElem {
            ty,
            equiv_loc: Some(local),
        });
    }

    /// The entry `depth` slots below the top.
    pub fn top(&self, depth: usize) -> Option<&StackElem> {
        let len = self.state.stack.len();
        len.checked_sub(depth + 1).map(|i| &self.state.stack[i])
    }

    // -- Locals -------------------------------------------------------------

    pub fn read_local(&mut self, local: LocalId) -> Type {
        self.flags.may_read_local_set.insert(local);
        self.state.local(local)
    }

    /// The instruction may read any local, e.g. through `compact()`.
    pub fn read_all_locals(&mut self) {
        self.flags.may_read_local_set.insert_all();
    }

    pub fn write_local(&mut self, local: LocalId, ty: Type) {
        self.state.kill_equivs(local);
        self.state.maybe_written.insert(local);
        self.state.set_local(local, ty);
    }

    /// Record a store into the static bound to `local`, if it is one.
    ///
    /// When the stored type is not covered by what the index currently
    /// believes, the current block is scheduled for re-processing: it will
    /// see a wider static once the driver folds the new type into the index.
    pub fn write_local_static(&mut self, local: LocalId, ty: &Type) {
        if !self.func().is_static_local(local) {
            return;
        }
        let known = self.use_local_static(local);
        self.collect.record_local_static(local, ty);
        if !ty.is_subseteq(&known) {
            debug!(local = %local, known = %known, stored = %ty, "local static widened");
            self.force_reprocess(self.blk.id);
        }
    }

    /// Type of the static bound to `local`, noting the dependency.
    pub fn use_local_static(&mut self, local: LocalId) -> Type {
        let ty = self.index.lookup_local_static(self.ctx.func, local);
        self.flags
            .used_local_statics
            .get_or_insert_with(Default::default)
            .insert(local, ty.clone());
        ty
    }

    // -- Flags --------------------------------------------------------------

    pub fn nothrow(&mut self) {
        self.flags.was_pei = false;
    }

    /// The instruction cannot throw and has no effect besides its outputs.
    pub fn effect_free(&mut self) {
        self.nothrow();
        self.flags.effect_free = true;
    }

    /// The instruction pushes a constant computed without side effects.
    pub fn const_prop(&mut self) {
        self.flags.can_const_prop = true;
    }

    pub fn jmp_setdest(&mut self, dest: BlockId) {
        self.flags.jmp_dest = Some(dest);
    }

    /// Offer a cheaper equivalent of the current instruction.
    pub fn reduce(&mut self, bcs: Vec<Bytecode>) {
        if self.index.options().strength_reduce {
            self.flags.strength_reduced = Some(bcs);
        }
    }

    /// Control never continues past this instruction.
    pub fn mark_unreachable(&mut self) {
        self.unreachable = true;
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    // -- Control flow -------------------------------------------------------

    /// Send the current state to `target`.
    pub fn propagate(&mut self, target: BlockId) {
        (self.propagate)(target, Some(&*self.state));
    }

    pub fn force_reprocess(&mut self, target: BlockId) {
        (self.propagate)(target, None);
    }

    /// Settle the flags of the finished instruction.
    pub(crate) fn finish(self) -> (StepFlags, bool) {
        let mut flags = self.flags;
        if flags.can_const_prop {
            let pushed_const = self.state.stack.last().is_some_and(|e| e.ty.is_const());
            if pushed_const {
                flags.was_pei = false;
                flags.effect_free = true;
            } else {
                flags.can_const_prop = false;
            }
        }
        (flags, self.unreachable)
    }
}
