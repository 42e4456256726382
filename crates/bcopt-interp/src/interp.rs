use bcopt_ir::{Block, BlockId, Bytecode};
use bcopt_types::Type;
use tracing::{debug, trace};

use crate::collect::CollectedInfo;
use crate::context::Context;
use crate::dispatch::default_dispatch;
use crate::env::Env;
use crate::flags::{RunFlags, StepFlags, merge_used_local_statics};
use crate::index::Index;
use crate::state::State;

/// A transfer function for one instruction.
pub type DispatchFn = fn(&mut Env<'_, '_>, &Bytecode);

/// Borrowed inputs for interpreting one block.
///
/// Built fresh for every [`step`] or [`run`] call; nothing here outlives it.
pub struct Interp<'a> {
    pub index: &'a Index,
    pub ctx: Context,
    pub collect: &'a mut CollectedInfo,
    pub blk: &'a Block,
    pub state: &'a mut State,
}

impl<'a> Interp<'a> {
    pub fn new(
        index: &'a Index,
        ctx: Context,
        collect: &'a mut CollectedInfo,
        blk: &'a Block,
        state: &'a mut State,
    ) -> Self {
        Interp {
            index,
            ctx,
            collect,
            blk,
            state,
        }
    }
}

/// Execute one instruction against `interp.state`.
///
/// The state must be exactly the one a full [`run`] of the block would have
/// reached at `op`. Successor propagation is not performed; a taken jump is
/// only reported through [`StepFlags::jmp_dest`].
pub fn step(interp: &mut Interp<'_>, op: &Bytecode) -> StepFlags {
    let mut ignore = |_: BlockId, _: Option<&State>| {};
    let mut env = Env::new(interp, &mut ignore);
    default_dispatch(&mut env, op);
    env.finish().0
}

/// Interpret the whole block with the default transfer functions.
///
/// `propagate` is called with the state to merge into every successor the
/// block may reach: branch targets, the fall-through block, and, for every
/// instruction that may throw, each exception handler with the state from
/// before that instruction. A `None` state asks for the block to be
/// re-processed regardless of any state change.
pub fn run(interp: &mut Interp<'_>, propagate: impl FnMut(BlockId, Option<&State>)) -> RunFlags {
    run_with(interp, propagate, default_dispatch)
}

/// Like [`run`], with a caller-supplied transfer function. Custom dispatchers
/// usually special-case a few opcodes and defer to [`default_dispatch`].
pub fn run_with(
    interp: &mut Interp<'_>,
    mut propagate: impl FnMut(BlockId, Option<&State>),
    dispatch: DispatchFn,
) -> RunFlags {
    let blk = interp.blk;
    debug!(func = %interp.ctx.func, block = %blk.id, instrs = blk.instrs.len(), "run block");

    let mut ret = RunFlags::default();
    let has_handlers = !blk.exn_exits.is_empty();

    for op in &blk.instrs {
        let before = has_handlers.then(|| interp.state.clone());
        let (flags, unreachable) = {
            let mut env = Env::new(interp, &mut propagate);
            dispatch(&mut env, op);
            env.finish()
        };
        trace!(
            op = %op,
            pei = flags.was_pei,
            effect_free = flags.effect_free,
            const_prop = flags.can_const_prop,
            state = %interp.state,
            "step"
        );

        if flags.was_pei {
            if let Some(before) = &before {
                for &handler in &blk.exn_exits {
                    propagate(handler, Some(before));
                }
            }
        }

        merge_used_local_statics(&mut ret.used_local_statics, flags.used_local_statics);

        if let Some(returned) = flags.returned {
            ret.returned = Some(returned);
            ret.ret_param = flags.ret_param;
            return ret;
        }
        if let Some(dest) = flags.jmp_dest {
            propagate(dest, Some(&*interp.state));
            return ret;
        }
        if unreachable {
            return ret;
        }
    }

    if let Some(next) = blk.fallthrough {
        propagate(next, Some(&*interp.state));
    }
    ret
}

/// The receiver type in the current context, or `None` where there is no
/// `$this` (free functions and static methods).
pub fn this_type(interp: &Interp<'_>) -> Option<Type> {
    receiver_type(interp.index, interp.ctx)
}

pub(crate) fn receiver_type(index: &Index, ctx: Context) -> Option<Type> {
    let cls = ctx.cls?;
    if !index.func(ctx.func).has_this() {
        return None;
    }
    Some(Type::sub_obj(index.class(cls).name.clone()))
}

#[cfg(test)]
mod tests {
    use bcopt_ir::{Class, Func, FuncId, LocalId, Param, Program};
    use crate::state::StackElem;
    use bcopt_types::ConstValue;

    use super::*;

    fn setup(instrs: Vec<Bytecode>) -> (Index, Block) {
        let blk = Block::new(0, instrs).fallthrough(1);
        let mut program = Program::new();
        program.add_func(
            Func::builder()
                .name("f")
                .params(vec![Param::new("x")])
                .num_locals(2)
                .blocks(vec![blk.clone(), Block::new(1, vec![Bytecode::Null, Bytecode::RetC])])
                .new(),
        );
        (Index::new(program).unwrap(), blk)
    }

    #[test]
    fn step_reports_taken_jump_without_propagating() {
        let (index, _) = setup(vec![]);
        let blk = Block::new(0, vec![]);
        let mut state = State::entry(index.func(FuncId::new(0)));
        state.stack.push(StackElem::new(Type::bool_val(false)));
        let mut collect = CollectedInfo::new();
        let ctx = index.context(FuncId::new(0));
        let mut interp = Interp::new(&index, ctx, &mut collect, &blk, &mut state);
        let flags = step(&mut interp, &Bytecode::JmpZ(BlockId::new(1)));
        assert_eq!(flags.jmp_dest, Some(BlockId::new(1)));
        assert!(!flags.was_pei);
        assert_eq!(
            flags.strength_reduced,
            Some(vec![Bytecode::PopC, Bytecode::Jmp(BlockId::new(1))])
        );
    }

    #[test]
    fn run_stops_at_first_return() {
        let (index, blk) = setup(vec![
            Bytecode::Int(1),
            Bytecode::RetC,
            Bytecode::String("dead".into()),
            Bytecode::RetC,
        ]);
        let ctx = index.context(FuncId::new(0));
        let mut state = State::entry(index.func(ctx.func));
        let mut collect = CollectedInfo::new();
        let mut seen = Vec::new();
        let flags = run(
            &mut Interp::new(&index, ctx, &mut collect, &blk, &mut state),
            |b, s| seen.push((b, s.cloned())),
        );
        assert_eq!(flags.returned, Some(Type::from_const(&ConstValue::Int(1))));
        assert_eq!(flags.ret_param, None);
        assert!(seen.is_empty());
    }

    #[test]
    fn falls_through_with_final_state() {
        let (index, blk) = setup(vec![Bytecode::Int(7), Bytecode::PopL(LocalId::new(1))]);
        let ctx = index.context(FuncId::new(0));
        let mut state = State::entry(index.func(ctx.func));
        let mut collect = CollectedInfo::new();
        let mut seen = Vec::new();
        let flags = run(
            &mut Interp::new(&index, ctx, &mut collect, &blk, &mut state),
            |b, s| seen.push((b, s.cloned())),
        );
        assert_eq!(flags, RunFlags::default());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, BlockId::new(1));
        let out = seen[0].1.as_ref().unwrap();
        assert_eq!(out.local(LocalId::new(1)), Type::int_val(7));
    }

    #[test]
    fn receiver_only_in_instance_methods() {
        let mut program = Program::new();
        program.add_class(Class::new("C"));
        program.add_func(Func::builder().name("free").new());
        program.add_func(Func::builder().name("m").cls("C").new());
        let index = Index::new(program).unwrap();
        assert_eq!(receiver_type(&index, index.context(FuncId::new(0))), None);
        assert_eq!(
            receiver_type(&index, index.context(FuncId::new(1))),
            Some(Type::sub_obj("C"))
        );
    }
}
