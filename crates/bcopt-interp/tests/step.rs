use std::sync::Arc;

use bcopt_interp::{CollectedInfo, Index, Interp, StackElem, State, StepFlags, step, this_type};
use bcopt_ir::{
    Block, BlockId, Bytecode, Class, ClsRefSlotId, Func, FuncAttrs, IncDecOp, LocalId, Param,
};
use bcopt_test_utils::{builtin, program_with, user_func};
use bcopt_types::{ConstInit, ConstValue, Type};

const X: LocalId = LocalId::new(0);
const Y: LocalId = LocalId::new(1);

/// `f($x)` with one extra local and one class-ref slot.
fn func() -> Func {
    Func::builder()
        .name("f")
        .params(vec![Param::new("x")])
        .num_locals(2)
        .num_cls_ref_slots(1)
        .blocks(vec![Block::new(0, vec![Bytecode::Null, Bytecode::RetC])])
        .new()
}

fn index() -> Index {
    let mut program = program_with([
        func(),
        Func::builder()
            .name("m")
            .cls("C")
            .blocks(vec![Block::new(0, vec![Bytecode::Null, Bytecode::RetC])])
            .new(),
    ]);
    program.add_func(builtin(
        "sort",
        vec![Param::new("a").by_ref()],
        Type::bool(),
        FuncAttrs::NO_THROW,
    ));
    program.add_class(
        Class::new("C")
            .constant("A", ConstValue::Int(5))
            .constant("R", ConstInit::ReadOnly)
            .constant("D", ConstInit::Dynamic),
    );
    Index::new(program).unwrap()
}

fn entry(index: &Index) -> State {
    State::entry(index.func(user_func(0)))
}

fn push(state: &mut State, ty: Type) {
    state.stack.push(StackElem::new(ty));
}

fn step_in(index: &Index, func: u32, state: &mut State, op: &Bytecode) -> StepFlags {
    let fid = user_func(func);
    let blk = &index.func(fid).blocks[0];
    let mut collect = CollectedInfo::new();
    step(
        &mut Interp::new(index, index.context(fid), &mut collect, blk, state),
        op,
    )
}

fn step_one(index: &Index, state: &mut State, op: &Bytecode) -> StepFlags {
    step_in(index, 0, state, op)
}

fn call(nargs: u32, name: &str) -> Bytecode {
    Bytecode::FCallD {
        nargs,
        func: Arc::from(name),
        unpack: false,
    }
}

fn cls_cns(name: &str) -> Bytecode {
    Bytecode::ClsCnsD {
        name: Arc::from(name),
        class: Arc::from("C"),
    }
}

#[test]
fn unproven_instructions_are_peis() {
    let index = index();
    let cases: Vec<(Vec<Type>, Bytecode)> = vec![
        (vec![], Bytecode::CGetL(Y)),
        (vec![Type::init_cell(), Type::init_cell()], Bytecode::Add),
        (vec![Type::str_val("abc"), Type::int_val(1)], Bytecode::Add),
        (vec![Type::arr(), Type::str()], Bytecode::Concat),
        (vec![], call(0, "mystery")),
        (vec![Type::init_cell()], Bytecode::Throw),
        (vec![], Bytecode::Fatal(Arc::from("boom"))),
        (vec![], cls_cns("D")),
        (vec![], cls_cns("MISSING")),
        (vec![], Bytecode::This),
        (vec![Type::init_cell()], Bytecode::ClsRefGetC(ClsRefSlotId::new(0))),
        (vec![Type::init_cell()], call(1, "strlen")),
    ];
    for (stack, op) in cases {
        let mut state = entry(&index);
        for ty in stack {
            push(&mut state, ty);
        }
        let flags = step_one(&index, &mut state, &op);
        assert!(flags.was_pei, "{op} should be a PEI");
        assert!(!flags.effect_free, "{op} should not be effect free");
    }
}

#[test]
fn proven_instructions_clear_pei() {
    let index = index();
    let cases: Vec<(Vec<Type>, Bytecode)> = vec![
        (vec![], Bytecode::Nop),
        (vec![], Bytecode::Int(4)),
        (vec![], Bytecode::CGetL(X)),
        (vec![], Bytecode::CGetQuietL(Y)),
        (vec![Type::int()], Bytecode::PopL(Y)),
        (vec![Type::int(), Type::dbl()], Bytecode::Add),
        (vec![Type::int(), Type::str()], Bytecode::Concat),
        (vec![Type::init_cell()], Bytecode::Not),
        (vec![], cls_cns("R")),
        (vec![Type::str_val("c")], Bytecode::ClsRefGetC(ClsRefSlotId::new(0))),
        (vec![Type::str()], call(1, "strlen")),
    ];
    for (stack, op) in cases {
        let mut state = entry(&index);
        for ty in stack {
            push(&mut state, ty);
        }
        let flags = step_one(&index, &mut state, &op);
        assert!(!flags.was_pei, "{op} should not be a PEI");
    }
}

#[test]
fn local_reads_are_reported() {
    let index = index();
    for op in [
        Bytecode::CGetL(Y),
        Bytecode::CGetQuietL(Y),
        Bytecode::IssetL(Y),
        Bytecode::IncDecL(Y, IncDecOp::PostInc),
        Bytecode::AssertRATL(Y, Type::int()),
    ] {
        let mut state = entry(&index);
        let flags = step_one(&index, &mut state, &op);
        assert!(flags.may_read_local_set.contains(Y), "{op} reads L:1");
        assert!(!flags.may_read_local_set.contains(X), "{op} does not read L:0");
        assert!(flags.may_read_local_set.contains(LocalId::new(700)));
    }

    // Functions that can inspect the caller's frame read everything.
    for op in [call(1, "compact"), call(0, "mystery")] {
        let mut state = entry(&index);
        if op == call(1, "compact") {
            push(&mut state, Type::str_val("x"));
        }
        let flags = step_one(&index, &mut state, &op);
        assert!(flags.may_read_local_set.is_full(), "{op} reads every local");
        assert!(flags.may_read_local_set.contains(LocalId::new(511)));
    }
}

#[test]
fn const_prop_implies_effect_free() {
    let index = index();
    let cases: Vec<(Vec<Type>, Bytecode, bool)> = vec![
        (vec![Type::int_val(2), Type::int_val(3)], Bytecode::Mul, true),
        (vec![Type::str_val("4"), Type::int_val(3)], Bytecode::Add, true),
        (vec![Type::str_val("abc"), Type::int_val(1)], Bytecode::Add, false),
        (vec![Type::int(), Type::int_val(1)], Bytecode::Add, false),
        (vec![Type::str_val("a"), Type::int_val(1)], Bytecode::Concat, true),
        (vec![Type::obj()], Bytecode::Not, true),
        (vec![Type::int(), Type::str()], Bytecode::Same, true),
        (vec![Type::int(), Type::int()], Bytecode::NSame, false),
        (vec![], Bytecode::IssetL(Y), true),
        (vec![], Bytecode::IssetL(X), false),
        (vec![Type::str_val("abc")], call(1, "strlen"), true),
        (vec![Type::str_val("12abc")], call(1, "intval"), true),
        (vec![], cls_cns("A"), true),
        (vec![], cls_cns("R"), false),
    ];
    for (stack, op, expect) in cases {
        let mut state = entry(&index);
        for ty in stack {
            push(&mut state, ty);
        }
        let flags = step_one(&index, &mut state, &op);
        assert_eq!(flags.can_const_prop, expect, "const prop of {op}");
        if flags.can_const_prop {
            assert!(flags.effect_free, "{op} const props but is not effect free");
            assert!(!flags.was_pei);
            let top = state.stack.last().unwrap();
            assert!(top.ty.is_const(), "{op} pushed {}", top.ty);
        }
    }
}

#[test]
fn constant_folding_results() {
    let index = index();
    let mut state = entry(&index);
    push(&mut state, Type::str_val("a"));
    push(&mut state, Type::int_val(1));
    step_one(&index, &mut state, &Bytecode::Concat);
    assert_eq!(state.stack.last().unwrap().ty, Type::str_val("a1"));

    let mut state = entry(&index);
    push(&mut state, Type::int_val(i64::MAX));
    push(&mut state, Type::int_val(1));
    step_one(&index, &mut state, &Bytecode::Add);
    assert_eq!(
        state.stack.last().unwrap().ty,
        Type::dbl_val(i64::MAX as f64 + 1.0)
    );

    let mut state = entry(&index);
    push(&mut state, Type::str_val("ab"));
    push(&mut state, Type::int_val(2));
    let flags = step_one(&index, &mut state, &call(2, "str_repeat"));
    assert!(flags.can_const_prop);
    assert_eq!(state.stack.len(), 1);
    assert_eq!(state.stack[0].ty, Type::str_val("abab"));
}

#[test]
fn builtin_calls_strength_reduce() {
    let index = index();
    let mut state = entry(&index);
    push(&mut state, Type::str());
    let flags = step_one(&index, &mut state, &call(1, "strlen"));
    assert!(!flags.can_const_prop);
    assert_eq!(
        flags.strength_reduced,
        Some(vec![Bytecode::FCallBuiltin {
            nargs: 1,
            func: Arc::from("strlen"),
        }])
    );
    assert_eq!(state.stack.last().unwrap().ty, Type::int());

    // Omitted arguments are pushed from their defaults.
    let mut state = entry(&index);
    push(&mut state, Type::init_cell());
    let flags = step_one(&index, &mut state, &call(1, "intval"));
    assert_eq!(
        flags.strength_reduced,
        Some(vec![
            Bytecode::Int(10),
            Bytecode::FCallBuiltin {
                nargs: 2,
                func: Arc::from("intval"),
            },
        ])
    );

    let mut state = entry(&index);
    push(&mut state, Type::str());
    push(&mut state, Type::int());
    let flags = step_one(
        &index,
        &mut state,
        &Bytecode::FCallBuiltin {
            nargs: 2,
            func: Arc::from("intval"),
        },
    );
    assert!(!flags.was_pei);
    assert_eq!(flags.strength_reduced, None);
    assert_eq!(state.stack.len(), 1);
}

#[test]
fn doubles_concatenate_in_runtime_format() {
    let index = index();
    for (d, expect) in [(1e20, "1.0E+20"), (0.1 + 0.2, "0.3"), (-1.5e-7, "-1.5E-7")] {
        let mut state = entry(&index);
        push(&mut state, Type::dbl_val(d));
        push(&mut state, Type::str_val(""));
        let flags = step_one(&index, &mut state, &Bytecode::Concat);
        assert!(flags.can_const_prop);
        assert_eq!(state.stack[0].ty, Type::str_val(expect));
    }
}

#[test]
fn by_ref_builtins_are_not_emitted_directly() {
    let index = index();
    let mut state = entry(&index);
    state.set_local(Y, Type::int_val(1));
    step_one(&index, &mut state, &Bytecode::CGetL(Y));
    let flags = step_one(
        &index,
        &mut state,
        &Bytecode::FCallBuiltin {
            nargs: 1,
            func: Arc::from("sort"),
        },
    );
    assert_eq!(flags.strength_reduced, None);
    assert_eq!(state.local(Y), Type::init_cell());
    assert!(state.maybe_written.contains(Y));
    assert_eq!(state.stack.len(), 1);
}

#[test]
fn function_exists_folds_known_names() {
    let index = index();
    let mut state = entry(&index);
    push(&mut state, Type::str_val("STRLEN"));
    let flags = step_one(&index, &mut state, &call(1, "function_exists"));
    assert!(flags.can_const_prop);
    assert_eq!(state.stack.last().unwrap().ty, Type::bool_val(true));

    let mut state = entry(&index);
    push(&mut state, Type::str_val("defined_later"));
    let flags = step_one(&index, &mut state, &call(1, "function_exists"));
    assert!(!flags.can_const_prop);
    assert_eq!(state.stack.last().unwrap().ty, Type::bool());
}

#[test]
fn class_constant_markers() {
    let index = index();

    let mut state = entry(&index);
    let flags = step_one(&index, &mut state, &cls_cns("R"));
    assert!(!flags.was_pei);
    assert!(!flags.can_const_prop);
    assert_eq!(state.stack[0].ty, Type::init_cell());

    let mut state = entry(&index);
    let flags = step_one(&index, &mut state, &cls_cns("D"));
    assert!(flags.was_pei);
    assert_eq!(state.stack[0].ty, Type::init_cell());

    // Through a class-ref slot.
    let slot = ClsRefSlotId::new(0);
    let mut state = entry(&index);
    push(&mut state, Type::str_val("c"));
    step_one(&index, &mut state, &Bytecode::ClsRefGetC(slot));
    assert_eq!(state.cls_ref_slot(slot), Type::exact_cls("C"));
    let flags = step_one(
        &index,
        &mut state,
        &Bytecode::ClsCns {
            name: Arc::from("A"),
            slot,
        },
    );
    assert!(flags.can_const_prop);
    assert_eq!(state.stack[0].ty, Type::int_val(5));
    assert_eq!(state.cls_ref_slot(slot), Type::cls());
}

#[test]
fn receiver_in_methods() {
    let index = index();
    let method = user_func(1);
    let mut state = State::entry(index.func(method));

    let first = step_in(&index, 1, &mut state, &Bytecode::This);
    assert!(first.was_pei);
    let second = step_in(&index, 1, &mut state, &Bytecode::This);
    assert!(second.effect_free);
    assert_eq!(state.stack[1].ty, Type::sub_obj("C"));

    let blk = &index.func(method).blocks[0];
    let mut collect = CollectedInfo::new();
    let interp = Interp::new(&index, index.context(method), &mut collect, blk, &mut state);
    assert_eq!(this_type(&interp), Some(Type::sub_obj("C")));

    let mut state = entry(&index);
    let flags = step_one(&index, &mut state, &Bytecode::BareThis);
    assert!(flags.effect_free);
    assert_eq!(state.stack[0].ty, Type::init_null());
}

/// `C::m($d)` where `$d` is declared as `D`, a subclass of `C`.
fn subclass_index() -> Index {
    let mut program = program_with([Func::builder()
        .name("m")
        .cls("C")
        .params(vec![Param::new("d").typed(Type::sub_obj("D"))])
        .num_locals(1)
        .blocks(vec![Block::new(0, vec![Bytecode::Null, Bytecode::RetC])])
        .new()]);
    program.add_class(Class::new("C"));
    program.add_class(Class::new("D").extends("C"));
    Index::new(program).unwrap()
}

#[test]
fn subclass_objects_are_not_assumed_distinct() {
    let index = subclass_index();
    let d = LocalId::new(0);
    let mut state = State::entry(index.func(user_func(0)));
    step_in(&index, 0, &mut state, &Bytecode::This);
    step_in(&index, 0, &mut state, &Bytecode::CGetL(d));
    let flags = step_in(&index, 0, &mut state, &Bytecode::Same);
    assert!(!flags.can_const_prop);
    assert_eq!(state.stack[0].ty, Type::bool());

    let mut state = State::entry(index.func(user_func(0)));
    step_in(&index, 0, &mut state, &Bytecode::AssertRATL(d, Type::sub_obj("C")));
    assert_eq!(state.local(d), Type::obj());
}

#[test]
fn jumps_on_decided_conditions() {
    let index = index();
    let target = BlockId::new(0);

    let mut state = entry(&index);
    push(&mut state, Type::bool_val(true));
    let flags = step_one(&index, &mut state, &Bytecode::JmpNZ(target));
    assert_eq!(flags.jmp_dest, Some(target));

    let mut state = entry(&index);
    push(&mut state, Type::int_val(1));
    let flags = step_one(&index, &mut state, &Bytecode::JmpZ(target));
    assert_eq!(flags.jmp_dest, None);
    assert_eq!(flags.strength_reduced, Some(vec![Bytecode::PopC]));

    let mut state = entry(&index);
    push(&mut state, Type::init_cell());
    let flags = step_one(&index, &mut state, &Bytecode::JmpZ(target));
    assert_eq!(flags.jmp_dest, None);
    assert_eq!(flags.strength_reduced, None);
    assert!(state.stack.is_empty());
}

#[test]
fn locals_track_writes_and_equivalences() {
    let index = index();
    let mut state = entry(&index);
    step_one(&index, &mut state, &Bytecode::CGetL(X));
    assert_eq!(state.stack[0].equiv_loc, Some(X));

    push(&mut state, Type::int_val(2));
    step_one(&index, &mut state, &Bytecode::SetL(X));
    // The older copy of `$x` no longer matches it.
    assert_eq!(state.stack[0].equiv_loc, None);
    assert_eq!(state.stack[1].equiv_loc, Some(X));
    assert_eq!(state.local(X), Type::int_val(2));
    assert!(state.maybe_written.contains(X));

    step_one(&index, &mut state, &Bytecode::IncDecL(X, IncDecOp::PostInc));
    assert_eq!(state.local(X), Type::int_val(3));
    assert_eq!(state.stack[2].ty, Type::int_val(2));

    step_one(&index, &mut state, &Bytecode::UnsetL(X));
    assert_eq!(state.local(X), Type::uninit());

    step_one(&index, &mut state, &Bytecode::AssertRATL(Y, Type::int()));
    assert!(state.local(Y).is_bottom());
}
