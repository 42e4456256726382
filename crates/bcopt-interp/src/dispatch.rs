//! Transfer functions for each opcode.

use std::sync::Arc;

use bcopt_ir::{BlockId, Bytecode, ClsRefSlotId, FuncAttrs, IncDecOp, LocalId};
use bcopt_types::{ConstInit, ConstValue, HasBottom, Lattice, Type, TypeBits};
use smallvec::SmallVec;

use crate::builtins::{can_emit_builtin, const_fold, finish_builtin, handle_function_exists};
use crate::env::Env;
use crate::interp::receiver_type;
use crate::state::StackElem;

/// Values that can be converted, compared and concatenated without running
/// user code.
const SCALAR: TypeBits = TypeBits::NULL
    .union(TypeBits::BOOL)
    .union(TypeBits::NUM)
    .union(TypeBits::STR);

/// The default abstract semantics of `op`.
pub fn default_dispatch(env: &mut Env<'_, '_>, op: &Bytecode) {
    match op {
        Bytecode::Nop => env.effect_free(),
        Bytecode::PopC => {
            let ty = env.pop_ty();
            // Dropping the last reference to an object may run a destructor.
            if !ty.could_be_bits(TypeBits::OBJ | TypeBits::RES) {
                env.effect_free();
            }
        }
        Bytecode::Dup => {
            let top = env.pop();
            env.state.stack.push(top.clone());
            env.state.stack.push(top);
            env.effect_free();
        }

        Bytecode::Null | Bytecode::True | Bytecode::False => push_literal(env, op),
        Bytecode::Int(i) => push_const(env, ConstValue::Int(*i)),
        Bytecode::Double(d) => push_const(env, ConstValue::Dbl(*d)),
        Bytecode::String(s) => push_const(env, ConstValue::Str(s.clone())),

        Bytecode::CGetL(l) => cget_local(env, *l, false),
        Bytecode::CGetQuietL(l) => cget_local(env, *l, true),
        Bytecode::SetL(l) => {
            let val = env.top(0).map(|e| e.ty.clone()).unwrap_or_else(Type::init_cell);
            set_local(env, *l, val);
            if let Some(top) = env.state.stack.last_mut() {
                top.equiv_loc = Some(*l);
            }
        }
        Bytecode::PopL(l) => {
            let val = env.pop_ty();
            set_local(env, *l, val);
        }
        Bytecode::UnsetL(l) => {
            let overwrites_obj = env.state.local(*l).could_be_bits(TypeBits::OBJ | TypeBits::RES);
            env.write_local(*l, Type::uninit());
            if !overwrites_obj {
                env.nothrow();
            }
        }
        Bytecode::IssetL(l) => {
            let ty = env.read_local(*l);
            let result = if ty.subtype_of_bits(TypeBits::NULL) {
                Type::bool_val(false)
            } else if !ty.could_be_bits(TypeBits::NULL) {
                Type::bool_val(true)
            } else {
                Type::bool()
            };
            env.push(result);
            env.effect_free();
            env.const_prop();
        }
        Bytecode::IncDecL(l, op) => inc_dec_local(env, *l, *op),
        Bytecode::AssertRATL(l, ty) => {
            let refined = env.read_local(*l).meet(ty);
            env.state.set_local(*l, refined);
            env.effect_free();
        }

        Bytecode::Add => arith(env, ConstValue::add),
        Bytecode::Sub => arith(env, ConstValue::sub),
        Bytecode::Mul => arith(env, ConstValue::mul),
        Bytecode::Concat => concat(env),
        Bytecode::Not => {
            let ty = env.pop_ty();
            match ty.truthiness() {
                Some(b) => {
                    env.push(Type::bool_val(!b));
                    env.const_prop();
                }
                None => env.push(Type::bool()),
            }
            env.effect_free();
        }
        Bytecode::Same => same(env, false),
        Bytecode::NSame => same(env, true),

        Bytecode::Jmp(target) => {
            env.jmp_setdest(*target);
            env.nothrow();
        }
        Bytecode::JmpZ(target) => cond_jmp(env, *target, false),
        Bytecode::JmpNZ(target) => cond_jmp(env, *target, true),
        Bytecode::RetC => ret(env),
        Bytecode::Throw => {
            env.pop();
            env.mark_unreachable();
        }
        Bytecode::Fatal(_) => env.mark_unreachable(),

        Bytecode::This => this(env),
        Bytecode::BareThis => {
            env.collect.reads_this = true;
            let ty = receiver_type(env.index, env.ctx)
                .map(|t| if env.state.this_available { t } else { t.opt() })
                .unwrap_or_else(Type::init_null);
            env.push(ty);
            env.effect_free();
        }

        Bytecode::ClsRefGetC(slot) => cls_ref_get(env, *slot),
        Bytecode::ClsCns { name, slot } => {
            let cls_ty = env.state.cls_ref_slot(*slot);
            env.state.set_cls_ref_slot(*slot, Type::cls());
            // Subclasses may redefine a constant, so only an exact class is
            // conclusive.
            let init = cls_ty
                .class_spec()
                .filter(|spec| spec.exact)
                .and_then(|spec| env.index.resolve_class(&spec.name))
                .and_then(|cls| env.index.lookup_class_constant(cls, name))
                .cloned();
            push_class_constant(env, init);
        }
        Bytecode::ClsCnsD { name, class } => {
            let init = env
                .index
                .resolve_class(class)
                .and_then(|cls| env.index.lookup_class_constant(cls, name))
                .cloned();
            push_class_constant(env, init);
        }

        Bytecode::StaticLocCheck(l) => {
            let ty = env.use_local_static(*l);
            env.write_local(*l, ty);
            env.push(Type::bool());
            env.nothrow();
        }
        Bytecode::StaticLocInit(l) => {
            let val = env.pop_ty();
            env.write_local_static(*l, &val);
            env.write_local(*l, val);
            env.nothrow();
        }

        Bytecode::FCallD { nargs, func, unpack } => fcall(env, *nargs, func, *unpack),
        Bytecode::FCallBuiltin { nargs, func } => {
            let index = env.index;
            match index.resolve_func(func) {
                Some(resolved) if can_emit_builtin(resolved.func, *nargs, false) => {
                    finish_builtin(env, resolved.func, *nargs, false)
                }
                _ => generic_call(env, *nargs, false, func),
            }
        }
    }
}

fn push_literal(env: &mut Env<'_, '_>, op: &Bytecode) {
    let ty = match op {
        Bytecode::True => Type::bool_val(true),
        Bytecode::False => Type::bool_val(false),
        _ => Type::init_null(),
    };
    env.push(ty);
    env.effect_free();
}

fn push_const(env: &mut Env<'_, '_>, value: ConstValue) {
    env.push(Type::from_const(&value));
    env.effect_free();
}

fn cget_local(env: &mut Env<'_, '_>, l: LocalId, quiet: bool) {
    let ty = env.read_local(l);
    // Reading an uninitialized local raises a notice.
    if quiet || !ty.could_be_bits(TypeBits::UNINIT) {
        env.effect_free();
    }
    env.push_equiv(ty.uninit_as_null(), l);
}

/// Overwriting a local may release the last reference to an object.
fn set_local(env: &mut Env<'_, '_>, l: LocalId, val: Type) {
    let overwrites_obj = env.state.local(l).could_be_bits(TypeBits::OBJ | TypeBits::RES);
    env.write_local_static(l, &val);
    env.write_local(l, val);
    if !overwrites_obj {
        env.nothrow();
    }
}

fn inc_dec_local(env: &mut Env<'_, '_>, l: LocalId, op: IncDecOp) {
    let raw = env.read_local(l);
    let old = raw.uninit_as_null();
    let one = ConstValue::Int(1);
    let folded = match old.to_const() {
        Some(ConstValue::Null) if op.is_inc() => Some(ConstValue::Int(1)),
        Some(ConstValue::Null) => Some(ConstValue::Null),
        Some(c @ (ConstValue::Int(_) | ConstValue::Dbl(_))) => {
            if op.is_inc() {
                c.add(&one)
            } else {
                c.sub(&one)
            }
        }
        _ => None,
    };
    let new = match folded {
        Some(v) => Type::from_const(&v),
        None if old.subtype_of_bits(TypeBits::DBL) => Type::dbl(),
        None if old.subtype_of_bits(TypeBits::NUM) => Type::num(),
        None => Type::init_cell(),
    };
    if raw.subtype_of_bits(TypeBits::INIT_NULL | TypeBits::NUM) {
        env.nothrow();
    }
    env.write_local_static(l, &new);
    env.write_local(l, new.clone());
    env.push(if op.is_pre() { new } else { old });
}

fn arith(env: &mut Env<'_, '_>, op: fn(&ConstValue, &ConstValue) -> Option<ConstValue>) {
    let rhs = env.pop_ty();
    let lhs = env.pop_ty();
    if let (Some(a), Some(b)) = (lhs.to_const(), rhs.to_const()) {
        if let Some(v) = op(&a, &b) {
            env.push(Type::from_const(&v));
            env.const_prop();
            return;
        }
    }
    if lhs.subtype_of_bits(TypeBits::NUM) && rhs.subtype_of_bits(TypeBits::NUM) {
        let ty = if lhs.subtype_of_bits(TypeBits::DBL) || rhs.subtype_of_bits(TypeBits::DBL) {
            Type::dbl()
        } else {
            Type::num()
        };
        env.push(ty);
        env.effect_free();
        return;
    }
    env.push(Type::init_cell());
}

fn concat(env: &mut Env<'_, '_>) {
    let rhs = env.pop_ty();
    let lhs = env.pop_ty();
    if let (Some(a), Some(b)) = (lhs.to_const(), rhs.to_const()) {
        let s = format!("{}{}", a.to_php_string(), b.to_php_string());
        env.push(Type::str_val(s));
        env.const_prop();
        return;
    }
    if lhs.subtype_of_bits(SCALAR) && rhs.subtype_of_bits(SCALAR) {
        env.effect_free();
    }
    env.push(Type::str());
}

fn same(env: &mut Env<'_, '_>, negate: bool) {
    let rhs = env.pop_ty();
    let lhs = env.pop_ty();
    let decided = match (lhs.to_const(), rhs.to_const()) {
        (Some(a), Some(b)) => Some(a.same(&b)),
        _ if !lhs.could_be(&rhs) => Some(false),
        _ => None,
    };
    match decided {
        Some(b) => {
            env.push(Type::bool_val(b != negate));
            env.const_prop();
        }
        None => env.push(Type::bool()),
    }
    env.effect_free();
}

/// `JmpZ` (`jump_if` false) and `JmpNZ` (`jump_if` true).
fn cond_jmp(env: &mut Env<'_, '_>, target: BlockId, jump_if: bool) {
    let cond = env.pop_ty();
    env.nothrow();
    match cond.truthiness() {
        Some(b) if b == jump_if => {
            env.jmp_setdest(target);
            env.reduce(vec![Bytecode::PopC, Bytecode::Jmp(target)]);
        }
        Some(_) => env.reduce(vec![Bytecode::PopC]),
        None => env.propagate(target),
    }
}

fn ret(env: &mut Env<'_, '_>) {
    let StackElem { ty, equiv_loc } = env.pop();
    let func = env.func();
    env.flags.ret_param = equiv_loc
        .filter(|l| func.is_param(*l) && !env.state.maybe_written.contains(*l));
    env.flags.returned = Some(ty);
    env.nothrow();
}

fn this(env: &mut Env<'_, '_>) {
    env.collect.reads_this = true;
    let Some(ty) = receiver_type(env.index, env.ctx) else {
        // Always fatal outside an instance method.
        env.push(Type::bottom());
        env.mark_unreachable();
        return;
    };
    if env.state.this_available {
        env.effect_free();
    }
    env.state.this_available = true;
    env.push(ty);
}

fn cls_ref_get(env: &mut Env<'_, '_>, slot: ClsRefSlotId) {
    let name = env.pop_ty();
    let resolved = name
        .str_data()
        .filter(|_| name.is_const())
        .and_then(|n| env.index.resolve_class(n));
    match resolved {
        Some(cls) => {
            let cls_name = env.index.class(cls).name.clone();
            env.state.set_cls_ref_slot(slot, Type::exact_cls(cls_name));
            env.nothrow();
        }
        None => env.state.set_cls_ref_slot(slot, Type::cls()),
    }
}

fn push_class_constant(env: &mut Env<'_, '_>, init: Option<ConstInit>) {
    let Some(init) = init else {
        // Unknown class or constant: raises at runtime.
        env.push(Type::init_cell());
        return;
    };
    env.push(init.to_type());
    match init {
        ConstInit::Value(_) => {
            env.nothrow();
            env.const_prop();
        }
        ConstInit::ReadOnly => env.nothrow(),
        ConstInit::Dynamic => {}
    }
}

// -- Calls ------------------------------------------------------------------

fn fcall(env: &mut Env<'_, '_>, nargs: u32, name: &Arc<str>, unpack: bool) {
    if !unpack
        && name.eq_ignore_ascii_case("function_exists")
        && handle_function_exists(env, nargs, true)
    {
        return;
    }
    let index = env.index;
    let Some(resolved) = index.resolve_func(name) else {
        return generic_call(env, nargs, unpack, name);
    };
    if !unpack {
        if let Some(ty) = const_fold(env, nargs, &resolved) {
            pop_args(env, nargs, false);
            env.collect.record_call(&resolved.func.name);
            env.push(ty);
            env.const_prop();
            return;
        }
    }
    if can_emit_builtin(resolved.func, nargs, unpack) {
        finish_builtin(env, resolved.func, nargs, unpack);
        let params = &resolved.func.params;
        let mut bcs: Vec<Bytecode> = params[nargs as usize..]
            .iter()
            .filter_map(|p| p.default.as_ref().map(Bytecode::from_const))
            .collect();
        bcs.push(Bytecode::FCallBuiltin {
            nargs: params.len() as u32,
            func: resolved.func.name.clone(),
        });
        env.reduce(bcs);
        return;
    }
    generic_call(env, nargs, unpack, name);
}

/// Pop call arguments, first argument first in the returned list.
pub(crate) fn pop_args(env: &mut Env<'_, '_>, nargs: u32, unpack: bool) -> SmallVec<[StackElem; 4]> {
    if unpack {
        env.pop();
    }
    let mut args: SmallVec<[StackElem; 4]> = (0..nargs).map(|_| env.pop()).collect();
    args.reverse();
    args
}

/// A call we know nothing special about: it may throw and run arbitrary code.
fn generic_call(env: &mut Env<'_, '_>, nargs: u32, unpack: bool, name: &Arc<str>) {
    let args = pop_args(env, nargs, unpack);
    let index = env.index;
    let ret = match index.resolve_func(name) {
        Some(r) => {
            env.collect.record_call(&r.func.name);
            if r.func.attrs.contains(FuncAttrs::READS_CALLER_FRAME) {
                env.read_all_locals();
            }
            // By-reference arguments write back into the caller's locals.
            for (param, arg) in r.func.params.iter().zip(&args) {
                if let (true, Some(l)) = (param.by_ref, arg.equiv_loc) {
                    env.write_local(l, Type::init_cell());
                }
            }
            index.lookup_return_type(r.id)
        }
        None => {
            env.collect.record_call(name);
            env.read_all_locals();
            Type::init_cell()
        }
    };
    env.push(ret);
}
