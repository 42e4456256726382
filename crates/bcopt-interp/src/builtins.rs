//! Call-site helpers for builtins.
//!
//! Every helper here is advisory: answering `false` or `None` only forgoes
//! an optimization.

use std::sync::Arc;

use bcopt_ir::{Func, FuncAttrs};
use bcopt_types::{ConstValue, Lattice, NUMERIC_WHITESPACE, Type};
use tracing::trace;

use crate::dispatch::pop_args;
use crate::env::Env;
use crate::index::ResolvedFunc;

/// Whether a call to `func` with `num_params` arguments can become an
/// `FCallBuiltin`. That form passes every parameter explicitly, so missing
/// arguments need defaults, and it cannot unpack.
pub fn can_emit_builtin(func: &Func, num_params: u32, has_unpack: bool) -> bool {
    let n = num_params as usize;
    func.is_builtin()
        && !has_unpack
        && !func
            .attrs
            .intersects(FuncAttrs::VARIADIC | FuncAttrs::READS_CALLER_FRAME)
        && n <= func.params.len()
        && func.params[n..].iter().all(|p| p.default.is_some())
        && func.params.iter().all(|p| !p.by_ref)
}

/// Apply the effect of a call to the builtin `func`: pop its arguments and
/// push its declared return type. It only throws when the builtin may throw
/// or an argument does not match its parameter type.
pub fn finish_builtin(env: &mut Env<'_, '_>, func: &Func, num_params: u32, unpack: bool) {
    let args = pop_args(env, num_params, unpack);
    env.collect.record_call(&func.name);
    if func.attrs.contains(FuncAttrs::READS_CALLER_FRAME) {
        env.read_all_locals();
    }
    let args_match = !unpack
        && args.iter().zip(&func.params).all(|(arg, param)| {
            param
                .type_constraint
                .as_ref()
                .is_none_or(|t| arg.ty.is_subseteq(t))
        });
    if func.attrs.contains(FuncAttrs::NO_THROW) && args_match {
        env.nothrow();
    }
    env.push(func.ret_type.clone().unwrap_or_else(Type::init_cell));
}

/// Fold `function_exists("name")` when `name` is a function the index knows.
///
/// Returns whether the call was handled. Names the index does not know are
/// left alone since they may be defined at runtime.
pub fn handle_function_exists(
    env: &mut Env<'_, '_>,
    num_args: u32,
    allow_const_prop: bool,
) -> bool {
    if !env.index.options().fold_function_exists || num_args != 1 {
        return false;
    }
    let Some(ConstValue::Str(name)) = env.top(0).and_then(|e| e.ty.to_const()) else {
        return false;
    };
    if env.index.resolve_func(&name).is_none() {
        return false;
    }
    trace!(func = %name, "function_exists folded");
    env.pop();
    env.push(Type::bool_val(true));
    if allow_const_prop {
        env.const_prop();
    } else {
        env.effect_free();
    }
    true
}

/// Evaluate a call to a foldable builtin whose arguments are all constants.
///
/// Arguments are read from the stack without popping them.
pub fn const_fold(env: &Env<'_, '_>, nargs: u32, resolved: &ResolvedFunc<'_>) -> Option<Type> {
    let func = resolved.func;
    if !env.index.options().const_fold_builtins
        || !func.is_builtin()
        || !func.attrs.contains(FuncAttrs::FOLDABLE)
    {
        return None;
    }
    let nargs = nargs as usize;
    if nargs > func.params.len() && !func.attrs.contains(FuncAttrs::VARIADIC) {
        return None;
    }
    let mut args = Vec::with_capacity(nargs.max(func.params.len()));
    for depth in (0..nargs).rev() {
        args.push(env.top(depth)?.ty.to_const()?);
    }
    for param in func.params.iter().skip(nargs) {
        args.push(param.default.clone()?);
    }
    let eval = evaluator(&func.name)?;
    let value = eval(&args)?;
    trace!(func = %func.name, result = %value, "const folded call");
    Some(Type::from_const(&value))
}

// -- Static evaluators ------------------------------------------------------

type EvalFn = fn(&[ConstValue]) -> Option<ConstValue>;

struct StaticBuiltin {
    name: &'static str,
    eval: EvalFn,
}

const STATIC_BUILTINS: &[StaticBuiltin] = &[
    StaticBuiltin { name: "strlen", eval: fold_strlen },
    StaticBuiltin { name: "abs", eval: fold_abs },
    StaticBuiltin { name: "strtolower", eval: fold_strtolower },
    StaticBuiltin { name: "strtoupper", eval: fold_strtoupper },
    StaticBuiltin { name: "intval", eval: fold_intval },
    StaticBuiltin { name: "str_repeat", eval: fold_str_repeat },
    StaticBuiltin { name: "ord", eval: fold_ord },
    StaticBuiltin { name: "chr", eval: fold_chr },
    StaticBuiltin { name: "is_int", eval: fold_is_int },
    StaticBuiltin { name: "is_string", eval: fold_is_string },
    StaticBuiltin { name: "is_null", eval: fold_is_null },
    StaticBuiltin { name: "min", eval: fold_min },
    StaticBuiltin { name: "max", eval: fold_max },
];

/// Folded strings longer than this are left to the runtime.
const MAX_FOLDED_STR_LEN: usize = 4096;

fn evaluator(name: &str) -> Option<EvalFn> {
    STATIC_BUILTINS
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(name))
        .map(|b| b.eval)
}

fn fold_strlen(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Str(s)] => Some(ConstValue::Int(s.len() as i64)),
        _ => None,
    }
}

fn fold_abs(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Int(i)] => Some(match i.checked_abs() {
            Some(v) => ConstValue::Int(v),
            None => ConstValue::Dbl((*i as f64).abs()),
        }),
        [ConstValue::Dbl(d)] => Some(ConstValue::Dbl(d.abs())),
        _ => None,
    }
}

fn fold_strtolower(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Str(s)] => Some(ConstValue::str(s.to_ascii_lowercase())),
        _ => None,
    }
}

fn fold_strtoupper(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Str(s)] => Some(ConstValue::str(s.to_ascii_uppercase())),
        _ => None,
    }
}

fn fold_intval(args: &[ConstValue]) -> Option<ConstValue> {
    let value = match args {
        [v] | [v, ConstValue::Int(10)] => v,
        _ => return None,
    };
    let i = match value {
        ConstValue::Null => 0,
        ConstValue::Bool(b) => i64::from(*b),
        ConstValue::Int(i) => *i,
        ConstValue::Dbl(d) if d.is_finite() && d.abs() < 9.2e18 => *d as i64,
        ConstValue::Dbl(_) => return None,
        ConstValue::Str(s) => leading_int(s)?,
    };
    Some(ConstValue::Int(i))
}

/// The integer prefix of `s`, or 0 when there is none.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start_matches(NUMERIC_WHITESPACE);
    let digits_start = usize::from(s.starts_with(['-', '+']));
    let end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| i + digits_start);
    if end == digits_start {
        return Some(0);
    }
    // Overflow saturates at runtime; leave that to the runtime.
    s[..end].parse().ok()
}

fn fold_str_repeat(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Str(s), ConstValue::Int(n)] if *n >= 0 => {
            let n = usize::try_from(*n).ok()?;
            if s.len().checked_mul(n)? > MAX_FOLDED_STR_LEN {
                return None;
            }
            Some(ConstValue::str(s.repeat(n)))
        }
        _ => None,
    }
}

fn fold_ord(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Str(s)] => Some(ConstValue::Int(i64::from(
            s.as_bytes().first().copied().unwrap_or(0),
        ))),
        _ => None,
    }
}

fn fold_chr(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [ConstValue::Int(i)] => {
            let byte = u8::try_from(i.rem_euclid(256)).ok()?;
            // Only single-byte characters survive as a `str`.
            byte.is_ascii()
                .then(|| ConstValue::Str(Arc::from(char::from(byte).to_string())))
        }
        _ => None,
    }
}

fn fold_is_int(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [v] => Some(ConstValue::Bool(matches!(v, ConstValue::Int(_)))),
        _ => None,
    }
}

fn fold_is_string(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [v] => Some(ConstValue::Bool(matches!(v, ConstValue::Str(_)))),
        _ => None,
    }
}

fn fold_is_null(args: &[ConstValue]) -> Option<ConstValue> {
    match args {
        [v] => Some(ConstValue::Bool(matches!(v, ConstValue::Null))),
        _ => None,
    }
}

fn ints(args: &[ConstValue]) -> Option<Vec<i64>> {
    args.iter()
        .map(|v| match v {
            ConstValue::Int(i) => Some(*i),
            _ => None,
        })
        .collect()
}

fn fold_min(args: &[ConstValue]) -> Option<ConstValue> {
    ints(args)?.into_iter().min().map(ConstValue::Int)
}

fn fold_max(args: &[ConstValue]) -> Option<ConstValue> {
    ints(args)?.into_iter().max().map(ConstValue::Int)
}
