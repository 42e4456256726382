//! Assertion helpers for lattice algebraic laws.
//!
//! Every law is checked over all pairs/triples of the given sample elements
//! and all violations are reported in one panic message.
//!
//! ```
//! use bcopt_test_utils::lattice::assert_finite_lattice_laws;
//! use bcopt_types::Type;
//!
//! assert_finite_lattice_laws(&[Type::int(), Type::int_val(1), Type::init_null()]);
//! ```

use bcopt_types::{HasBottom, HasTop, Lattice};
use std::fmt::{Debug, Write};

fn report(violations: Vec<String>) {
    if violations.is_empty() {
        return;
    }
    let mut msg = format!("{} lattice law violation(s):\n", violations.len());
    for (i, v) in violations.iter().enumerate() {
        let _ = writeln!(msg, "  {}. {}", i + 1, v);
    }
    panic!("{msg}");
}

/// Join and meet are commutative, associative and idempotent, absorb each
/// other, and agree with `is_subseteq`.
pub fn assert_lattice_laws<L: Lattice + PartialEq + Debug>(elements: &[L]) {
    let mut v = Vec::new();
    check_lattice(elements, &mut v);
    report(v);
}

/// [`assert_lattice_laws`] plus the bottom and top element laws. Bottom and
/// top are added to the sample set automatically.
pub fn assert_finite_lattice_laws<L: HasBottom + HasTop + PartialEq + Debug>(elements: &[L]) {
    let mut all: Vec<L> = Vec::with_capacity(elements.len() + 2);
    all.push(L::bottom());
    all.push(L::top());
    for e in elements {
        all.push(e.join(e));
    }
    let mut v = Vec::new();
    check_lattice(&all, &mut v);
    check_bounds(&all, &mut v);
    report(v);
}

type BinOp<L> = fn(&L, &L) -> L;

fn check_lattice<L: Lattice + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    let ops: [(&str, BinOp<L>); 2] = [("join", L::join), ("meet", L::meet)];
    for (name, op) in ops {
        for a in elements {
            if op(a, a) != *a {
                v.push(format!("{name} not idempotent on {a:?}"));
            }
            for b in elements {
                if op(a, b) != op(b, a) {
                    v.push(format!("{name} not commutative on {a:?}, {b:?}"));
                }
                for c in elements {
                    if op(&op(a, b), c) != op(a, &op(b, c)) {
                        v.push(format!("{name} not associative on {a:?}, {b:?}, {c:?}"));
                    }
                }
            }
        }
    }
    for a in elements {
        for b in elements {
            if a.join(&a.meet(b)) != *a || a.meet(&a.join(b)) != *a {
                v.push(format!("absorption violated on {a:?}, {b:?}"));
            }
            let sub = a.is_subseteq(b);
            if sub != (a.join(b) == *b) {
                v.push(format!("{a:?} <= {b:?} is {sub}, inconsistent with join"));
            }
            if sub != (a.meet(b) == *a) {
                v.push(format!("{a:?} <= {b:?} is {sub}, inconsistent with meet"));
            }
        }
    }
}

fn check_bounds<L: HasBottom + HasTop + PartialEq + Debug>(elements: &[L], v: &mut Vec<String>) {
    let bot = L::bottom();
    let top = L::top();
    for x in elements {
        if !bot.is_subseteq(x) || bot.join(x) != *x || bot.meet(x) != bot {
            v.push(format!("bottom laws violated against {x:?}"));
        }
        if !x.is_subseteq(&top) || top.join(x) != top || top.meet(x) != *x {
            v.push(format!("top laws violated against {x:?}"));
        }
    }
}
