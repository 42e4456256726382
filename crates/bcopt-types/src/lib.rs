//! Abstract value domain for the bytecode interpreter.
//!
//! [`Type`] over-approximates the set of runtime values a local, stack slot
//! or return may hold. [`ConstValue`] is the concrete side used by constant
//! folding, and [`ConstInit`] describes class-constant initializers,
//! including the two sentinel markers that live outside the lattice.

mod const_init;
mod lattice;
mod ty;
mod value;

pub use const_init::ConstInit;
pub use lattice::{FiniteLattice, HasBottom, HasTop, Lattice};
pub use ty::{ClassSpec, Type, TypeBits};
pub use value::{ConstValue, NUMERIC_WHITESPACE};
