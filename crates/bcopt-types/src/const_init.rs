use crate::ty::Type;
use crate::value::ConstValue;

/// Initializer of a class constant as recorded in the program.
///
/// The two markers are not abstract values and `ConstInit` deliberately has
/// no [`Lattice`](crate::Lattice) impl: merging a marker with a type is
/// meaningless. Consumers convert explicitly with [`ConstInit::to_type`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConstInit {
    /// A scalar known at compile time.
    Value(ConstValue),
    /// Readable without running any code, but its type is not tracked.
    ReadOnly,
    /// Computed on first access by running an initializer, which may throw.
    Dynamic,
}

impl ConstInit {
    pub fn value(&self) -> Option<&ConstValue> {
        match self {
            ConstInit::Value(v) => Some(v),
            ConstInit::ReadOnly | ConstInit::Dynamic => None,
        }
    }

    pub fn is_marker(&self) -> bool {
        !matches!(self, ConstInit::Value(_))
    }

    /// Whether reading the constant can run user code.
    pub fn may_run_initializer(&self) -> bool {
        matches!(self, ConstInit::Dynamic)
    }

    /// The type a read of this constant produces.
    pub fn to_type(&self) -> Type {
        match self {
            ConstInit::Value(v) => Type::from_const(v),
            ConstInit::ReadOnly | ConstInit::Dynamic => Type::init_cell(),
        }
    }
}

impl From<ConstValue> for ConstInit {
    fn from(value: ConstValue) -> Self {
        ConstInit::Value(value)
    }
}
