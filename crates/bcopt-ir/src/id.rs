/// Declare a dense `u32` index newtype.
macro_rules! identifier {
    ($(#[$attr:meta])* struct $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the raw index.
            pub const fn raw(self) -> u32 {
                self.0
            }

            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

identifier! {
    /// A local variable slot of a function. Parameter `i` is local `i`.
    struct LocalId
}

identifier! {
    /// A basic block, indexing [`Func::blocks`](crate::Func::blocks).
    struct BlockId
}

identifier! {
    /// A class-reference slot of a function frame.
    struct ClsRefSlotId
}

identifier! {
    /// A function in a [`Program`](crate::Program).
    struct FuncId
}

identifier! {
    /// A class in a [`Program`](crate::Program).
    struct ClassId
}
