use std::fmt;
use std::sync::Arc;

use bcopt_types::{ConstValue, Type};
use smallvec::{SmallVec, smallvec};

use crate::id::{BlockId, ClsRefSlotId, LocalId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncDecOp {
    PreInc,
    PostInc,
    PreDec,
    PostDec,
}

impl IncDecOp {
    pub fn is_inc(self) -> bool {
        matches!(self, IncDecOp::PreInc | IncDecOp::PostInc)
    }

    pub fn is_pre(self) -> bool {
        matches!(self, IncDecOp::PreInc | IncDecOp::PreDec)
    }
}

/// One stack-machine instruction.
///
/// Call arguments are pushed left to right before the call, so the last
/// argument is on top of the stack.
#[derive(Clone, Debug, PartialEq)]
pub enum Bytecode {
    Nop,
    PopC,
    Dup,

    Null,
    True,
    False,
    Int(i64),
    Double(f64),
    String(Arc<str>),

    CGetL(LocalId),
    /// Like `CGetL` but never raises on an uninitialized local.
    CGetQuietL(LocalId),
    SetL(LocalId),
    PopL(LocalId),
    UnsetL(LocalId),
    IssetL(LocalId),
    IncDecL(LocalId, IncDecOp),
    /// Assert that a local has the given type.
    AssertRATL(LocalId, Type),

    Add,
    Sub,
    Mul,
    Concat,
    Not,
    Same,
    NSame,

    Jmp(BlockId),
    JmpZ(BlockId),
    JmpNZ(BlockId),
    RetC,
    Throw,
    Fatal(Arc<str>),

    This,
    BareThis,

    /// Pop a class name and load the class into a class-ref slot.
    ClsRefGetC(ClsRefSlotId),
    /// Read a class constant through a class-ref slot, consuming the slot.
    ClsCns {
        name: Arc<str>,
        slot: ClsRefSlotId,
    },
    ClsCnsD {
        name: Arc<str>,
        class: Arc<str>,
    },

    /// Bind a local to its static and push whether the static is initialized.
    StaticLocCheck(LocalId),
    /// Pop an initial value, store it into the static, and bind the local.
    StaticLocInit(LocalId),

    FCallD {
        nargs: u32,
        func: Arc<str>,
        unpack: bool,
    },
    FCallBuiltin {
        nargs: u32,
        func: Arc<str>,
    },
}

impl Bytecode {
    /// The instruction that pushes `value`.
    pub fn from_const(value: &ConstValue) -> Self {
        match value {
            ConstValue::Null => Bytecode::Null,
            ConstValue::Bool(true) => Bytecode::True,
            ConstValue::Bool(false) => Bytecode::False,
            ConstValue::Int(i) => Bytecode::Int(*i),
            ConstValue::Dbl(d) => Bytecode::Double(*d),
            ConstValue::Str(s) => Bytecode::String(s.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Bytecode::Nop => "Nop",
            Bytecode::PopC => "PopC",
            Bytecode::Dup => "Dup",
            Bytecode::Null => "Null",
            Bytecode::True => "True",
            Bytecode::False => "False",
            Bytecode::Int(_) => "Int",
            Bytecode::Double(_) => "Double",
            Bytecode::String(_) => "String",
            Bytecode::CGetL(_) => "CGetL",
            Bytecode::CGetQuietL(_) => "CGetQuietL",
            Bytecode::SetL(_) => "SetL",
            Bytecode::PopL(_) => "PopL",
            Bytecode::UnsetL(_) => "UnsetL",
            Bytecode::IssetL(_) => "IssetL",
            Bytecode::IncDecL(..) => "IncDecL",
            Bytecode::AssertRATL(..) => "AssertRATL",
            Bytecode::Add => "Add",
            Bytecode::Sub => "Sub",
            Bytecode::Mul => "Mul",
            Bytecode::Concat => "Concat",
            Bytecode::Not => "Not",
            Bytecode::Same => "Same",
            Bytecode::NSame => "NSame",
            Bytecode::Jmp(_) => "Jmp",
            Bytecode::JmpZ(_) => "JmpZ",
            Bytecode::JmpNZ(_) => "JmpNZ",
            Bytecode::RetC => "RetC",
            Bytecode::Throw => "Throw",
            Bytecode::Fatal(_) => "Fatal",
            Bytecode::This => "This",
            Bytecode::BareThis => "BareThis",
            Bytecode::ClsRefGetC(_) => "ClsRefGetC",
            Bytecode::ClsCns { .. } => "ClsCns",
            Bytecode::ClsCnsD { .. } => "ClsCnsD",
            Bytecode::StaticLocCheck(_) => "StaticLocCheck",
            Bytecode::StaticLocInit(_) => "StaticLocInit",
            Bytecode::FCallD { .. } => "FCallD",
            Bytecode::FCallBuiltin { .. } => "FCallBuiltin",
        }
    }

    /// Explicit branch targets of this instruction.
    pub fn targets(&self) -> SmallVec<[BlockId; 1]> {
        match self {
            Bytecode::Jmp(b) | Bytecode::JmpZ(b) | Bytecode::JmpNZ(b) => smallvec![*b],
            _ => SmallVec::new(),
        }
    }

    /// The local operand, if any.
    pub fn local(&self) -> Option<LocalId> {
        match self {
            Bytecode::CGetL(l)
            | Bytecode::CGetQuietL(l)
            | Bytecode::SetL(l)
            | Bytecode::PopL(l)
            | Bytecode::UnsetL(l)
            | Bytecode::IssetL(l)
            | Bytecode::IncDecL(l, _)
            | Bytecode::AssertRATL(l, _)
            | Bytecode::StaticLocCheck(l)
            | Bytecode::StaticLocInit(l) => Some(*l),
            _ => None,
        }
    }

    pub fn cls_ref_slot(&self) -> Option<ClsRefSlotId> {
        match self {
            Bytecode::ClsRefGetC(s) | Bytecode::ClsCns { slot: s, .. } => Some(*s),
            _ => None,
        }
    }

    /// Whether control never reaches the next instruction.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Bytecode::Jmp(_) | Bytecode::RetC | Bytecode::Throw | Bytecode::Fatal(_)
        )
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Bytecode::Int(i) => write!(f, " {i}"),
            Bytecode::Double(d) => write!(f, " {d:?}"),
            Bytecode::String(s) | Bytecode::Fatal(s) => write!(f, " \"{}\"", s.escape_debug()),
            Bytecode::IncDecL(l, op) => write!(f, " L:{l} {op:?}"),
            Bytecode::AssertRATL(l, t) => write!(f, " L:{l} {t}"),
            Bytecode::Jmp(b) | Bytecode::JmpZ(b) | Bytecode::JmpNZ(b) => write!(f, " B{b}"),
            Bytecode::ClsRefGetC(s) => write!(f, " S:{s}"),
            Bytecode::ClsCns { name, slot } => write!(f, " \"{name}\" S:{slot}"),
            Bytecode::ClsCnsD { name, class } => write!(f, " \"{name}\" \"{class}\""),
            Bytecode::FCallD { nargs, func, unpack } => {
                write!(f, " {nargs} \"{func}\"")?;
                if *unpack {
                    f.write_str(" unpack")?;
                }
                Ok(())
            }
            Bytecode::FCallBuiltin { nargs, func } => write!(f, " {nargs} \"{func}\""),
            other => match other.local() {
                Some(l) => write!(f, " L:{l}"),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Bytecode::CGetL(LocalId::new(2)).to_string(), "CGetL L:2");
        assert_eq!(
            Bytecode::FCallD {
                nargs: 1,
                func: Arc::from("strlen"),
                unpack: false
            }
            .to_string(),
            "FCallD 1 \"strlen\""
        );
        assert_eq!(Bytecode::JmpZ(BlockId::new(3)).to_string(), "JmpZ B3");
        assert_eq!(Bytecode::RetC.to_string(), "RetC");
    }

    #[test]
    fn const_pushes() {
        assert_eq!(Bytecode::from_const(&ConstValue::Int(3)), Bytecode::Int(3));
        assert_eq!(
            Bytecode::from_const(&ConstValue::Bool(false)),
            Bytecode::False
        );
    }
}
