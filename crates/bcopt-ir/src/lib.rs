mod block;
mod bytecode;
mod class;
mod error;
mod func;
mod id;
mod program;

pub use block::Block;
pub use bytecode::{Bytecode, IncDecOp};
pub use class::Class;
pub use error::ProgramError;
pub use func::{Func, FuncAttrs, Param};
pub use id::{BlockId, ClassId, ClsRefSlotId, FuncId, LocalId};
pub use program::Program;
