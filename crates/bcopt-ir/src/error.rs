use std::sync::Arc;

use crate::id::{BlockId, ClsRefSlotId, LocalId};

/// Structural problems found by [`Program::validate`](crate::Program::validate).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgramError {
    #[error("duplicate function '{0}'")]
    DuplicateFunc(Arc<str>),
    #[error("duplicate class '{0}'")]
    DuplicateClass(Arc<str>),
    #[error("class '{class}' extends unknown class '{parent}'")]
    UnknownParent { class: Arc<str>, parent: Arc<str> },
    #[error("method '{func}' belongs to unknown class '{class}'")]
    UnknownClass { func: Arc<str>, class: Arc<str> },
    #[error("function '{func}' has no entry block {entry}")]
    MissingEntry { func: Arc<str>, entry: BlockId },
    #[error("function '{func}': block {found} stored at position {expected}")]
    MisnumberedBlock {
        func: Arc<str>,
        expected: BlockId,
        found: BlockId,
    },
    #[error("function '{func}': block {block} references missing block {target}")]
    BadBlockTarget {
        func: Arc<str>,
        block: BlockId,
        target: BlockId,
    },
    #[error("function '{func}': local {local} out of range ({num_locals} locals)")]
    BadLocal {
        func: Arc<str>,
        local: LocalId,
        num_locals: u32,
    },
    #[error("function '{func}': class-ref slot {slot} out of range ({num_slots} slots)")]
    BadClsRefSlot {
        func: Arc<str>,
        slot: ClsRefSlotId,
        num_slots: u32,
    },
}
