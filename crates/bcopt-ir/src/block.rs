use smallvec::SmallVec;

use crate::bytecode::Bytecode;
use crate::id::BlockId;

/// A straight-line instruction sequence. Control leaves only at the end,
/// through a branch, the fall-through edge, or an exception edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Bytecode>,
    /// Successor reached by falling off the end of the block.
    pub fallthrough: Option<BlockId>,
    /// Handlers that receive control when an instruction of this block throws.
    pub exn_exits: SmallVec<[BlockId; 2]>,
}

impl Block {
    pub fn new(id: u32, instrs: Vec<Bytecode>) -> Self {
        Block {
            id: BlockId::new(id),
            instrs,
            fallthrough: None,
            exn_exits: SmallVec::new(),
        }
    }

    /// Set the fall-through successor.
    pub fn fallthrough(mut self, target: u32) -> Self {
        self.fallthrough = Some(BlockId::new(target));
        self
    }

    /// Add an exception handler successor.
    pub fn exn_exit(mut self, target: u32) -> Self {
        self.exn_exits.push(BlockId::new(target));
        self
    }

    /// Successors under normal control flow: branch targets, then the
    /// fall-through block.
    pub fn normal_successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.instrs
            .iter()
            .flat_map(|op| op.targets())
            .chain(self.fallthrough)
    }

    /// All successors, exception edges included.
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.normal_successors()
            .chain(self.exn_exits.iter().copied())
    }
}
