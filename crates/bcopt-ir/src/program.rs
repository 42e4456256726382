use rustc_hash::FxHashSet;

use crate::class::Class;
use crate::error::ProgramError;
use crate::func::Func;
use crate::id::{BlockId, ClassId, FuncId};

/// All functions and classes under analysis.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub funcs: Vec<Func>,
    pub classes: Vec<Class>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(&mut self, func: Func) -> FuncId {
        self.funcs.push(func);
        FuncId::new(self.funcs.len() as u32 - 1)
    }

    pub fn add_class(&mut self, class: Class) -> ClassId {
        self.classes.push(class);
        ClassId::new(self.classes.len() as u32 - 1)
    }

    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn func_ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        (0..self.funcs.len() as u32).map(FuncId::new)
    }

    /// Check that every id referenced by the program is in range and that
    /// names are unique. Function and class names compare case-insensitively.
    pub fn validate(&self) -> Result<(), ProgramError> {
        let mut class_names = FxHashSet::default();
        for class in &self.classes {
            if !class_names.insert(class.name.to_ascii_lowercase()) {
                return Err(ProgramError::DuplicateClass(class.name.clone()));
            }
        }
        for class in &self.classes {
            if let Some(parent) = &class.parent {
                if !class_names.contains(&parent.to_ascii_lowercase()) {
                    return Err(ProgramError::UnknownParent {
                        class: class.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let mut func_names = FxHashSet::default();
        for func in &self.funcs {
            match &func.cls {
                Some(cls) => {
                    if !class_names.contains(&cls.to_ascii_lowercase()) {
                        return Err(ProgramError::UnknownClass {
                            func: func.name.clone(),
                            class: cls.clone(),
                        });
                    }
                }
                None => {
                    if !func_names.insert(func.name.to_ascii_lowercase()) {
                        return Err(ProgramError::DuplicateFunc(func.name.clone()));
                    }
                }
            }
            validate_func(func)?;
        }
        Ok(())
    }
}

fn validate_func(func: &Func) -> Result<(), ProgramError> {
    let num_blocks = func.blocks.len();
    if num_blocks == 0 {
        // Builtins and declarations have no body.
        return Ok(());
    }
    if func.entry.index() >= num_blocks {
        return Err(ProgramError::MissingEntry {
            func: func.name.clone(),
            entry: func.entry,
        });
    }
    let local_in_range = |local: crate::LocalId| local.raw() < func.num_locals;
    for local in &func.static_locals {
        if !local_in_range(*local) {
            return Err(ProgramError::BadLocal {
                func: func.name.clone(),
                local: *local,
                num_locals: func.num_locals,
            });
        }
    }
    for (pos, block) in func.blocks.iter().enumerate() {
        let expected = BlockId::new(pos as u32);
        if block.id != expected {
            return Err(ProgramError::MisnumberedBlock {
                func: func.name.clone(),
                expected,
                found: block.id,
            });
        }
        if let Some(target) = block.successors().find(|t| t.index() >= num_blocks) {
            return Err(ProgramError::BadBlockTarget {
                func: func.name.clone(),
                block: block.id,
                target,
            });
        }
        for op in &block.instrs {
            if let Some(local) = op.local().filter(|l| !local_in_range(*l)) {
                return Err(ProgramError::BadLocal {
                    func: func.name.clone(),
                    local,
                    num_locals: func.num_locals,
                });
            }
            if let Some(slot) = op.cls_ref_slot() {
                if slot.raw() >= func.num_cls_ref_slots {
                    return Err(ProgramError::BadClsRefSlot {
                        func: func.name.clone(),
                        slot,
                        num_slots: func.num_cls_ref_slots,
                    });
                }
            }
        }
    }
    Ok(())
}
