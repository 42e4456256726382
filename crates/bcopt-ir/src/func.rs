use std::sync::Arc;

use bcopt_types::{ConstValue, Type};
use bitflags::bitflags;

use crate::block::Block;
use crate::id::{BlockId, LocalId};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FuncAttrs: u8 {
        /// Implemented natively by the runtime.
        const BUILTIN = 1 << 0;
        /// Deterministic and side-effect free given constant arguments.
        const FOLDABLE = 1 << 1;
        /// Never throws when its arguments match the declared parameter types.
        const NO_THROW = 1 << 2;
        /// A static method; there is no `$this`.
        const STATIC = 1 << 3;
        /// May inspect or modify the caller's locals (`compact`, `extract`, ...).
        const READS_CALLER_FRAME = 1 << 4;
        const VARIADIC = 1 << 5;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Arc<str>,
    pub type_constraint: Option<Type>,
    /// Default value used when the argument is omitted.
    pub default: Option<ConstValue>,
    pub by_ref: bool,
}

impl Param {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Param {
            name: name.into(),
            type_constraint: None,
            default: None,
            by_ref: false,
        }
    }

    pub fn typed(mut self, ty: Type) -> Self {
        self.type_constraint = Some(ty);
        self
    }

    pub fn default_value(mut self, value: ConstValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }
}

/// A function or method body.
#[derive(Clone, Debug, PartialEq)]
pub struct Func {
    pub name: Arc<str>,
    pub params: Vec<Param>,
    pub num_locals: u32,
    pub num_cls_ref_slots: u32,
    /// Locals bound to function statics.
    pub static_locals: Vec<LocalId>,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    /// Owning class for methods.
    pub cls: Option<Arc<str>>,
    pub attrs: FuncAttrs,
    /// Declared return type; builtins rely on it.
    pub ret_type: Option<Type>,
}

#[bon::bon]
impl Func {
    #[builder(finish_fn = new)]
    pub fn new(
        /// Function name, or method name for methods.
        #[builder(into)]
        name: Arc<str>,
        #[builder(default)] params: Vec<Param>,
        /// Number of locals; never less than the parameter count.
        num_locals: Option<u32>,
        #[builder(default)] num_cls_ref_slots: u32,
        #[builder(default)] static_locals: Vec<LocalId>,
        #[builder(default)] blocks: Vec<Block>,
        entry: Option<BlockId>,
        #[builder(into)] cls: Option<Arc<str>>,
        #[builder(default = FuncAttrs::empty())] attrs: FuncAttrs,
        ret_type: Option<Type>,
    ) -> Self {
        let num_params = params.len() as u32;
        Func {
            name,
            params,
            num_locals: num_locals.unwrap_or(num_params).max(num_params),
            num_cls_ref_slots,
            static_locals,
            blocks,
            entry: entry.unwrap_or(BlockId::new(0)),
            cls,
            attrs,
            ret_type,
        }
    }
}

impl Func {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn is_param(&self, local: LocalId) -> bool {
        local.index() < self.params.len()
    }

    pub fn is_static_local(&self, local: LocalId) -> bool {
        self.static_locals.contains(&local)
    }

    pub fn is_builtin(&self) -> bool {
        self.attrs.contains(FuncAttrs::BUILTIN)
    }

    /// Whether calls have a `$this` receiver.
    pub fn has_this(&self) -> bool {
        self.cls.is_some() && !self.attrs.contains(FuncAttrs::STATIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let f = Func::builder()
            .name("f")
            .params(vec![Param::new("a"), Param::new("b")])
            .new();
        assert_eq!(f.num_locals, 2);
        assert_eq!(f.entry, BlockId::new(0));
        assert!(f.is_param(LocalId::new(1)));
        assert!(!f.is_param(LocalId::new(2)));
        assert!(!f.has_this());

        let m = Func::builder()
            .name("m")
            .cls("C")
            .num_locals(1)
            .attrs(FuncAttrs::STATIC)
            .new();
        assert!(!m.has_this());
        assert_eq!(m.num_locals, 1);
    }
}
