use bcopt_ir::{Class, ClassId, Func, FuncId, LocalId, Program, ProgramError};
use bcopt_types::{ConstInit, HasBottom, Lattice, Type};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::context::Context;
use crate::options::Options;

/// A function found by name.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedFunc<'a> {
    pub id: FuncId,
    pub func: &'a Func,
}

/// Whole-program facts the interpreter queries.
///
/// The program is validated once on construction; afterwards every id it
/// hands out is assumed in range. Inferred return types and local-static
/// types start unknown and are refined by the driver between passes.
#[derive(Clone, Debug)]
pub struct Index {
    program: Program,
    funcs_by_name: FxHashMap<String, FuncId>,
    classes_by_name: FxHashMap<String, ClassId>,
    return_types: Vec<Option<Type>>,
    local_statics: FxHashMap<(FuncId, LocalId), Type>,
    options: Options,
}

impl Index {
    pub fn new(program: Program) -> Result<Self, ProgramError> {
        program.validate()?;
        let funcs_by_name = program
            .func_ids()
            .filter(|id| program.func(*id).cls.is_none())
            .map(|id| (program.func(id).name.to_ascii_lowercase(), id))
            .collect();
        let classes_by_name = program
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_ascii_lowercase(), ClassId::new(i as u32)))
            .collect();
        debug!(
            funcs = program.funcs.len(),
            classes = program.classes.len(),
            "built index"
        );
        Ok(Index {
            return_types: vec![None; program.funcs.len()],
            program,
            funcs_by_name,
            classes_by_name,
            local_statics: FxHashMap::default(),
            options: Options::default(),
        })
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn func(&self, id: FuncId) -> &Func {
        self.program.func(id)
    }

    pub fn class(&self, id: ClassId) -> &Class {
        self.program.class(id)
    }

    /// The analysis context for `func`, with its class resolved for methods.
    pub fn context(&self, func: FuncId) -> Context {
        let ctx = Context::new(func);
        match self.func(func).cls.as_deref().and_then(|c| self.resolve_class(c)) {
            Some(cls) => ctx.with_class(cls),
            None => ctx,
        }
    }

    /// Look up a free function. Names are case-insensitive.
    pub fn resolve_func(&self, name: &str) -> Option<ResolvedFunc<'_>> {
        let id = *self.funcs_by_name.get(&name.to_ascii_lowercase())?;
        Some(ResolvedFunc {
            id,
            func: self.func(id),
        })
    }

    /// Look up a class. Names are case-insensitive.
    pub fn resolve_class(&self, name: &str) -> Option<ClassId> {
        self.classes_by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Best known type of a call to `id`.
    pub fn lookup_return_type(&self, id: FuncId) -> Type {
        if let Some(inferred) = &self.return_types[id.index()] {
            return inferred.clone();
        }
        self.func(id).ret_type.clone().unwrap_or_else(Type::init_cell)
    }

    /// Find a class constant, searching parent classes.
    pub fn lookup_class_constant(&self, cls: ClassId, name: &str) -> Option<&ConstInit> {
        let mut current = Some(cls);
        // Bounded so that a malformed cyclic hierarchy cannot hang.
        for _ in 0..=self.program.classes.len() {
            let class = self.class(current?);
            if let Some(init) = class.constants.get(name) {
                return Some(init);
            }
            current = class.parent.as_deref().and_then(|p| self.resolve_class(p));
        }
        None
    }

    /// Type of a function static, `Bottom` until something is stored into it.
    pub fn lookup_local_static(&self, func: FuncId, local: LocalId) -> Type {
        self.local_statics
            .get(&(func, local))
            .cloned()
            .unwrap_or_else(Type::bottom)
    }

    /// Widen a local static to include `ty`. Returns whether it changed.
    pub fn refine_local_static(&mut self, func: FuncId, local: LocalId, ty: &Type) -> bool {
        let old = self.lookup_local_static(func, local);
        let new = old.join(ty);
        if new == old {
            return false;
        }
        debug!(func = %func, local = %local, old = %old, new = %new, "refined local static");
        self.local_statics.insert((func, local), new);
        true
    }

    /// Record the inferred return type of `func`. Returns whether it changed.
    pub fn refine_return_type(&mut self, func: FuncId, ty: Type) -> bool {
        let slot = &mut self.return_types[func.index()];
        if slot.as_ref() == Some(&ty) {
            return false;
        }
        debug!(func = %func, ty = %ty, "refined return type");
        *slot = Some(ty);
        true
    }
}
