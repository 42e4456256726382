use bcopt_ir::{ClassId, FuncId};

/// The function being analyzed, and its class for methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Context {
    pub func: FuncId,
    pub cls: Option<ClassId>,
}

impl Context {
    pub fn new(func: FuncId) -> Self {
        Context { func, cls: None }
    }

    pub fn with_class(mut self, cls: ClassId) -> Self {
        self.cls = Some(cls);
        self
    }
}
