use std::sync::Arc;

use bcopt_types::ConstInit;
use indexmap::IndexMap;

#[derive(Clone, Debug, PartialEq)]
pub struct Class {
    pub name: Arc<str>,
    pub parent: Option<Arc<str>>,
    pub constants: IndexMap<Arc<str>, ConstInit>,
}

impl Class {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Class {
            name: name.into(),
            parent: None,
            constants: IndexMap::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<Arc<str>>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn constant(mut self, name: impl Into<Arc<str>>, init: impl Into<ConstInit>) -> Self {
        self.constants.insert(name.into(), init.into());
        self
    }
}
