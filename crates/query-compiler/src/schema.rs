//! Attribute registry: the keyword → integer id lookup supplied by the
//! environment. Read-only during compilation.

use internment::Intern;
use query_parser::Symbol;
use query_plan::Aid;
use std::collections::HashMap;

use crate::error::CompileError;

/// Maps attribute keywords to their schema ids.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    ids: HashMap<Symbol, Aid>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: Aid) {
        self.ids.insert(Intern::new(name.to_string()), id);
    }

    /// Total over the schema; unknown attributes are a compile error.
    pub fn resolve(&self, attribute: Symbol) -> Result<Aid, CompileError> {
        self.ids
            .get(&attribute)
            .copied()
            .ok_or(CompileError::UnknownAttribute { attribute })
    }
}
