//! Explicit tool registry
//!
//! Built once at startup from a set of [`ToolSchema`]s and handed to the
//! runner by reference. Construction is where configuration-level defects
//! (empty tool set, duplicate or malformed schemas) become fatal.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EvalError, Result, SchemaError};
use crate::schema::ToolSchema;

/// Mapping from tool name to its schema
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSchema>,
}

impl ToolRegistry {
    /// Build a registry, validating every schema
    pub fn new(schemas: impl IntoIterator<Item = ToolSchema>) -> Result<Self> {
        let mut tools = BTreeMap::new();
        for schema in schemas {
            schema.validate()?;
            if tools.contains_key(&schema.name) {
                return Err(SchemaError::DuplicateTool(schema.name).into());
            }
            tools.insert(schema.name.clone(), schema);
        }

        if tools.is_empty() {
            return Err(EvalError::Config("tool registry is empty".to_string()));
        }

        Ok(Self { tools })
    }

    /// Load a JSON array of tool schemas from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let schemas: Vec<ToolSchema> = serde_json::from_str(&content)?;
        Self::new(schemas)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.get(name)
    }

    /// Like [`get`](Self::get), but a missing tool is a schema error
    pub fn require(&self, name: &str) -> std::result::Result<&ToolSchema, SchemaError> {
        self.get(name).ok_or_else(|| SchemaError::UnknownTool(name.to_string()))
    }

    pub fn by_tier(&self, tier: u32) -> Vec<&ToolSchema> {
        self.tools.values().filter(|t| t.tier == tier).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSchema> {
        self.tools.values()
    }

    /// Clone the schemas for the given names, in the order given
    pub fn schemas_for<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> std::result::Result<Vec<ToolSchema>, SchemaError> {
        names.iter().map(|name| self.require(name.as_ref()).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
