use crate::tool::{Tool, ToolDefinition};
use crate::tools::{ExecuteSqlTool, GetSchemaTool, NaturalLanguageQueryTool, QueryDatabaseTool};
use std::collections::HashMap;
use std::sync::Arc;

/// Manages available tools, their schemas, and lookup.
/// Thread-safe via Arc wrapping of individual tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry holding every SQL tool the bridge exposes.
    pub fn with_builtin_tools() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(QueryDatabaseTool)?;
        registry.register(ExecuteSqlTool)?;
        registry.register(GetSchemaTool)?;
        registry.register(NaturalLanguageQueryTool)?;
        Ok(registry)
    }

    /// Register a tool. Returns error if name already registered.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        let def = tool.definition();
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        self.tools.insert(def.name, Arc::new(tool));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool definitions, sorted by name.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(GetSchemaTool).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("get_schema").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(GetSchemaTool).unwrap();
        assert!(registry.register(GetSchemaTool).is_err());
    }

    #[test]
    fn test_builtin_tools_sorted() {
        let registry = ToolRegistry::with_builtin_tools().unwrap();
        let names: Vec<String> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "execute_sql",
                "get_schema",
                "natural_language_query",
                "query_database",
            ]
        );
    }

    #[test]
    fn test_builtin_schemas_are_objects() {
        let registry = ToolRegistry::with_builtin_tools().unwrap();
        for def in registry.list() {
            assert_eq!(def.input_schema["type"], "object", "tool {}", def.name);
            assert!(!def.description.is_empty());
        }
    }
}
