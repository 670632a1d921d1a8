pub mod registry;
pub mod tool;
pub mod tools;

pub use registry::{RegistryError, ToolRegistry};
pub use tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};
pub use tools::{ExecuteSqlTool, GetSchemaTool, NaturalLanguageQueryTool, QueryDatabaseTool};
