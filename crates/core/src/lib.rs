pub mod config;

pub use config::{Config, DispatchMode, PostgresConfig, ServerConfig};
