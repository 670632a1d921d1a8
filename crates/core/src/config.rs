use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Source of raw configuration values, keyed by variable name.
///
/// `Config::from_env` uses the process environment; tests pass a closure
/// over a fixed map so they never touch global state.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> EnvSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Reads from the process environment.
struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// Profiled lookups: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
struct Lookup<'a> {
    profile: &'a str,
    source: &'a dyn EnvSource,
}

impl Lookup<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = self.source.get(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        self.source.get(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.opt(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key = %key, value = %raw, "Unparseable config value, using default");
                default
            }),
            None => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PGBRIDGE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        Self::from_source(&ProcessEnv)
    }

    /// Build config from an arbitrary key/value source.
    pub fn from_source(source: &dyn EnvSource) -> Self {
        let profile = source
            .get("PGBRIDGE_PROFILE")
            .unwrap_or_default()
            .to_uppercase();
        let lookup = Lookup {
            profile: &profile,
            source,
        };
        let postgres = PostgresConfig::from_lookup(&lookup);
        let server = ServerConfig::from_lookup(&lookup, postgres.max_connections);
        Self {
            profile,
            postgres,
            server,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  postgres:    {}, pool={}..{}",
            self.postgres.connection_label(),
            self.postgres.min_connections,
            self.postgres.max_connections
        );
        tracing::info!(
            "  server:      name={}, mode={}, max_in_flight={}",
            self.server.name,
            self.server.mode,
            self.server.max_in_flight
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_lookup(env: &Lookup<'_>) -> Self {
        let max_connections = env.parse("POSTGRES_MAX_CONNECTIONS", 10u32).max(1);
        Self {
            host: env.or("POSTGRES_HOST", "localhost"),
            port: env.parse("POSTGRES_PORT", 5432),
            database: env.or("POSTGRES_DB", "NYC"),
            username: env.or("POSTGRES_USER", "user"),
            password: env.or("POSTGRES_PASSWORD", "password"),
            ssl_mode: env.or("POSTGRES_SSL_MODE", "prefer"),
            min_connections: env.parse("POSTGRES_MIN_CONNECTIONS", 1u32).min(max_connections),
            max_connections,
        }
    }

    /// `user@host:port/db` with the password left out.
    pub fn connection_label(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ssl_mode", &self.ssl_mode)
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

// ── Server ────────────────────────────────────────────────────

/// How the request loop schedules work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each request is fully handled before the next line is read.
    #[default]
    Serialized,
    /// Requests run on their own tasks, bounded by `max_in_flight`.
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serialized" | "serial" | "sequential" => Ok(Self::Serialized),
            "concurrent" | "parallel" => Ok(Self::Concurrent),
            other => Err(format!(
                "unknown dispatch mode '{other}', expected 'serialized' or 'concurrent'"
            )),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialized => f.write_str("serialized"),
            Self::Concurrent => f.write_str("concurrent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`.
    pub name: String,
    pub mode: DispatchMode,
    /// Upper bound on requests handled at once in concurrent mode.
    pub max_in_flight: usize,
}

impl ServerConfig {
    fn from_lookup(env: &Lookup<'_>, pool_size: u32) -> Self {
        Self {
            name: env.or("PGBRIDGE_SERVER_NAME", "postgres-query-server"),
            mode: env.parse("PGBRIDGE_MODE", DispatchMode::Serialized),
            max_in_flight: env.parse("PGBRIDGE_MAX_IN_FLIGHT", pool_size as usize).max(1),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "postgres-query-server".to_string(),
            mode: DispatchMode::Serialized,
            max_in_flight: 10,
        }
    }
}
