//! MCP Server Configuration
//!
//! Provides configuration structures for MCP server connections including:
//! - The subprocess / stream transport union bound to each session
//! - Validation of raw entries (exactly one of `command` or `url`)
//! - Servers file loading from TOML or JSON (`mcpServers` layout)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("server config must contain 'command' or 'url'")]
    MissingEndpoint,

    #[error("server config must contain only one of 'command' ({command}) or 'url' ({url})")]
    AmbiguousEndpoint { command: String, url: String },

    #[error("'{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Transport selection for one server.
///
/// Built through [`ServerConfig::subprocess`] / [`ServerConfig::stream`] or
/// deserialized from a [`RawServerConfig`]; both paths reject entries that
/// name neither or both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawServerConfig", into = "RawServerConfig")]
pub enum ServerConfig {
    /// Child process speaking the protocol over stdin/stdout
    Subprocess {
        /// Command to execute
        command: String,
        /// Command arguments
        args: Vec<String>,
        /// Environment variables (`None` inherits the parent environment only)
        env: Option<HashMap<String, String>>,
    },
    /// Streamable HTTP endpoint
    Stream {
        /// Endpoint URL
        url: String,
        /// Transport-specific extras (e.g. `auth_token`)
        params: Map<String, Value>,
    },
}

impl ServerConfig {
    /// Create a new subprocess server configuration
    pub fn subprocess(command: impl Into<String>) -> Self {
        Self::Subprocess {
            command: command.into(),
            args: Vec::new(),
            env: None,
        }
    }

    /// Create a new stream server configuration
    pub fn stream(url: impl Into<String>) -> Self {
        Self::Stream {
            url: url.into(),
            params: Map::new(),
        }
    }

    /// Set command arguments (subprocess only)
    pub fn with_args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Self::Subprocess { ref mut args, .. } = self {
            *args = new_args.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Add an environment variable (subprocess only)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Subprocess { ref mut env, .. } = self {
            env.get_or_insert_with(HashMap::new)
                .insert(key.into(), value.into());
        }
        self
    }

    /// Add a transport parameter (stream only)
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Stream { ref mut params, .. } = self {
            params.insert(key.into(), value.into());
        }
        self
    }

    /// Check if this is a subprocess transport
    pub fn is_subprocess(&self) -> bool {
        matches!(self, Self::Subprocess { .. })
    }

    /// Check if this is a stream transport
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }

    /// String-valued stream parameter, if present.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        match self {
            Self::Stream { params, .. } => params.get(key).and_then(Value::as_str),
            Self::Subprocess { .. } => None,
        }
    }

    /// Short human-readable endpoint description for logs.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Subprocess { command, args, .. } if args.is_empty() => command.clone(),
            Self::Subprocess { command, args, .. } => format!("{} {}", command, args.join(" ")),
            Self::Stream { url, .. } => url.clone(),
        }
    }
}

/// Server entry exactly as written in a config file.
///
/// Keys other than `command`, `args`, `env` and `url` are collected into
/// `params` and handed to the stream transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServerConfig) -> Result<Self, Self::Error> {
        match (raw.command, raw.url) {
            (Some(command), Some(url)) => Err(ConfigError::AmbiguousEndpoint { command, url }),
            (None, None) => Err(ConfigError::MissingEndpoint),
            (Some(command), None) => {
                if command.trim().is_empty() {
                    return Err(ConfigError::EmptyField("command"));
                }
                if !raw.params.is_empty() {
                    tracing::debug!(
                        command = %command,
                        keys = ?raw.params.keys().collect::<Vec<_>>(),
                        "ignoring extra keys on subprocess server config"
                    );
                }
                Ok(Self::Subprocess {
                    command,
                    args: raw.args,
                    env: raw.env,
                })
            }
            (None, Some(url)) => {
                if url.trim().is_empty() {
                    return Err(ConfigError::EmptyField("url"));
                }
                if !raw.args.is_empty() || raw.env.is_some() {
                    tracing::debug!(
                        url = %url,
                        args = raw.args.len(),
                        env = raw.env.as_ref().map_or(0, HashMap::len),
                        "ignoring args and env on stream server config"
                    );
                }
                Ok(Self::Stream {
                    url,
                    params: raw.params,
                })
            }
        }
    }
}

impl From<ServerConfig> for RawServerConfig {
    fn from(config: ServerConfig) -> Self {
        match config {
            ServerConfig::Subprocess { command, args, env } => Self {
                command: Some(command),
                args,
                env,
                ..Self::default()
            },
            ServerConfig::Stream { url, params } => Self {
                url: Some(url),
                params,
                ..Self::default()
            },
        }
    }
}

/// A file of named server entries.
///
/// Accepts the common `{"mcpServers": {...}}` JSON layout as well as a TOML
/// `[servers.<name>]` table. Entry order is preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersFile {
    #[serde(rename = "mcpServers", alias = "servers", default)]
    pub servers: IndexMap<String, ServerConfig>,
}

impl ServersFile {
    /// Load with fallback chain:
    /// 1. Explicit path, if given
    /// 2. Project-local ./.bemcp/servers.toml
    /// 3. User config ~/.config/bemcp/servers.toml
    /// 4. Empty
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let candidates = [Self::project_config_path(), Self::user_config_path()];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                let file = Self::load_from_file(&path)?;
                tracing::info!("Loaded servers from {:?}", path);
                return Ok(file);
            }
        }

        tracing::debug!("No servers file found, starting empty");
        Ok(Self::default())
    }

    /// Load from a specific file; `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
        .map_err(|e| match e {
            ConfigError::ParseError(msg) => {
                ConfigError::ParseError(format!("Failed to parse {}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse a JSON servers document.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse a TOML servers document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Get the project-local path (./.bemcp/servers.toml)
    pub fn project_config_path() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .map(|dir| dir.join(".bemcp").join("servers.toml"))
    }

    /// Get the user config path (~/.config/bemcp/servers.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bemcp").join("servers.toml"))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_subprocess_config() {
        let config = ServerConfig::subprocess("run-server")
            .with_args(["serve"])
            .with_env("LOG", "debug");

        assert!(config.is_subprocess());
        assert_eq!(config.endpoint(), "run-server serve");

        if let ServerConfig::Subprocess { command, args, env } = &config {
            assert_eq!(command, "run-server");
            assert_eq!(args, &vec!["serve".to_string()]);
            assert_eq!(env.as_ref().unwrap().get("LOG").unwrap(), "debug");
        }
    }

    #[test]
    fn test_stream_config() {
        let config = ServerConfig::stream("https://gitmcp.io/owner/repo")
            .with_param("auth_token", "secret-token")
            .with_args(["ignored"]);

        assert!(config.is_stream());
        assert_eq!(config.param_str("auth_token"), Some("secret-token"));
        assert_eq!(config.endpoint(), "https://gitmcp.io/owner/repo");
    }

    #[test]
    fn test_neither_endpoint_is_rejected() {
        let raw = RawServerConfig {
            args: vec!["serve".into()],
            ..RawServerConfig::default()
        };
        assert_eq!(ServerConfig::try_from(raw), Err(ConfigError::MissingEndpoint));
    }

    #[test]
    fn test_both_endpoints_are_rejected() {
        let raw = RawServerConfig {
            command: Some("uv".into()),
            url: Some("http://localhost:8000/mcp".into()),
            ..RawServerConfig::default()
        };
        assert!(matches!(
            ServerConfig::try_from(raw),
            Err(ConfigError::AmbiguousEndpoint { .. })
        ));
    }

    #[test]
    fn test_stream_entry_drops_subprocess_keys() {
        let raw = RawServerConfig {
            url: Some("http://localhost:8000/mcp".into()),
            args: vec!["serve".into()],
            env: Some(HashMap::from([("LOG".to_string(), "debug".to_string())])),
            ..RawServerConfig::default()
        };

        let config = ServerConfig::try_from(raw).unwrap();

        assert_eq!(config, ServerConfig::stream("http://localhost:8000/mcp"));
        assert_eq!(config.param_str("args"), None);
    }

    #[test]
    fn test_blank_command_is_rejected() {
        let raw = RawServerConfig {
            command: Some("  ".into()),
            ..RawServerConfig::default()
        };
        assert_eq!(
            ServerConfig::try_from(raw),
            Err(ConfigError::EmptyField("command"))
        );
    }

    #[test]
    fn test_json_servers_file() {
        let json = r#"{
            "mcpServers": {
                "test-mcp": { "command": "uv", "args": ["run", "server.py"], "env": null },
                "docs": { "url": "https://gitmcp.io/owner/repo", "auth_token": "t0k" }
            }
        }"#;

        let file = ServersFile::from_json_str(json).unwrap();
        assert_eq!(file.len(), 2);

        let names: Vec<&String> = file.servers.keys().collect();
        assert_eq!(names, vec!["test-mcp", "docs"]);

        assert_eq!(
            file.servers["test-mcp"],
            ServerConfig::subprocess("uv").with_args(["run", "server.py"])
        );
        assert_eq!(file.servers["docs"].param_str("auth_token"), Some("t0k"));
    }

    #[test]
    fn test_toml_servers_file() {
        let toml = r#"
            [servers.git]
            command = "uvx"
            args = ["mcp-server-git"]

            [servers.git.env]
            GIT_DIR = "/tmp/repo"

            [servers.remote]
            url = "http://localhost:8000/mcp"
        "#;

        let file = ServersFile::from_toml_str(toml).unwrap();
        assert_eq!(file.len(), 2);
        assert!(file.servers["git"].is_subprocess());
        assert!(file.servers["remote"].is_stream());
    }

    #[test]
    fn test_invalid_entry_fails_whole_file() {
        let json = r#"{ "mcpServers": { "broken": { "args": ["x"] } } }"#;
        let err = ServersFile::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("'command' or 'url'"));
    }

    #[test]
    fn test_load_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, r#"{{"mcpServers": {{"echo": {{"command": "echo"}}}}}}"#).unwrap();

        let file = ServersFile::load(Some(&path)).unwrap();
        assert_eq!(file.servers["echo"], ServerConfig::subprocess("echo"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ServersFile::load_from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = ServerConfig::subprocess("echo").with_args(["hello"]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"command\":\"echo\""));
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
