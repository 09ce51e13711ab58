//! Language server configuration
//!
//! This module defines how a language server is launched: the command line,
//! the environment overlay, the working directory, and the opaque
//! initialization options forwarded in the `initialize` request. A
//! [`ServerRegistry`] maps server names to their configurations and loads
//! from a YAML file:
//!
//! ```yaml
//! servers:
//!   rust:
//!     command: rust-analyzer
//!   ts:
//!     command: typescript-language-server
//!     args: ["--stdio"]
//!     env:
//!       NODE_OPTIONS: "--max-old-space-size=4096"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LspLinkError, Result};

/// Launch configuration for one language server.
///
/// # Examples
///
/// ```
/// use lsplink::config::ServerConfig;
///
/// let config = ServerConfig::new("rust-analyzer");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The server executable.
    pub command: PathBuf,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables overlaid on the inherited parent environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the server process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Server-specific options forwarded verbatim in `initialize`.
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,
}

impl ServerConfig {
    /// Create a configuration that runs `command` with no arguments.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            initialization_options: None,
        }
    }

    /// Check the configuration for obvious mistakes.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::Config`] when the command is empty.
    pub fn validate(&self) -> Result<()> {
        if self.command.as_os_str().is_empty() {
            return Err(LspLinkError::Config("server command is empty".to_string()).into());
        }
        Ok(())
    }
}

/// Named server configurations, loadable from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerRegistry {
    /// Server configurations keyed by a user-chosen name.
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

impl ServerRegistry {
    /// Load and validate a registry from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::Io`] when the file cannot be read,
    /// [`LspLinkError::Yaml`] on malformed YAML, and
    /// [`LspLinkError::Config`] when an entry fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(LspLinkError::Io)?;
        let registry: ServerRegistry =
            serde_yaml::from_str(&raw).map_err(LspLinkError::Yaml)?;
        for (name, config) in &registry.servers {
            config
                .validate()
                .map_err(|e| LspLinkError::Config(format!("server '{name}': {e}")))?;
        }
        Ok(registry)
    }

    /// Look up a server configuration by name.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::Config`] when the name is unknown.
    pub fn get(&self, name: &str) -> Result<&ServerConfig> {
        self.servers
            .get(name)
            .ok_or_else(|| LspLinkError::Config(format!("unknown server: {name}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_file, temp_dir};

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::new("rust-analyzer");
        assert!(config.args.is_empty());
        assert!(config.env.is_empty());
        assert!(config.working_dir.is_none());
        assert!(config.initialization_options.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let config = ServerConfig::new("");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("command is empty"));
    }

    #[test]
    fn test_registry_load_minimal_yaml() {
        let dir = temp_dir();
        let path = create_test_file(
            &dir,
            "servers.yaml",
            "servers:\n  rust:\n    command: rust-analyzer\n",
        );

        let registry = ServerRegistry::load(&path).unwrap();
        let config = registry.get("rust").unwrap();
        assert_eq!(config.command, PathBuf::from("rust-analyzer"));
    }

    #[test]
    fn test_registry_load_full_entry() {
        let dir = temp_dir();
        let path = create_test_file(
            &dir,
            "servers.yaml",
            r#"
servers:
  ts:
    command: typescript-language-server
    args: ["--stdio"]
    env:
      NODE_OPTIONS: "--max-old-space-size=4096"
    working_dir: /work
    initialization_options:
      preferences:
        quotePreference: single
"#,
        );

        let registry = ServerRegistry::load(&path).unwrap();
        let config = registry.get("ts").unwrap();
        assert_eq!(config.args, vec!["--stdio"]);
        assert_eq!(config.env["NODE_OPTIONS"], "--max-old-space-size=4096");
        assert_eq!(config.working_dir, Some(PathBuf::from("/work")));
        assert_eq!(
            config.initialization_options.as_ref().unwrap()["preferences"]["quotePreference"],
            "single"
        );
    }

    #[test]
    fn test_registry_load_rejects_invalid_entry() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "servers.yaml", "servers:\n  bad:\n    command: \"\"\n");
        let err = ServerRegistry::load(&path).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = ServerRegistry::default();
        let err = registry.get("missing").unwrap_err();
        assert!(err.to_string().contains("unknown server"));
    }

    #[test]
    fn test_registry_load_missing_file() {
        let dir = temp_dir();
        let err = ServerRegistry::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("IO error"));
    }
}
