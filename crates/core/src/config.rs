//! TOML-based configuration for dirlookup.
//!
//! The bind password is never stored in the file: `bind_password_env` names an
//! environment variable whose value is resolved at runtime via
//! [`AppConfig::resolve_env_vars`]. The resolved file settings are turned into
//! an immutable [`SessionConfig`] for the directory session.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

/// Default port for cleartext LDAP.
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// Default port for LDAP over TLS.
pub const DEFAULT_LDAPS_PORT: u16 = 636;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory server connection settings.
    pub directory: DirectoryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Directory server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Hostname or IP address of the directory server.
    pub host: String,

    /// Base DN used for searches when no override is given.
    pub base_dn: String,

    /// Identity used for the simple bind (a DN or `DOMAIN\user`).
    pub bind_identity: String,

    /// Environment variable holding the bind password.
    pub bind_password_env: String,

    /// Server port. Promoted to 636 when `use_tls` is set and this is left at 389.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect with `ldaps://` instead of `ldap://`.
    #[serde(default)]
    pub use_tls: bool,

    /// Seconds to wait for the TCP/TLS connection to establish.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Resolved bind password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_LDAP_PORT
}
fn default_connect_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does **not** fail; building a
    /// [`SessionConfig`] later reports it.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        self.directory.bind_password = resolve_optional_env(
            &self.directory.bind_password_env,
            "directory.bind_password_env",
        );

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dir = &self.directory;
        for (field, value) in [
            ("directory.host", &dir.host),
            ("directory.base_dn", &dir.base_dn),
            ("directory.bind_identity", &dir.bind_identity),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "must not be empty".into(),
                });
            }
        }
        if dir.host.contains("://") {
            return Err(ConfigError::InvalidValue {
                field: "directory.host".into(),
                detail: "expected a bare hostname, not a URL; use `use_tls` to select ldaps".into(),
            });
        }
        if dir.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "directory.port".into(),
                detail: "port must be > 0".into(),
            });
        }
        if dir.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "directory.connect_timeout_secs".into(),
                detail: "connect timeout must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Default config location: `<user config dir>/dirlookup/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dirlookup")
            .join("config.toml")
    }
}

impl DirectoryConfig {
    /// The port a session built from these settings will use.
    pub fn effective_port(&self) -> u16 {
        effective_port(self.port, self.use_tls)
    }

    /// Build the session settings. Fails if the bind password was not resolved.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let password = self
            .bind_password
            .clone()
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: self.bind_password_env.clone(),
                field: "directory.bind_password_env".into(),
            })?;

        Ok(SessionConfig::new(
            &self.host,
            &self.base_dn,
            &self.bind_identity,
            BindCredential::new(password),
        )
        .with_port(self.port)
        .with_encrypted_transport(self.use_tls))
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Session settings
// ---------------------------------------------------------------------------

fn effective_port(port: u16, encrypted: bool) -> u16 {
    if encrypted && port == DEFAULT_LDAP_PORT {
        DEFAULT_LDAPS_PORT
    } else {
        port
    }
}

/// Secret bind password. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct BindCredential(String);

impl BindCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for handing to the transport.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BindCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BindCredential(***)")
    }
}

/// Immutable settings for one directory session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    host: String,
    base_dn: String,
    bind_identity: String,
    bind_credential: BindCredential,
    port: u16,
    use_encrypted_transport: bool,
}

impl SessionConfig {
    /// Settings for a cleartext session on port 389.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_identity: impl Into<String>,
        bind_credential: BindCredential,
    ) -> Self {
        Self {
            host: host.into(),
            base_dn: base_dn.into(),
            bind_identity: bind_identity.into(),
            bind_credential,
            port: DEFAULT_LDAP_PORT,
            use_encrypted_transport: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_encrypted_transport(mut self, enabled: bool) -> Self {
        self.use_encrypted_transport = enabled;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    pub fn bind_identity(&self) -> &str {
        &self.bind_identity
    }

    pub fn bind_credential(&self) -> &BindCredential {
        &self.bind_credential
    }

    /// The port actually used: 389 becomes 636 when encryption is requested.
    pub fn port(&self) -> u16 {
        effective_port(self.port, self.use_encrypted_transport)
    }

    pub fn use_encrypted_transport(&self) -> bool {
        self.use_encrypted_transport
    }
}
