//! dirlookup core library.
//!
//! A thin layer over an LDAP client: one authenticated session that binds
//! lazily and rebinds when found unbound, RFC 4515 filter escaping, and two
//! user lookups (by email, by account name) returning plain attribute maps.

pub mod config;
pub mod directory;
pub mod errors;

// Re-exports for convenience.
pub use config::{AppConfig, BindCredential, SessionConfig};
pub use directory::{DirectorySession, LdapConnector, LdapSession, SearchRecord};
pub use errors::{ConfigError, CoreError, DirectoryError};
