//! The protocol collaborator the session delegates to.
//!
//! [`DirectorySession`](super::DirectorySession) never speaks the wire
//! protocol itself. It asks a [`DirectoryConnector`] for a bound
//! [`DirectoryConnection`] and runs searches through it. The production
//! implementation lives in [`super::ldap`]; tests plug in scripted doubles.

use std::collections::HashMap;
use std::fmt;

use crate::config::{BindCredential, SessionConfig};
use crate::errors::DirectoryError;

/// Attribute selector meaning "every user attribute".
pub const ALL_ATTRIBUTES: &str = "*";

/// Where a directory server lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl ServerDescriptor {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// Build the descriptor from session settings, using the effective port.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.host(),
            config.port(),
            config.use_encrypted_transport(),
        )
    }

    /// `ldap://host:port` or `ldaps://host:port`.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

/// Protocol type of one search response entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A matching entry carrying attributes.
    SearchResultEntry,
    /// A referral to another server; carries no data.
    SearchResultReference,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchResultEntry => "searchResEntry",
            Self::SearchResultReference => "searchResRef",
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::SearchResultReference)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search response entry as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub kind: EntryKind,
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl RawEntry {
    pub fn entry(dn: impl Into<String>, attributes: HashMap<String, Vec<String>>) -> Self {
        Self {
            kind: EntryKind::SearchResultEntry,
            dn: dn.into(),
            attributes,
        }
    }

    pub fn reference() -> Self {
        Self {
            kind: EntryKind::SearchResultReference,
            dn: String::new(),
            attributes: HashMap::new(),
        }
    }
}

/// Opens bound connections to a directory server.
pub trait DirectoryConnector {
    type Connection: DirectoryConnection;

    /// Connect to `server` and perform a simple bind as `identity`.
    fn connect(
        &self,
        server: &ServerDescriptor,
        identity: &str,
        credential: &BindCredential,
    ) -> Result<Self::Connection, DirectoryError>;
}

/// A live connection handle.
pub trait DirectoryConnection {
    /// Whether the provider still considers the session bound.
    fn is_bound(&self) -> bool;

    /// Run a search and return every response entry, references included.
    fn search(
        &mut self,
        base: &str,
        filter: &str,
        scope: SearchScope,
        attributes: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError>;

    /// Close the session.
    fn unbind(&mut self) -> Result<(), DirectoryError>;
}
