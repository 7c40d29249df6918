//! Directory access: one lazily bound session plus two user lookups.
//!
//! - [`session`]: bind / unbind / rebind-before-query lifecycle
//! - [`filter`]: RFC 4515 escaping of filter values
//! - [`query`]: lookup filters and result shaping
//! - [`transport`]: the connector traits the session delegates to
//! - [`ldap`]: the `ldap3`-backed transport

pub mod filter;
pub mod ldap;
pub mod query;
pub mod session;
pub mod transport;

pub use filter::{escape_filter, escape_filter_chars, escape_filter_value, TextEncoding};
pub use ldap::{LdapConnector, LdapHandle};
pub use query::{SearchRecord, UserLookup};
pub use session::DirectorySession;
pub use transport::{
    DirectoryConnection, DirectoryConnector, EntryKind, RawEntry, SearchScope, ServerDescriptor,
};

/// A session over the production `ldap3` transport.
pub type LdapSession = DirectorySession<LdapConnector>;
