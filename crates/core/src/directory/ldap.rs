//! Production transport backed by the `ldap3` synchronous client.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ldap3::{LdapConn, LdapConnSettings, LdapError, ResultEntry, Scope, SearchEntry, SearchResult};
use tracing::{debug, warn};

use crate::config::{BindCredential, DirectoryConfig};
use crate::directory::session::DirectorySession;
use crate::directory::transport::{
    DirectoryConnection, DirectoryConnector, RawEntry, SearchScope, ServerDescriptor,
};
use crate::errors::{ConfigError, DirectoryError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const RC_TIME_LIMIT_EXCEEDED: u32 = 3;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;

/// Opens [`LdapHandle`]s with simple authentication.
#[derive(Debug, Clone)]
pub struct LdapConnector {
    connect_timeout: Duration,
}

impl LdapConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(Duration::from_secs(config.connect_timeout_secs))
    }
}

impl Default for LdapConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl DirectoryConnector for LdapConnector {
    type Connection = LdapHandle;

    fn connect(
        &self,
        server: &ServerDescriptor,
        identity: &str,
        credential: &BindCredential,
    ) -> Result<LdapHandle, DirectoryError> {
        // An empty password turns a simple bind into an anonymous one, which
        // most servers accept and report as success.
        if credential.expose().is_empty() {
            return Err(DirectoryError::BindRejected {
                identity: identity.to_string(),
                detail: "empty password would perform an unauthenticated bind".into(),
            });
        }

        let url = server.url();
        debug!(%url, timeout_secs = self.connect_timeout.as_secs(), "opening LDAP connection");

        let settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);
        let mut conn =
            LdapConn::with_settings(settings, &url).map_err(|e| DirectoryError::Connection {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        let result = conn
            .simple_bind(identity, credential.expose())
            .map_err(|e| DirectoryError::Connection {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        if result.rc != 0 {
            if let Err(e) = conn.unbind() {
                debug!(%url, error = %e, "unbind after rejected bind failed");
            }
            return Err(DirectoryError::BindRejected {
                identity: identity.to_string(),
                detail: format!("rc={} {}", result.rc, result.text),
            });
        }

        Ok(LdapHandle {
            conn,
            url,
            bound: true,
        })
    }
}

impl DirectorySession<LdapConnector> {
    /// Build an `ldap3` session from file settings and attempt the initial bind.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.session_config()?,
            LdapConnector::from_config(config),
        ))
    }

    /// Like [`from_config`](Self::from_config), but binds on first use.
    pub fn lazy_from_config(config: &DirectoryConfig) -> Result<Self, ConfigError> {
        Ok(Self::lazy(
            config.session_config()?,
            LdapConnector::from_config(config),
        ))
    }
}

/// A bound `ldap3` connection.
pub struct LdapHandle {
    conn: LdapConn,
    url: String,
    bound: bool,
}

impl DirectoryConnection for LdapHandle {
    fn is_bound(&self) -> bool {
        self.bound
    }

    fn search(
        &mut self,
        base: &str,
        filter: &str,
        scope: SearchScope,
        attributes: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError> {
        let response = match self
            .conn
            .search(base, to_ldap3_scope(scope), filter, attributes.to_vec())
        {
            Ok(response) => response,
            Err(e) => {
                // Transport-level failure: the session is gone.
                warn!(url = %self.url, error = %e, "LDAP connection lost during search");
                self.bound = false;
                return Err(DirectoryError::Connection {
                    url: self.url.clone(),
                    detail: e.to_string(),
                });
            }
        };

        let (entries, truncated) = accepted_entries(response).map_err(|e| DirectoryError::Search {
            base: base.to_string(),
            filter: filter.to_string(),
            detail: e.to_string(),
        })?;
        if let Some(rc) = truncated {
            warn!(
                url = %self.url,
                base,
                filter,
                rc,
                returned = entries.len(),
                "search stopped at a server limit; results are truncated"
            );
        }

        Ok(entries.into_iter().filter_map(convert_entry).collect())
    }

    fn unbind(&mut self) -> Result<(), DirectoryError> {
        self.bound = false;
        self.conn
            .unbind()
            .map_err(|e| DirectoryError::Unbind(e.to_string()))
    }
}

fn to_ldap3_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Entries of a finished search, plus the result code when a server limit
/// cut the search short.
///
/// Success and referral results pass; so do time and size limit results,
/// keeping the entries received before the limit hit. Any other code is an
/// error.
fn accepted_entries(response: SearchResult) -> Result<(Vec<ResultEntry>, Option<u32>), LdapError> {
    let SearchResult(entries, result) = response;
    match result.rc {
        RC_TIME_LIMIT_EXCEEDED | RC_SIZE_LIMIT_EXCEEDED => Ok((entries, Some(result.rc))),
        _ => SearchResult(entries, result)
            .non_error()
            .map(|(entries, _)| (entries, None)),
    }
}

/// Intermediate messages are dropped; binary values are base64-encoded.
fn convert_entry(entry: ResultEntry) -> Option<RawEntry> {
    if entry.is_intermediate() {
        return None;
    }
    if entry.is_ref() {
        return Some(RawEntry::reference());
    }

    let SearchEntry {
        dn,
        mut attrs,
        bin_attrs,
        ..
    } = SearchEntry::construct(entry);
    for (name, values) in bin_attrs {
        attrs
            .entry(name)
            .or_default()
            .extend(values.iter().map(|v| BASE64.encode(v)));
    }

    Some(RawEntry::entry(dn, attrs))
}

#[cfg(test)]
mod tests {
    use ldap3::asn1::{StructureTag, TagClass, PL};
    use ldap3::LdapResult;

    use super::*;
    use crate::directory::transport::EntryKind;

    fn octets(bytes: &[u8]) -> StructureTag {
        StructureTag {
            class: TagClass::Universal,
            id: 4,
            payload: PL::P(bytes.to_vec()),
        }
    }

    fn constructed(class: TagClass, id: u64, inner: Vec<StructureTag>) -> StructureTag {
        StructureTag {
            class,
            id,
            payload: PL::C(inner),
        }
    }

    /// A searchResEntry as it arrives off the wire.
    fn wire_entry(dn: &str, attrs: &[(&str, Vec<&[u8]>)]) -> ResultEntry {
        let attributes = attrs
            .iter()
            .map(|(name, values)| {
                constructed(
                    TagClass::Universal,
                    16,
                    vec![
                        octets(name.as_bytes()),
                        constructed(
                            TagClass::Universal,
                            17,
                            values.iter().map(|v| octets(v)).collect(),
                        ),
                    ],
                )
            })
            .collect();
        ResultEntry::new(constructed(
            TagClass::Application,
            4,
            vec![
                octets(dn.as_bytes()),
                constructed(TagClass::Universal, 16, attributes),
            ],
        ))
    }

    fn wire_reference() -> ResultEntry {
        ResultEntry::new(constructed(
            TagClass::Application,
            19,
            vec![octets(b"ldap://dc02.example.com/DC=corp,DC=example,DC=com")],
        ))
    }

    fn wire_intermediate() -> ResultEntry {
        ResultEntry::new(constructed(TagClass::Application, 25, vec![]))
    }

    fn search_result(entries: Vec<ResultEntry>, rc: u32, text: &str) -> SearchResult {
        SearchResult(
            entries,
            LdapResult {
                rc,
                matched: String::new(),
                text: text.to_string(),
                refs: vec![],
                ctrls: vec![],
            },
        )
    }

    fn jane() -> ResultEntry {
        wire_entry(
            "CN=Jane Doe,DC=example,DC=com",
            &[("mail", vec![b"jane@example.com".as_slice()])],
        )
    }

    #[test]
    fn test_convert_entry_encodes_binary_values() {
        let entry = wire_entry(
            "CN=Jane Doe,DC=example,DC=com",
            &[
                ("objectGUID", vec![b"\xff\x00\xfe".as_slice()]),
                ("mail", vec![b"jane@example.com".as_slice()]),
            ],
        );

        let raw = convert_entry(entry).unwrap();
        assert_eq!(raw.kind, EntryKind::SearchResultEntry);
        assert_eq!(raw.dn, "CN=Jane Doe,DC=example,DC=com");
        assert_eq!(raw.attributes["objectGUID"], vec!["/wD+"]);
        assert_eq!(raw.attributes["mail"], vec!["jane@example.com"]);
    }

    #[test]
    fn test_convert_entry_keeps_references() {
        let raw = convert_entry(wire_reference()).unwrap();
        assert_eq!(raw.kind, EntryKind::SearchResultReference);
        assert!(raw.attributes.is_empty());
    }

    #[test]
    fn test_convert_entry_drops_intermediate_messages() {
        assert!(convert_entry(wire_intermediate()).is_none());
    }

    #[test]
    fn test_size_limit_keeps_received_entries() {
        let response = search_result(vec![jane(), jane()], 4, "Size limit exceeded");
        let (entries, truncated) = accepted_entries(response).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(truncated, Some(RC_SIZE_LIMIT_EXCEEDED));
    }

    #[test]
    fn test_time_limit_keeps_received_entries() {
        let response = search_result(vec![jane()], 3, "Time limit exceeded");
        let (entries, truncated) = accepted_entries(response).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(truncated, Some(RC_TIME_LIMIT_EXCEEDED));
    }

    #[test]
    fn test_success_and_referral_results_pass() {
        let (entries, truncated) = accepted_entries(search_result(vec![jane()], 0, "")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(truncated, None);

        let (entries, truncated) =
            accepted_entries(search_result(vec![wire_reference()], 10, "Referral")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(truncated, None);
    }

    #[test]
    fn test_error_result_is_rejected() {
        let response = search_result(vec![], 32, "No such object");
        let err = accepted_entries(response).unwrap_err();
        assert!(err.to_string().contains("rc=32"));
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(to_ldap3_scope(SearchScope::Base), Scope::Base));
        assert!(matches!(to_ldap3_scope(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(to_ldap3_scope(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn test_empty_password_rejected_before_connecting() {
        // Port 1 on localhost is never an LDAP server; the check must come first.
        let server = ServerDescriptor::new("127.0.0.1", 1, false);
        let result = LdapConnector::default().connect(
            &server,
            "cn=reader,dc=example,dc=com",
            &BindCredential::new(""),
        );
        assert!(matches!(result, Err(DirectoryError::BindRejected { .. })));
    }

    #[test]
    fn test_unreachable_server_is_connection_error() {
        let server = ServerDescriptor::new("127.0.0.1", 1, false);
        let result = LdapConnector::new(Duration::from_secs(2)).connect(
            &server,
            "cn=reader,dc=example,dc=com",
            &BindCredential::new("pw"),
        );
        match result {
            Err(DirectoryError::Connection { url, .. }) => assert_eq!(url, "ldap://127.0.0.1:1"),
            Err(other) => panic!("expected connection error, got {other}"),
            Ok(_) => panic!("expected connection error, got a handle"),
        }
    }
}
