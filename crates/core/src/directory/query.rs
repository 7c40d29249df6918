//! User lookups and shaping of search responses into plain records.

use std::collections::BTreeMap;

use tracing::info;

use crate::directory::filter::{escape_filter_chars, FILTER_SPECIAL_CHARS_KEEP_WILDCARD};
use crate::directory::session::DirectorySession;
use crate::directory::transport::{DirectoryConnector, RawEntry, SearchScope, ALL_ATTRIBUTES};
use crate::errors::DirectoryError;

/// Attribute name to values for one returned entry.
pub type SearchRecord = BTreeMap<String, Vec<String>>;

/// The two supported user lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLookup {
    /// Prefix match on `mail`.
    Email,
    /// Prefix match on `sAMAccountName`.
    UserId,
}

impl UserLookup {
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::Email => "mail",
            Self::UserId => "sAMAccountName",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "user email",
            Self::UserId => "user id",
        }
    }

    /// `(&(objectClass=user)(<attr>=<escaped value>*))`. The value keeps any
    /// `*` the caller supplied; the trailing wildcard is always appended.
    pub fn filter(&self, value: &str) -> String {
        let escaped = escape_filter_chars(value, FILTER_SPECIAL_CHARS_KEEP_WILDCARD);
        format!("(&(objectClass=user)({}={}*))", self.attribute(), escaped)
    }
}

impl<C: DirectoryConnector> DirectorySession<C> {
    /// Find user objects whose `mail` starts with `email`.
    pub fn search_user_by_email(
        &mut self,
        email: &str,
        base: Option<&str>,
    ) -> Result<Vec<SearchRecord>, DirectoryError> {
        self.search_user(UserLookup::Email, email, base)
    }

    /// Find user objects whose `sAMAccountName` starts with `user_id`.
    pub fn search_user_by_user_id(
        &mut self,
        user_id: &str,
        base: Option<&str>,
    ) -> Result<Vec<SearchRecord>, DirectoryError> {
        self.search_user(UserLookup::UserId, user_id, base)
    }

    /// Run `lookup` for `value` under `base` (default: the configured base DN).
    pub fn search_user(
        &mut self,
        lookup: UserLookup,
        value: &str,
        base: Option<&str>,
    ) -> Result<Vec<SearchRecord>, DirectoryError> {
        {
            let _enter = self.span().enter();
            let base = base.unwrap_or(self.config().base_dn());
            info!(base, "searching for {} {}", lookup.label(), value);
        }

        let filter = lookup.filter(value);
        let records =
            self.execute_search(&filter, base, SearchScope::Subtree, &[ALL_ATTRIBUTES])?;

        let _enter = self.span().enter();
        info!(count = records.len(), "search returned {} user objects", records.len());
        Ok(records)
    }

    /// Guarded search; reference entries are dropped and the rest flattened
    /// into [`SearchRecord`]s. No match is an empty list.
    pub fn execute_search(
        &mut self,
        filter: &str,
        base: Option<&str>,
        scope: SearchScope,
        attributes: &[&str],
    ) -> Result<Vec<SearchRecord>, DirectoryError> {
        let entries = self.search_raw(filter, base, scope, attributes)?;
        Ok(shape_entries(entries))
    }
}

fn shape_entries(entries: Vec<RawEntry>) -> Vec<SearchRecord> {
    entries
        .into_iter()
        .filter(|entry| !entry.kind.is_reference())
        .map(|entry| entry.attributes.into_iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::session::tests::{test_config, user_entry, FakeConnector};

    #[test]
    fn test_email_filter_escapes_parens_keeps_wildcard() {
        let filter = UserLookup::Email.filter("a(b)c");
        assert_eq!(filter, "(&(objectClass=user)(mail=a\\28b\\29c*))");
        assert!(filter.contains("mail=a\\28b\\29c*"));
    }

    #[test]
    fn test_user_id_filter() {
        assert_eq!(
            UserLookup::UserId.filter("jdoe*"),
            "(&(objectClass=user)(sAMAccountName=jdoe**))"
        );
        assert_eq!(
            UserLookup::UserId.filter("dom\\jdoe\0"),
            "(&(objectClass=user)(sAMAccountName=dom\\5cjdoe\\00*))"
        );
    }

    #[test]
    fn test_search_by_email_issues_filter() {
        let connector = FakeConnector::default();
        let mut session = DirectorySession::new(test_config(), connector.clone());

        session.search_user_by_email("a(b)c", None).unwrap();

        let rec = connector.recorder.borrow();
        let (base, filter, scope, attrs) = &rec.searches[0];
        assert_eq!(base, "DC=example,DC=com");
        assert!(filter.contains("mail=a\\28b\\29c*"));
        assert_eq!(*scope, SearchScope::Subtree);
        assert_eq!(attrs, &vec!["*".to_string()]);
    }

    #[test]
    fn test_references_are_dropped() {
        let connector = FakeConnector::default();
        connector.respond_with(vec![
            user_entry(
                "CN=Jane Doe,OU=Staff,DC=example,DC=com",
                &[("mail", "jane@example.com"), ("sAMAccountName", "jdoe")],
            ),
            RawEntry::reference(),
        ]);
        let mut session = DirectorySession::new(test_config(), connector);

        let records = session.search_user_by_user_id("jdoe", None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["mail"], vec!["jane@example.com"]);
        assert_eq!(records[0]["sAMAccountName"], vec!["jdoe"]);
        assert_eq!(records[0].len(), 2);
    }

    #[test]
    fn test_base_override_applies_to_one_call() {
        let connector = FakeConnector::default();
        let mut session = DirectorySession::new(test_config(), connector.clone());

        session
            .search_user_by_user_id("jdoe", Some("OU=Staff,DC=example,DC=com"))
            .unwrap();
        session.search_user_by_user_id("jdoe", None).unwrap();

        let rec = connector.recorder.borrow();
        assert_eq!(rec.searches[0].0, "OU=Staff,DC=example,DC=com");
        assert_eq!(rec.searches[1].0, "DC=example,DC=com");
    }

    #[test]
    fn test_no_match_is_empty_list() {
        let mut session = DirectorySession::new(test_config(), FakeConnector::default());
        let records = session.search_user_by_email("nobody@example.com", None).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_shape_entries_keeps_multi_values() {
        let mut entry = user_entry("CN=x", &[]);
        entry.attributes.insert(
            "memberOf".into(),
            vec!["CN=A,DC=x".into(), "CN=B,DC=x".into()],
        );
        let records = shape_entries(vec![entry]);
        assert_eq!(records[0]["memberOf"].len(), 2);
    }
}
