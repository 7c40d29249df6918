//! Lifecycle of the single directory session behind a [`DirectorySession`].
//!
//! The session is bound lazily, checked before every query and rebound when
//! the provider reports it unbound. A failed bind never fails the caller
//! directly: it is logged, the session stays unbound, and the next query that
//! needs the session reports [`DirectoryError::NoSession`].

use tracing::{debug, error, info, info_span, Span};

use crate::config::SessionConfig;
use crate::directory::transport::{
    DirectoryConnection, DirectoryConnector, RawEntry, SearchScope, ServerDescriptor,
};
use crate::errors::DirectoryError;

/// An authenticated session to one directory server.
///
/// Not `Sync`-safe by contract: every operation takes `&mut self`. Wrap the
/// session in a `Mutex` to share it between threads.
pub struct DirectorySession<C: DirectoryConnector> {
    config: SessionConfig,
    connector: C,
    connection: Option<C::Connection>,
    span: Span,
}

impl<C: DirectoryConnector> DirectorySession<C> {
    /// Create the session and attempt the initial bind.
    ///
    /// Always succeeds; check [`is_bound`](Self::is_bound) to see whether the
    /// bind went through.
    pub fn new(config: SessionConfig, connector: C) -> Self {
        let mut session = Self::lazy(config, connector);
        session.bind();
        session
    }

    /// Create the session without binding; the first query binds.
    pub fn lazy(config: SessionConfig, connector: C) -> Self {
        let span = info_span!(
            "directory_session",
            host = %config.host(),
            port = config.port()
        );
        {
            let _enter = span.enter();
            if config.use_encrypted_transport() {
                info!("session configured for LDAPS on port {}", config.port());
            } else {
                info!("session configured for cleartext LDAP on port {}", config.port());
            }
        }
        Self {
            config,
            connector,
            connection: None,
            span,
        }
    }

    /// Log every operation of this session under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True iff a handle exists and the provider reports it bound.
    pub fn is_bound(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| conn.is_bound())
    }

    /// Open and bind a session unless one is already bound.
    ///
    /// Failures are logged and swallowed; see [`try_bind`](Self::try_bind).
    pub fn bind(&mut self) {
        if let Err(e) = self.try_bind() {
            let _enter = self.span.enter();
            error!(error = %e, "directory bind failed; session remains unbound");
        }
    }

    /// Like [`bind`](Self::bind), but reports the failure.
    ///
    /// A handle the provider reports as unbound is discarded and replaced, so
    /// at most one handle exists at a time.
    pub fn try_bind(&mut self) -> Result<(), DirectoryError> {
        let _enter = self.span.enter();

        if self.is_bound() {
            error!("bind requested, but the directory session is already bound");
            return Ok(());
        }
        if self.connection.take().is_some() {
            debug!("discarding stale unbound handle");
        }

        let server = ServerDescriptor::from_config(&self.config);
        info!(
            server = %server,
            base_dn = %self.config.base_dn(),
            "binding to directory server"
        );
        debug!(
            secure = server.secure,
            identity = %self.config.bind_identity(),
            "opening connection with simple authentication"
        );

        let connection = self.connector.connect(
            &server,
            self.config.bind_identity(),
            self.config.bind_credential(),
        )?;
        self.connection = Some(connection);

        info!(server = %server, "directory session bound");
        Ok(())
    }

    /// Close the session and drop the handle.
    ///
    /// Calling this without a session is a caller error. The handle is
    /// dropped even when the provider's unbind fails.
    pub fn unbind(&mut self) -> Result<(), DirectoryError> {
        let _enter = self.span.enter();
        let mut connection = self
            .connection
            .take()
            .ok_or_else(|| DirectoryError::no_session("unbind"))?;

        connection.unbind()?;
        info!("directory session unbound");
        Ok(())
    }

    /// Bind first if the session is not bound. Proceeds whatever the outcome.
    fn ensure_bound(&mut self) {
        if self.is_bound() {
            let _enter = self.span.enter();
            debug!("directory session is bound");
            return;
        }
        {
            let _enter = self.span.enter();
            debug!("directory session is not bound; binding now");
        }
        self.bind();
    }

    /// Guarded search against the live handle, returning raw entries.
    ///
    /// `base` defaults to the configured base DN.
    pub(crate) fn search_raw(
        &mut self,
        filter: &str,
        base: Option<&str>,
        scope: SearchScope,
        attributes: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError> {
        self.ensure_bound();

        let _enter = self.span.enter();
        let base = base.unwrap_or(self.config.base_dn());
        info!(base, filter, "searching directory");

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| DirectoryError::no_session("search"))?;
        connection.search(base, filter, scope, attributes)
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }
}
