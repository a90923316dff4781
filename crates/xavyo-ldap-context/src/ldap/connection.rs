//! Blocking wrapper around an `ldap3` connection.

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings};
use std::future::Future;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::config::LdapConfig;
use crate::error::{result_code, DirError, DirResult};
use crate::socket_scope;
use crate::types::Control;

use super::to_raw_controls;

/// One LDAP connection driven by its own single-threaded runtime.
///
/// The socket is opened with the socket factory installed in
/// [`socket_scope`] at the time of [`Connection::open`].
pub(crate) struct Connection {
    runtime: Runtime,
    ldap: Ldap,
    url: String,
    bind_dn: String,
}

impl Connection {
    /// Connect to `url` and bind as `bind_dn`; an empty `bind_dn` binds
    /// anonymously.
    pub(crate) fn open(
        url: &str,
        config: &LdapConfig,
        bind_dn: &str,
        password: &str,
        connect_controls: &[Control],
    ) -> DirResult<Self> {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(config.connection.connection_timeout())
            .set_starttls(config.use_starttls && url.starts_with("ldap://"));

        if let Some(factory) = socket_scope::current() {
            debug!(url = %url, factory = %factory.describe(), "Using scoped socket factory");
            settings = factory.configure(settings);
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                DirError::communication_with_source("Failed to start LDAP I/O runtime", e)
            })?;

        debug!(url = %url, "Connecting to LDAP server");

        let ldap = runtime.block_on(async {
            let (conn, mut ldap) = LdapConnAsync::with_settings(settings, url)
                .await
                .map_err(|e| {
                    DirError::communication(format!(
                        "Failed to connect to LDAP server at {url}: {e}"
                    ))
                })?;

            tokio::spawn(async move {
                if let Err(e) = conn.drive().await {
                    warn!(error = %e, "LDAP connection driver error");
                }
            });

            if !bind_dn.is_empty() {
                debug!(bind_dn = %bind_dn, "Performing LDAP bind");
                if !connect_controls.is_empty() {
                    ldap.with_controls(to_raw_controls(connect_controls));
                }
                let result = ldap.simple_bind(bind_dn, password).await?;
                if result.rc == result_code::INVALID_CREDENTIALS {
                    return Err(DirError::AuthenticationFailed);
                }
                if result.rc != result_code::SUCCESS {
                    return Err(DirError::communication(format!(
                        "LDAP bind failed with code {}: {}",
                        result.rc, result.text
                    )));
                }
            }

            Ok::<_, DirError>(ldap)
        })?;

        info!(url = %url, "LDAP connection established");

        Ok(Self {
            runtime,
            ldap,
            url: url.to_string(),
            bind_dn: bind_dn.to_string(),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// A handle for one operation. Per-operation state such as controls or
    /// timeouts set on it does not leak into other operations.
    pub(crate) fn handle(&self) -> Ldap {
        self.ldap.clone()
    }

    /// Run a future on this connection's runtime.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Send an unbind request. Errors are logged, not returned.
    pub(crate) fn unbind(&self) {
        let mut ldap = self.handle();
        if let Err(e) = self.block_on(ldap.unbind()) {
            warn!(url = %self.url, error = %e, "LDAP unbind failed");
        } else {
            debug!(url = %self.url, "LDAP connection closed");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_connection_is_shareable_across_threads() {
        assert_send_sync::<Connection>();
        assert_send_sync::<std::sync::Arc<Connection>>();
    }
}
