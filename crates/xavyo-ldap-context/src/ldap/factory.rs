//! Context factories for the LDAP backend.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::LdapConfig;
use crate::context::ManagedContext;
use crate::error::DirResult;
use crate::socket_scope::{self, SocketFactory};
use crate::traits::{
    CloseHandler, DirContext, DirContextFactory, InitialContextFactory, ReferralMode,
};
use crate::types::{env, Environment};

use super::context::LdapDirContext;
use super::tls::TlsSocketFactory;

fn environment_for(mode: ReferralMode) -> Environment {
    let mut environment = Environment::new();
    environment.insert(env::REFERRAL.to_string(), mode.as_str().to_string());
    environment
}

/// Opens contexts bound with the configured identity.
///
/// Uses whatever socket factory is in scope on the calling thread.
#[derive(Debug, Clone)]
pub struct LdapInitialContextFactory {
    config: Arc<LdapConfig>,
}

impl LdapInitialContextFactory {
    pub fn new(config: Arc<LdapConfig>) -> Self {
        Self { config }
    }
}

impl InitialContextFactory for LdapInitialContextFactory {
    fn initial_context(&self) -> DirResult<Box<dyn DirContext>> {
        let context = LdapDirContext::connect(
            Arc::clone(&self.config),
            &self.config.bind_dn,
            self.config.password(),
            environment_for(self.config.referral),
        )?;
        Ok(Box::new(context))
    }
}

/// Factory handing out [`ManagedContext`]s over fresh LDAP connections.
///
/// When TLS is enabled the factory builds a [`TlsSocketFactory`] once and
/// attaches it to every context it hands out.
pub struct SimpleDirContextFactory {
    config: Arc<LdapConfig>,
    socket_factory: Option<Arc<dyn SocketFactory>>,
}

impl SimpleDirContextFactory {
    /// Validate `config` and prepare the socket factory.
    pub fn new(config: LdapConfig) -> DirResult<Self> {
        config.validate()?;

        let socket_factory: Option<Arc<dyn SocketFactory>> = if config.tls.enabled {
            Some(Arc::new(TlsSocketFactory::from_config(&config.tls)?))
        } else {
            None
        };

        info!(
            url = %config.url(),
            base_dn = %config.base_dn,
            tls = socket_factory.is_some(),
            "LDAP context factory initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            socket_factory,
        })
    }

    /// Replace the socket factory attached to handed-out contexts.
    #[must_use]
    pub fn with_socket_factory(mut self, socket_factory: Arc<dyn SocketFactory>) -> Self {
        self.socket_factory = Some(socket_factory);
        self
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    pub fn socket_factory(&self) -> Option<&Arc<dyn SocketFactory>> {
        self.socket_factory.as_ref()
    }

    /// Factory for fresh contexts with this factory's configuration.
    pub fn initial_context_factory(&self) -> LdapInitialContextFactory {
        LdapInitialContextFactory::new(Arc::clone(&self.config))
    }

    fn connect(
        &self,
        bind_dn: &str,
        password: &str,
        referral_mode: ReferralMode,
    ) -> DirResult<LdapDirContext> {
        socket_scope::scoped(self.socket_factory.as_ref(), || {
            LdapDirContext::connect(
                Arc::clone(&self.config),
                bind_dn,
                password,
                environment_for(referral_mode),
            )
        })
    }

    /// Open a context bound with the configured identity whose `close()`
    /// runs `close_handler`.
    pub fn obtain_with_close_handler(
        &self,
        referral_mode: ReferralMode,
        close_handler: impl CloseHandler + 'static,
    ) -> DirResult<ManagedContext> {
        let context = self.connect(&self.config.bind_dn, self.config.password(), referral_mode)?;
        Ok(ManagedContext::pooled(
            Box::new(context),
            close_handler,
            self.socket_factory.clone(),
        ))
    }
}

fn close_connection(mut context: Box<dyn DirContext>) -> DirResult<()> {
    debug!(context = ?context, "Closing LDAP context");
    context.close()
}

impl DirContextFactory for SimpleDirContextFactory {
    fn obtain_dir_context(&self, referral_mode: ReferralMode) -> DirResult<ManagedContext> {
        self.obtain_with_close_handler(referral_mode, close_connection)
    }

    fn obtain_with_credentials(
        &self,
        bind_dn: &str,
        password: &str,
        referral_mode: ReferralMode,
    ) -> DirResult<ManagedContext> {
        let context = self.connect(bind_dn, password, referral_mode)?;
        Ok(ManagedContext::pooled(
            Box::new(context),
            close_connection,
            self.socket_factory.clone(),
        ))
    }
}

impl std::fmt::Debug for SimpleDirContextFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleDirContextFactory")
            .field("config", &self.config)
            .field("socket_factory", &self.socket_factory)
            .finish()
    }
}
