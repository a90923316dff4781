//! LDAP connection configuration
//!
//! Configuration types for the contexts opened by the LDAP backend.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DirError, DirResult};
use crate::traits::ReferralMode;

/// Configuration for LDAP directory contexts.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Name of the initial context (e.g., "dc=example,dc=com").
    #[serde(default)]
    pub base_dn: String,

    /// Bind DN; empty for anonymous.
    #[serde(default)]
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// How server referrals are surfaced.
    #[serde(default)]
    pub referral: ReferralMode,

    /// Connection settings (timeouts).
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// TLS configuration used to build the socket factory.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Default page size for searches, 0 to disable paging.
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("referral", &self.referral)
            .field("connection", &self.connection)
            .field("tls", &self.tls)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_page_size() -> i32 {
    500
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(host: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: String::new(),
            bind_password: None,
            referral: ReferralMode::default(),
            connection: ConnectionSettings::default(),
            tls: TlsConfig::default(),
            page_size: default_page_size(),
        }
    }

    /// Set bind credentials.
    pub fn with_credentials(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.bind_dn = bind_dn.into();
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self.tls.enabled = true;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self.tls.enabled = true;
        self
    }

    #[must_use]
    pub fn with_referral_mode(mut self, mode: ReferralMode) -> Self {
        self.referral = mode;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Bind password, empty when none is configured.
    pub fn password(&self) -> &str {
        self.bind_password.as_deref().unwrap_or("")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirResult<()> {
        if self.host.is_empty() {
            return Err(DirError::invalid_configuration("host is required"));
        }

        if self.base_dn.trim().is_empty() {
            return Err(DirError::invalid_configuration("base_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if !self.bind_dn.is_empty() && self.bind_password.as_deref().unwrap_or("").is_empty() {
            return Err(DirError::invalid_configuration(
                "bind_password is required when bind_dn is set",
            ));
        }

        if self.page_size < 0 {
            return Err(DirError::invalid_configuration(
                "page_size must not be negative",
            ));
        }

        self.tls.validate_security();
        Ok(())
    }

    /// Create a redacted version of this config (for logging/display).
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }
}

/// Connection timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds, 0 for none.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl ConnectionSettings {
    /// Get connection timeout as Duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the per-operation timeout, if one is set.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}

/// SSL/TLS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether to use SSL/TLS.
    #[serde(default)]
    pub enabled: bool,

    /// Whether to verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Path to a PEM CA certificate added to the trust roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,

    /// Path to a PEM client certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert_path: Option<String>,

    /// Path to the PEM PKCS#8 client key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key_path: Option<String>,

    /// Minimum TLS version ("1.0", "1.1", "1.2"); library default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tls_version: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verify_certificate: true,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            min_tls_version: None,
        }
    }
}

impl TlsConfig {
    /// Log a security warning when certificate verification is disabled.
    pub fn validate_security(&self) {
        if self.enabled && !self.verify_certificate {
            tracing::warn!(
                target: "security",
                "SECURITY WARNING: TLS certificate verification is DISABLED for LDAP connections. \
                 This should ONLY be used for local development."
            );
        }
    }

    /// Create a new TLS config with SSL enabled.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Set the CA certificate path.
    pub fn with_ca_cert(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Set client certificate and key paths.
    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    #[must_use]
    pub fn with_min_tls_version(mut self, version: impl Into<String>) -> Self {
        self.min_tls_version = Some(version.into());
        self
    }
}
