//! TLS socket factory.

use ldap3::LdapConnSettings;
use native_tls::{Certificate, Identity, Protocol, TlsConnector};
use std::fs;
use tracing::debug;

use crate::config::TlsConfig;
use crate::error::{DirError, DirResult};
use crate::socket_scope::SocketFactory;

/// Socket factory that opens TLS connections with a prepared connector.
#[derive(Clone)]
pub struct TlsSocketFactory {
    connector: TlsConnector,
    description: String,
}

impl TlsSocketFactory {
    /// Build the connector described by `config`.
    pub fn from_config(config: &TlsConfig) -> DirResult<Self> {
        config.validate_security();

        let mut builder = TlsConnector::builder();

        if !config.verify_certificate {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(path) = &config.ca_cert_path {
            let pem = read_file("CA certificate", path)?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                DirError::invalid_configuration(format!("invalid CA certificate {path}: {e}"))
            })?;
            builder.add_root_certificate(cert);
        }

        match (&config.client_cert_path, &config.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = read_file("client certificate", cert_path)?;
                let key = read_file("client key", key_path)?;
                let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
                    DirError::invalid_configuration(format!("invalid client identity: {e}"))
                })?;
                builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(DirError::invalid_configuration(
                    "client_cert_path and client_key_path must be set together",
                ))
            }
        }

        if let Some(version) = &config.min_tls_version {
            builder.min_protocol_version(Some(parse_protocol(version)?));
        }

        let connector = builder.build().map_err(|e| {
            DirError::invalid_configuration(format!("failed to build TLS connector: {e}"))
        })?;

        let description = format!(
            "TlsSocketFactory(verify={}, ca={}, client_cert={}, min_version={})",
            config.verify_certificate,
            config.ca_cert_path.as_deref().unwrap_or("system"),
            config.client_cert_path.is_some(),
            config.min_tls_version.as_deref().unwrap_or("default"),
        );
        debug!(factory = %description, "Built TLS socket factory");

        Ok(Self {
            connector,
            description,
        })
    }
}

fn read_file(what: &str, path: &str) -> DirResult<Vec<u8>> {
    fs::read(path)
        .map_err(|e| DirError::invalid_configuration(format!("cannot read {what} {path}: {e}")))
}

fn parse_protocol(version: &str) -> DirResult<Protocol> {
    match version {
        "1.0" => Ok(Protocol::Tlsv10),
        "1.1" => Ok(Protocol::Tlsv11),
        "1.2" => Ok(Protocol::Tlsv12),
        other => Err(DirError::invalid_configuration(format!(
            "unsupported minimum TLS version: {other}"
        ))),
    }
}

impl SocketFactory for TlsSocketFactory {
    fn configure(&self, settings: LdapConnSettings) -> LdapConnSettings {
        settings.set_connector(self.connector.clone())
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl std::fmt::Debug for TlsSocketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let factory = TlsSocketFactory::from_config(&TlsConfig::enabled()).unwrap();
        assert!(factory.describe().contains("verify=true"));
        assert!(factory.describe().contains("ca=system"));
    }

    #[test]
    fn test_missing_ca_file_is_a_configuration_error() {
        let config = TlsConfig::enabled().with_ca_cert("/nonexistent/ca.pem");
        let err = TlsSocketFactory::from_config(&config).unwrap_err();
        assert!(matches!(err, DirError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn test_client_cert_requires_key() {
        let mut config = TlsConfig::enabled();
        config.client_cert_path = Some("/tmp/client.pem".to_string());
        assert!(matches!(
            TlsSocketFactory::from_config(&config),
            Err(DirError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_unknown_min_version_rejected() {
        let config = TlsConfig::enabled().with_min_tls_version("1.9");
        assert!(TlsSocketFactory::from_config(&config).is_err());
        assert!(matches!(parse_protocol("1.2"), Ok(Protocol::Tlsv12)));
    }
}
