//! LDAP referrals.
//!
//! A referral URL has the form `ldap[s]://host[:port]/dn`. Following it opens
//! a new connection to `host:port` with the credentials of the referring
//! context, rooted at `dn`.

use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::LdapConfig;
use crate::error::{DirError, DirResult};
use crate::referral::{Referral, ReferralSource};
use crate::traits::{DirContext, ReferralMode};
use crate::types::{Control, Environment};

use super::context::{Credentials, LdapDirContext};

/// Server address and base DN parsed from a referral URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralTarget {
    /// `scheme://host:port`, with the default port filled in.
    pub server_url: String,
    /// Decoded DN from the URL path, empty when the URL has none.
    pub dn: String,
}

impl ReferralTarget {
    pub fn parse(referral_url: &str) -> DirResult<Self> {
        let url = Url::parse(referral_url).map_err(|e| {
            DirError::invalid_data(format!("invalid referral URL {referral_url}: {e}"))
        })?;

        let default_port = match url.scheme() {
            "ldap" => 389,
            "ldaps" => 636,
            other => {
                return Err(DirError::invalid_data(format!(
                    "unsupported referral URL scheme: {other}"
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                DirError::invalid_data(format!("referral URL has no host: {referral_url}"))
            })?;
        let port = url.port().unwrap_or(default_port);

        let path = url.path().trim_start_matches('/');
        let dn = urlencoding::decode(path)
            .map_err(|e| DirError::invalid_data(format!("invalid DN in referral URL: {e}")))?
            .into_owned();

        Ok(Self {
            server_url: format!("{}://{}:{}", url.scheme(), host, port),
            dn,
        })
    }
}

/// What a context needs to follow referrals it receives.
#[derive(Debug, Clone)]
pub(crate) struct ReferralOrigin {
    pub(crate) config: Arc<LdapConfig>,
    pub(crate) credentials: Credentials,
    pub(crate) environment: Environment,
    pub(crate) connect_controls: Vec<Control>,
    pub(crate) mode: ReferralMode,
}

impl ReferralOrigin {
    /// Turn a referral result for `target` into the error the referral mode
    /// calls for.
    pub(crate) fn error(&self, urls: Vec<String>, target: &str) -> DirError {
        match self.mode {
            ReferralMode::Throw if !urls.is_empty() => {
                debug!(target_dn = %target, urls = ?urls, "Surfacing referral");
                Referral::new(LdapReferral::new(urls, target, self.clone())).into()
            }
            _ => {
                debug!(target_dn = %target, urls = ?urls, "Ignoring referral");
                DirError::PartialResult {
                    message: format!("referral for {target} not followed"),
                }
            }
        }
    }
}

/// Referral returned by an LDAP server.
#[derive(Debug)]
pub struct LdapReferral {
    urls: Vec<String>,
    index: usize,
    /// DN the referring operation targeted; used when a URL carries no DN.
    target: String,
    origin: ReferralOrigin,
}

impl LdapReferral {
    pub(crate) fn new(urls: Vec<String>, target: &str, origin: ReferralOrigin) -> Self {
        Self {
            urls,
            index: 0,
            target: target.to_string(),
            origin,
        }
    }

    /// The URL [`ReferralSource::referral_context`] will connect to.
    pub fn current_url(&self) -> Option<&str> {
        self.urls.get(self.index).map(String::as_str)
    }
}

impl ReferralSource for LdapReferral {
    fn urls(&self) -> &[String] {
        &self.urls
    }

    #[instrument(skip(self), fields(index = self.index, urls = self.urls.len()))]
    fn referral_context(&mut self) -> DirResult<Box<dyn DirContext>> {
        let url = self
            .current_url()
            .ok_or_else(|| DirError::invalid_data("referral has no URLs"))?;
        let target = ReferralTarget::parse(url)?;
        let base = if target.dn.is_empty() {
            self.target.clone()
        } else {
            target.dn
        };

        debug!(server = %target.server_url, base = %base, "Connecting to referred server");

        let context = LdapDirContext::open(
            &target.server_url,
            base,
            Arc::clone(&self.origin.config),
            self.origin.credentials.clone(),
            self.origin.environment.clone(),
            self.origin.connect_controls.clone(),
        )
        .inspect_err(|e| {
            warn!(server = %target.server_url, error = %e, "Referral connection failed");
        })?;

        Ok(Box::new(context))
    }

    fn skip_referral(&mut self) -> bool {
        if self.index + 1 < self.urls.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(mode: ReferralMode) -> ReferralOrigin {
        ReferralOrigin {
            config: Arc::new(LdapConfig::new("ldap.example.com", "dc=example,dc=com")),
            credentials: Credentials::new("", ""),
            environment: Environment::new(),
            connect_controls: Vec::new(),
            mode,
        }
    }

    #[test]
    fn test_parse_with_port_and_dn() {
        let target =
            ReferralTarget::parse("ldap://ldap2.example.com:1389/ou=People,dc=example,dc=com")
                .unwrap();
        assert_eq!(target.server_url, "ldap://ldap2.example.com:1389");
        assert_eq!(target.dn, "ou=People,dc=example,dc=com");
    }

    #[test]
    fn test_parse_default_ports() {
        let plain = ReferralTarget::parse("ldap://ldap2.example.com/dc=example").unwrap();
        assert_eq!(plain.server_url, "ldap://ldap2.example.com:389");

        let secure = ReferralTarget::parse("ldaps://ldap2.example.com").unwrap();
        assert_eq!(secure.server_url, "ldaps://ldap2.example.com:636");
        assert_eq!(secure.dn, "");
    }

    #[test]
    fn test_parse_decodes_dn() {
        let target =
            ReferralTarget::parse("ldap://h/cn=Smith%2C%20John,ou=People,dc=example").unwrap();
        assert_eq!(target.dn, "cn=Smith, John,ou=People,dc=example");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(matches!(
            ReferralTarget::parse("http://h/dc=example"),
            Err(DirError::InvalidData { .. })
        ));
        assert!(ReferralTarget::parse("not a url").is_err());
    }

    #[test]
    fn test_ignore_mode_yields_partial_result() {
        let err = origin(ReferralMode::Ignore).error(vec!["ldap://h/dc=x".into()], "dc=x");
        assert!(matches!(err, DirError::PartialResult { .. }));
    }

    #[test]
    fn test_throw_mode_yields_referral() {
        let err = origin(ReferralMode::Throw).error(
            vec!["ldap://a/dc=x".into(), "ldap://b/dc=x".into()],
            "dc=x",
        );
        let DirError::Referral(mut referral) = err else {
            panic!("expected a referral error");
        };
        assert_eq!(referral.urls().len(), 2);
        assert!(referral.skip_referral());
        assert!(!referral.skip_referral());
    }

    #[test]
    fn test_throw_mode_without_urls_is_partial_result() {
        let err = origin(ReferralMode::Throw).error(Vec::new(), "dc=x");
        assert!(matches!(err, DirError::PartialResult { .. }));
    }
}
