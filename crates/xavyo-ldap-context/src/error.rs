//! Directory error types
//!
//! Error definitions for directory operations, with transient/permanent
//! classification for the surrounding pool's retry decisions.

use ldap3::{LdapError, LdapResult};
use thiserror::Error;

use crate::referral::Referral;

/// LDAP result codes the error mapping cares about (RFC 4511 section 4.1.9).
pub mod result_code {
    pub const SUCCESS: u32 = 0;
    pub const TIME_LIMIT_EXCEEDED: u32 = 3;
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    pub const REFERRAL: u32 = 10;
    pub const ADMIN_LIMIT_EXCEEDED: u32 = 11;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    pub const BUSY: u32 = 51;
    pub const UNAVAILABLE: u32 = 52;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirError {
    // Native protocol errors, propagated unchanged by the managed context
    /// The named entry does not exist.
    #[error("name not found: {name}")]
    NameNotFound { name: String },

    /// An entry with this name already exists.
    #[error("name already bound: {name}")]
    NameAlreadyBound { name: String },

    /// Bind credentials were rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// The bound identity may not perform the operation.
    #[error("insufficient access rights for {operation}")]
    NoPermission { operation: String },

    /// A server-side size, time or administrative limit was hit.
    #[error("limit exceeded: {message}")]
    LimitExceeded { message: String },

    /// The server answered with a referral while referrals are ignored.
    #[error("partial result: {message}")]
    PartialResult { message: String },

    /// The client-side operation timeout elapsed.
    #[error("operation timed out: {message}")]
    Timeout { message: String },

    /// Transport-level failure (connect, TLS handshake, broken connection).
    #[error("communication failure: {message}")]
    Communication {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other non-success LDAP result.
    #[error("protocol error (result code {code}): {message}")]
    Protocol { code: u32, message: String },

    /// The server referred the operation to another server.
    #[error("{0}")]
    Referral(Referral),

    // Locally raised errors
    /// The underlying context lacks the extended LDAP capability set.
    #[error("operation not supported: {operation}")]
    Unsupported { operation: String },

    /// The context was already closed or handed back.
    #[error("context has been closed")]
    Closed,

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Malformed name, URL or value.
    #[error("invalid data: {message}")]
    InvalidData { message: String },
}

impl DirError {
    /// Check if this error is transient and the operation could be retried
    /// by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirError::Timeout { .. } | DirError::Communication { .. }
        ) || matches!(
            self,
            DirError::Protocol { code, .. }
                if *code == result_code::BUSY || *code == result_code::UNAVAILABLE
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirError::NameNotFound { .. } => "NAME_NOT_FOUND",
            DirError::NameAlreadyBound { .. } => "NAME_ALREADY_BOUND",
            DirError::AuthenticationFailed => "AUTH_FAILED",
            DirError::NoPermission { .. } => "NO_PERMISSION",
            DirError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            DirError::PartialResult { .. } => "PARTIAL_RESULT",
            DirError::Timeout { .. } => "TIMEOUT",
            DirError::Communication { .. } => "COMMUNICATION",
            DirError::Protocol { .. } => "PROTOCOL",
            DirError::Referral(_) => "REFERRAL",
            DirError::Unsupported { .. } => "UNSUPPORTED",
            DirError::Closed => "CLOSED",
            DirError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirError::InvalidData { .. } => "INVALID_DATA",
        }
    }

    // Convenience constructors

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        DirError::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        DirError::Communication {
            message: message.into(),
            source: None,
        }
    }

    /// Create a communication error with source.
    pub fn communication_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirError::Communication {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        DirError::InvalidData {
            message: message.into(),
        }
    }

    /// Map a non-success LDAP result for the entry `name`.
    ///
    /// Referral results (code 10) are not handled here: turning them into a
    /// [`DirError::Referral`] needs the connection context, see the `ldap`
    /// backend.
    pub fn from_ldap_result(result: &LdapResult, name: &str) -> Self {
        let message = if result.text.is_empty() {
            format!("result code {}", result.rc)
        } else {
            result.text.clone()
        };

        match result.rc {
            result_code::NO_SUCH_OBJECT => DirError::NameNotFound {
                name: name.to_string(),
            },
            result_code::ENTRY_ALREADY_EXISTS => DirError::NameAlreadyBound {
                name: name.to_string(),
            },
            result_code::INVALID_CREDENTIALS => DirError::AuthenticationFailed,
            result_code::INSUFFICIENT_ACCESS_RIGHTS => DirError::NoPermission {
                operation: format!("{name}: {message}"),
            },
            result_code::TIME_LIMIT_EXCEEDED
            | result_code::SIZE_LIMIT_EXCEEDED
            | result_code::ADMIN_LIMIT_EXCEEDED => DirError::LimitExceeded { message },
            code => DirError::Protocol { code, message },
        }
    }
}

impl From<LdapError> for DirError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::LdapResult { result } => {
                DirError::from_ldap_result(&result, &result.matched)
            }
            LdapError::Timeout { elapsed } => DirError::Timeout {
                message: elapsed.to_string(),
            },
            LdapError::Io { source } => {
                DirError::communication_with_source("I/O error on LDAP connection", source)
            }
            other => DirError::communication(format!("LDAP client error: {other}")),
        }
    }
}

/// Result type for directory operations.
pub type DirResult<T> = Result<T, DirError>;
