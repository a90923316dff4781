//! # LDAP Context
//!
//! Connection lifecycle wrapper for pooled LDAP directory contexts.
//!
//! A pool hands out [`ManagedContext`]s. A managed context forwards every
//! directory operation to the context it wraps, with three changes:
//!
//! - `close()` gives the context back through the close handler supplied at
//!   checkout. Contexts derived from it close their own connection.
//! - Operations that may open sockets run with the pool's TLS socket factory
//!   installed in a thread-scoped slot ([`socket_scope`]), including every
//!   pull from a search cursor.
//! - Referrals can be followed into new managed contexts that share the
//!   socket factory.
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_ldap_context::prelude::*;
//!
//! let config = LdapConfig::new("ldap.example.com", "dc=example,dc=com")
//!     .with_credentials("cn=admin,dc=example,dc=com", "secret")
//!     .with_ssl();
//!
//! let factory = SimpleDirContextFactory::new(config)?;
//! let mut ctx = factory.obtain_with_close_handler(ReferralMode::Throw, |ctx| {
//!     pool.give_back(ctx);
//!     Ok(())
//! })?;
//!
//! let controls = SearchControls::new(SearchScope::Subtree).with_page_size(100);
//! let mut results = ctx.search("ou=people", "(uid=jdoe)", &controls)?;
//! while let Some(entry) = results.next_entry()? {
//!     println!("{}", entry.full_name);
//! }
//! ctx.close()?; // back to the pool
//! ```
//!
//! ## Crate Organization
//!
//! - [`context`] - The managed context facade
//! - [`socket_scope`] - Thread-scoped socket factory slot
//! - [`cursor`] - Result cursors and the scoped cursor wrapper
//! - [`referral`] - Referral payload and following
//! - [`traits`] - Directory context capability traits
//! - [`ldap`] - `ldap3` backend
//! - [`config`] - Connection configuration
//! - [`error`] - Error types with transient/permanent classification

pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod ids;
pub mod ldap;
pub mod name;
pub mod referral;
pub mod socket_scope;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConnectionSettings, LdapConfig, TlsConfig};
    pub use crate::context::ManagedContext;
    pub use crate::cursor::{Cursor, ScopedCursor, VecCursor};
    pub use crate::error::{DirError, DirResult};
    pub use crate::ids::ContextId;
    pub use crate::ldap::{
        LdapDirContext, LdapInitialContextFactory, LdapReferral, SimpleDirContextFactory,
        TlsSocketFactory,
    };
    pub use crate::referral::{Referral, ReferralSource};
    pub use crate::socket_scope::SocketFactory;
    pub use crate::traits::{
        CloseHandler, DirContext, DirContextFactory, InitialContextFactory, LdapContext,
        ReferralMode, SearchCursor,
    };
    pub use crate::types::{
        Attributes, Control, Environment, ExtendedRequest, ExtendedResponse, ModOp,
        ModificationItem, NameClassPair, SearchControls, SearchResult, SearchScope,
    };
}

pub use config::LdapConfig;
pub use context::ManagedContext;
pub use error::{DirError, DirResult};
pub use ldap::SimpleDirContextFactory;
