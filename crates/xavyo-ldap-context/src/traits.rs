//! Directory context capability traits
//!
//! [`DirContext`] is the capability set every directory context provides.
//! [`LdapContext`] adds the LDAP-specific operations; a context advertises it
//! at runtime through [`DirContext::as_ldap_context`], so callers holding a
//! `Box<dyn DirContext>` can check for it without downcasting.

use std::fmt;

use crate::context::ManagedContext;
use crate::cursor::Cursor;
use crate::error::DirResult;
use crate::filter;
use crate::types::{
    Attributes, Control, Environment, ExtendedRequest, ExtendedResponse, ModificationItem,
    NameClassPair, SearchControls, SearchResult, SearchScope,
};

/// Lazy sequence of search results.
pub type SearchCursor = Box<dyn Cursor<SearchResult>>;

/// Lazy sequence of listed children.
pub type ListCursor = Box<dyn Cursor<NameClassPair>>;

/// Operations of a directory context.
///
/// All names are relative to the context's own name in the namespace.
pub trait DirContext: Send + fmt::Debug {
    /// Create a new entry with the given attributes.
    fn bind(&mut self, name: &str, attrs: &Attributes) -> DirResult<()>;

    /// Create or replace an entry.
    fn rebind(&mut self, name: &str, attrs: &Attributes) -> DirResult<()>;

    /// Remove an entry. Removing an entry that does not exist succeeds.
    fn unbind(&mut self, name: &str) -> DirResult<()>;

    fn rename(&mut self, old_name: &str, new_name: &str) -> DirResult<()>;

    /// Context rooted at the named entry.
    fn lookup(&mut self, name: &str) -> DirResult<Box<dyn DirContext>>;

    /// Immediate children of the named entry.
    fn list(&mut self, name: &str) -> DirResult<ListCursor>;

    /// Attributes of the named entry, restricted to `attr_ids` when given.
    fn get_attributes(&mut self, name: &str, attr_ids: Option<&[&str]>)
        -> DirResult<Attributes>;

    fn modify_attributes(&mut self, name: &str, mods: &[ModificationItem]) -> DirResult<()>;

    /// Create an entry and return a context rooted at it.
    fn create_subcontext(&mut self, name: &str, attrs: &Attributes)
        -> DirResult<Box<dyn DirContext>>;

    fn destroy_subcontext(&mut self, name: &str) -> DirResult<()>;

    /// Context rooted at the schema entry governing the named entry.
    fn get_schema(&mut self, name: &str) -> DirResult<Box<dyn DirContext>>;

    /// Schema definitions of the object classes of the named entry.
    fn get_schema_class_definition(&mut self, name: &str) -> DirResult<Vec<String>>;

    /// Search below `name` with an RFC 4515 filter.
    fn search(
        &mut self,
        name: &str,
        filter: &str,
        controls: &SearchControls,
    ) -> DirResult<SearchCursor>;

    /// Search with a filter expression whose `{n}` placeholders are replaced
    /// by the escaped `filter_args[n]`.
    fn search_with_args(
        &mut self,
        name: &str,
        filter_expr: &str,
        filter_args: &[&str],
        controls: &SearchControls,
    ) -> DirResult<SearchCursor> {
        let filter = filter::substitute_args(filter_expr, filter_args)?;
        self.search(name, &filter, controls)
    }

    /// One-level search for entries carrying all `matching` attribute values.
    fn search_by_attributes(
        &mut self,
        name: &str,
        matching: &Attributes,
        return_attrs: Option<&[&str]>,
    ) -> DirResult<SearchCursor> {
        let mut controls = SearchControls::new(SearchScope::OneLevel);
        if let Some(attrs) = return_attrs {
            controls = controls.with_return_attributes(attrs.iter().copied());
        }
        self.search(name, &filter::from_attributes(matching), &controls)
    }

    fn compose_name(&self, name: &str, prefix: &str) -> DirResult<String>;

    /// Full name of this context.
    fn name_in_namespace(&self) -> DirResult<String>;

    fn environment(&self) -> DirResult<Environment>;

    /// Set an environment property, returning its previous value.
    fn add_to_environment(&mut self, property: &str, value: &str) -> DirResult<Option<String>>;

    /// Remove an environment property, returning its previous value.
    fn remove_from_environment(&mut self, property: &str) -> DirResult<Option<String>>;

    /// Release the context. It must not be used afterwards.
    fn close(&mut self) -> DirResult<()>;

    /// The LDAP capability set, when this context supports it.
    fn as_ldap_context(&mut self) -> Option<&mut dyn LdapContext> {
        None
    }

    /// Shared-reference form of [`DirContext::as_ldap_context`].
    fn as_ldap_context_ref(&self) -> Option<&dyn LdapContext> {
        None
    }
}

/// LDAP-specific operations on top of [`DirContext`].
pub trait LdapContext: DirContext {
    fn extended_operation(&mut self, request: &ExtendedRequest) -> DirResult<ExtendedResponse>;

    /// Independent context over the same connection with its own request
    /// controls.
    fn new_instance(&mut self, request_controls: &[Control]) -> DirResult<Box<dyn DirContext>>;

    /// Re-establish the connection, sending `connect_controls` with the bind.
    fn reconnect(&mut self, connect_controls: &[Control]) -> DirResult<()>;

    fn connect_controls(&self) -> DirResult<Vec<Control>>;

    /// Controls sent with every subsequent request.
    fn set_request_controls(&mut self, request_controls: &[Control]) -> DirResult<()>;

    fn request_controls(&self) -> DirResult<Vec<Control>>;

    /// Controls returned with the last response.
    fn response_controls(&self) -> DirResult<Vec<Control>>;
}

/// Disposes of, or returns to a pool, the context behind a closed
/// [`ManagedContext`].
pub trait CloseHandler: Send {
    fn handle(self: Box<Self>, context: Box<dyn DirContext>) -> DirResult<()>;
}

impl<F> CloseHandler for F
where
    F: FnOnce(Box<dyn DirContext>) -> DirResult<()> + Send,
{
    fn handle(self: Box<Self>, context: Box<dyn DirContext>) -> DirResult<()> {
        (*self)(context)
    }
}

/// Opens fresh contexts using its own ambient configuration.
pub trait InitialContextFactory: Send + Sync {
    fn initial_context(&self) -> DirResult<Box<dyn DirContext>>;
}

/// How referrals returned by the server are surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralMode {
    /// Skip continuation references; a referral result becomes
    /// [`DirError::PartialResult`](crate::error::DirError::PartialResult).
    #[default]
    Ignore,
    /// Surface referrals as [`DirError::Referral`](crate::error::DirError::Referral).
    Throw,
}

impl ReferralMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralMode::Ignore => "ignore",
            ReferralMode::Throw => "throw",
        }
    }

    /// Parse an environment value; unknown values fall back to `Ignore`.
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("throw") {
            ReferralMode::Throw
        } else {
            ReferralMode::Ignore
        }
    }
}

/// Hands out managed contexts, as a connection pool's backing factory.
pub trait DirContextFactory: Send + Sync {
    /// Open a context bound with the configured identity.
    fn obtain_dir_context(&self, referral_mode: ReferralMode) -> DirResult<ManagedContext>;

    /// Open a context bound as `bind_dn`.
    fn obtain_with_credentials(
        &self,
        bind_dn: &str,
        password: &str,
        referral_mode: ReferralMode,
    ) -> DirResult<ManagedContext>;
}
