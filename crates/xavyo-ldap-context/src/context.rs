//! Managed directory context
//!
//! [`ManagedContext`] stands in for the context a pool hands out. Callers use
//! it like any other [`DirContext`]; underneath it changes three things:
//!
//! - `close()` hands the underlying context to the close handler supplied at
//!   checkout instead of closing it. Contexts derived through
//!   [`LdapContext::new_instance`] or
//!   [`follow_referral`](ManagedContext::follow_referral) never carry the
//!   handler and close their own connection.
//! - Calls that may open sockets (reconnect, opening an initial context,
//!   referral resolution, and every pull from a search cursor) run with the
//!   context's socket factory installed in [`socket_scope`].
//! - LDAP-only operations fail with [`DirError::Unsupported`] when the
//!   underlying context does not provide [`LdapContext`].
//!
//! Everything else is forwarded unchanged, errors included.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cursor::ScopedCursor;
use crate::error::{DirError, DirResult};
use crate::ids::ContextId;
use crate::socket_scope::{self, SocketFactory};
use crate::traits::{
    CloseHandler, DirContext, InitialContextFactory, LdapContext, ListCursor, SearchCursor,
};
use crate::types::{
    Attributes, Control, Environment, ExtendedRequest, ExtendedResponse, ModificationItem,
    SearchControls,
};

/// Directory context with pooled close and scoped socket factory.
pub struct ManagedContext {
    id: ContextId,
    /// `None` once closed.
    inner: Option<Box<dyn DirContext>>,
    close_handler: Option<Box<dyn CloseHandler>>,
    socket_factory: Option<Arc<dyn SocketFactory>>,
}

impl ManagedContext {
    /// Wrap a context checked out of a pool; `close()` runs `close_handler`.
    pub fn pooled(
        inner: Box<dyn DirContext>,
        close_handler: impl CloseHandler + 'static,
        socket_factory: Option<Arc<dyn SocketFactory>>,
    ) -> Self {
        Self {
            id: ContextId::new(),
            inner: Some(inner),
            close_handler: Some(Box::new(close_handler)),
            socket_factory,
        }
    }

    /// Wrap a context derived from another one; `close()` closes it.
    pub fn derived(
        inner: Box<dyn DirContext>,
        socket_factory: Option<Arc<dyn SocketFactory>>,
    ) -> Self {
        let context = Self {
            id: ContextId::new(),
            inner: Some(inner),
            close_handler: None,
            socket_factory,
        };
        debug!(context_id = %context.id, "Created derived managed context");
        context
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn socket_factory(&self) -> Option<&Arc<dyn SocketFactory>> {
        self.socket_factory.as_ref()
    }

    /// Whether `close()` hands the context back instead of closing it.
    pub fn has_close_handler(&self) -> bool {
        self.close_handler.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Open a fresh context through `factory` with this context's socket
    /// factory in scope.
    ///
    /// The factory uses its own ambient configuration. The result is not
    /// wrapped: it is an ordinary context owned by the caller.
    pub fn new_initial_context(
        &self,
        factory: &dyn InitialContextFactory,
    ) -> DirResult<Box<dyn DirContext>> {
        if self.is_closed() {
            return Err(DirError::Closed);
        }
        let _scope = socket_scope::enter(self.socket_factory.as_ref());
        factory.initial_context()
    }

    fn delegate(&mut self) -> DirResult<&mut (dyn DirContext + 'static)> {
        match self.inner.as_deref_mut() {
            Some(inner) => Ok(inner),
            None => Err(DirError::Closed),
        }
    }

    fn delegate_ref(&self) -> DirResult<&(dyn DirContext + 'static)> {
        match self.inner.as_deref() {
            Some(inner) => Ok(inner),
            None => Err(DirError::Closed),
        }
    }

    fn ldap_delegate(&mut self, operation: &str) -> DirResult<&mut dyn LdapContext> {
        self.delegate()?
            .as_ldap_context()
            .ok_or_else(|| DirError::unsupported(operation))
    }

    fn ldap_delegate_ref(&self, operation: &str) -> DirResult<&dyn LdapContext> {
        self.delegate_ref()?
            .as_ldap_context_ref()
            .ok_or_else(|| DirError::unsupported(operation))
    }

    fn wrap(&self, cursor: SearchCursor) -> SearchCursor {
        Box::new(ScopedCursor::new(cursor, self.socket_factory.clone()))
    }
}

impl DirContext for ManagedContext {
    fn bind(&mut self, name: &str, attrs: &Attributes) -> DirResult<()> {
        self.delegate()?.bind(name, attrs)
    }

    fn rebind(&mut self, name: &str, attrs: &Attributes) -> DirResult<()> {
        self.delegate()?.rebind(name, attrs)
    }

    fn unbind(&mut self, name: &str) -> DirResult<()> {
        self.delegate()?.unbind(name)
    }

    fn rename(&mut self, old_name: &str, new_name: &str) -> DirResult<()> {
        self.delegate()?.rename(old_name, new_name)
    }

    fn lookup(&mut self, name: &str) -> DirResult<Box<dyn DirContext>> {
        self.delegate()?.lookup(name)
    }

    fn list(&mut self, name: &str) -> DirResult<ListCursor> {
        self.delegate()?.list(name)
    }

    fn get_attributes(
        &mut self,
        name: &str,
        attr_ids: Option<&[&str]>,
    ) -> DirResult<Attributes> {
        self.delegate()?.get_attributes(name, attr_ids)
    }

    fn modify_attributes(&mut self, name: &str, mods: &[ModificationItem]) -> DirResult<()> {
        self.delegate()?.modify_attributes(name, mods)
    }

    fn create_subcontext(
        &mut self,
        name: &str,
        attrs: &Attributes,
    ) -> DirResult<Box<dyn DirContext>> {
        self.delegate()?.create_subcontext(name, attrs)
    }

    fn destroy_subcontext(&mut self, name: &str) -> DirResult<()> {
        self.delegate()?.destroy_subcontext(name)
    }

    fn get_schema(&mut self, name: &str) -> DirResult<Box<dyn DirContext>> {
        self.delegate()?.get_schema(name)
    }

    fn get_schema_class_definition(&mut self, name: &str) -> DirResult<Vec<String>> {
        self.delegate()?.get_schema_class_definition(name)
    }

    fn search(
        &mut self,
        name: &str,
        filter: &str,
        controls: &SearchControls,
    ) -> DirResult<SearchCursor> {
        let cursor = self.delegate()?.search(name, filter, controls)?;
        Ok(self.wrap(cursor))
    }

    fn search_with_args(
        &mut self,
        name: &str,
        filter_expr: &str,
        filter_args: &[&str],
        controls: &SearchControls,
    ) -> DirResult<SearchCursor> {
        let cursor = self
            .delegate()?
            .search_with_args(name, filter_expr, filter_args, controls)?;
        Ok(self.wrap(cursor))
    }

    fn search_by_attributes(
        &mut self,
        name: &str,
        matching: &Attributes,
        return_attrs: Option<&[&str]>,
    ) -> DirResult<SearchCursor> {
        let cursor = self
            .delegate()?
            .search_by_attributes(name, matching, return_attrs)?;
        Ok(self.wrap(cursor))
    }

    fn compose_name(&self, name: &str, prefix: &str) -> DirResult<String> {
        self.delegate_ref()?.compose_name(name, prefix)
    }

    fn name_in_namespace(&self) -> DirResult<String> {
        self.delegate_ref()?.name_in_namespace()
    }

    fn environment(&self) -> DirResult<Environment> {
        self.delegate_ref()?.environment()
    }

    fn add_to_environment(&mut self, property: &str, value: &str) -> DirResult<Option<String>> {
        self.delegate()?.add_to_environment(property, value)
    }

    fn remove_from_environment(&mut self, property: &str) -> DirResult<Option<String>> {
        self.delegate()?.remove_from_environment(property)
    }

    fn close(&mut self) -> DirResult<()> {
        let Some(mut inner) = self.inner.take() else {
            debug!(context_id = %self.id, "Managed context already closed");
            return Ok(());
        };

        match self.close_handler.take() {
            Some(handler) => {
                debug!(context_id = %self.id, "Handing context back to close handler");
                handler.handle(inner)
            }
            None => {
                debug!(context_id = %self.id, "Closing underlying context");
                inner.close()
            }
        }
    }

    fn as_ldap_context(&mut self) -> Option<&mut dyn LdapContext> {
        Some(self)
    }

    fn as_ldap_context_ref(&self) -> Option<&dyn LdapContext> {
        Some(self)
    }
}

impl LdapContext for ManagedContext {
    fn extended_operation(&mut self, request: &ExtendedRequest) -> DirResult<ExtendedResponse> {
        self.ldap_delegate("extended_operation")?
            .extended_operation(request)
    }

    fn new_instance(&mut self, request_controls: &[Control]) -> DirResult<Box<dyn DirContext>> {
        let child = self
            .ldap_delegate("new_instance")?
            .new_instance(request_controls)?;
        Ok(Box::new(ManagedContext::derived(
            child,
            self.socket_factory.clone(),
        )))
    }

    fn reconnect(&mut self, connect_controls: &[Control]) -> DirResult<()> {
        let id = self.id;
        let factory = self.socket_factory.clone();
        let delegate = self.ldap_delegate("reconnect")?;
        debug!(context_id = %id, "Reconnecting managed context");
        let _scope = socket_scope::enter(factory.as_ref());
        delegate.reconnect(connect_controls)
    }

    fn connect_controls(&self) -> DirResult<Vec<Control>> {
        self.ldap_delegate_ref("connect_controls")?.connect_controls()
    }

    fn set_request_controls(&mut self, request_controls: &[Control]) -> DirResult<()> {
        self.ldap_delegate("set_request_controls")?
            .set_request_controls(request_controls)
    }

    fn request_controls(&self) -> DirResult<Vec<Control>> {
        self.ldap_delegate_ref("request_controls")?.request_controls()
    }

    fn response_controls(&self) -> DirResult<Vec<Control>> {
        self.ldap_delegate_ref("response_controls")?.response_controls()
    }
}

impl Drop for ManagedContext {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.close() {
                warn!(context_id = %self.id, error = %e, "Error closing dropped managed context");
            }
        }
    }
}

impl fmt::Debug for ManagedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedContext")
            .field("id", &self.id)
            .field("pooled", &self.close_handler.is_some())
            .field("socket_factory", &self.socket_factory)
            .field("inner", &self.inner)
            .finish()
    }
}
