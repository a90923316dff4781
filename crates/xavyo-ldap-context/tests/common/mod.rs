//! In-process fakes shared by the integration tests.
//!
//! Every fake records the operations it receives together with the socket
//! factory that was in scope at the time.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use ldap3::LdapConnSettings;
use xavyo_ldap_context::cursor::Cursor;
use xavyo_ldap_context::error::{DirError, DirResult};
use xavyo_ldap_context::referral::ReferralSource;
use xavyo_ldap_context::socket_scope::{self, SocketFactory};
use xavyo_ldap_context::traits::{
    CloseHandler, DirContext, InitialContextFactory, LdapContext, ListCursor, SearchCursor,
};
use xavyo_ldap_context::types::{
    Attributes, Control, Environment, ExtendedRequest, ExtendedResponse, ModificationItem,
    SearchControls, SearchResult,
};

// =============================================================================
// Event log
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Which fake and which call, e.g. `"ctx.bind"`.
    pub op: String,
    /// Description of the socket factory in scope during the call.
    pub factory: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op: impl Into<String>) {
        self.0.lock().push(Event {
            op: op.into(),
            factory: socket_scope::current().map(|f| f.describe()),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn ops(&self) -> Vec<String> {
        self.0.lock().iter().map(|e| e.op.clone()).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.0.lock().iter().filter(|e| e.op == op).count()
    }

    /// Factory seen by the first call named `op`.
    pub fn factory_for(&self, op: &str) -> Option<Option<String>> {
        self.0
            .lock()
            .iter()
            .find(|e| e.op == op)
            .map(|e| e.factory.clone())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Socket factory
// =============================================================================

#[derive(Debug)]
pub struct NamedFactory(pub &'static str);

impl SocketFactory for NamedFactory {
    fn configure(&self, settings: LdapConnSettings) -> LdapConnSettings {
        settings
    }

    fn describe(&self) -> String {
        self.0.to_string()
    }
}

pub fn factory(name: &'static str) -> Arc<dyn SocketFactory> {
    Arc::new(NamedFactory(name))
}

// =============================================================================
// Directory context
// =============================================================================

/// Fake context. With `ldap` set it also provides [`LdapContext`].
#[derive(Debug, Clone)]
pub struct FakeContext {
    pub name: String,
    pub log: Log,
    pub ldap: bool,
    pub entries: Vec<SearchResult>,
    /// When set, every operation fails with the error it builds.
    pub failure: Option<fn() -> DirError>,
    pub environment: Environment,
    pub request_controls: Vec<Control>,
    pub connect_controls: Vec<Control>,
}

impl FakeContext {
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            ldap: false,
            entries: Vec::new(),
            failure: None,
            environment: Environment::new(),
            request_controls: Vec::new(),
            connect_controls: Vec::new(),
        }
    }

    pub fn ldap(name: &str, log: &Log) -> Self {
        Self {
            ldap: true,
            ..Self::new(name, log)
        }
    }

    pub fn with_entries(mut self, entries: Vec<SearchResult>) -> Self {
        self.entries = entries;
        self
    }

    pub fn failing(mut self, failure: fn() -> DirError) -> Self {
        self.failure = Some(failure);
        self
    }

    fn call(&self, op: &str) -> DirResult<()> {
        self.log.record(format!("{}.{}", self.name, op));
        match self.failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }

    fn child(&self, suffix: &str) -> Self {
        Self {
            name: format!("{}/{}", self.name, suffix),
            ..self.clone()
        }
    }
}

impl DirContext for FakeContext {
    fn bind(&mut self, _name: &str, _attrs: &Attributes) -> DirResult<()> {
        self.call("bind")
    }

    fn rebind(&mut self, _name: &str, _attrs: &Attributes) -> DirResult<()> {
        self.call("rebind")
    }

    fn unbind(&mut self, _name: &str) -> DirResult<()> {
        self.call("unbind")
    }

    fn rename(&mut self, _old_name: &str, _new_name: &str) -> DirResult<()> {
        self.call("rename")
    }

    fn lookup(&mut self, name: &str) -> DirResult<Box<dyn DirContext>> {
        self.call("lookup")?;
        Ok(Box::new(self.child(name)))
    }

    fn list(&mut self, _name: &str) -> DirResult<ListCursor> {
        self.call("list")?;
        Ok(Box::new(xavyo_ldap_context::cursor::VecCursor::new(Vec::new())))
    }

    fn get_attributes(
        &mut self,
        name: &str,
        _attr_ids: Option<&[&str]>,
    ) -> DirResult<Attributes> {
        self.call("get_attributes")?;
        Ok(Attributes::new().with("cn", name))
    }

    fn modify_attributes(&mut self, _name: &str, _mods: &[ModificationItem]) -> DirResult<()> {
        self.call("modify_attributes")
    }

    fn create_subcontext(
        &mut self,
        name: &str,
        _attrs: &Attributes,
    ) -> DirResult<Box<dyn DirContext>> {
        self.call("create_subcontext")?;
        Ok(Box::new(self.child(name)))
    }

    fn destroy_subcontext(&mut self, _name: &str) -> DirResult<()> {
        self.call("destroy_subcontext")
    }

    fn get_schema(&mut self, _name: &str) -> DirResult<Box<dyn DirContext>> {
        self.call("get_schema")?;
        Ok(Box::new(self.child("schema")))
    }

    fn get_schema_class_definition(&mut self, _name: &str) -> DirResult<Vec<String>> {
        self.call("get_schema_class_definition")?;
        Ok(vec!["( 2.5.6.6 NAME 'person' SUP top STRUCTURAL )".to_string()])
    }

    fn search(
        &mut self,
        _name: &str,
        filter: &str,
        _controls: &SearchControls,
    ) -> DirResult<SearchCursor> {
        self.call(&format!("search {filter}"))?;
        Ok(Box::new(FakeCursor::new(&self.log, self.entries.clone())))
    }

    fn compose_name(&self, name: &str, prefix: &str) -> DirResult<String> {
        Ok(format!("{name},{prefix}"))
    }

    fn name_in_namespace(&self) -> DirResult<String> {
        Ok(self.name.clone())
    }

    fn environment(&self) -> DirResult<Environment> {
        Ok(self.environment.clone())
    }

    fn add_to_environment(&mut self, property: &str, value: &str) -> DirResult<Option<String>> {
        Ok(self
            .environment
            .insert(property.to_string(), value.to_string()))
    }

    fn remove_from_environment(&mut self, property: &str) -> DirResult<Option<String>> {
        Ok(self.environment.remove(property))
    }

    fn close(&mut self) -> DirResult<()> {
        self.call("close")
    }

    fn as_ldap_context(&mut self) -> Option<&mut dyn LdapContext> {
        if self.ldap {
            Some(self)
        } else {
            None
        }
    }

    fn as_ldap_context_ref(&self) -> Option<&dyn LdapContext> {
        if self.ldap {
            Some(self)
        } else {
            None
        }
    }
}

impl LdapContext for FakeContext {
    fn extended_operation(&mut self, request: &ExtendedRequest) -> DirResult<ExtendedResponse> {
        self.call("extended_operation")?;
        Ok(ExtendedResponse {
            oid: Some(request.oid.clone()),
            value: request.value.clone(),
        })
    }

    fn new_instance(&mut self, request_controls: &[Control]) -> DirResult<Box<dyn DirContext>> {
        self.call("new_instance")?;
        let mut child = self.child("instance");
        child.request_controls = request_controls.to_vec();
        Ok(Box::new(child))
    }

    fn reconnect(&mut self, connect_controls: &[Control]) -> DirResult<()> {
        self.call("reconnect")?;
        self.connect_controls = connect_controls.to_vec();
        Ok(())
    }

    fn connect_controls(&self) -> DirResult<Vec<Control>> {
        Ok(self.connect_controls.clone())
    }

    fn set_request_controls(&mut self, request_controls: &[Control]) -> DirResult<()> {
        self.call("set_request_controls")?;
        self.request_controls = request_controls.to_vec();
        Ok(())
    }

    fn request_controls(&self) -> DirResult<Vec<Control>> {
        Ok(self.request_controls.clone())
    }

    fn response_controls(&self) -> DirResult<Vec<Control>> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Cursor
// =============================================================================

pub struct FakeCursor {
    log: Log,
    items: VecDeque<SearchResult>,
}

impl FakeCursor {
    pub fn new(log: &Log, items: Vec<SearchResult>) -> Self {
        Self {
            log: log.clone(),
            items: items.into(),
        }
    }
}

impl Cursor<SearchResult> for FakeCursor {
    fn has_more(&mut self) -> DirResult<bool> {
        self.log.record("cursor.has_more");
        Ok(!self.items.is_empty())
    }

    fn next_entry(&mut self) -> DirResult<Option<SearchResult>> {
        self.log.record("cursor.next");
        Ok(self.items.pop_front())
    }

    fn close(&mut self) -> DirResult<()> {
        self.log.record("cursor.close");
        Ok(())
    }
}

pub fn entry(rdn: &str) -> SearchResult {
    SearchResult {
        name: rdn.to_string(),
        full_name: format!("{rdn},dc=example,dc=com"),
        attributes: Attributes::new().with("cn", rdn.trim_start_matches("cn=")),
    }
}

// =============================================================================
// Referral and initial context factory
// =============================================================================

/// Referral over several URLs; connecting to a URL listed in `down` fails.
#[derive(Debug)]
pub struct FakeReferral {
    pub urls: Vec<String>,
    pub log: Log,
    pub down: Vec<String>,
    index: usize,
}

impl FakeReferral {
    pub fn new(urls: &[&str], log: &Log) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            log: log.clone(),
            down: Vec::new(),
            index: 0,
        }
    }

    pub fn with_down(mut self, url: &str) -> Self {
        self.down.push(url.to_string());
        self
    }
}

impl ReferralSource for FakeReferral {
    fn urls(&self) -> &[String] {
        &self.urls
    }

    fn referral_context(&mut self) -> DirResult<Box<dyn DirContext>> {
        let url = self.urls.get(self.index).cloned().unwrap_or_default();
        self.log.record(format!("referral.connect {url}"));
        if self.down.contains(&url) {
            return Err(DirError::communication(format!("{url} unreachable")));
        }
        Ok(Box::new(FakeContext::ldap("referred", &self.log)))
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

pub struct FakeInitialFactory {
    pub log: Log,
    pub fail: bool,
}

impl InitialContextFactory for FakeInitialFactory {
    fn initial_context(&self) -> DirResult<Box<dyn DirContext>> {
        self.log.record("factory.initial_context");
        if self.fail {
            return Err(DirError::communication("directory unreachable"));
        }
        Ok(Box::new(FakeContext::ldap("initial", &self.log)))
    }
}

// =============================================================================
// Close handler
// =============================================================================

/// Contexts handed back through a recording close handler.
#[derive(Clone, Default)]
pub struct Returned(Arc<Mutex<Vec<Box<dyn DirContext>>>>);

impl Returned {
    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| c.name_in_namespace().ok())
            .collect()
    }
}

/// Close handler that keeps the context, as a pool would.
pub fn pool_handler() -> (impl CloseHandler, Returned) {
    let returned = Returned::default();
    let sink = returned.clone();
    let handler = move |context: Box<dyn DirContext>| -> DirResult<()> {
        sink.0.lock().push(context);
        Ok(())
    };
    (handler, returned)
}
