//! LDAP directory context.
//!
//! An [`LdapDirContext`] owns a share of one [`Connection`]. Contexts obtained
//! from it through `lookup`, `create_subcontext`, `get_schema` and
//! `new_instance` share the same connection; the connection is unbound when
//! the last context holding it is closed.

use ldap3::adapters::{Adapter, PagedResults};
use ldap3::exop::Exop;
use ldap3::result::ExopResult;
use ldap3::{Ldap, LdapResult, Scope, SearchEntry, SearchOptions};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::LdapConfig;
use crate::cursor::{Cursor, VecCursor};
use crate::error::{result_code, DirError, DirResult};
use crate::filter;
use crate::name;
use crate::traits::{DirContext, LdapContext, ListCursor, ReferralMode, SearchCursor};
use crate::types::{
    env, Attributes, Control, Environment, ExtendedRequest, ExtendedResponse, ModificationItem,
    NameClassPair, SearchControls, SearchScope,
};

use super::connection::Connection;
use super::cursor::LdapSearchCursor;
use super::referral::ReferralOrigin;
use super::{
    entry_attributes, from_ldap_controls, to_ldap_attrs, to_ldap_mods, to_ldap_scope,
    to_raw_controls,
};

const DEFAULT_SCHEMA_DN: &str = "cn=schema";

/// Identity a context binds with.
#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) bind_dn: String,
    pub(crate) password: String,
}

impl Credentials {
    pub(crate) fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***REDACTED***")
            .finish()
    }
}

/// Directory context backed by an LDAP connection.
pub struct LdapDirContext {
    connection: Option<Arc<Connection>>,
    url: String,
    base: String,
    config: Arc<LdapConfig>,
    credentials: Credentials,
    environment: Environment,
    connect_controls: Vec<Control>,
    request_controls: Vec<Control>,
    response_controls: Vec<Control>,
}

impl LdapDirContext {
    /// Connect to the configured server and bind as `bind_dn`.
    ///
    /// `environment[provider_url]` overrides the configured server URL. The
    /// socket factory in scope on the calling thread, if any, configures the
    /// connection.
    pub fn connect(
        config: Arc<LdapConfig>,
        bind_dn: &str,
        password: &str,
        environment: Environment,
    ) -> DirResult<Self> {
        let url = environment
            .get(env::PROVIDER_URL)
            .cloned()
            .unwrap_or_else(|| config.url());
        let base = config.base_dn.clone();
        Self::open(
            &url,
            base,
            config,
            Credentials::new(bind_dn, password),
            environment,
            Vec::new(),
        )
    }

    #[instrument(
        skip(config, credentials, environment, connect_controls),
        fields(bind_dn = %credentials.bind_dn)
    )]
    pub(crate) fn open(
        url: &str,
        base: String,
        config: Arc<LdapConfig>,
        credentials: Credentials,
        mut environment: Environment,
        connect_controls: Vec<Control>,
    ) -> DirResult<Self> {
        let connection = Connection::open(
            url,
            &config,
            &credentials.bind_dn,
            &credentials.password,
            &connect_controls,
        )?;

        environment.insert(env::PROVIDER_URL.to_string(), url.to_string());
        if !credentials.bind_dn.is_empty() {
            environment.insert(
                env::SECURITY_PRINCIPAL.to_string(),
                credentials.bind_dn.clone(),
            );
        }

        Ok(Self {
            connection: Some(Arc::new(connection)),
            url: url.to_string(),
            base,
            config,
            credentials,
            environment,
            connect_controls,
            request_controls: Vec::new(),
            response_controls: Vec::new(),
        })
    }

    /// Referral handling currently in effect.
    pub fn referral_mode(&self) -> ReferralMode {
        self.environment
            .get(env::REFERRAL)
            .map(|v| ReferralMode::from_env_value(v))
            .unwrap_or(self.config.referral)
    }

    fn resolve(&self, name: &str) -> String {
        name::compose(name, &self.base)
    }

    /// Connection and a per-operation handle carrying this context's request
    /// controls and timeout.
    fn prepare(&self) -> DirResult<(Arc<Connection>, Ldap)> {
        let connection = self.connection.clone().ok_or(DirError::Closed)?;
        let mut ldap = connection.handle();
        if !self.request_controls.is_empty() {
            ldap.with_controls(to_raw_controls(&self.request_controls));
        }
        if let Some(timeout) = self.config.connection.read_timeout() {
            ldap.with_timeout(timeout);
        }
        Ok((connection, ldap))
    }

    fn origin(&self) -> ReferralOrigin {
        ReferralOrigin {
            config: Arc::clone(&self.config),
            credentials: self.credentials.clone(),
            environment: self.environment.clone(),
            connect_controls: self.connect_controls.clone(),
            mode: self.referral_mode(),
        }
    }

    /// Record response controls and map a non-success result to an error.
    fn check(&mut self, result: LdapResult, dn: &str) -> DirResult<()> {
        self.response_controls = from_ldap_controls(&result.ctrls);
        match result.rc {
            result_code::SUCCESS => Ok(()),
            result_code::REFERRAL => Err(self.origin().error(result.refs, dn)),
            _ => Err(DirError::from_ldap_result(&result, dn)),
        }
    }

    /// Context over the same connection rooted at `base`.
    fn child(&self, base: String, request_controls: Vec<Control>) -> Self {
        Self {
            connection: self.connection.clone(),
            url: self.url.clone(),
            base,
            config: Arc::clone(&self.config),
            credentials: self.credentials.clone(),
            environment: self.environment.clone(),
            connect_controls: self.connect_controls.clone(),
            request_controls,
            response_controls: Vec::new(),
        }
    }

    fn read_entry(&mut self, dn: &str, attrs: Vec<String>) -> DirResult<SearchEntry> {
        let (connection, mut ldap) = self.prepare()?;
        let ldap3::SearchResult(entries, result) = connection.block_on(ldap.search(
            dn,
            Scope::Base,
            filter::MATCH_ALL,
            attrs,
        ))?;
        self.check(result, dn)?;

        entries
            .into_iter()
            .find(|e| !e.is_ref() && !e.is_intermediate())
            .map(SearchEntry::construct)
            .ok_or_else(|| DirError::NameNotFound {
                name: dn.to_string(),
            })
    }

    fn delete_entry(&mut self, dn: &str) -> DirResult<()> {
        let (connection, mut ldap) = self.prepare()?;
        let result = connection.block_on(ldap.delete(dn))?;
        match self.check(result, dn) {
            Err(DirError::NameNotFound { .. }) => {
                debug!(dn = %dn, "Entry already absent");
                Ok(())
            }
            other => other,
        }
    }

    /// DN of the subschema entry governing `dn`.
    fn schema_dn(&mut self, dn: &str) -> DirResult<String> {
        let attrs = vec!["subschemaSubentry".to_string()];
        let entry = entry_attributes(self.read_entry(dn, attrs.clone())?);
        if let Some(schema_dn) = entry.get_first("subschemaSubentry") {
            return Ok(schema_dn.to_string());
        }

        let root_dse = entry_attributes(self.read_entry("", attrs)?);
        Ok(root_dse
            .get_first("subschemaSubentry")
            .unwrap_or(DEFAULT_SCHEMA_DN)
            .to_string())
    }

    fn release(connection: Arc<Connection>) {
        match Arc::try_unwrap(connection) {
            Ok(connection) => connection.unbind(),
            Err(shared) => {
                debug!(url = %shared.url(), "LDAP connection still shared, leaving it open");
            }
        }
    }
}

/// Page size for a search: its own setting, then the environment, then the
/// configuration.
fn effective_page_size(
    controls: &SearchControls,
    environment: &Environment,
    config: &LdapConfig,
) -> i32 {
    controls
        .page_size
        .or_else(|| environment.get(env::PAGE_SIZE).and_then(|v| v.parse().ok()))
        .unwrap_or(config.page_size)
}

/// LDAP time limits are whole seconds; round up so a small limit is not lost.
fn time_limit_secs(time_limit_ms: i32) -> i32 {
    if time_limit_ms <= 0 {
        0
    } else {
        time_limit_ms.saturating_add(999) / 1000
    }
}

fn requested_attributes(controls: &SearchControls) -> Vec<String> {
    match &controls.return_attributes {
        None => vec!["*".to_string()],
        // "1.1" asks for no attributes at all.
        Some(attrs) if attrs.is_empty() => vec!["1.1".to_string()],
        Some(attrs) => attrs.clone(),
    }
}

/// Names declared by a schema definition: `NAME 'x'` or `NAME ( 'x' 'y' )`.
fn definition_names(definition: &str) -> Vec<String> {
    let Some(idx) = definition.find("NAME") else {
        return Vec::new();
    };
    let after = definition[idx + 4..].trim_start();

    match after.strip_prefix('(') {
        Some(list) => list
            .split(')')
            .next()
            .unwrap_or_default()
            .split('\'')
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect(),
        None => after
            .split('\'')
            .nth(1)
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
    }
}

impl DirContext for LdapDirContext {
    #[instrument(skip(self, attrs), fields(base = %self.base))]
    fn bind(&mut self, name: &str, attrs: &Attributes) -> DirResult<()> {
        let dn = self.resolve(name);
        let (connection, mut ldap) = self.prepare()?;
        let result = connection.block_on(ldap.add(&dn, to_ldap_attrs(attrs)))?;
        self.check(result, &dn)?;
        debug!(dn = %dn, "LDAP entry created");
        Ok(())
    }

    fn rebind(&mut self, name: &str, attrs: &Attributes) -> DirResult<()> {
        self.unbind(name)?;
        self.bind(name, attrs)
    }

    #[instrument(skip(self), fields(base = %self.base))]
    fn unbind(&mut self, name: &str) -> DirResult<()> {
        let dn = self.resolve(name);
        self.delete_entry(&dn)
    }

    #[instrument(skip(self), fields(base = %self.base))]
    fn rename(&mut self, old_name: &str, new_name: &str) -> DirResult<()> {
        let old_dn = self.resolve(old_name);
        let new_dn = self.resolve(new_name);
        let (new_rdn, new_parent) = name::split_rdn(&new_dn);
        let (_, old_parent) = name::split_rdn(&old_dn);
        let new_superior = (!new_parent.eq_ignore_ascii_case(old_parent)).then_some(new_parent);

        let (connection, mut ldap) = self.prepare()?;
        let result = connection.block_on(ldap.modifydn(&old_dn, new_rdn, true, new_superior))?;
        self.check(result, &old_dn)?;
        debug!(from = %old_dn, to = %new_dn, "LDAP entry renamed");
        Ok(())
    }

    fn lookup(&mut self, name: &str) -> DirResult<Box<dyn DirContext>> {
        let dn = self.resolve(name);
        self.read_entry(&dn, vec!["1.1".to_string()])?;
        Ok(Box::new(self.child(dn, self.request_controls.clone())))
    }

    fn list(&mut self, name: &str) -> DirResult<ListCursor> {
        let controls =
            SearchControls::new(SearchScope::OneLevel).with_return_attributes(["objectClass"]);
        let mut cursor = self.search(name, filter::MATCH_ALL, &controls)?;

        let mut children = Vec::new();
        while let Some(result) = cursor.next_entry()? {
            let class_name = result
                .attributes
                .get("objectClass")
                .and_then(|classes| classes.last())
                .cloned();
            children.push(NameClassPair {
                name: result.name,
                class_name,
            });
        }
        Ok(Box::new(VecCursor::new(children)))
    }

    fn get_attributes(
        &mut self,
        name: &str,
        attr_ids: Option<&[&str]>,
    ) -> DirResult<Attributes> {
        let dn = self.resolve(name);
        let attrs = match attr_ids {
            Some(ids) => ids.iter().map(|id| id.to_string()).collect(),
            None => vec!["*".to_string()],
        };
        Ok(entry_attributes(self.read_entry(&dn, attrs)?))
    }

    #[instrument(skip(self, mods), fields(base = %self.base, mods = mods.len()))]
    fn modify_attributes(&mut self, name: &str, mods: &[ModificationItem]) -> DirResult<()> {
        if mods.is_empty() {
            return Ok(());
        }
        let dn = self.resolve(name);
        let (connection, mut ldap) = self.prepare()?;
        let result = connection.block_on(ldap.modify(&dn, to_ldap_mods(mods)))?;
        self.check(result, &dn)
    }

    fn create_subcontext(
        &mut self,
        name: &str,
        attrs: &Attributes,
    ) -> DirResult<Box<dyn DirContext>> {
        self.bind(name, attrs)?;
        Ok(Box::new(
            self.child(self.resolve(name), self.request_controls.clone()),
        ))
    }

    fn destroy_subcontext(&mut self, name: &str) -> DirResult<()> {
        let dn = self.resolve(name);
        self.delete_entry(&dn)
    }

    fn get_schema(&mut self, name: &str) -> DirResult<Box<dyn DirContext>> {
        let dn = self.resolve(name);
        let schema_dn = self.schema_dn(&dn)?;
        debug!(dn = %dn, schema_dn = %schema_dn, "Resolved subschema entry");
        Ok(Box::new(self.child(schema_dn, self.request_controls.clone())))
    }

    fn get_schema_class_definition(&mut self, name: &str) -> DirResult<Vec<String>> {
        let dn = self.resolve(name);
        let entry = entry_attributes(self.read_entry(&dn, vec!["objectClass".to_string()])?);
        let classes = entry.get("objectClass").unwrap_or_default().to_vec();

        let schema_dn = self.schema_dn(&dn)?;
        let schema =
            entry_attributes(self.read_entry(&schema_dn, vec!["objectClasses".to_string()])?);

        Ok(schema
            .get("objectClasses")
            .unwrap_or_default()
            .iter()
            .filter(|definition| {
                definition_names(definition)
                    .iter()
                    .any(|n| classes.iter().any(|c| c.eq_ignore_ascii_case(n)))
            })
            .cloned()
            .collect())
    }

    #[instrument(skip(self, controls), fields(base = %self.base, scope = ?controls.scope))]
    fn search(
        &mut self,
        name: &str,
        filter: &str,
        controls: &SearchControls,
    ) -> DirResult<SearchCursor> {
        let dn = self.resolve(name);
        let (connection, mut ldap) = self.prepare()?;

        let mut options = SearchOptions::new().typesonly(controls.types_only);
        if controls.count_limit > 0 {
            options = options.sizelimit(controls.count_limit);
        }
        let time_limit = time_limit_secs(controls.time_limit_ms);
        if time_limit > 0 {
            options = options.timelimit(time_limit);
        }
        ldap.with_search_options(options);

        let attrs = requested_attributes(controls);
        let scope = to_ldap_scope(controls.scope);
        let page_size = effective_page_size(controls, &self.environment, &self.config);

        debug!(dn = %dn, filter = %filter, page_size, "Starting LDAP search");

        let stream = if page_size > 0 {
            let adapters: Vec<Box<dyn Adapter<'static, String, Vec<String>>>> =
                vec![Box::new(PagedResults::new(page_size))];
            connection.block_on(ldap.streaming_search_with(adapters, &dn, scope, filter, attrs))?
        } else {
            connection.block_on(ldap.streaming_search(&dn, scope, filter, attrs))?
        };

        Ok(Box::new(LdapSearchCursor::new(
            connection,
            stream,
            dn,
            self.origin(),
        )))
    }

    fn compose_name(&self, name: &str, prefix: &str) -> DirResult<String> {
        Ok(name::compose(name, prefix))
    }

    fn name_in_namespace(&self) -> DirResult<String> {
        Ok(self.base.clone())
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
        if let Some(connection) = self.connection.take() {
            Self::release(connection);
        }
        Ok(())
    }

    fn as_ldap_context(&mut self) -> Option<&mut dyn LdapContext> {
        Some(self)
    }

    fn as_ldap_context_ref(&self) -> Option<&dyn LdapContext> {
        Some(self)
    }
}

impl LdapContext for LdapDirContext {
    #[instrument(skip(self, request), fields(oid = %request.oid))]
    fn extended_operation(&mut self, request: &ExtendedRequest) -> DirResult<ExtendedResponse> {
        let (connection, mut ldap) = self.prepare()?;
        let exop_result = connection.block_on(ldap.extended(Exop {
            name: Some(request.oid.clone()),
            val: request.value.clone(),
        }))?;
        let (response, result) = split_exop_result(exop_result);
        let dn = self.base.clone();
        self.check(result, &dn)?;
        Ok(response)
    }

    fn new_instance(&mut self, request_controls: &[Control]) -> DirResult<Box<dyn DirContext>> {
        if self.connection.is_none() {
            return Err(DirError::Closed);
        }
        Ok(Box::new(
            self.child(self.base.clone(), request_controls.to_vec()),
        ))
    }

    #[instrument(skip(self, connect_controls), fields(url = %self.url))]
    fn reconnect(&mut self, connect_controls: &[Control]) -> DirResult<()> {
        let connection = Connection::open(
            &self.url,
            &self.config,
            &self.credentials.bind_dn,
            &self.credentials.password,
            connect_controls,
        )?;
        self.connect_controls = connect_controls.to_vec();
        if let Some(previous) = self.connection.replace(Arc::new(connection)) {
            Self::release(previous);
        }
        Ok(())
    }

    fn connect_controls(&self) -> DirResult<Vec<Control>> {
        Ok(self.connect_controls.clone())
    }

    fn set_request_controls(&mut self, request_controls: &[Control]) -> DirResult<()> {
        self.request_controls = request_controls.to_vec();
        Ok(())
    }

    fn request_controls(&self) -> DirResult<Vec<Control>> {
        Ok(self.request_controls.clone())
    }

    fn response_controls(&self) -> DirResult<Vec<Control>> {
        Ok(self.response_controls.clone())
    }
}

impl std::fmt::Debug for LdapDirContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirContext")
            .field("url", &self.url)
            .field("base", &self.base)
            .field("bind_dn", &self.credentials.bind_dn)
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

fn split_exop_result(exop_result: ExopResult) -> (ExtendedResponse, LdapResult) {
    let ExopResult(exop, result) = exop_result;
    let response = ExtendedResponse {
        oid: exop.name,
        value: exop.val,
    };
    (response, result)
}
