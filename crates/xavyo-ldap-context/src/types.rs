//! Value types exchanged with directory contexts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known environment property names.
pub mod env {
    /// Referral handling: `"ignore"` or `"throw"`.
    pub const REFERRAL: &str = "referral";
    /// Default page size for searches that do not set one.
    pub const PAGE_SIZE: &str = "page_size";
    /// URL of the server the context is connected to.
    pub const PROVIDER_URL: &str = "provider_url";
    /// DN the context is bound as.
    pub const SECURITY_PRINCIPAL: &str = "security_principal";
}

/// Environment properties of a context.
pub type Environment = BTreeMap<String, String>;

/// Attributes of a directory entry.
///
/// Names keep the case they were inserted with; lookups ignore case, as LDAP
/// attribute descriptions do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(flatten)]
    values: BTreeMap<String, Vec<String>>,
}

impl Attributes {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(&self, name: &str) -> Option<String> {
        self.values
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Append a value to an attribute.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = self.key_for(&name).unwrap_or(name);
        self.values.entry(key).or_default().push(value.into());
    }

    /// Replace all values of an attribute.
    pub fn put(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        let key = self.key_for(&name).unwrap_or(name);
        self.values.insert(key, values);
    }

    /// Append a value using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    /// Get all values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Get the first value of an attribute.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let key = self.key_for(name)?;
        self.values.remove(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (name, values) in iter {
            attrs.put(name, values);
        }
        attrs
    }
}

/// Kind of attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModOp {
    Add,
    Replace,
    Remove,
}

/// One attribute modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationItem {
    pub op: ModOp,
    pub attribute: String,
    /// Values to add, replace with, or remove. Empty with [`ModOp::Remove`]
    /// removes the whole attribute.
    pub values: Vec<String>,
}

impl ModificationItem {
    pub fn new(op: ModOp, attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op,
            attribute: attribute.into(),
            values,
        }
    }

    /// Apply the same operation to every attribute of `attrs`.
    pub fn from_attributes(op: ModOp, attrs: &Attributes) -> Vec<Self> {
        attrs
            .iter()
            .map(|(name, values)| Self::new(op, name, values.to_vec()))
            .collect()
    }
}

/// How far below the base a search reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// The named entry only.
    Object,
    /// Immediate children of the named entry.
    #[default]
    OneLevel,
    /// The named entry and all its descendants.
    Subtree,
}

/// Parameters of a filter search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchControls {
    pub scope: SearchScope,
    /// Maximum number of entries, 0 for no limit.
    pub count_limit: i32,
    /// Server-side time limit in milliseconds, 0 for no limit.
    pub time_limit_ms: i32,
    /// Attributes to return, `None` for all user attributes.
    pub return_attributes: Option<Vec<String>>,
    /// Page size for the simple paged results control, `None` to use the
    /// context default.
    pub page_size: Option<i32>,
    pub types_only: bool,
}

impl SearchControls {
    pub fn new(scope: SearchScope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    pub fn with_return_attributes<S: Into<String>>(
        mut self,
        attrs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.return_attributes = Some(attrs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_count_limit(mut self, limit: i32) -> Self {
        self.count_limit = limit;
        self
    }

    pub fn with_time_limit_ms(mut self, limit: i32) -> Self {
        self.time_limit_ms = limit;
        self
    }

    pub fn with_page_size(mut self, size: i32) -> Self {
        self.page_size = Some(size);
        self
    }
}

/// One entry produced by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Name relative to the context and base the search ran against.
    pub name: String,
    /// Full distinguished name.
    pub full_name: String,
    pub attributes: Attributes,
}

/// One child produced by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameClassPair {
    pub name: String,
    /// Most specific structural object class, when the server returned one.
    pub class_name: Option<String>,
}

/// An LDAP request or response control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(oid: impl Into<String>, critical: bool, value: Option<Vec<u8>>) -> Self {
        Self {
            oid: oid.into(),
            critical,
            value,
        }
    }
}

/// An LDAP extended operation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub oid: String,
    pub value: Option<Vec<u8>>,
}

/// An LDAP extended operation response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedResponse {
    pub oid: Option<String>,
    pub value: Option<Vec<u8>>,
}
