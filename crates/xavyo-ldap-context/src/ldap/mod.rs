//! `ldap3` backend.
//!
//! [`LdapDirContext`] implements [`DirContext`](crate::traits::DirContext) and
//! [`LdapContext`](crate::traits::LdapContext) over a blocking wrapper of an
//! `ldap3` connection. Every place that opens a connection reads the socket
//! factory from [`socket_scope`](crate::socket_scope).

mod connection;
pub mod context;
mod cursor;
pub mod factory;
pub mod referral;
pub mod tls;

pub use context::LdapDirContext;
pub use factory::{LdapInitialContextFactory, SimpleDirContextFactory};
pub use referral::LdapReferral;
pub use tls::TlsSocketFactory;

use base64::Engine;
use ldap3::controls::RawControl;
use ldap3::{Mod, Scope, SearchEntry};
use std::collections::HashSet;

use crate::name;
use crate::types::{Attributes, Control, ModOp, ModificationItem, SearchResult, SearchScope};

fn to_raw_controls(controls: &[Control]) -> Vec<RawControl> {
    controls
        .iter()
        .map(|c| RawControl {
            ctype: c.oid.clone(),
            crit: c.critical,
            val: c.value.clone(),
        })
        .collect()
}

fn from_ldap_controls(controls: &[ldap3::controls::Control]) -> Vec<Control> {
    controls
        .iter()
        .map(|c| Control::new(c.1.ctype.clone(), c.1.crit, c.1.val.clone()))
        .collect()
}

fn to_ldap_mods(mods: &[ModificationItem]) -> Vec<Mod<String>> {
    mods.iter()
        .map(|m| {
            let values: HashSet<String> = m.values.iter().cloned().collect();
            match m.op {
                ModOp::Add => Mod::Add(m.attribute.clone(), values),
                ModOp::Replace => Mod::Replace(m.attribute.clone(), values),
                ModOp::Remove => Mod::Delete(m.attribute.clone(), values),
            }
        })
        .collect()
}

fn to_ldap_attrs(attrs: &Attributes) -> Vec<(String, HashSet<String>)> {
    attrs
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| (name.to_string(), values.iter().cloned().collect()))
        .collect()
}

fn to_ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Object => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Convert an LDAP search entry to attributes. Binary values are base64
/// encoded.
fn entry_attributes(entry: SearchEntry) -> Attributes {
    let mut attrs: Attributes = entry.attrs.into_iter().collect();
    for (name, values) in entry.bin_attrs {
        attrs.put(
            name,
            values
                .iter()
                .map(|v| base64::engine::general_purpose::STANDARD.encode(v))
                .collect(),
        );
    }
    attrs
}

fn entry_to_result(entry: SearchEntry, base: &str) -> SearchResult {
    let full_name = entry.dn.clone();
    SearchResult {
        name: name::relative_to(&full_name, base),
        full_name,
        attributes: entry_attributes(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(dn: &str) -> SearchEntry {
        let mut attrs = HashMap::new();
        attrs.insert("cn".to_string(), vec!["Jane".to_string()]);
        let mut bin_attrs = HashMap::new();
        bin_attrs.insert("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]]);
        SearchEntry {
            dn: dn.to_string(),
            attrs,
            bin_attrs,
        }
    }

    #[test]
    fn test_entry_to_result_is_relative_to_base() {
        let result = entry_to_result(entry("cn=Jane,ou=people,dc=example"), "dc=example");
        assert_eq!(result.name, "cn=Jane,ou=people");
        assert_eq!(result.full_name, "cn=Jane,ou=people,dc=example");
        assert_eq!(result.attributes.get_first("cn"), Some("Jane"));
        assert_eq!(result.attributes.get_first("jpegphoto"), Some("/9g="));
    }

    #[test]
    fn test_mods_conversion() {
        let mods = to_ldap_mods(&[
            ModificationItem::new(ModOp::Replace, "mail", vec!["a@example.com".to_string()]),
            ModificationItem::new(ModOp::Remove, "description", vec![]),
        ]);
        assert!(matches!(&mods[0], Mod::Replace(attr, values)
            if attr == "mail" && values.contains("a@example.com")));
        assert!(matches!(&mods[1], Mod::Delete(attr, values)
            if attr == "description" && values.is_empty()));
    }

    #[test]
    fn test_raw_controls_carry_fields() {
        let raw = to_raw_controls(&[Control::new("1.2.840.113556.1.4.319", true, None)]);
        assert_eq!(raw[0].ctype, "1.2.840.113556.1.4.319");
        assert!(raw[0].crit);
        assert!(raw[0].val.is_none());
    }

    #[test]
    fn test_empty_attributes_are_not_sent() {
        let mut attrs = Attributes::new().with("cn", "x");
        attrs.put("description", vec![]);
        let ldap_attrs = to_ldap_attrs(&attrs);
        assert_eq!(ldap_attrs.len(), 1);
        assert_eq!(ldap_attrs[0].0, "cn");
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(to_ldap_scope(SearchScope::Object), Scope::Base));
        assert!(matches!(to_ldap_scope(SearchScope::Subtree), Scope::Subtree));
    }
}
