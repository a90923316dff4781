//! Distinguished name helpers.
//!
//! Context operations take names relative to the context's own name in the
//! namespace. LDAP names grow to the right, so composing `name` under
//! `prefix` yields `"name,prefix"`.

/// Compose `name` with `prefix` into a single distinguished name.
pub fn compose(name: &str, prefix: &str) -> String {
    let name = name.trim();
    let prefix = prefix.trim();
    match (name.is_empty(), prefix.is_empty()) {
        (true, _) => prefix.to_string(),
        (_, true) => name.to_string(),
        _ => format!("{name},{prefix}"),
    }
}

/// Express `dn` relative to `base`.
///
/// Returns `dn` unchanged when it is not below `base`.
pub fn relative_to(dn: &str, base: &str) -> String {
    if base.is_empty() {
        return dn.to_string();
    }
    if dn.eq_ignore_ascii_case(base) {
        return String::new();
    }
    if dn.len() > base.len() + 1 {
        let split = dn.len() - base.len();
        if dn.is_char_boundary(split)
            && dn[split..].eq_ignore_ascii_case(base)
            && dn[..split].ends_with(',')
        {
            return dn[..split - 1].to_string();
        }
    }
    dn.to_string()
}

/// Split a DN into its leftmost RDN and the parent DN.
///
/// Escaped commas (`\,`) do not separate components.
pub fn split_rdn(dn: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return (dn[..i].trim(), dn[i + 1..].trim()),
            _ => escaped = false,
        }
    }
    (dn.trim(), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose() {
        assert_eq!(compose("cn=a", "dc=example,dc=com"), "cn=a,dc=example,dc=com");
        assert_eq!(compose("", "dc=example"), "dc=example");
        assert_eq!(compose("cn=a", ""), "cn=a");
        assert_eq!(compose("", ""), "");
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to("cn=a,ou=people,dc=example", "ou=People,dc=Example"),
            "cn=a"
        );
        assert_eq!(relative_to("dc=example", "DC=example"), "");
        assert_eq!(relative_to("cn=a,dc=other", "dc=example"), "cn=a,dc=other");
        assert_eq!(relative_to("cn=a", ""), "cn=a");
        // A suffix match must start at a component boundary.
        assert_eq!(relative_to("cn=xdc=example", "dc=example"), "cn=xdc=example");
    }

    #[test]
    fn test_split_rdn() {
        assert_eq!(
            split_rdn("cn=a,ou=people,dc=example"),
            ("cn=a", "ou=people,dc=example")
        );
        assert_eq!(split_rdn("cn=Doe\\, John,dc=example"), ("cn=Doe\\, John", "dc=example"));
        assert_eq!(split_rdn("dc=example"), ("dc=example", ""));
    }
}
