//! LDAP filter construction for the search overloads that do not take a
//! ready-made filter string.

use crate::error::{DirError, DirResult};
use crate::types::Attributes;

/// Filter matching every entry.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Build a conjunction requiring every given attribute value.
///
/// An attribute without values only has to be present.
pub fn from_attributes(matching: &Attributes) -> String {
    let mut parts = Vec::new();
    for (name, values) in matching.iter() {
        if values.is_empty() {
            parts.push(format!("({name}=*)"));
        }
        for value in values {
            parts.push(format!("({}={})", name, escape_value(value)));
        }
    }

    match parts.len() {
        0 => MATCH_ALL.to_string(),
        1 => parts.remove(0),
        _ => format!("(&{})", parts.join("")),
    }
}

/// Replace `{n}` placeholders in `expr` with the escaped `args[n]`.
pub fn substitute_args(expr: &str, args: &[&str]) -> DirResult<String> {
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.char_indices();

    while let Some((start, ch)) = chars.next() {
        if ch != '{' {
            out.push(ch);
            continue;
        }

        let end = expr[start..]
            .find('}')
            .map(|offset| start + offset)
            .ok_or_else(|| {
                DirError::invalid_data(format!("unterminated placeholder in filter '{expr}'"))
            })?;
        let index: usize = expr[start + 1..end].trim().parse().map_err(|_| {
            DirError::invalid_data(format!(
                "invalid placeholder '{}' in filter '{expr}'",
                &expr[start..=end]
            ))
        })?;
        let arg = args.get(index).ok_or_else(|| {
            DirError::invalid_data(format!(
                "filter '{expr}' references argument {index} but only {} given",
                args.len()
            ))
        })?;
        out.push_str(&escape_value(arg));

        // Skip past the closing brace.
        for (pos, _) in chars.by_ref() {
            if pos == end {
                break;
            }
        }
    }

    Ok(out)
}
