//! Identifier case folding.
//!
//! Object type names and column names are compared ordinally after ASCII
//! lowercasing, independent of any locale.

/// Normalize an identifier for comparisons and map keys.
pub fn normalize_identifier(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Compare two identifiers ignoring ASCII case and surrounding whitespace.
pub fn identifiers_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Strip one level of double quotes from an identifier (`"Col"` -> `Col`).
pub(crate) fn unquote(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .unwrap_or(name)
}
