//! Domain name helpers
//!
//! Zone names are stored without the trailing root dot. These helpers
//! convert between the two forms and clean up user supplied name lists.

use std::collections::BTreeSet;

/// Convert a name into a fully qualified name by appending a trailing dot
///
/// Empty names and names that already end with a dot are returned as-is.
pub fn to_fqdn(name: &str) -> String {
    if name.is_empty() || name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Strip a single trailing dot from a fully qualified name
pub fn un_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Canonical form of a zone name: surrounding whitespace trimmed and one
/// trailing dot stripped
pub fn canonical_zone(name: &str) -> &str {
    un_fqdn(name.trim())
}

/// Trim, drop empty entries and deduplicate a list of names
///
/// The result is sorted so that stored entities compare equal regardless
/// of the order names were supplied in.
pub fn normalize_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
