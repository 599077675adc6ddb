// # Key Schema
//
// Every entity lives under `<bucket>:<kind>:<identifier>`.
//
// The kind tags are fixed-width and contain no separator, so two kinds can
// never produce the same key for any identifier string, and every kind owns
// a contiguous prefix range that can be enumerated on its own.
//
// Identifiers are not escaped. An identifier containing `:` still maps to a
// unique key, but callers that parse keys back must split on the first two
// separators only (see [`parse_key`]).

use std::fmt;

/// Namespace used when no bucket is configured
pub const DEFAULT_BUCKET: &str = "cert";

/// Separator between key segments
pub const KEY_SEPARATOR: char = ':';

/// Kind of entity stored by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Locally generated signing identity
    SelfSigner,
    /// ACME account registered with a certificate authority
    Account,
    /// Managed DNS zone
    Zone,
}

impl EntityKind {
    /// All kinds, in schema order
    pub const ALL: [EntityKind; 3] = [EntityKind::SelfSigner, EntityKind::Account, EntityKind::Zone];

    /// Tag written into the key for this kind
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::SelfSigner => "self",
            EntityKind::Account => "acme",
            EntityKind::Zone => "zone",
        }
    }

    /// Look up a kind by its key tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Derive the storage key for an entity
pub fn storage_key(bucket: &str, kind: EntityKind, id: &str) -> String {
    format!("{bucket}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{id}", kind.tag())
}

/// Derive the scan prefix covering every entity of `kind` whose identifier
/// starts with `prefix`
///
/// Has the same shape as [`storage_key`], so an empty `prefix` covers the
/// whole kind.
pub fn prefix_key(bucket: &str, kind: EntityKind, prefix: &str) -> String {
    storage_key(bucket, kind, prefix)
}

/// Split a storage key back into its kind and identifier
///
/// Returns `None` for keys outside `bucket` or with an unknown kind tag.
pub fn parse_key<'a>(bucket: &str, key: &'a str) -> Option<(EntityKind, &'a str)> {
    let rest = key.strip_prefix(bucket)?.strip_prefix(KEY_SEPARATOR)?;
    let (tag, id) = rest.split_once(KEY_SEPARATOR)?;
    EntityKind::from_tag(tag).map(|kind| (kind, id))
}
