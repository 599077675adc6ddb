//! Entities persisted by the certificate repository
//!
//! Each entity is keyed independently by its identifier. There is no
//! referential constraint between kinds, and no copy is cached in memory:
//! the store is the single source of truth.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::fqdn::{canonical_zone, normalize_names, to_fqdn};
use crate::keys::EntityKind;

/// A typed entity that can be stored by the repository
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind tag used in the storage key
    const KIND: EntityKind;

    /// Identifier unique within the entity's kind
    fn id(&self) -> &str;
}

/// Private key algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyType {
    #[default]
    #[serde(rename = "RSA2048")]
    Rsa2048,
    #[serde(rename = "RSA4096")]
    Rsa4096,
    #[serde(rename = "RSA8192")]
    Rsa8192,
    #[serde(rename = "EC256")]
    Ec256,
    #[serde(rename = "EC384")]
    Ec384,
}

impl KeyType {
    /// Parse an algorithm name, case-insensitively
    ///
    /// Unknown names fall back to [`KeyType::Rsa2048`].
    pub fn parse_lenient(algorithm: &str) -> Self {
        match algorithm.trim().to_ascii_uppercase().as_str() {
            "RSA4096" => KeyType::Rsa4096,
            "RSA8192" => KeyType::Rsa8192,
            "EC256" => KeyType::Ec256,
            "EC384" => KeyType::Ec384,
            _ => KeyType::Rsa2048,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa2048 => "RSA2048",
            KeyType::Rsa4096 => "RSA4096",
            KeyType::Rsa8192 => "RSA8192",
            KeyType::Ec256 => "EC256",
            KeyType::Ec384 => "EC384",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locally generated signing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfSigner {
    /// Unique signer name
    pub name: String,
    /// Algorithm of the signing key
    pub key_type: KeyType,
    /// PEM encoded CA certificate
    #[serde(default)]
    pub certificate_pem: String,
    /// PEM encoded private key
    #[serde(default)]
    pub private_key_pem: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl SelfSigner {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            certificate_pem: String::new(),
            private_key_pem: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach the generated certificate and key material
    pub fn with_material(
        mut self,
        certificate_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        self.certificate_pem = certificate_pem.into();
        self.private_key_pem = private_key_pem.into();
        self
    }
}

impl Entity for SelfSigner {
    const KIND: EntityKind = EntityKind::SelfSigner;

    fn id(&self) -> &str {
        &self.name
    }
}

/// Account registered with an ACME certificate authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeAccount {
    /// Contact email, unique per account
    pub email: String,
    /// ACME directory the account is registered with
    pub directory_url: String,
    /// Algorithm of the account key
    pub key_type: KeyType,
    /// PEM encoded account key
    #[serde(default)]
    pub private_key_pem: String,
    /// Account URI returned by the CA on registration
    #[serde(default)]
    pub registration_uri: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AcmeAccount {
    pub fn new(email: impl Into<String>, directory_url: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            email: email.into(),
            directory_url: directory_url.into(),
            key_type,
            private_key_pem: String::new(),
            registration_uri: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_private_key(mut self, private_key_pem: impl Into<String>) -> Self {
        self.private_key_pem = private_key_pem.into();
        self
    }

    pub fn with_registration(mut self, uri: impl Into<String>) -> Self {
        self.registration_uri = Some(uri.into());
        self
    }
}

impl Entity for AcmeAccount {
    const KIND: EntityKind = EntityKind::Account;

    fn id(&self) -> &str {
        &self.email
    }
}

/// Managed DNS zone
///
/// The zone name is always stored without its trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Canonical zone name (e.g. "example.com")
    pub zone: String,
    /// Name of the DNS challenge provider serving this zone
    pub provider: String,
    /// Provider API token, if not taken from configuration
    #[serde(default)]
    pub token: Option<String>,
    /// Domains within the zone to issue certificates for
    #[serde(default)]
    pub domains: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Zone {
    /// Create a zone, canonicalizing its name
    pub fn new(zone: impl AsRef<str>, provider: impl Into<String>) -> Self {
        Self {
            zone: canonical_zone(zone.as_ref()).to_string(),
            provider: provider.into(),
            token: None,
            domains: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.domains = normalize_names(domains);
        self
    }

    /// The zone name with a trailing dot
    pub fn fqdn(&self) -> String {
        to_fqdn(&self.zone)
    }

    /// Whether the zone name is already in canonical form
    pub fn is_canonical(&self) -> bool {
        canonical_zone(&self.zone).len() == self.zone.len()
    }
}

impl Entity for Zone {
    const KIND: EntityKind = EntityKind::Zone;

    fn id(&self) -> &str {
        &self.zone
    }
}
