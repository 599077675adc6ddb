//! Plugin-based DNS challenge registry
//!
//! Challenge adapters are registered by name at startup and selected by
//! configuration, so adding a DNS provider never touches core code.
//!
//! ## Registration
//!
//! Adapter crates should expose a `register()` function:
//!
//! ```rust,ignore
//! use certrepo_core::ChallengeRegistry;
//!
//! pub fn register(registry: &ChallengeRegistry) {
//!     registry.register_challenge("netlify", Box::new(NetlifyFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::config::ChallengeConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsChallenge, DnsChallengeFactory};

/// Registry of DNS challenge adapter factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ChallengeRegistry {
    factories: RwLock<HashMap<String, Box<dyn DnsChallengeFactory>>>,
}

impl ChallengeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a challenge adapter factory
    ///
    /// Registering a name twice replaces the earlier factory.
    pub fn register_challenge(
        &self,
        name: impl Into<String>,
        factory: Box<dyn DnsChallengeFactory>,
    ) {
        let name = name.into();
        debug!("Registering DNS challenge provider {}", name);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, factory);
    }

    /// Create a challenge adapter from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsChallenge>)`: Created adapter instance
    /// - `Err(Error)`: If the provider is not registered, the configuration
    ///   is invalid, or creation fails
    pub fn create_challenge(&self, config: &ChallengeConfig) -> Result<Box<dyn DnsChallenge>> {
        config.validate()?;

        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories.get(&config.provider).ok_or_else(|| {
            Error::config(format!("Unknown challenge provider: {}", config.provider))
        })?;

        factory.create(config)
    }

    /// List all registered provider names
    pub fn list_challenges(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered
    pub fn has_challenge(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
