// # DNS Challenge Trait
//
// Defines the boundary for DNS-01 challenge provider adapters.
//
// The repository never calls these adapters itself. An issuance workflow
// picks the adapter named by a zone's `provider` field from the
// `ChallengeRegistry` and drives it through `present` / `cleanup`.
//
// ## Usage
//
// ```rust,ignore
// use certrepo_core::{ChallengeConfig, ChallengeRegistry};
//
// let config = ChallengeConfig::for_zone(&zone);
// let challenge = registry.create_challenge(&config)?;
//
// challenge.present("www.example.com", token, key_auth).await?;
// // ... CA validates the TXT record ...
// challenge.cleanup("www.example.com", token, key_auth).await?;
// ```

use async_trait::async_trait;

use crate::config::ChallengeConfig;
use crate::error::{Error, Result};

/// Trait for DNS-01 challenge provider adapters
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// - Publish and remove the `_acme-challenge` TXT record for a domain
/// - Nothing else: retries, scheduling and persistence belong to the caller
#[async_trait]
pub trait DnsChallenge: Send + Sync {
    /// Publish the TXT record answering a challenge
    ///
    /// # Parameters
    ///
    /// - `domain`: Domain being validated (e.g. "www.example.com")
    /// - `token`: Challenge token issued by the CA
    /// - `key_authorization`: Key authorization derived from the token
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()>;

    /// Remove the TXT record published by [`present`](DnsChallenge::present)
    async fn cleanup(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing challenge adapters from configuration
pub trait DnsChallengeFactory: Send + Sync {
    /// Create a DnsChallenge instance from configuration
    fn create(&self, config: &ChallengeConfig) -> Result<Box<dyn DnsChallenge>>;
}

/// Resolve a provider API token
///
/// Candidates are tried in order: the explicit argument, the configured
/// value, then the environment variable `env_var`. Empty strings count as
/// missing.
pub fn resolve_token(
    provider: &str,
    explicit: Option<&str>,
    configured: Option<&str>,
    env_var: &str,
) -> Result<String> {
    explicit
        .filter(|token| !token.is_empty())
        .or(configured.filter(|token| !token.is_empty()))
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|token| !token.is_empty()))
        .ok_or_else(|| Error::challenge(provider, format!("{provider} token not found")))
}
