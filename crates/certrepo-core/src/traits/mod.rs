//! Core traits for the certificate repository
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`KvStore`]: Key-value backend the repository persists entities in
//! - [`DnsChallenge`]: DNS-01 challenge provider adapters

pub mod dns_challenge;
pub mod kv_store;

pub use dns_challenge::{DnsChallenge, DnsChallengeFactory, resolve_token};
pub use kv_store::{KvStore, enumerate};
