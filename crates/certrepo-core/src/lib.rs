// # certrepo-core
//
// Core library of the certificate repository.
//
// ## Architecture Overview
//
// - **KvStore**: Trait for the key-value backend entities are persisted in
// - **CertificateRepository**: CRUD for self-signers, ACME accounts and
//   zones over a `KvStore`, plus the zone watch surface
// - **WatchRegistry**: Active zone watches; fans zone mutations out to one
//   delivery task per watch
// - **DnsChallenge**: Trait for DNS-01 challenge adapters, selected through
//   the `ChallengeRegistry`
//
// ## Key Schema
//
// Every entity lives under `<bucket>:<kind>:<id>` with kind one of `self`,
// `acme` or `zone` (see `keys`). Kinds never collide and each kind can be
// enumerated by prefix.
//
// ## Design Principles
//
// 1. **Pass-through errors**: the store's result reaches the caller as-is
// 2. **Store is the source of truth**: no in-memory entity cache
// 3. **Contained observers**: a faulty watch callback only ends its own watch

pub mod codec;
pub mod config;
pub mod error;
pub mod fqdn;
pub mod keys;
pub mod model;
pub mod registry;
pub mod repository;
pub mod store;
pub mod traits;
pub mod watch;

// Re-export core types for convenience
pub use config::{ChallengeConfig, OverflowPolicy, RepositoryConfig, StoreConfig, WatchConfig};
pub use error::{Error, Result};
pub use keys::{EntityKind, storage_key};
pub use model::{AcmeAccount, Entity, KeyType, SelfSigner, Zone};
pub use registry::ChallengeRegistry;
pub use repository::CertificateRepository;
pub use store::{FileStore, MemoryStore, open_store};
pub use traits::{DnsChallenge, DnsChallengeFactory, KvStore, enumerate, resolve_token};
pub use watch::{WatchHandle, WatchRegistry, WatchState, ZoneEvent, ZoneEventKind, ZoneEventStream};
