//! Quoting Connectors
//!
//! Adapters for the external lookup services (participants, account lookup),
//! the TTL cache in front of them and the cache-first resolvers used by the
//! aggregate.

#![warn(clippy::all)]

pub mod account_lookup_client;
pub mod cache;
pub mod participants_client;
pub mod ports;
pub mod resolver;
pub mod stub;

// Re-exports
pub use account_lookup_client::HttpAccountLookupClient;
pub use cache::{CacheError, LocalCache};
pub use participants_client::HttpParticipantClient;
pub use ports::{AccountLookupRequest, AccountLookupService, ConnectorError, ParticipantService};
pub use resolver::{
    AccountResolver, CachedAccountResolver, CachedParticipantResolver, ParticipantResolver,
    ResolverError,
};
pub use stub::{StubAccountLookupService, StubParticipantService};
