//! Cache-first resolvers over the lookup ports.
//!
//! The participant resolver swallows service failures and reports them as
//! "not found": the aggregate treats an unknown participant as a business error.
//! The account resolver instead raises [`ResolverError::AccountLookupAdapter`],
//! since an unavailable lookup service must not be mistaken for an unknown party.
//!
//! Only successful resolutions are cached, so a transient failure or a
//! not-found answer never poisons the cache.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use quoting_domain::{FspId, Participant};

use crate::cache::LocalCache;
use crate::ports::{AccountLookupRequest, AccountLookupService, ConnectorError, ParticipantService};

const PARTICIPANT_KEY: &str = "participant";
const ACCOUNT_KEY: &str = "account";

/// Resolver errors that callers must tell apart from "not found"
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// The account lookup service could not answer
    #[error("Account lookup adapter failed: {0}")]
    AccountLookupAdapter(#[source] ConnectorError),
}

// =============================================================================
// Participant Resolver
// =============================================================================

/// Resolves participant ids to participant records
#[async_trait]
pub trait ParticipantResolver: Send + Sync {
    /// Resolve one participant. `None` if unknown or the registry failed.
    async fn get_participant_info(&self, fsp_id: &str) -> Option<Participant>;

    /// Resolve many participants, preserving input order. Unknown ids are
    /// omitted; a registry failure yields an empty list.
    async fn get_participants_info(&self, fsp_ids: &[String]) -> Vec<Participant>;
}

/// [`ParticipantResolver`] backed by a [`LocalCache`]
pub struct CachedParticipantResolver {
    service: Arc<dyn ParticipantService>,
    cache: LocalCache<Participant>,
}

impl CachedParticipantResolver {
    /// Create a resolver whose cache entries live for `ttl_ms`
    pub fn new(service: Arc<dyn ParticipantService>, ttl_ms: u64) -> Self {
        Self { service, cache: LocalCache::with_ttl_ms(ttl_ms) }
    }

    fn cached(&self, fsp_id: &str) -> Option<Participant> {
        self.cache.get(&[PARTICIPANT_KEY, fsp_id])
    }

    fn remember(&self, participant: &Participant) {
        if let Err(e) = self.cache.set(participant.clone(), &[PARTICIPANT_KEY, &participant.id]) {
            tracing::debug!(fsp_id = %participant.id, error = %e, "Participant not cached");
        }
    }
}

#[async_trait]
impl ParticipantResolver for CachedParticipantResolver {
    async fn get_participant_info(&self, fsp_id: &str) -> Option<Participant> {
        if let Some(participant) = self.cached(fsp_id) {
            tracing::debug!(fsp_id, "Participant cache hit");
            return Some(participant);
        }

        match self.service.get_participant(fsp_id).await {
            Ok(Some(participant)) => {
                self.remember(&participant);
                Some(participant)
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(fsp_id, error = %e, "Participant lookup failed");
                None
            },
        }
    }

    async fn get_participants_info(&self, fsp_ids: &[String]) -> Vec<Participant> {
        let mut found: HashMap<String, Participant> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();

        for id in fsp_ids {
            if found.contains_key(id) || misses.contains(id) {
                continue;
            }
            match self.cached(id) {
                Some(participant) => {
                    found.insert(id.clone(), participant);
                },
                None => misses.push(id.clone()),
            }
        }

        if !misses.is_empty() {
            tracing::debug!(hits = found.len(), misses = misses.len(), "Participant batch lookup");
            match self.service.get_participants(&misses).await {
                Ok(fetched) => {
                    for participant in fetched {
                        self.remember(&participant);
                        found.insert(participant.id.clone(), participant);
                    }
                },
                Err(e) => {
                    tracing::warn!(count = misses.len(), error = %e, "Participant batch lookup failed");
                    return Vec::new();
                },
            }
        }

        fsp_ids.iter().filter_map(|id| found.get(id).cloned()).collect()
    }
}

// =============================================================================
// Account Resolver
// =============================================================================

/// Resolves parties to the FSP that owns their account
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// Resolve one party
    async fn get_account_lookup(
        &self,
        party_id: &str,
        party_type: &str,
        currency: Option<&str>,
    ) -> Result<Option<FspId>, ResolverError>;

    /// Resolve many parties keyed by caller-chosen keys, with at most one
    /// external call for the keys not already cached.
    async fn get_bulk_account_lookup(
        &self,
        requests: HashMap<String, AccountLookupRequest>,
    ) -> Result<HashMap<String, Option<FspId>>, ResolverError>;
}

/// [`AccountResolver`] backed by a [`LocalCache`]
pub struct CachedAccountResolver {
    service: Arc<dyn AccountLookupService>,
    cache: LocalCache<FspId>,
}

impl CachedAccountResolver {
    /// Create a resolver whose cache entries live for `ttl_ms`
    pub fn new(service: Arc<dyn AccountLookupService>, ttl_ms: u64) -> Self {
        Self { service, cache: LocalCache::with_ttl_ms(ttl_ms) }
    }

    fn cached(&self, request: &AccountLookupRequest) -> Option<FspId> {
        self.cache.get(&Self::key_parts(request))
    }

    fn remember(&self, request: &AccountLookupRequest, fsp_id: &FspId) {
        if let Err(e) = self.cache.set(fsp_id.clone(), &Self::key_parts(request)) {
            tracing::warn!(party_id = %request.party_id, error = %e, "Account lookup not cached");
        }
    }

    fn key_parts(request: &AccountLookupRequest) -> [&str; 4] {
        [
            ACCOUNT_KEY,
            request.party_type.as_str(),
            request.party_id.as_str(),
            request.currency.as_deref().unwrap_or(""),
        ]
    }
}

#[async_trait]
impl AccountResolver for CachedAccountResolver {
    async fn get_account_lookup(
        &self,
        party_id: &str,
        party_type: &str,
        currency: Option<&str>,
    ) -> Result<Option<FspId>, ResolverError> {
        let request = AccountLookupRequest::new(party_id, party_type, currency.map(str::to_string));
        if let Some(fsp_id) = self.cached(&request) {
            tracing::debug!(party_id, "Account lookup cache hit");
            return Ok(Some(fsp_id));
        }

        let fsp_id = self.service.lookup(&request).await.map_err(|e| {
            tracing::warn!(party_id, error = %e, "Account lookup failed");
            ResolverError::AccountLookupAdapter(e)
        })?;

        if let Some(fsp_id) = &fsp_id {
            self.remember(&request, fsp_id);
        }
        Ok(fsp_id)
    }

    async fn get_bulk_account_lookup(
        &self,
        requests: HashMap<String, AccountLookupRequest>,
    ) -> Result<HashMap<String, Option<FspId>>, ResolverError> {
        let mut results: HashMap<String, Option<FspId>> = HashMap::with_capacity(requests.len());
        let mut pending: HashMap<String, AccountLookupRequest> = HashMap::new();

        for (key, request) in requests {
            match self.cached(&request) {
                Some(fsp_id) => {
                    results.insert(key, Some(fsp_id));
                },
                None => {
                    pending.insert(key, request);
                },
            }
        }

        if pending.is_empty() {
            return Ok(results);
        }

        tracing::debug!(hits = results.len(), misses = pending.len(), "Bulk account lookup");
        let fetched = self.service.bulk_lookup(&pending).await.map_err(|e| {
            tracing::warn!(count = pending.len(), error = %e, "Bulk account lookup failed");
            ResolverError::AccountLookupAdapter(e)
        })?;

        for (key, request) in pending {
            let fsp_id = fetched.get(&key).cloned().flatten();
            if let Some(fsp_id) = &fsp_id {
                self.remember(&request, fsp_id);
            }
            results.insert(key, fsp_id);
        }
        Ok(results)
    }
}

// =============================================================================
// Tests
// =============================================================================
