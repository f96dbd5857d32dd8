//! Stub implementations for testing.
//!
//! These implementations answer from in-memory tables without making real
//! API calls, count their invocations and can be told to fail the next call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use quoting_domain::{FspId, Participant};

use crate::ports::{AccountLookupRequest, AccountLookupService, ConnectorError, ParticipantService};

// =============================================================================
// Stub Participant Service
// =============================================================================

/// Stub participant registry.
#[derive(Default)]
pub struct StubParticipantService {
    participants: RwLock<HashMap<FspId, Participant>>,
    /// Ids requested per call, in call order
    requests: RwLock<Vec<Vec<String>>>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl StubParticipantService {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a participant.
    pub fn insert(&self, participant: Participant) {
        let mut participants = self.participants.write().unwrap_or_else(PoisonError::into_inner);
        participants.insert(participant.id.clone(), participant);
    }

    /// Configure the next call to fail.
    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids requested by each call.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, ids: Vec<String>) -> Result<(), ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.write().unwrap_or_else(PoisonError::into_inner).push(ids);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ConnectorError::RequestFailed("Simulated participant failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParticipantService for StubParticipantService {
    async fn get_participant(&self, fsp_id: &str) -> Result<Option<Participant>, ConnectorError> {
        self.record(vec![fsp_id.to_string()])?;
        let participants = self.participants.read().unwrap_or_else(PoisonError::into_inner);
        Ok(participants.get(fsp_id).cloned())
    }

    async fn get_participants(
        &self,
        fsp_ids: &[String],
    ) -> Result<Vec<Participant>, ConnectorError> {
        self.record(fsp_ids.to_vec())?;
        let participants = self.participants.read().unwrap_or_else(PoisonError::into_inner);
        Ok(fsp_ids.iter().filter_map(|id| participants.get(id).cloned()).collect())
    }
}

// =============================================================================
// Stub Account Lookup Service
// =============================================================================

/// Stub account lookup keyed by `(partyType, partyId)`.
#[derive(Default)]
pub struct StubAccountLookupService {
    accounts: RwLock<HashMap<(String, String), FspId>>,
    calls: AtomicUsize,
    /// Keys sent on each bulk call
    bulk_requests: RwLock<Vec<Vec<String>>>,
    fail_next: AtomicBool,
}

impl StubAccountLookupService {
    /// Create an empty lookup table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a party to its owning FSP.
    pub fn insert(
        &self,
        party_type: impl Into<String>,
        party_id: impl Into<String>,
        fsp_id: impl Into<FspId>,
    ) {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        accounts.insert((party_type.into(), party_id.into()), fsp_id.into());
    }

    /// Configure the next call to fail.
    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sorted keys sent by each bulk call.
    pub fn bulk_requests(&self) -> Vec<Vec<String>> {
        self.bulk_requests.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn should_fail(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fail_next.swap(false, Ordering::SeqCst)
    }

    fn find(&self, request: &AccountLookupRequest) -> Option<FspId> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        accounts.get(&(request.party_type.clone(), request.party_id.clone())).cloned()
    }
}

#[async_trait]
impl AccountLookupService for StubAccountLookupService {
    async fn lookup(
        &self,
        request: &AccountLookupRequest,
    ) -> Result<Option<FspId>, ConnectorError> {
        if self.should_fail() {
            return Err(ConnectorError::RequestFailed("Simulated lookup failure".into()));
        }
        Ok(self.find(request))
    }

    async fn bulk_lookup(
        &self,
        requests: &HashMap<String, AccountLookupRequest>,
    ) -> Result<HashMap<String, Option<FspId>>, ConnectorError> {
        let mut keys: Vec<String> = requests.keys().cloned().collect();
        keys.sort();
        self.bulk_requests.write().unwrap_or_else(PoisonError::into_inner).push(keys);

        if self.should_fail() {
            return Err(ConnectorError::RequestFailed("Simulated bulk lookup failure".into()));
        }
        Ok(requests.iter().map(|(key, req)| (key.clone(), self.find(req))).collect())
    }
}
