//! In-memory fake remote store for engine tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{RecordId, SyncRecord, SyncStatus};

use super::remote::{ConnectivityProbe, FetchWindow, PushOutcome, RemoteStore};

/// Scripted failure for the next remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFault {
    None,
    Network,
    Authentication,
}

struct State<R> {
    records: HashMap<RecordId, R>,
    reject_ids: HashSet<RecordId>,
    fetch_fault: RemoteFault,
    push_fault: RemoteFault,
    push_count: usize,
}

/// Fake remote store backed by a map, shared across clones so tests can
/// inspect and reconfigure it while the engine holds the other handle.
pub struct MemoryRemoteStore<R> {
    state: Arc<Mutex<State<R>>>,
}

impl<R> Clone for MemoryRemoteStore<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: SyncRecord> Default for MemoryRemoteStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SyncRecord> MemoryRemoteStore<R> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                records: HashMap::new(),
                reject_ids: HashSet::new(),
                fetch_fault: RemoteFault::None,
                push_fault: RemoteFault::None,
                push_count: 0,
            })),
        }
    }

    pub fn seed(&self, records: Vec<R>) {
        let mut state = self.state.lock().unwrap();
        for record in records {
            state.records.insert(record.record_id().clone(), record);
        }
    }

    pub fn remove(&self, id: &RecordId) {
        self.state.lock().unwrap().records.remove(id);
    }

    pub fn reject_next_push_of(&self, id: RecordId) {
        self.state.lock().unwrap().reject_ids.insert(id);
    }

    pub fn set_fetch_fault(&self, fault: RemoteFault) {
        self.state.lock().unwrap().fetch_fault = fault;
    }

    pub fn set_push_fault(&self, fault: RemoteFault) {
        self.state.lock().unwrap().push_fault = fault;
    }

    pub fn record(&self, id: &RecordId) -> Option<R> {
        self.state.lock().unwrap().records.get(id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().unwrap().push_count
    }
}

fn fault_error(fault: RemoteFault) -> Option<Error> {
    match fault {
        RemoteFault::None => None,
        RemoteFault::Network => Some(Error::Network("connection refused".to_string())),
        RemoteFault::Authentication => {
            Some(Error::Authentication("token expired".to_string()))
        }
    }
}

#[async_trait]
impl<R: SyncRecord> RemoteStore<R> for MemoryRemoteStore<R> {
    async fn fetch_all(&self, window: FetchWindow) -> Result<Vec<R>> {
        let state = self.state.lock().unwrap();
        if let Some(error) = fault_error(state.fetch_fault) {
            return Err(error);
        }

        let mut records: Vec<R> = state
            .records
            .values()
            .filter(|record| match window {
                FetchWindow::Full => true,
                FetchWindow::Since(since) => record.last_modified_at() >= since,
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.record_id().as_str().cmp(b.record_id().as_str()));
        Ok(records)
    }

    async fn push(&self, record: &R) -> Result<PushOutcome<R>> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = fault_error(state.push_fault) {
            return Err(error);
        }
        state.push_count += 1;

        if state.reject_ids.remove(record.record_id()) {
            return Ok(PushOutcome::Rejected {
                message: "validation failed".to_string(),
            });
        }

        // The fake server adopts the client's clock so tests stay
        // deterministic; status comes back authoritative.
        let accepted =
            record.with_sync_meta(SyncStatus::Synced, record.last_modified_at(), record.version());
        state
            .records
            .insert(accepted.record_id().clone(), accepted.clone());
        Ok(PushOutcome::Accepted(accepted))
    }
}

/// Connectivity probe with a settable answer.
#[derive(Clone)]
pub struct StaticProbe {
    online: Arc<Mutex<bool>>,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(Mutex::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        *self.online.lock().unwrap() = online;
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        *self.online.lock().unwrap()
    }
}
