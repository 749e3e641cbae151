use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{StorageError, StorageResult, TripStore, TripTransaction};
use crate::record::FeatureRow;

#[derive(Debug, Default)]
struct MemoryState {
    vendors: BTreeSet<String>,
    trips: Vec<FeatureRow>,
    insert_calls: usize,
    commits: usize,
    rollbacks: usize,
}

/// In-process store with the same transactional visibility as the database:
/// staged vendors and rows appear only on commit. Faults can be injected to
/// exercise rollback paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_insert_call: Option<usize>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `n`th physical insert call (1-based, counted across the store).
    pub fn fail_on_insert_call(mut self, n: usize) -> Self {
        self.fail_on_insert_call = Some(n);
        self
    }

    /// Makes every `begin` fail, as if the backend could not be reached.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn trips(&self) -> Vec<FeatureRow> {
        self.lock().trips.clone()
    }

    pub fn trip_count(&self) -> usize {
        self.lock().trips.len()
    }

    pub fn vendors(&self) -> Vec<String> {
        self.lock().vendors.iter().cloned().collect()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> StorageResult<MemoryTransaction> {
        if self.unavailable {
            return Err(StorageError::Backend("memory store is unavailable".to_string()));
        }
        Ok(MemoryTransaction {
            state: Arc::clone(&self.state),
            fail_on_insert_call: self.fail_on_insert_call,
            vendors: BTreeSet::new(),
            rows: Vec::new(),
        })
    }
}

pub struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    fail_on_insert_call: Option<usize>,
    vendors: BTreeSet<String>,
    rows: Vec<FeatureRow>,
}

impl MemoryTransaction {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TripTransaction for MemoryTransaction {
    async fn upsert_vendor_if_absent(&mut self, vendor_id: &str) -> StorageResult<()> {
        self.vendors.insert(vendor_id.to_string());
        Ok(())
    }

    async fn insert_feature_rows(&mut self, rows: &[FeatureRow]) -> StorageResult<u64> {
        let call = {
            let mut state = self.lock();
            state.insert_calls += 1;
            state.insert_calls
        };
        if self.fail_on_insert_call == Some(call) {
            return Err(StorageError::Backend(format!(
                "injected failure on insert call {}",
                call
            )));
        }
        self.rows.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn commit(self) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.vendors.extend(self.vendors);
        state.trips.extend(self.rows);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> StorageResult<()> {
        self.lock().rollbacks += 1;
        Ok(())
    }
}
