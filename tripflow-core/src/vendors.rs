use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::record::FeatureRow;
use crate::storage::{StorageResult, TripTransaction};

/// Keeps the vendor registry in step with the trips being loaded.
///
/// Identifiers are registered with insert-if-absent semantics inside the chunk
/// transaction, so concurrent loaders racing on the same vendor are harmless.
/// An identifier is remembered as known only once its chunk has committed.
#[derive(Debug, Default)]
pub struct VendorRegistrar {
    known: HashSet<String>,
}

impl VendorRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct, trimmed vendor ids of `rows` not yet committed by this registrar,
    /// in sorted order. Only rows about to be inserted are passed in, so vendors
    /// seen solely on rejected rows are never registered.
    pub fn pending(&self, rows: &[FeatureRow]) -> Vec<String> {
        rows.iter()
            .filter_map(|row| row.vendor_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty() && !self.known.contains(*id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Issues one idempotent upsert per identifier and returns how many were sent.
    pub async fn register<T>(&self, txn: &mut T, vendor_ids: &[String]) -> StorageResult<usize>
    where
        T: TripTransaction,
    {
        for vendor_id in vendor_ids {
            txn.upsert_vendor_if_absent(vendor_id).await?;
        }
        if !vendor_ids.is_empty() {
            debug!("Upserted {} vendor ids", vendor_ids.len());
        }
        Ok(vendor_ids.len())
    }

    /// Records identifiers whose transaction committed.
    pub fn mark_committed(&mut self, vendor_ids: Vec<String>) {
        self.known.extend(vendor_ids);
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }
}
