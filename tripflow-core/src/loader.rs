use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::IngestConfig;
use crate::errors::{IngestError, Result};
use crate::features::{FeatureDeriver, OutlierFilter};
use crate::reader::ChunkedReader;
use crate::record::{FeatureRow, RejectReason, RejectedRow};
use crate::reject_log::{RejectLog, RejectSink};
use crate::storage::{StorageResult, TripStore, TripTransaction};
use crate::vendors::VendorRegistrar;

/// Totals of one `load` call. On failure `stopped_at` holds the data row
/// offset of the chunk that was not committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub source: PathBuf,
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub chunks_committed: u64,
    pub rejected: BTreeMap<RejectReason, u64>,
    pub stopped_at: Option<u64>,
}

impl LoadSummary {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn rows_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: RejectReason) -> u64 {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    fn record_chunk(&mut self, inserted: u64, rejected: &[RejectedRow]) {
        self.rows_inserted += inserted;
        self.chunks_committed += 1;
        for row in rejected {
            *self.rejected.entry(row.reason).or_insert(0) += 1;
        }
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rows read, {} inserted, {} rejected",
            self.source.display(),
            self.rows_read,
            self.rows_inserted,
            self.rows_rejected()
        )?;
        if !self.rejected.is_empty() {
            let reasons: Vec<String> = self
                .rejected
                .iter()
                .map(|(reason, count)| format!("{}={}", reason.tag(), count))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        if let Some(offset) = self.stopped_at {
            write!(f, ", stopped at row {}", offset)?;
        }
        Ok(())
    }
}

/// Streams one source into a trip store, one transaction per read chunk.
///
/// A loader owns its store for the duration of `load`. Chunks are handled
/// strictly in source order; the first chunk that cannot be committed aborts
/// the run after its transaction has been rolled back.
pub struct BulkLoader<S, K = RejectLog> {
    config: IngestConfig,
    store: S,
    rejects: K,
    cancel: CancellationToken,
    summary: LoadSummary,
}

impl<S, K> BulkLoader<S, K>
where
    S: TripStore,
    K: RejectSink,
{
    pub fn new(config: IngestConfig, store: S, rejects: K) -> Self {
        Self {
            config,
            store,
            rejects,
            cancel: CancellationToken::new(),
            summary: LoadSummary::default(),
        }
    }

    /// Checked between chunks; an in-flight chunk always finishes first.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rejects(&self) -> &K {
        &self.rejects
    }

    /// Progress of the most recent load, including failed ones.
    pub fn summary(&self) -> &LoadSummary {
        &self.summary
    }

    #[instrument(skip_all, fields(source = %path.display()))]
    pub async fn load(&mut self, path: &Path) -> Result<LoadSummary> {
        self.summary = LoadSummary::new(path);
        self.config.validate()?;
        let reader = ChunkedReader::open(path, self.config.chunk_size)?;
        self.load_from(reader).await
    }

    /// Loads from an already-open reader.
    pub async fn load_from<R>(&mut self, mut reader: ChunkedReader<R>) -> Result<LoadSummary>
    where
        R: Read + Send,
    {
        self.summary = LoadSummary::new(reader.path());
        self.config.validate()?;

        let headers = reader.schema().headers().clone();
        let mut deriver = FeatureDeriver::new(self.config.fare);
        let outliers = self
            .config
            .outliers
            .enabled
            .then(|| OutlierFilter::new(&self.config.outliers));
        let mut vendors = VendorRegistrar::new();

        info!(
            "Loading {} in chunks of {} rows",
            reader.path().display(),
            self.config.chunk_size
        );

        loop {
            let batch = match reader.next_batch() {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(err) => {
                    self.summary.stopped_at = Some(reader.rows_read());
                    return Err(err);
                }
            };
            let offset = batch.offset;

            if self.cancel.is_cancelled() {
                warn!("Load cancelled before chunk at row {}", offset);
                self.summary.stopped_at = Some(offset);
                return Err(IngestError::Cancelled { offset });
            }
            self.summary.rows_read += batch.len() as u64;

            let mut derived = deriver.derive(batch);
            if let Some(filter) = &outliers {
                let (kept, rejected) = filter.apply(std::mem::take(&mut derived.rows));
                derived.rows = kept;
                derived.rejected.extend(rejected);
            }

            let pending = vendors.pending(&derived.rows);
            let inserted = match self.commit_chunk(offset, &derived.rows, &vendors, &pending).await {
                Ok(inserted) => inserted,
                Err(err) => {
                    self.summary.stopped_at = Some(offset);
                    return Err(err);
                }
            };
            vendors.mark_committed(pending);

            // The chunk is durable from here on, whatever happens to the report.
            derived.rejected.sort_by_key(|row| row.row);
            self.summary.record_chunk(inserted, &derived.rejected);
            if let Err(err) = self.rejects.append(&headers, offset, &derived.rejected) {
                self.summary.stopped_at = Some(reader.rows_read());
                return Err(err);
            }
            debug!(
                "Committed chunk at row {}: {} inserted, {} rejected",
                offset,
                inserted,
                derived.rejected.len()
            );
        }

        info!("{}", self.summary);
        Ok(self.summary.clone())
    }

    async fn commit_chunk(
        &self,
        offset: u64,
        rows: &[FeatureRow],
        vendors: &VendorRegistrar,
        pending: &[String],
    ) -> Result<u64> {
        let mut txn = self
            .store
            .begin()
            .await
            .map_err(IngestError::StorageUnavailable)?;

        match self.write_chunk(&mut txn, rows, vendors, pending).await {
            Ok(inserted) => {
                txn.commit()
                    .await
                    .map_err(|source| IngestError::ChunkCommitFailure { offset, source })?;
                Ok(inserted)
            }
            Err(source) => {
                warn!("Rolling back chunk at row {}: {}", offset, source);
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Rollback of chunk at row {} failed: {}", offset, rollback_err);
                }
                Err(IngestError::ChunkCommitFailure { offset, source })
            }
        }
    }

    async fn write_chunk(
        &self,
        txn: &mut S::Transaction,
        rows: &[FeatureRow],
        vendors: &VendorRegistrar,
        pending: &[String],
    ) -> StorageResult<u64> {
        vendors.register(txn, pending).await?;

        let mut inserted = 0;
        for batch in rows.chunks(self.config.insert_batch_size) {
            inserted += txn.insert_feature_rows(batch).await?;
        }
        Ok(inserted)
    }
}
