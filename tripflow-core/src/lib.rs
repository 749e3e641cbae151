//! Chunked, transactional loading of taxi trip records into a relational store.
//!
//! A source CSV is streamed in bounded chunks, each record is validated and
//! enriched with derived distance, speed and fare figures, and every chunk is
//! committed as one transaction. Rows that cannot be used are diverted to a
//! reject report instead of failing the run.

pub mod config;
pub mod database;
pub mod entities;
pub mod errors;
pub mod features;
pub mod geo;
pub mod loader;
pub mod reader;
pub mod record;
pub mod reject_log;
pub mod storage;
pub mod vendors;

pub use config::{DatabaseConfig, FareModel, IngestConfig, OutlierConfig};
pub use errors::{IngestError, Result};
pub use loader::{BulkLoader, LoadSummary};
pub use reader::{discover_sources, ChunkedReader};
pub use record::{FeatureRow, RejectReason, RejectedRow};
pub use reject_log::{RejectLog, RejectSink};
pub use storage::{MemoryStore, SeaOrmStore, StorageError, TripStore, TripTransaction};
