//! Storage sink consumed by the loader.
//!
//! A [`TripStore`] hands out [`TripTransaction`]s; everything written through a
//! transaction becomes visible only after `commit`. Two implementations ship
//! with the crate: [`SeaOrmStore`] for SQLite/MySQL and [`MemoryStore`] for dry
//! runs and tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::FeatureRow;

pub mod memory;
pub mod sea_orm_store;

pub use memory::{MemoryStore, MemoryTransaction};
pub use sea_orm_store::{SeaOrmStore, SeaOrmTransaction};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait TripStore: Send + Sync {
    type Transaction: TripTransaction;

    async fn begin(&self) -> StorageResult<Self::Transaction>;
}

#[async_trait]
pub trait TripTransaction: Send {
    /// Inserts the vendor unless it already exists. Never fails on duplicates.
    async fn upsert_vendor_if_absent(&mut self, vendor_id: &str) -> StorageResult<()>;

    /// Inserts one physical batch and returns the number of rows written.
    async fn insert_feature_rows(&mut self, rows: &[FeatureRow]) -> StorageResult<u64>;

    async fn commit(self) -> StorageResult<()>;

    async fn rollback(self) -> StorageResult<()>;
}
