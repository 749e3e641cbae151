use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use super::{StorageError, StorageResult, TripStore, TripTransaction};
use crate::config::DatabaseConfig;
use crate::database::{establish_connection, Migrator};
use crate::entities::{trips, vendors};
use crate::record::FeatureRow;

/// SQLite caps a statement at 32766 bound parameters.
const MAX_BIND_PARAMETERS: usize = 32_766;
/// Bound parameters per trip row: every `trips` column except `id`.
const TRIP_INSERT_PARAMETERS: usize = 17;
pub const MAX_ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMETERS / TRIP_INSERT_PARAMETERS;

/// Relational trip store backed by SeaORM.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connects and brings the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let db = establish_connection(&config.url).await?;
        let store = Self::new(db);
        store.migrate().await?;
        info!("Connected to trip store");
        Ok(store)
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        Migrator::up(&self.db, None).await?;
        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl TripStore for SeaOrmStore {
    type Transaction = SeaOrmTransaction;

    async fn begin(&self) -> StorageResult<SeaOrmTransaction> {
        let txn = self.db.begin().await?;
        Ok(SeaOrmTransaction { txn })
    }
}

pub struct SeaOrmTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl TripTransaction for SeaOrmTransaction {
    async fn upsert_vendor_if_absent(&mut self, vendor_id: &str) -> StorageResult<()> {
        let vendor = vendors::ActiveModel {
            vendor_id: Set(vendor_id.to_string()),
            created_at: Set(Utc::now()),
        };
        let result = vendors::Entity::insert(vendor)
            .on_conflict(
                OnConflict::column(vendors::Column::VendorId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await;

        match result {
            Ok(inserted) => {
                if inserted > 0 {
                    debug!("Registered vendor {}", vendor_id);
                }
                Ok(())
            }
            Err(DbErr::RecordNotInserted) => Ok(()),
            Err(err) => Err(StorageError::from(err)),
        }
    }

    async fn insert_feature_rows(&mut self, rows: &[FeatureRow]) -> StorageResult<u64> {
        let mut inserted = 0;
        for statement_rows in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let models = statement_rows.iter().map(feature_row_to_active_model);
            inserted += trips::Entity::insert_many(models)
                .exec_without_returning(&self.txn)
                .await?;
        }
        Ok(inserted)
    }

    async fn commit(self) -> StorageResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StorageResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

pub fn feature_row_to_active_model(row: &FeatureRow) -> trips::ActiveModel {
    trips::ActiveModel {
        vendor_id: Set(row.vendor_id.clone()),
        pickup_datetime: Set(row.pickup_datetime),
        dropoff_datetime: Set(row.dropoff_datetime),
        passenger_count: Set(row.passenger_count),
        pickup_longitude: Set(row.pickup_longitude),
        pickup_latitude: Set(row.pickup_latitude),
        dropoff_longitude: Set(row.dropoff_longitude),
        dropoff_latitude: Set(row.dropoff_latitude),
        store_and_fwd_flag: Set(row.store_and_fwd_flag.as_str().to_string()),
        trip_duration: Set(row.trip_duration),
        fare_amount: Set(row.fare_amount),
        trip_distance_km: Set(row.trip_distance_km),
        trip_duration_min: Set(row.trip_duration_min),
        speed_kmh: Set(row.speed_kmh),
        fare_per_km: Set(row.fare_per_km),
        estimated_fare: Set(row.estimated_fare),
        source_row: Set(row.row as i64),
        ..Default::default()
    }
}
