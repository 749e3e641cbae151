use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder};
use tripflow::database::Migrator;
use tripflow::entities::{trips, vendors};
use tripflow::features::FeatureDeriver;
use tripflow::{
    BulkLoader, ChunkedReader, FareModel, FeatureRow, IngestConfig, IngestError, RejectedRow,
    SeaOrmStore, TripStore, TripTransaction,
};
use tripflow_test_utils::{TestDb, TripCsv, TripRow};

async fn store() -> SeaOrmStore {
    let db = TestDb::new_in_memory().migrated::<Migrator>().await.unwrap();
    SeaOrmStore::new(db)
}

fn feature_rows(csv: &TripCsv) -> Vec<FeatureRow> {
    let content = csv.build();
    let batch = ChunkedReader::from_reader("trips.csv", content.as_bytes(), 100)
        .unwrap()
        .next_batch()
        .unwrap()
        .unwrap();
    FeatureDeriver::new(FareModel::default()).derive(batch).rows
}

#[tokio::test]
async fn vendor_upsert_is_idempotent() {
    let store = store().await;

    let mut txn = store.begin().await.unwrap();
    txn.upsert_vendor_if_absent("1").await.unwrap();
    txn.upsert_vendor_if_absent("1").await.unwrap();
    txn.commit().await.unwrap();

    let mut txn = store.begin().await.unwrap();
    txn.upsert_vendor_if_absent("1").await.unwrap();
    txn.upsert_vendor_if_absent("2").await.unwrap();
    txn.commit().await.unwrap();

    let ids: Vec<String> = vendors::Entity::find()
        .order_by_asc(vendors::Column::VendorId)
        .all(store.connection())
        .await
        .unwrap()
        .into_iter()
        .map(|vendor| vendor.vendor_id)
        .collect();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
}

#[tokio::test]
async fn rolled_back_transaction_leaves_nothing_behind() {
    let store = store().await;
    let rows = feature_rows(&TripCsv::new().row(TripRow::new("a").vendor("9")));

    let mut txn = store.begin().await.unwrap();
    txn.upsert_vendor_if_absent("9").await.unwrap();
    assert_eq!(txn.insert_feature_rows(&rows).await.unwrap(), 1);
    txn.rollback().await.unwrap();

    let db = store.connection();
    assert_eq!(trips::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(vendors::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn inserted_rows_keep_derived_columns() {
    let store = store().await;
    let rows = feature_rows(&TripCsv::new().valid_rows(3));

    let mut txn = store.begin().await.unwrap();
    txn.upsert_vendor_if_absent("1").await.unwrap();
    txn.upsert_vendor_if_absent("2").await.unwrap();
    assert_eq!(txn.insert_feature_rows(&rows).await.unwrap(), 3);
    assert_eq!(txn.insert_feature_rows(&[]).await.unwrap(), 0);
    txn.commit().await.unwrap();

    let stored = trips::Entity::find()
        .order_by_asc(trips::Column::SourceRow)
        .all(store.connection())
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].vendor_id.as_deref(), Some("2"));
    assert_eq!(stored[1].source_row, 1);
    assert_eq!(stored[0].store_and_fwd_flag, "N");
    assert!((stored[0].speed_kmh - 60.0).abs() < 0.1);
    assert!(stored[0].fare_per_km.is_some());
}

#[tokio::test]
async fn loader_commits_chunks_into_sqlite() {
    let store = store().await;
    let content = TripCsv::new()
        .valid_rows(5)
        .row(TripRow::new("broken").dropoff_latitude(""))
        .build();
    let config = IngestConfig {
        chunk_size: 2,
        insert_batch_size: 1,
        ..Default::default()
    };
    let mut loader: BulkLoader<SeaOrmStore, Vec<RejectedRow>> =
        BulkLoader::new(config, store.clone(), Vec::new());

    let summary = loader
        .load_from(ChunkedReader::from_reader("trips.csv", content.as_bytes(), 2).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 5);
    assert_eq!(summary.chunks_committed, 3);
    let db = store.connection();
    assert_eq!(trips::Entity::find().count(db).await.unwrap(), 5);
    assert_eq!(vendors::Entity::find().count(db).await.unwrap(), 2);
}

#[tokio::test]
async fn unreachable_database_is_reported_as_storage_unavailable() {
    let config = tripflow::DatabaseConfig::new("sqlite:///nonexistent-dir/tripflow.db?mode=ro");
    let err = SeaOrmStore::connect(&config)
        .await
        .map_err(IngestError::StorageUnavailable)
        .err();
    assert!(matches!(err, Some(IngestError::StorageUnavailable(_))));
}

#[tokio::test]
async fn insert_batches_above_the_parameter_limit_are_split() {
    let store = store().await;
    let content = TripCsv::new().valid_rows(2_500).build();
    let config = IngestConfig {
        chunk_size: 5_000,
        insert_batch_size: 2_500,
        ..Default::default()
    };
    assert!(config.insert_batch_size > tripflow::storage::sea_orm_store::MAX_ROWS_PER_STATEMENT);
    let mut loader: BulkLoader<SeaOrmStore, Vec<RejectedRow>> =
        BulkLoader::new(config, store.clone(), Vec::new());

    let summary = loader
        .load_from(ChunkedReader::from_reader("trips.csv", content.as_bytes(), 5_000).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 2_500);
    assert_eq!(
        trips::Entity::find().count(store.connection()).await.unwrap(),
        2_500
    );
}

#[tokio::test]
async fn antipodal_trip_loads_without_the_outlier_pass() {
    let store = store().await;
    let mut antipodal = TripRow::new("antipodal");
    antipodal.pickup_latitude = "2.5".to_string();
    antipodal.pickup_longitude = "0".to_string();
    antipodal.dropoff_latitude = "-2.5".to_string();
    antipodal.dropoff_longitude = "180".to_string();
    let content = TripCsv::new().valid_rows(3).row(antipodal).build();

    let mut config = IngestConfig::default();
    config.outliers.enabled = false;
    let mut loader: BulkLoader<SeaOrmStore, Vec<RejectedRow>> =
        BulkLoader::new(config, store.clone(), Vec::new());

    let summary = loader
        .load_from(ChunkedReader::from_reader("trips.csv", content.as_bytes(), 100).unwrap())
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 4);
    let far = trips::Entity::find()
        .order_by_desc(trips::Column::TripDistanceKm)
        .one(store.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(far.source_row, 3);
    assert!(far.trip_distance_km.is_finite() && far.trip_distance_km > 20_000.0);
}
