use sea_orm::entity::prelude::*;

/// One loaded trip with its derived features. `source_row` is the zero-based
/// data row of the source file the trip came from.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "trips")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub vendor_id: Option<String>,
    pub pickup_datetime: DateTime,
    pub dropoff_datetime: DateTime,
    pub passenger_count: Option<i32>,
    pub pickup_longitude: f64,
    pub pickup_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_latitude: f64,
    pub store_and_fwd_flag: String,
    pub trip_duration: f64,
    pub fare_amount: Option<f64>,
    pub trip_distance_km: f64,
    pub trip_duration_min: f64,
    pub speed_kmh: f64,
    pub fare_per_km: Option<f64>,
    pub estimated_fare: f64,
    pub source_row: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vendors::Entity",
        from = "Column::VendorId",
        to = "super::vendors::Column::VendorId"
    )]
    Vendors,
}

impl Related<super::vendors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendors.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
