use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        create_vendors_table(manager).await?;
        create_trips_table(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trips::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vendors::Table).to_owned())
            .await?;
        Ok(())
    }
}

async fn create_vendors_table(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(Vendors::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Vendors::VendorId)
                        .string()
                        .not_null()
                        .primary_key(),
                )
                .col(ColumnDef::new(Vendors::CreatedAt).timestamp().not_null())
                .to_owned(),
        )
        .await
}

async fn create_trips_table(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(Trips::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Trips::Id)
                        .integer()
                        .not_null()
                        .auto_increment()
                        .primary_key(),
                )
                .col(ColumnDef::new(Trips::VendorId).string())
                .col(ColumnDef::new(Trips::PickupDatetime).date_time().not_null())
                .col(ColumnDef::new(Trips::DropoffDatetime).date_time().not_null())
                .col(ColumnDef::new(Trips::PassengerCount).integer())
                .col(ColumnDef::new(Trips::PickupLongitude).double().not_null())
                .col(ColumnDef::new(Trips::PickupLatitude).double().not_null())
                .col(ColumnDef::new(Trips::DropoffLongitude).double().not_null())
                .col(ColumnDef::new(Trips::DropoffLatitude).double().not_null())
                .col(
                    ColumnDef::new(Trips::StoreAndFwdFlag)
                        .char_len(1)
                        .not_null()
                        .default("N"),
                )
                .col(ColumnDef::new(Trips::TripDuration).double().not_null())
                .col(ColumnDef::new(Trips::FareAmount).double())
                .col(ColumnDef::new(Trips::TripDistanceKm).double().not_null())
                .col(ColumnDef::new(Trips::TripDurationMin).double().not_null())
                .col(ColumnDef::new(Trips::SpeedKmh).double().not_null())
                .col(ColumnDef::new(Trips::FarePerKm).double())
                .col(ColumnDef::new(Trips::EstimatedFare).double().not_null())
                .col(ColumnDef::new(Trips::SourceRow).big_integer().not_null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_trips_vendor")
                        .from(Trips::Table, Trips::VendorId)
                        .to(Vendors::Table, Vendors::VendorId),
                )
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name("idx_trips_vendor")
                .table(Trips::Table)
                .col(Trips::VendorId)
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .name("idx_trips_speed")
                .table(Trips::Table)
                .col(Trips::SpeedKmh)
                .to_owned(),
        )
        .await
}

#[derive(DeriveIden)]
enum Vendors {
    Table,
    VendorId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Trips {
    Table,
    Id,
    VendorId,
    PickupDatetime,
    DropoffDatetime,
    PassengerCount,
    PickupLongitude,
    PickupLatitude,
    DropoffLongitude,
    DropoffLatitude,
    StoreAndFwdFlag,
    TripDuration,
    FareAmount,
    TripDistanceKm,
    TripDurationMin,
    SpeedKmh,
    FarePerKm,
    EstimatedFare,
    SourceRow,
}
