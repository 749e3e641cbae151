use anyhow::{Context, Result};
use clap::Subcommand;
use sea_orm_migration::MigratorTrait;
use tracing::info;
use tripflow::database::{establish_connection, get_database_url, Migrator};
use tripflow::DatabaseConfig;

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateDirection {
    Up,
    Down,
    /// Drop every table, then migrate up again
    Fresh,
}

/// An explicit `--database` wins over the environment.
pub fn database_config(database: Option<&str>) -> DatabaseConfig {
    match database {
        Some(database) => DatabaseConfig::new(get_database_url(Some(database))),
        None => DatabaseConfig::from_env(),
    }
}

pub async fn migrate_database(database: &DatabaseConfig, direction: MigrateDirection) -> Result<()> {
    let db = establish_connection(&database.url)
        .await
        .context("failed to connect to the trip database")?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}
