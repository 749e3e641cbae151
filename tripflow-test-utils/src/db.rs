use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

pub struct TestDb {
    url: String,
}

impl TestDb {
    pub fn new_in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
        }
    }

    pub fn new_file(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path.as_ref().display()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single-connection handle, so an in-memory database survives across
    /// statements.
    pub async fn connect(&self) -> Result<DatabaseConnection, DbErr> {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        Database::connect(opt).await
    }

    /// Connects and applies every migration of `M`.
    pub async fn migrated<M: MigratorTrait>(&self) -> Result<DatabaseConnection, DbErr> {
        let db = self.connect().await?;
        M::up(&db, None).await?;
        Ok(db)
    }
}
