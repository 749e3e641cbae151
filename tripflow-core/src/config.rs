use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{IngestError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_MAX_SPEED_KMH: f64 = 150.0;

/// Configuration knobs for a single ingestion run. Defaults mirror the batch sizes
/// used by the command line loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of source rows read, derived and committed together.
    pub chunk_size: usize,
    /// Rows per physical insert statement inside a chunk transaction.
    pub insert_batch_size: usize,
    pub outliers: OutlierConfig,
    pub fare: FareModel,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            outliers: OutlierConfig::default(),
            fare: FareModel::default(),
        }
    }
}

impl IngestConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: IngestConfig = serde_yaml::from_str(content)
            .map_err(|err| IngestError::config("config", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            IngestError::config("config", format!("cannot read {}: {}", path.display(), err))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IngestError::config("chunk_size", "must be greater than zero"));
        }
        if self.insert_batch_size == 0 {
            return Err(IngestError::config(
                "insert_batch_size",
                "must be greater than zero",
            ));
        }
        let max_speed = self.outliers.max_speed_kmh;
        if !max_speed.is_finite() || max_speed <= 0.0 {
            return Err(IngestError::config(
                "outliers.max_speed_kmh",
                "must be a positive number",
            ));
        }
        if !self.fare.base_fare.is_finite() || !self.fare.cost_per_km.is_finite() {
            return Err(IngestError::config("fare", "fare model must be finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub enabled: bool,
    pub max_speed_kmh: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_speed_kmh: DEFAULT_MAX_SPEED_KMH,
        }
    }
}

/// Flat-rate tariff used to estimate what a trip should have cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FareModel {
    pub base_fare: f64,
    pub cost_per_km: f64,
}

impl Default for FareModel {
    fn default() -> Self {
        Self {
            base_fare: 2.50,
            cost_per_km: 4.00,
        }
    }
}

impl FareModel {
    pub fn estimate(&self, distance_km: f64) -> f64 {
        self.base_fare + distance_km * self.cost_per_km
    }
}

/// Where the trip store lives. Resolved from the environment so that no module
/// needs process-wide connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty("TRIPFLOW_DATABASE_URL") {
            return Self { url };
        }

        match non_empty("DB_HOST") {
            Some(host) => {
                let user = non_empty("DB_USER").unwrap_or_else(|| "root".to_string());
                let password = lookup("DB_PASSWORD").unwrap_or_default();
                let name = non_empty("DB_NAME").unwrap_or_else(|| "trip_data".to_string());
                let credentials = if password.is_empty() {
                    user
                } else {
                    format!("{}:{}", user, password)
                };
                Self {
                    url: format!("mysql://{}@{}/{}", credentials, host, name),
                }
            }
            None => Self {
                url: crate::database::connection::get_database_url(None),
            },
        }
    }
}
