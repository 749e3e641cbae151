//! Turns raw record batches into feature rows.
//!
//! Rows are screened in a fixed order: whole-source duplicates first, then rows
//! missing a critical geo/time field. Survivors get distance, duration, speed,
//! fare rate and estimated fare. The optional [`OutlierFilter`] runs afterwards
//! on the derived rows.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime};
use sha2::{Digest, Sha256};

use crate::config::{FareModel, OutlierConfig};
use crate::geo;
use crate::reader::RecordBatch;
use crate::record::{FeatureRow, RawRecord, RejectReason, RejectedRow, StoreAndFwdFlag};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses the timestamp layouts seen in trip exports. Anything else is `None`.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// The coerced values a feature row cannot be built without.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalFields {
    pub pickup_datetime: NaiveDateTime,
    pub dropoff_datetime: NaiveDateTime,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub trip_duration: f64,
}

/// Extracts the critical fields, or `None` when any is absent, unparseable or
/// not a finite number.
pub fn critical_fields(record: &RawRecord) -> Option<CriticalFields> {
    let finite = |value: Option<f64>| value.filter(|v| v.is_finite());
    Some(CriticalFields {
        pickup_datetime: record.pickup_datetime.as_deref().and_then(parse_timestamp)?,
        dropoff_datetime: record.dropoff_datetime.as_deref().and_then(parse_timestamp)?,
        pickup_latitude: finite(record.pickup_latitude)?,
        pickup_longitude: finite(record.pickup_longitude)?,
        dropoff_latitude: finite(record.dropoff_latitude)?,
        dropoff_longitude: finite(record.dropoff_longitude)?,
        trip_duration: finite(record.trip_duration)?,
    })
}

pub fn has_critical_fields(record: &RawRecord) -> bool {
    critical_fields(record).is_some()
}

/// Output of deriving one batch. `rows` keeps source order.
#[derive(Debug, Clone, Default)]
pub struct DerivedBatch {
    pub offset: u64,
    pub rows: Vec<FeatureRow>,
    pub rejected: Vec<RejectedRow>,
}

/// Stateful across batches of one source: it remembers every row identity seen
/// so duplicates are detected source-wide, not just within a chunk.
#[derive(Debug)]
pub struct FeatureDeriver {
    fare: FareModel,
    seen: HashSet<[u8; 32]>,
}

impl FeatureDeriver {
    pub fn new(fare: FareModel) -> Self {
        Self {
            fare,
            seen: HashSet::new(),
        }
    }

    pub fn derive(&mut self, batch: RecordBatch) -> DerivedBatch {
        let mut derived = DerivedBatch {
            offset: batch.offset,
            rows: Vec::with_capacity(batch.records.len()),
            rejected: Vec::new(),
        };

        for record in batch.records {
            if !self.seen.insert(row_identity(&record)) {
                derived
                    .rejected
                    .push(RejectedRow::from_record(record, RejectReason::Duplicate));
                continue;
            }
            match critical_fields(&record) {
                Some(critical) => derived.rows.push(self.feature_row(record, critical)),
                None => derived.rejected.push(RejectedRow::from_record(
                    record,
                    RejectReason::MissingCriticalField,
                )),
            }
        }

        derived
    }

    /// Derives one row without duplicate tracking.
    pub fn derive_record(&self, record: RawRecord) -> Result<FeatureRow, RejectedRow> {
        match critical_fields(&record) {
            Some(critical) => Ok(self.feature_row(record, critical)),
            None => Err(RejectedRow::from_record(
                record,
                RejectReason::MissingCriticalField,
            )),
        }
    }

    /// Distinct row identities remembered so far.
    pub fn identities_seen(&self) -> usize {
        self.seen.len()
    }

    fn feature_row(&self, record: RawRecord, critical: CriticalFields) -> FeatureRow {
        let trip_distance_km = geo::great_circle_distance_km(
            critical.pickup_latitude,
            critical.pickup_longitude,
            critical.dropoff_latitude,
            critical.dropoff_longitude,
        );
        let trip_duration_min = geo::trip_duration_minutes(critical.trip_duration);
        let speed_kmh = geo::speed_kmh(trip_distance_km, trip_duration_min);
        let fare_amount = record.fare_amount.filter(|fare| fare.is_finite());
        let fare_per_km = geo::fare_per_km(fare_amount, trip_distance_km);

        FeatureRow {
            row: record.row,
            store_and_fwd_flag: StoreAndFwdFlag::normalize(record.store_and_fwd_flag.as_deref()),
            vendor_id: record.vendor_id,
            pickup_datetime: critical.pickup_datetime,
            dropoff_datetime: critical.dropoff_datetime,
            passenger_count: record.passenger_count,
            pickup_longitude: critical.pickup_longitude,
            pickup_latitude: critical.pickup_latitude,
            dropoff_longitude: critical.dropoff_longitude,
            dropoff_latitude: critical.dropoff_latitude,
            trip_duration: critical.trip_duration,
            fare_amount,
            trip_distance_km,
            trip_duration_min,
            speed_kmh,
            fare_per_km,
            estimated_fare: self.fare.estimate(trip_distance_km),
            fields: record.fields,
        }
    }
}

/// SHA-256 over the verbatim fields; two rows share an identity only when every
/// field is byte-identical.
fn row_identity(record: &RawRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((record.fields.len() as u64).to_le_bytes());
    for field in record.fields.iter() {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.finalize().into()
}

/// Drops physically implausible rows from already-derived output.
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    max_speed_kmh: f64,
}

impl OutlierFilter {
    pub fn new(config: &OutlierConfig) -> Self {
        Self {
            max_speed_kmh: config.max_speed_kmh,
        }
    }

    pub fn classify(&self, row: &FeatureRow) -> Option<RejectReason> {
        let speed = row.speed_kmh;
        if !(speed > 0.0 && speed <= self.max_speed_kmh) {
            return Some(RejectReason::UnrealisticSpeed);
        }
        match row.fare_per_km {
            Some(rate) if !(rate > 0.0) => Some(RejectReason::InvalidFareRate),
            _ => None,
        }
    }

    /// Splits rows into survivors and rejections. Idempotent on its own output.
    pub fn apply(&self, rows: Vec<FeatureRow>) -> (Vec<FeatureRow>, Vec<RejectedRow>) {
        let mut kept = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        for row in rows {
            match self.classify(&row) {
                Some(reason) => rejected.push(RejectedRow::from_feature(row, reason)),
                None => kept.push(row),
            }
        }
        (kept, rejected)
    }
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new(&OutlierConfig::default())
    }
}
