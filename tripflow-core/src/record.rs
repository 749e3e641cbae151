//! Row types flowing through the pipeline: raw source rows, derived feature rows,
//! and rejected rows with their reason tag.

use chrono::NaiveDateTime;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Columns the loader understands. All but `StoreAndFwdFlag` must be present in
/// the source header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum TripColumn {
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
}

impl TripColumn {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn is_required(self) -> bool {
        !matches!(self, TripColumn::StoreAndFwdFlag)
    }
}

/// One source row as read, with type coercion applied but nothing validated.
/// Unparseable numeric cells become `None`; timestamps stay textual until the
/// deriver parses them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Zero-based data row index within the source (header excluded).
    pub row: u64,
    pub vendor_id: Option<String>,
    pub pickup_datetime: Option<String>,
    pub dropoff_datetime: Option<String>,
    pub passenger_count: Option<i32>,
    pub pickup_longitude: Option<f64>,
    pub pickup_latitude: Option<f64>,
    pub dropoff_longitude: Option<f64>,
    pub dropoff_latitude: Option<f64>,
    pub store_and_fwd_flag: Option<String>,
    pub trip_duration: Option<f64>,
    pub fare_amount: Option<f64>,
    /// Verbatim field values in source column order.
    pub fields: StringRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreAndFwdFlag {
    Y,
    #[default]
    N,
}

impl StoreAndFwdFlag {
    /// Coerces free text to `Y`/`N` by its first character; anything else is `N`.
    pub fn normalize(value: Option<&str>) -> Self {
        match value.map(str::trim).and_then(|v| v.chars().next()) {
            Some(c) if c.eq_ignore_ascii_case(&'y') => StoreAndFwdFlag::Y,
            _ => StoreAndFwdFlag::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreAndFwdFlag::Y => "Y",
            StoreAndFwdFlag::N => "N",
        }
    }
}

/// A validated record augmented with derived physical quantities.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub row: u64,
    pub vendor_id: Option<String>,
    pub pickup_datetime: NaiveDateTime,
    pub dropoff_datetime: NaiveDateTime,
    pub passenger_count: Option<i32>,
    pub pickup_longitude: f64,
    pub pickup_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_latitude: f64,
    pub store_and_fwd_flag: StoreAndFwdFlag,
    /// Seconds, as given by the source.
    pub trip_duration: f64,
    pub fare_amount: Option<f64>,
    pub trip_distance_km: f64,
    pub trip_duration_min: f64,
    pub speed_kmh: f64,
    pub fare_per_km: Option<f64>,
    pub estimated_fare: f64,
    pub fields: StringRecord,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    IntoStaticStr,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum RejectReason {
    Duplicate,
    MissingCriticalField,
    UnrealisticSpeed,
    InvalidFareRate,
}

impl RejectReason {
    pub fn tag(self) -> &'static str {
        self.into()
    }

    /// Section title used in the reject report.
    pub fn title(self) -> &'static str {
        match self {
            RejectReason::Duplicate => "Removed duplicate rows",
            RejectReason::MissingCriticalField => "Removed rows with missing critical values",
            RejectReason::UnrealisticSpeed => "Removed unrealistic speeds",
            RejectReason::InvalidFareRate => "Removed invalid fare/km",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub row: u64,
    pub reason: RejectReason,
    pub fields: StringRecord,
}

impl RejectedRow {
    pub fn from_record(record: RawRecord, reason: RejectReason) -> Self {
        Self {
            row: record.row,
            reason,
            fields: record.fields,
        }
    }

    pub fn from_feature(row: FeatureRow, reason: RejectReason) -> Self {
        Self {
            row: row.row,
            reason,
            fields: row.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn flag_normalization() {
        assert_eq!(StoreAndFwdFlag::normalize(Some("Y")), StoreAndFwdFlag::Y);
        assert_eq!(StoreAndFwdFlag::normalize(Some("yes")), StoreAndFwdFlag::Y);
        assert_eq!(StoreAndFwdFlag::normalize(Some(" y ")), StoreAndFwdFlag::Y);
        assert_eq!(StoreAndFwdFlag::normalize(Some("N")), StoreAndFwdFlag::N);
        assert_eq!(StoreAndFwdFlag::normalize(Some("")), StoreAndFwdFlag::N);
        assert_eq!(StoreAndFwdFlag::normalize(Some("X")), StoreAndFwdFlag::N);
        assert_eq!(StoreAndFwdFlag::normalize(None), StoreAndFwdFlag::N);
    }

    #[test]
    fn reason_tags_round_trip_through_strings() {
        assert_eq!(RejectReason::MissingCriticalField.to_string(), "missing-critical-field");
        assert_eq!(
            RejectReason::from_str("invalid-fare-rate").unwrap(),
            RejectReason::InvalidFareRate
        );
        assert_eq!(RejectReason::Duplicate.tag(), "duplicate");
    }

    #[test]
    fn column_names_match_source_header() {
        assert_eq!(TripColumn::PickupDatetime.name(), "pickup_datetime");
        assert_eq!(TripColumn::StoreAndFwdFlag.name(), "store_and_fwd_flag");
        assert!(!TripColumn::StoreAndFwdFlag.is_required());
        assert!(TripColumn::FareAmount.is_required());
    }
}
