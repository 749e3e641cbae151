//! Streams a delimited trip source into bounded, order-preserving batches.
//!
//! The reader validates the header once, then hands out `RecordBatch`es of at
//! most `chunk_size` rows. Only one batch is held in memory at a time.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use strum::IntoEnumIterator;
use tracing::debug;

use crate::errors::{IngestError, Result};
use crate::record::{RawRecord, TripColumn};

/// Cell values treated as missing, in addition to empty cells.
const NULL_MARKERS: &[&str] = &["NA", "N/A", "NaN", "nan", "NULL", "null", "None"];

#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Data row index of the first record in the batch.
    pub offset: u64,
    pub records: Vec<RawRecord>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Column layout of one source file, resolved from its header row.
#[derive(Debug, Clone)]
pub struct SourceSchema {
    headers: StringRecord,
    positions: HashMap<TripColumn, usize>,
}

impl SourceSchema {
    pub fn from_headers(path: &Path, headers: &StringRecord) -> Result<Self> {
        let mut positions = HashMap::new();
        for (index, name) in headers.iter().enumerate() {
            let name = name.trim();
            if let Some(column) = TripColumn::iter().find(|c| c.name() == name) {
                positions.entry(column).or_insert(index);
            }
        }

        let missing: Vec<&str> = TripColumn::iter()
            .filter(|c| c.is_required() && !positions.contains_key(c))
            .map(TripColumn::name)
            .collect();
        if !missing.is_empty() {
            return Err(IngestError::malformed(
                path,
                format!("missing required columns: {}", missing.join(", ")),
            ));
        }

        Ok(Self {
            headers: headers.clone(),
            positions,
        })
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    fn text<'a>(&self, fields: &'a StringRecord, column: TripColumn) -> Option<&'a str> {
        let index = *self.positions.get(&column)?;
        let value = fields.get(index)?.trim();
        if value.is_empty() || NULL_MARKERS.contains(&value) {
            None
        } else {
            Some(value)
        }
    }

    fn float(&self, fields: &StringRecord, column: TripColumn) -> Option<f64> {
        self.text(fields, column)?.parse::<f64>().ok()
    }

    fn integer(&self, fields: &StringRecord, column: TripColumn) -> Option<i32> {
        let value = self.text(fields, column)?;
        value.parse::<i32>().ok().or_else(|| {
            // Counts exported through float columns look like "2.0".
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && v.abs() <= i32::MAX as f64)
                .map(|v| v as i32)
        })
    }

    /// Applies type coercion to one row of verbatim fields.
    pub fn to_record(&self, row: u64, fields: StringRecord) -> RawRecord {
        let owned = |column| self.text(&fields, column).map(str::to_string);
        RawRecord {
            row,
            vendor_id: owned(TripColumn::VendorId),
            pickup_datetime: owned(TripColumn::PickupDatetime),
            dropoff_datetime: owned(TripColumn::DropoffDatetime),
            passenger_count: self.integer(&fields, TripColumn::PassengerCount),
            pickup_longitude: self.float(&fields, TripColumn::PickupLongitude),
            pickup_latitude: self.float(&fields, TripColumn::PickupLatitude),
            dropoff_longitude: self.float(&fields, TripColumn::DropoffLongitude),
            dropoff_latitude: self.float(&fields, TripColumn::DropoffLatitude),
            store_and_fwd_flag: owned(TripColumn::StoreAndFwdFlag),
            trip_duration: self.float(&fields, TripColumn::TripDuration),
            fare_amount: self.float(&fields, TripColumn::FareAmount),
            fields,
        }
    }
}

pub struct ChunkedReader<R = File> {
    path: PathBuf,
    reader: csv::Reader<R>,
    schema: SourceSchema,
    chunk_size: usize,
    next_row: u64,
    finished: bool,
}

impl ChunkedReader<File> {
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IngestError::SourceNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(IngestError::malformed(path, "not a regular file"));
        }
        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => IngestError::SourceNotFound(path.to_path_buf()),
            _ => IngestError::malformed(path, err.to_string()),
        })?;
        Self::from_reader(path, file, chunk_size)
    }
}

impl<R: Read> ChunkedReader<R> {
    /// Wraps an already-open stream; `path` is only used to label errors.
    pub fn from_reader(path: impl Into<PathBuf>, source: R, chunk_size: usize) -> Result<Self> {
        let path = path.into();
        if chunk_size == 0 {
            return Err(IngestError::config("chunk_size", "must be greater than zero"));
        }

        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(source);
        let headers = reader
            .headers()
            .map_err(|err| IngestError::malformed(&path, format!("unreadable header: {}", err)))?
            .clone();
        let schema = SourceSchema::from_headers(&path, &headers)?;
        debug!(
            "Opened {} with {} columns, chunk size {}",
            path.display(),
            headers.len(),
            chunk_size
        );

        Ok(Self {
            path,
            reader,
            schema,
            chunk_size,
            next_row: 0,
            finished: false,
        })
    }

    pub fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows handed out so far.
    pub fn rows_read(&self) -> u64 {
        self.next_row
    }

    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.finished {
            return Ok(None);
        }

        let offset = self.next_row;
        let mut records = Vec::with_capacity(self.chunk_size.min(8_192));
        let mut fields = StringRecord::new();
        while records.len() < self.chunk_size {
            match self.reader.read_record(&mut fields) {
                Ok(true) => {
                    records.push(self.schema.to_record(self.next_row, fields.clone()));
                    self.next_row += 1;
                }
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(err) => {
                    self.finished = true;
                    return Err(IngestError::malformed(
                        &self.path,
                        format!("row {}: {}", self.next_row, err),
                    ));
                }
            }
        }

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(RecordBatch { offset, records }))
    }
}

impl<R: Read> Iterator for ChunkedReader<R> {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

/// Lists the `.csv` files of a directory, sorted by file name.
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::SourceNotFound(dir.to_path_buf()));
    }
    let entries = std::fs::read_dir(dir).map_err(|err| IngestError::malformed(dir, err.to_string()))?;

    let mut sources = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| IngestError::malformed(dir, err.to_string()))?
            .path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag,trip_duration,fare_amount";

    fn csv_with_rows(rows: usize) -> String {
        let mut content = format!("{}\n", HEADER);
        for i in 0..rows {
            content.push_str(&format!(
                "id{i},1,2016-03-14 17:24:55,2016-03-14 17:32:30,1,-73.98,40.76,-73.96,40.76,N,455,9.5\n"
            ));
        }
        content
    }

    #[test]
    fn batches_are_bounded_and_ordered() {
        let content = csv_with_rows(7);
        let reader = ChunkedReader::from_reader("trips.csv", content.as_bytes(), 3).unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();

        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(batches.iter().map(|b| b.offset).collect::<Vec<_>>(), vec![0, 3, 6]);
        let ids: Vec<String> = batches
            .iter()
            .flat_map(|b| b.records.iter().map(|r| r.fields[0].to_string()))
            .collect();
        assert_eq!(ids, (0..7).map(|i| format!("id{i}")).collect::<Vec<_>>());
    }

    #[test]
    fn exhausted_reader_stays_exhausted() {
        let content = csv_with_rows(2);
        let mut reader = ChunkedReader::from_reader("trips.csv", content.as_bytes(), 2).unwrap();
        assert_eq!(reader.next_batch().unwrap().unwrap().len(), 2);
        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.next().is_none());
        assert_eq!(reader.rows_read(), 2);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let content = "vendor_id,pickup_datetime,dropoff_datetime\n1,a,b\n";
        let err = ChunkedReader::from_reader("bad.csv", content.as_bytes(), 10)
            .err()
            .unwrap();
        match err {
            IngestError::MalformedSource { reason, .. } => {
                assert!(reason.contains("pickup_longitude"));
                assert!(reason.contains("fare_amount"));
                assert!(!reason.contains("store_and_fwd_flag"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_path_is_source_not_found() {
        let err = ChunkedReader::open("/definitely/not/here.csv", 10).err().unwrap();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
    }

    #[test]
    fn cells_are_coerced_leniently() {
        let content = format!(
            "{}\nx,2,2016-01-01 00:00:00,,2.0,abc,40.7,-73.9,NaN,,600,\nshort,1\n",
            HEADER
        );
        let mut reader = ChunkedReader::from_reader("t.csv", content.as_bytes(), 10).unwrap();
        let batch = reader.next_batch().unwrap().unwrap();
        let first = &batch.records[0];
        assert_eq!(first.vendor_id.as_deref(), Some("2"));
        assert_eq!(first.dropoff_datetime, None);
        assert_eq!(first.passenger_count, Some(2));
        assert_eq!(first.pickup_longitude, None);
        assert_eq!(first.pickup_latitude, Some(40.7));
        assert_eq!(first.dropoff_latitude, None);
        assert_eq!(first.store_and_fwd_flag, None);
        assert_eq!(first.trip_duration, Some(600.0));
        assert_eq!(first.fare_amount, None);

        let short = &batch.records[1];
        assert_eq!(short.vendor_id.as_deref(), Some("1"));
        assert_eq!(short.trip_duration, None);
        assert_eq!(short.row, 1);
    }

    #[test]
    fn discovers_only_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), csv_with_rows(1)).unwrap();
        std::fs::write(dir.path().join("a.CSV"), csv_with_rows(1)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let sources = discover_sources(dir.path()).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);

        assert!(matches!(
            discover_sources(&dir.path().join("missing")),
            Err(IngestError::SourceNotFound(_))
        ));
    }
}
