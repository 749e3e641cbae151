/// Full source header in the column order of the public trip dataset.
pub const HEADER: &str = "id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag,trip_duration,fare_amount";

/// One source row. Defaults describe a 10 km trip due north taking ten
/// minutes for a fare of 25.
#[derive(Debug, Clone)]
pub struct TripRow {
    pub id: String,
    pub vendor_id: String,
    pub pickup_datetime: String,
    pub dropoff_datetime: String,
    pub passenger_count: String,
    pub pickup_longitude: String,
    pub pickup_latitude: String,
    pub dropoff_longitude: String,
    pub dropoff_latitude: String,
    pub store_and_fwd_flag: String,
    pub trip_duration: String,
    pub fare_amount: String,
}

impl TripRow {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            vendor_id: "1".to_string(),
            pickup_datetime: "2016-03-14 17:24:55".to_string(),
            dropoff_datetime: "2016-03-14 17:34:55".to_string(),
            passenger_count: "1".to_string(),
            pickup_longitude: "-73.982155".to_string(),
            pickup_latitude: "40.0".to_string(),
            dropoff_longitude: "-73.982155".to_string(),
            dropoff_latitude: "40.089932".to_string(),
            store_and_fwd_flag: "N".to_string(),
            trip_duration: "600".to_string(),
            fare_amount: "25".to_string(),
        }
    }

    pub fn vendor(mut self, vendor_id: &str) -> Self {
        self.vendor_id = vendor_id.to_string();
        self
    }

    pub fn duration(mut self, seconds: &str) -> Self {
        self.trip_duration = seconds.to_string();
        self
    }

    pub fn fare(mut self, amount: &str) -> Self {
        self.fare_amount = amount.to_string();
        self
    }

    pub fn dropoff_latitude(mut self, value: &str) -> Self {
        self.dropoff_latitude = value.to_string();
        self
    }

    pub fn to_line(&self) -> String {
        [
            &self.id,
            &self.vendor_id,
            &self.pickup_datetime,
            &self.dropoff_datetime,
            &self.passenger_count,
            &self.pickup_longitude,
            &self.pickup_latitude,
            &self.dropoff_longitude,
            &self.dropoff_latitude,
            &self.store_and_fwd_flag,
            &self.trip_duration,
            &self.fare_amount,
        ]
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Builds trip CSV content with the standard header.
#[derive(Debug, Clone, Default)]
pub struct TripCsv {
    rows: Vec<TripRow>,
}

impl TripCsv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, row: TripRow) -> Self {
        self.rows.push(row);
        self
    }

    /// `count` valid rows with ids `trip-<n>`, cycling vendors 1 and 2.
    pub fn valid_rows(mut self, count: usize) -> Self {
        let start = self.rows.len();
        for n in start..start + count {
            let vendor = if n % 2 == 0 { "1" } else { "2" };
            self.rows.push(TripRow::new(&format!("trip-{}", n)).vendor(vendor));
        }
        self
    }

    pub fn build(&self) -> String {
        let mut content = String::from(HEADER);
        content.push('\n');
        for row in &self.rows {
            content.push_str(&row.to_line());
            content.push('\n');
        }
        content
    }
}
