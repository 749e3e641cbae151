//! Shared helpers for tripflow integration tests.

pub mod db;
pub mod fixtures;
pub mod temp;

pub use db::TestDb;
pub use fixtures::{TripCsv, TripRow, HEADER};
pub use temp::TempDir;
