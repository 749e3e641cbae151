pub mod trips;
pub mod vendors;
