pub mod connection;
pub mod migrations;

pub use connection::{establish_connection, get_database_url};
pub use migrations::Migrator;
