//! Local database layer

mod connection;
mod migrations;

pub use connection::Database;
