// Database Drivers
// Concrete provider implementations, one per engine

pub mod mssql;

pub use mssql::{MssqlProvider, DEFAULT_SCHEMA_KEY};
