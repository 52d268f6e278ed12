//! Storage layer: DuckDB-backed mirror of remote declarations and read access
//! to the authoritative contract tables.

mod error;
pub mod schema;
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
