use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no results for query")]
    NoResults,

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("malformed {column} in {table}: {value:?}")]
    Malformed {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("{0}")]
    Other(String),
}
