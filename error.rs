use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV layout mismatch: {0}")]
    Shape(String),

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("No market with id {0}")]
    NotFound(i64),

    #[error("Invalid rating {0:?}: expected a whole number from 1 to 5")]
    InvalidRating(String),

    #[error("Database already exists at {0}; pass --force to replace it")]
    DatabaseExists(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
