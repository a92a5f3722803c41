use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Year {year} is not in the station file (available: {available:?})")]
    YearUnavailable { year: i32, available: Vec<i32> },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No station-year with a detected onset ({excluded} excluded)")]
    NoContributors { excluded: usize },

    #[error("Station file parsing failed: {0}")]
    Parser(#[from] bic_parser::ParserError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
