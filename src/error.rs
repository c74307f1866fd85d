use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("unknown species '{key}'")]
    #[diagnostic(help("available species: {available}"))]
    UnknownSpecies { key: String, available: String },

    #[error("failed to connect to {server} after {attempts} attempts: {message}")]
    ConnectionFailure {
        server: String,
        attempts: u32,
        message: String,
    },

    #[error("dataset {dataset} not found on {server}")]
    DatasetNotFound { dataset: String, server: String },

    #[error("attribute mismatch at line {line}: expected {expected} fields, found {found}")]
    AttributeMismatch {
        expected: usize,
        found: usize,
        line: usize,
    },

    #[error("reduced attribute query failed: {fallback} (full query: {original})")]
    FallbackFailure {
        original: Box<KiraError>,
        fallback: Box<KiraError>,
    },

    #[error("BioMart request failed: {0}")]
    BiomartHttp(String),

    #[error("BioMart returned status {status}: {message}")]
    BiomartStatus { status: u16, message: String },

    #[error("BioMart rejected query: {0}")]
    BiomartQuery(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("csv error: {0}")]
    Csv(String),
}

impl KiraError {
    /// Errors that another connection attempt could plausibly clear.
    pub fn is_retryable(&self, retry_not_found: bool) -> bool {
        match self {
            KiraError::DatasetNotFound { .. } => retry_not_found,
            KiraError::UnknownSpecies { .. }
            | KiraError::ConfigRead(_)
            | KiraError::ConfigParse(_)
            | KiraError::InvalidConfig(_)
            | KiraError::Filesystem(_)
            | KiraError::Csv(_) => false,
            _ => true,
        }
    }
}
