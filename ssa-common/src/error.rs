//! Common error types for SSA

use thiserror::Error;

/// Common result type for SSA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading an export or computing over it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required export file is absent (fatal for the dataset load)
    #[error("Missing required file: {file}")]
    MissingRequiredFile { file: String },

    /// A required column is absent from a file
    #[error("Missing required column '{column}' in {file}")]
    MissingRequiredColumn { file: String, column: String },

    /// Rows of a file could not be parsed and were skipped
    #[error("Skipped {skipped} unparsable row(s) in {file}")]
    UnparsableRow { file: String, skipped: usize },

    /// File header matches no known export layout
    #[error("Unsupported export version: no recognizable columns in {file}")]
    UnsupportedExportVersion { file: String },

    /// The dataset holds no subscribers or no posts (non-fatal notice)
    #[error("Dataset is empty: {subscribers} subscriber(s), {posts} post(s)")]
    EmptyDataset { subscribers: usize, posts: usize },

    /// I/O operation error
    #[error("IO error: {0}")]
    Io(String),

    /// A whole file could not be read as CSV
    #[error("CSV error in {file}: {message}")]
    Csv { file: String, message: String },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// True for errors that abort a dataset load
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnparsableRow { .. } | Error::EmptyDataset { .. })
    }

    /// Stable machine-readable code for API responses and load notices
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingRequiredFile { .. } => "MISSING_REQUIRED_FILE",
            Error::MissingRequiredColumn { .. } => "MISSING_REQUIRED_COLUMN",
            Error::UnparsableRow { .. } => "UNPARSABLE_ROW",
            Error::UnsupportedExportVersion { .. } => "UNSUPPORTED_EXPORT_VERSION",
            Error::EmptyDataset { .. } => "EMPTY_DATASET",
            Error::Io(_) => "IO_ERROR",
            Error::Csv { .. } => "CSV_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}
