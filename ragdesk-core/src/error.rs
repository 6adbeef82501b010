//! Error types for the ragdesk core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering client-side validation, backend submission, configuration, and
//! the local job store.

use std::path::PathBuf;

/// Client-side problems that block a submission before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a Use Case ID")]
    MissingUsecaseId,

    #[error("Please upload at least one document")]
    NoDocuments,

    #[error("Please provide S3 bucket name and region")]
    MissingS3Location,

    #[error("Please enter a query")]
    MissingQuery,

    #[error("Please upload a CSV file with test data")]
    NoEvaluationData,

    #[error("CSV must contain \"query\" and \"answer\" columns")]
    MissingCsvColumns,

    #[error("Please upload a valid CSV file: {path}")]
    NotCsv { path: PathBuf },

    #[error("Could not read CSV file {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("{label} is required")]
    RequiredField { id: String, label: String },

    #[error("Invalid field assignment '{input}', expected key=value")]
    BadAssignment { input: String },
}

/// Failures from talking to the backend.
///
/// Every variant is folded into a failed `ResponseResult` before it reaches
/// the renderer; see [`crate::submit::ResponseResult::from_outcome`].
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response from server: {message}")]
    Decode { message: String },

    #[error("Server unreachable: {message}")]
    Connectivity { message: String },

    #[error("Could not build request: {message}")]
    Request { message: String },
}

impl SubmitError {
    /// Whether the request never reached the server.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SubmitError::Connectivity { .. })
    }
}

/// Errors from the configuration system and use-case catalog.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Unknown use case: {name}")]
    UnknownUseCase { name: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Failures reading or writing local job records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
