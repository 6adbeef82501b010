//! # ragdesk Core
//!
//! Core library for the ragdesk console.
//! Provides evaluation CSV loading, form state, request assembly for the
//! upload/test/evaluate operations, the HTTP backend client, the response
//! views that the CLI renders, and local records of evaluation jobs.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluation_csv;
pub mod form;
pub mod jobs;
pub mod payload;
pub mod render;
pub mod submit;
pub mod usecase;

// Re-export commonly used types at the crate root.
pub use backend::{MockBackend, RagBackend};
pub use client::HttpBackend;
pub use config::{config_exists, load_config, ConsoleConfig};
pub use error::{ConfigError, StoreError, SubmitError, ValidationError};
pub use evaluation_csv::{parse_evaluation_csv, EvaluationRecord, EvaluationSet};
pub use form::{FieldType, FieldValue, FieldVisibility, FormField, FormState};
pub use jobs::JobStore;
pub use payload::{
    assemble, DeveloperSession, DocumentSource, MainMode, Operation, SubMode, SubmissionPayload,
};
pub use render::{render_fields, render_text, JobStatus, JobTracker, ResponseView};
pub use submit::{ResponseResult, SubmissionController};
pub use usecase::{ResponseField, UseCaseCatalog, UseCaseConfig};
