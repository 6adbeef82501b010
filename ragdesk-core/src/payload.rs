//! Request assembly for the upload, test, and evaluate operations.
//!
//! A [`DeveloperSession`] accumulates everything the user has entered. At
//! submit time [`assemble`] checks the rules for the active operation and
//! produces exactly one [`SubmissionPayload`] variant. Structured parameters
//! stay typed until [`SubmissionPayload::form_fields`] serializes them for
//! the multipart body.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::FormDefaults;
use crate::error::ValidationError;
use crate::evaluation_csv::{EvaluationRecord, EvaluationSet};
use crate::form::FieldVisibility;

pub const TOP_K_MIN: u32 = 1;
pub const TOP_K_MAX: u32 = 10;
pub const DEFAULT_TOP_K: u32 = 5;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_CHUNK_SIZE: u32 = 1000;
pub const DEFAULT_OVERLAP: u32 = 200;

/// Agent id whose selection turns on `useSelfCritic`.
pub const SELF_CRITIC_AGENT: &str = "self_critic";

/// A selectable tool or agent offered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const AVAILABLE_TOOLS: &[CatalogEntry] = &[
    CatalogEntry {
        id: "vin_search",
        name: "VIN Search",
        description: "Use the VINteligence API to search vehicle information",
    },
    CatalogEntry {
        id: "carfax",
        name: "CARFAX",
        description: "Find the Date of First Use (DOFU) from CARFAX database",
    },
    CatalogEntry {
        id: "cims",
        name: "CIMS",
        description: "Access Claims database API for vehicle claims information",
    },
    CatalogEntry {
        id: "ihost",
        name: "Ihost",
        description: "Access Contract data APIs for vehicle contract information",
    },
];

pub const AVAILABLE_AGENTS: &[CatalogEntry] = &[
    CatalogEntry {
        id: "self_critic",
        name: "Self Critic",
        description: "Enable self-criticism to improve response quality and accuracy",
    },
    CatalogEntry {
        id: "fact_checker",
        name: "Fact Checker",
        description: "Verify facts and cross-reference information with reliable sources",
    },
    CatalogEntry {
        id: "context_analyzer",
        name: "Context Analyzer",
        description: "Analyze context and maintain conversation coherence",
    },
    CatalogEntry {
        id: "reasoning_agent",
        name: "Reasoning Agent",
        description: "Apply logical reasoning and step-by-step problem solving",
    },
    CatalogEntry {
        id: "summarization_agent",
        name: "Summarization Agent",
        description: "Create concise summaries of complex information",
    },
    CatalogEntry {
        id: "query_optimizer",
        name: "Query Optimizer",
        description: "Optimize search queries for better retrieval results",
    },
];

/// Top-level mode: prepare documents, or run queries against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MainMode {
    #[default]
    Upload,
    Run,
}

/// Run sub-mode: a single query, or a batch evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubMode {
    #[default]
    Test,
    Evaluation,
}

/// Where uploaded documents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    #[default]
    Upload,
    S3,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::Upload => "upload",
            DocumentSource::S3 => "s3",
        }
    }
}

/// The backend operation a submission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Test,
    Evaluate,
}

impl Operation {
    pub fn from_modes(main: MainMode, sub: SubMode) -> Self {
        match (main, sub) {
            (MainMode::Upload, _) => Operation::Upload,
            (MainMode::Run, SubMode::Test) => Operation::Test,
            (MainMode::Run, SubMode::Evaluation) => Operation::Evaluate,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Upload => write!(f, "upload"),
            Operation::Test => write!(f, "test"),
            Operation::Evaluate => write!(f, "evaluate"),
        }
    }
}

/// Generation parameters shared by test and evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmParameters {
    pub is_vector: bool,
    pub top_k: u32,
    pub temperature: f64,
    pub max_tokens: u32,
    pub use_self_critic: bool,
}

/// Chunking parameters sent with an upload. Chunking fields are null unless
/// vectorization is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParameters {
    pub is_vector: bool,
    pub chunk_size: Option<u32>,
    pub overlap: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgenticConfig {
    pub enabled: bool,
    pub agents: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    pub use_guardrails: bool,
    pub guardrails: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    pub enabled: bool,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub prefix: Option<String>,
}

/// External API the backend's tools may call on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
}

/// Options common to the test and evaluate operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub llm_parameters: LlmParameters,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub agentic_config: AgenticConfig,
    pub guardrail_config: GuardrailConfig,
    pub api_config: ApiConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub usecase_id: String,
    pub llm_parameters: UploadParameters,
    pub document_source: DocumentSource,
    pub files: Vec<PathBuf>,
    pub s3_config: S3Config,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestRequest {
    pub usecase_id: String,
    pub query: String,
    pub options: RunOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateRequest {
    pub usecase_id: String,
    pub evaluation_data: Vec<EvaluationRecord>,
    pub options: RunOptions,
}

/// Exactly one request, built fresh for each submit.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionPayload {
    Upload(UploadRequest),
    Test(TestRequest),
    Evaluate(EvaluateRequest),
}

impl SubmissionPayload {
    pub fn operation(&self) -> Operation {
        match self {
            SubmissionPayload::Upload(_) => Operation::Upload,
            SubmissionPayload::Test(_) => Operation::Test,
            SubmissionPayload::Evaluate(_) => Operation::Evaluate,
        }
    }

    pub fn usecase_id(&self) -> &str {
        match self {
            SubmissionPayload::Upload(r) => &r.usecase_id,
            SubmissionPayload::Test(r) => &r.usecase_id,
            SubmissionPayload::Evaluate(r) => &r.usecase_id,
        }
    }

    /// Files to attach as `files[]` parts.
    pub fn attachments(&self) -> &[PathBuf] {
        match self {
            SubmissionPayload::Upload(r) => &r.files,
            _ => &[],
        }
    }

    /// Text parts of the multipart body, with nested objects encoded as JSON.
    pub fn form_fields(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let mut fields = Vec::new();
        match self {
            SubmissionPayload::Upload(r) => {
                fields.push(("usecase_id", r.usecase_id.clone()));
                fields.push(("llm_parameters", serde_json::to_string(&r.llm_parameters)?));
                fields.push(("document_source", r.document_source.as_str().to_string()));
                fields.push(("s3_config", serde_json::to_string(&r.s3_config)?));
            }
            SubmissionPayload::Test(r) => {
                fields.push(("usecase_id", r.usecase_id.clone()));
                fields.push(("query", r.query.clone()));
                push_run_options(&mut fields, &r.options)?;
            }
            SubmissionPayload::Evaluate(r) => {
                fields.push(("usecase_id", r.usecase_id.clone()));
                fields.push(("evaluation_data", serde_json::to_string(&r.evaluation_data)?));
                push_run_options(&mut fields, &r.options)?;
            }
        }
        Ok(fields)
    }
}

fn push_run_options(
    fields: &mut Vec<(&'static str, String)>,
    options: &RunOptions,
) -> Result<(), serde_json::Error> {
    fields.push(("llm_parameters", serde_json::to_string(&options.llm_parameters)?));
    fields.push(("system_prompt", options.system_prompt.clone()));
    fields.push(("tools", serde_json::to_string(&options.tools)?));
    fields.push(("agentic_config", serde_json::to_string(&options.agentic_config)?));
    fields.push(("guardrail_config", serde_json::to_string(&options.guardrail_config)?));
    fields.push(("api_config", serde_json::to_string(&options.api_config)?));
    Ok(())
}

/// S3 bucket location as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Location {
    pub bucket_name: String,
    pub region: String,
    pub prefix: String,
}

/// Settings for the optional external API integration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub auth_token: String,
}

/// Everything entered on the developer console, across all modes.
#[derive(Debug, Clone)]
pub struct DeveloperSession {
    pub main_mode: MainMode,
    pub sub_mode: SubMode,
    pub document_source: DocumentSource,
    pub usecase_id: String,
    pub query: String,
    pub system_prompt: String,
    pub is_vector: bool,
    pub chunk_size: u32,
    pub overlap: u32,
    /// Raw numeric inputs; parsed leniently at submit time.
    pub top_k_input: String,
    pub temperature_input: String,
    pub max_tokens_input: String,
    pub attachments: Vec<PathBuf>,
    pub s3: S3Location,
    pub agentic_enabled: bool,
    pub guardrails_enabled: bool,
    pub guardrails: String,
    pub api: ApiSettings,
    pub evaluation: EvaluationSet,
    selected_tools: Vec<String>,
    selected_agents: Vec<String>,
}

impl Default for DeveloperSession {
    fn default() -> Self {
        Self::with_defaults(&FormDefaults::default())
    }
}

impl DeveloperSession {
    pub fn with_defaults(defaults: &FormDefaults) -> Self {
        Self {
            main_mode: MainMode::default(),
            sub_mode: SubMode::default(),
            document_source: DocumentSource::default(),
            usecase_id: String::new(),
            query: String::new(),
            system_prompt: String::new(),
            is_vector: false,
            chunk_size: defaults.chunk_size,
            overlap: defaults.overlap,
            top_k_input: defaults.top_k.to_string(),
            temperature_input: defaults.temperature.to_string(),
            max_tokens_input: defaults.max_tokens.to_string(),
            attachments: Vec::new(),
            s3: S3Location::default(),
            agentic_enabled: false,
            guardrails_enabled: false,
            guardrails: String::new(),
            api: ApiSettings::default(),
            evaluation: EvaluationSet::new(),
            selected_tools: Vec::new(),
            selected_agents: Vec::new(),
        }
    }

    pub fn operation(&self) -> Operation {
        Operation::from_modes(self.main_mode, self.sub_mode)
    }

    /// Visibility of the configured dynamic fields under the current mode.
    pub fn field_visibility(&self) -> FieldVisibility {
        if self.main_mode == MainMode::Run && self.sub_mode == SubMode::Evaluation {
            FieldVisibility::Hidden
        } else {
            FieldVisibility::Visible
        }
    }

    pub fn toggle_tool(&mut self, id: &str) {
        toggle(&mut self.selected_tools, id);
    }

    pub fn toggle_agent(&mut self, id: &str) {
        toggle(&mut self.selected_agents, id);
    }

    pub fn selected_tools(&self) -> &[String] {
        &self.selected_tools
    }

    pub fn selected_agents(&self) -> &[String] {
        &self.selected_agents
    }

    /// Attach documents, keeping only PDFs. Returns how many were added.
    pub fn add_attachments<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let before = self.attachments.len();
        self.attachments.extend(
            paths
                .into_iter()
                .map(Into::into)
                .filter(|p: &PathBuf| is_pdf(p)),
        );
        self.attachments.len() - before
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<PathBuf> {
        (index < self.attachments.len()).then(|| self.attachments.remove(index))
    }

    pub fn set_chunk_size(&mut self, input: &str) {
        self.chunk_size = parse_positive(input).unwrap_or(DEFAULT_CHUNK_SIZE);
    }

    pub fn set_overlap(&mut self, input: &str) {
        self.overlap = parse_positive(input).unwrap_or(DEFAULT_OVERLAP);
    }

    fn run_options(&self) -> RunOptions {
        let llm_parameters = LlmParameters {
            is_vector: self.is_vector,
            top_k: parse_top_k(&self.top_k_input),
            temperature: parse_temperature(&self.temperature_input),
            max_tokens: parse_max_tokens(&self.max_tokens_input),
            use_self_critic: self.selected_agents.iter().any(|a| a == SELF_CRITIC_AGENT),
        };

        let agentic_config = AgenticConfig {
            enabled: self.agentic_enabled,
            agents: self
                .agentic_enabled
                .then(|| self.selected_agents.clone()),
        };

        let guardrail_config = GuardrailConfig {
            use_guardrails: self.guardrails_enabled,
            guardrails: self
                .guardrails_enabled
                .then(|| self.guardrails.trim().to_string()),
        };

        let api_config = ApiConfig {
            enabled: self.api.enabled,
            endpoint: self.api.enabled.then(|| self.api.endpoint.trim().to_string()),
            auth_token: (self.api.enabled && !self.api.auth_token.is_empty())
                .then(|| self.api.auth_token.clone()),
        };

        RunOptions {
            llm_parameters,
            system_prompt: self.system_prompt.trim().to_string(),
            tools: self.selected_tools.clone(),
            agentic_config,
            guardrail_config,
            api_config,
        }
    }

    fn s3_config(&self) -> S3Config {
        match self.document_source {
            DocumentSource::S3 => S3Config {
                enabled: true,
                bucket_name: Some(self.s3.bucket_name.trim().to_string()),
                region: Some(self.s3.region.trim().to_string()),
                prefix: Some(self.s3.prefix.trim().to_string()).filter(|p| !p.is_empty()),
            },
            DocumentSource::Upload => S3Config {
                enabled: false,
                bucket_name: None,
                region: None,
                prefix: None,
            },
        }
    }
}

/// Build the request for the session's active operation.
///
/// Fails before any network activity if the operation's required inputs
/// are missing.
pub fn assemble(session: &DeveloperSession) -> Result<SubmissionPayload, ValidationError> {
    let usecase_id = session.usecase_id.trim();
    if usecase_id.is_empty() {
        return Err(ValidationError::MissingUsecaseId);
    }
    let usecase_id = usecase_id.to_string();

    match session.operation() {
        Operation::Upload => {
            match session.document_source {
                DocumentSource::Upload if session.attachments.is_empty() => {
                    return Err(ValidationError::NoDocuments);
                }
                DocumentSource::S3
                    if session.s3.bucket_name.trim().is_empty()
                        || session.s3.region.trim().is_empty() =>
                {
                    return Err(ValidationError::MissingS3Location);
                }
                _ => {}
            }
            let files = match session.document_source {
                DocumentSource::Upload => session.attachments.clone(),
                DocumentSource::S3 => Vec::new(),
            };
            Ok(SubmissionPayload::Upload(UploadRequest {
                usecase_id,
                llm_parameters: UploadParameters {
                    is_vector: session.is_vector,
                    chunk_size: session.is_vector.then_some(session.chunk_size),
                    overlap: session.is_vector.then_some(session.overlap),
                },
                document_source: session.document_source,
                files,
                s3_config: session.s3_config(),
            }))
        }
        Operation::Test => {
            let query = session.query.trim();
            if query.is_empty() {
                return Err(ValidationError::MissingQuery);
            }
            Ok(SubmissionPayload::Test(TestRequest {
                usecase_id,
                query: query.to_string(),
                options: session.run_options(),
            }))
        }
        Operation::Evaluate => {
            if session.evaluation.is_empty() {
                return Err(ValidationError::NoEvaluationData);
            }
            Ok(SubmissionPayload::Evaluate(EvaluateRequest {
                usecase_id,
                evaluation_data: session.evaluation.records().to_vec(),
                options: session.run_options(),
            }))
        }
    }
}

/// Parse `topK`, falling back to the default and clamping into range.
pub fn parse_top_k(input: &str) -> u32 {
    let value = parse_int_prefix(input).unwrap_or(i64::from(DEFAULT_TOP_K));
    value.clamp(i64::from(TOP_K_MIN), i64::from(TOP_K_MAX)) as u32
}

pub fn parse_temperature(input: &str) -> f64 {
    match input.trim().parse::<f64>() {
        Ok(t) if t.is_finite() => t,
        _ => DEFAULT_TEMPERATURE,
    }
}

pub fn parse_max_tokens(input: &str) -> u32 {
    parse_positive(input).unwrap_or(DEFAULT_MAX_TOKENS)
}

fn parse_positive(input: &str) -> Option<u32> {
    parse_int_prefix(input)
        .filter(|n| *n > 0)
        .map(|n| n.min(i64::from(u32::MAX)) as u32)
}

/// Integer parse that accepts a decimal and truncates it ("7.9" -> 7).
fn parse_int_prefix(input: &str) -> Option<i64> {
    let trimmed = input.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

fn toggle(list: &mut Vec<String>, id: &str) {
    if let Some(pos) = list.iter().position(|x| x == id) {
        list.remove(pos);
    } else {
        list.push(id.to_string());
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
