//! Response display states.
//!
//! The shape of the latest [`ResponseResult`] picks one of four views. Async
//! evaluation jobs get a [`JobTracker`] whose status only changes when the
//! user asks for a refresh.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Write};
use tracing::{debug, warn};

use crate::backend::RagBackend;
use crate::submit::ResponseResult;
use crate::usecase::ResponseField;

pub const IDLE_PROMPT: &str = "Submit the form to see the response";
pub const MISSING_VALUE: &str = "N/A";

/// A retrieved passage returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSnippet {
    pub rank: u32,
    pub score: Option<f64>,
    pub content: String,
    pub filename: Option<String>,
    pub file_path: Option<String>,
}

// Backends send explicit nulls as often as they omit keys.
#[derive(Debug, Default, Deserialize)]
struct RawSnippet {
    rank: Option<u32>,
    score: Option<f64>,
    content: Option<String>,
    metadata: Option<RawSnippetMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSnippetMetadata {
    filename: Option<String>,
    file_path: Option<String>,
}

/// Parse `search_results`, sorted ascending by rank.
///
/// A missing rank defaults to the item's 1-based position. Items that are
/// not objects are skipped.
pub fn parse_snippets(value: &Value) -> Vec<SearchSnippet> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    let mut snippets: Vec<SearchSnippet> = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let raw: RawSnippet = match serde_json::from_value(item.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(index = idx, error = %e, "Skipping malformed search result");
                    return None;
                }
            };
            let metadata = raw.metadata.unwrap_or_default();
            Some(SearchSnippet {
                rank: raw.rank.unwrap_or(idx as u32 + 1),
                score: raw.score,
                content: raw.content.unwrap_or_default(),
                filename: metadata.filename,
                file_path: metadata.file_path,
            })
        })
        .collect();
    snippets.sort_by_key(|s| s.rank);
    snippets
}

/// Lifecycle of a backend evaluation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => JobStatus::Pending,
            "running" | "in_progress" | "processing" => JobStatus::Running,
            "completed" | "complete" | "done" => JobStatus::Completed,
            "failed" | "error" => JobStatus::Failed,
            _ => JobStatus::Other(s.trim().to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        JobStatus::parse(&s)
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// An asynchronous evaluation job and its last known status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTracker {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub total_queries: Option<u64>,
    pub status: JobStatus,
}

impl JobTracker {
    pub fn from_data(data: &Map<String, Value>) -> Self {
        Self {
            task_id: data.get("task_id").and_then(scalar_string),
            status_url: data.get("status_url").and_then(scalar_string),
            download_url: data.get("download_url").and_then(scalar_string),
            total_queries: data.get("total_queries").and_then(Value::as_u64),
            status: data
                .get("status")
                .and_then(Value::as_str)
                .map(JobStatus::parse)
                .unwrap_or(JobStatus::Pending),
        }
    }

    /// Tracker for a status URL the user already has.
    pub fn for_status_url(status_url: impl Into<String>) -> Self {
        Self {
            task_id: None,
            status_url: Some(status_url.into()),
            download_url: None,
            total_queries: None,
            status: JobStatus::Pending,
        }
    }

    /// Poll the status URL once and apply the reported status.
    ///
    /// On failure the previous status is kept and the failure is returned
    /// as a normalized result.
    pub async fn refresh<B>(&mut self, backend: &B) -> ResponseResult
    where
        B: RagBackend + ?Sized,
    {
        let Some(url) = self.status_url.clone() else {
            return ResponseResult::failure("No status URL available for this job");
        };
        let result = ResponseResult::from_outcome(backend.fetch_status(&url).await);
        if result.success {
            if let Some(status) = result.data.get("status").and_then(Value::as_str) {
                let status = JobStatus::parse(status);
                debug!(from = %self.status, to = %status, "Job status refreshed");
                self.status = status;
            }
            if let Some(download) = result.data.get("download_url").and_then(scalar_string) {
                self.download_url = Some(download);
            }
        }
        result
    }

    /// Key under which the job is stored locally: the task id, or the status
    /// URL with path separators replaced.
    pub fn key(&self) -> Option<String> {
        if let Some(id) = self.task_id.as_deref().filter(|id| !id.is_empty()) {
            return Some(sanitize_key(id));
        }
        self.status_url.as_deref().map(sanitize_key)
    }

    /// Whether `reference` names this job by task id or status URL.
    pub fn matches(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.task_id.as_deref() == Some(reference)
            || self
                .status_url
                .as_deref()
                .is_some_and(|url| url.trim_end_matches('/') == reference.trim_end_matches('/'))
    }

    /// Link to the HTML results page, available once the job completed.
    pub fn download_link(&self) -> Option<String> {
        if !self.status.is_completed() {
            return None;
        }
        self.download_url
            .as_deref()
            .map(|url| format!("{}/html", url.trim_end_matches('/')))
    }
}

/// What to show for the latest result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseView {
    Idle,
    Plain {
        result: ResponseResult,
    },
    SingleQuery {
        message: String,
        answer: Option<String>,
        snippets: Vec<SearchSnippet>,
    },
    AsyncJob(JobTracker),
}

impl ResponseView {
    pub fn classify(result: Option<&ResponseResult>) -> Self {
        let Some(result) = result else {
            return ResponseView::Idle;
        };
        let data = &result.data;
        if !result.success {
            return ResponseView::Plain {
                result: result.clone(),
            };
        }
        if data.contains_key("task_id") || data.contains_key("status_url") {
            return ResponseView::AsyncJob(JobTracker::from_data(data));
        }
        if data.contains_key("response") || data.contains_key("search_results") {
            return ResponseView::SingleQuery {
                message: result.message.clone(),
                answer: data.get("response").and_then(scalar_string),
                snippets: data
                    .get("search_results")
                    .map(parse_snippets)
                    .unwrap_or_default(),
            };
        }
        ResponseView::Plain {
            result: result.clone(),
        }
    }
}

/// Terminal rendering of a view.
pub fn render_text(view: &ResponseView) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_view(&mut out, view);
    out
}

fn write_view(out: &mut String, view: &ResponseView) -> fmt::Result {
    match view {
        ResponseView::Idle => writeln!(out, "{IDLE_PROMPT}"),
        ResponseView::Plain { result } => {
            let label = if result.success { "Success" } else { "Error" };
            writeln!(out, "{label}: {}", display_or_missing(&result.message))?;
            if !result.data.is_empty() {
                let data = serde_json::to_string_pretty(&result.data).unwrap_or_default();
                writeln!(out, "{data}")?;
            }
            writeln!(out, "at {}", result.timestamp.to_rfc3339())
        }
        ResponseView::SingleQuery {
            message,
            answer,
            snippets,
        } => {
            if !message.is_empty() {
                writeln!(out, "{message}")?;
            }
            writeln!(out, "Answer:")?;
            writeln!(out, "{}", answer.as_deref().unwrap_or(MISSING_VALUE))?;
            if !snippets.is_empty() {
                writeln!(out, "\nSearch results ({}):", snippets.len())?;
            }
            for s in snippets {
                let score = s.score.map(|v| format!(" score={v:.3}")).unwrap_or_default();
                let source = s.filename.as_deref().unwrap_or(MISSING_VALUE);
                writeln!(out, "  #{} [{source}]{score}", s.rank)?;
                for line in s.content.lines() {
                    writeln!(out, "      {line}")?;
                }
            }
            Ok(())
        }
        ResponseView::AsyncJob(job) => {
            writeln!(out, "Evaluation job")?;
            writeln!(
                out,
                "  task id:       {}",
                job.task_id.as_deref().unwrap_or(MISSING_VALUE)
            )?;
            if let Some(total) = job.total_queries {
                writeln!(out, "  total queries: {total}")?;
            }
            writeln!(out, "  status:        {}", job.status)?;
            if let Some(url) = &job.status_url {
                writeln!(out, "  status url:    {url}")?;
            }
            match job.download_link() {
                Some(link) => writeln!(out, "  results:       {link}"),
                None => writeln!(out, "  results:       available once the job completes"),
            }
        }
    }
}

/// Label/value pairs for the configured response fields.
///
/// `success`, `message`, and `timestamp` come from the envelope; other ids
/// are looked up in `data`. Missing or empty values show as `N/A`.
pub fn render_fields(result: &ResponseResult, fields: &[ResponseField]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|field| {
            let value = match field.id.as_str() {
                "success" => result.success.to_string(),
                "message" => display_or_missing(&result.message).to_string(),
                "timestamp" => result.timestamp.to_rfc3339(),
                id => result
                    .data
                    .get(id)
                    .and_then(scalar_string)
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| MISSING_VALUE.to_string()),
            };
            (field.label.clone(), value)
        })
        .collect()
}

fn display_or_missing(s: &str) -> &str {
    if s.is_empty() { MISSING_VALUE } else { s }
}

pub(crate) fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strings as-is, other non-null values as compact JSON.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::error::SubmitError;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_classify_idle() {
        assert_eq!(ResponseView::classify(None), ResponseView::Idle);
        assert_eq!(render_text(&ResponseView::Idle).trim(), IDLE_PROMPT);
    }

    #[test]
    fn test_classify_single_query_sorts_snippets() {
        let result = ResponseResult::success(
            "ok",
            data(json!({
                "response": "Paris",
                "search_results": [
                    { "rank": 3, "score": 0.2, "content": "c", "metadata": { "filename": "c.pdf" } },
                    { "rank": 1, "score": 0.9, "content": "a", "metadata": { "filename": "a.pdf", "file_path": "/d/a.pdf" } },
                    { "content": "no rank" }
                ]
            })),
        );
        let ResponseView::SingleQuery {
            answer, snippets, ..
        } = ResponseView::classify(Some(&result))
        else {
            panic!("expected single query view");
        };
        assert_eq!(answer.as_deref(), Some("Paris"));
        let ranks: Vec<u32> = snippets.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 3, 3]);
        assert_eq!(snippets[0].file_path.as_deref(), Some("/d/a.pdf"));
        assert_eq!(snippets[1].content, "c");
        assert_eq!(snippets[2].content, "no rank");
    }

    #[test]
    fn test_snippets_skip_malformed_items() {
        let snippets = parse_snippets(&json!([42, { "rank": 2, "content": "ok" }]));
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].rank, 2);
        assert!(parse_snippets(&json!("not a list")).is_empty());
    }

    #[test]
    fn test_snippets_keep_items_with_null_fields() {
        let snippets = parse_snippets(&json!([
            { "rank": 1, "content": "first", "metadata": null },
            { "rank": 2, "content": null, "metadata": { "filename": "b.pdf" } },
            { "rank": 3, "content": "third", "metadata": { "filename": null, "file_path": null } }
        ]));
        assert_eq!(snippets.len(), 3);
        assert_eq!(snippets[0].content, "first");
        assert_eq!(snippets[0].filename, None);
        assert_eq!(snippets[1].content, "");
        assert_eq!(snippets[1].filename.as_deref(), Some("b.pdf"));
        assert_eq!(snippets[2].file_path, None);
    }

    #[test]
    fn test_classify_async_job() {
        let result = ResponseResult::success(
            "queued",
            data(json!({
                "task_id": "t-1",
                "status_url": "/api/evaluate/status/t-1",
                "download_url": "/api/evaluate/download/t-1",
                "total_queries": 12
            })),
        );
        let ResponseView::AsyncJob(job) = ResponseView::classify(Some(&result)) else {
            panic!("expected async job view");
        };
        assert_eq!(job.task_id.as_deref(), Some("t-1"));
        assert_eq!(job.total_queries, Some(12));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.download_link(), None);
    }

    #[test]
    fn test_classify_failure_is_plain() {
        let mut result = ResponseResult::failure("Request failed with status 500: boom");
        result.data.insert("task_id".into(), json!("t"));
        assert!(matches!(
            ResponseView::classify(Some(&result)),
            ResponseView::Plain { .. }
        ));
        let text = render_text(&ResponseView::classify(Some(&result)));
        assert!(text.starts_with("Error: Request failed with status 500"));
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!(JobStatus::parse("RUNNING"), JobStatus::Running);
        assert_eq!(JobStatus::parse("in_progress"), JobStatus::Running);
        assert_eq!(JobStatus::parse("completed"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("queued"), JobStatus::Pending);
        assert_eq!(
            JobStatus::parse("cancelled"),
            JobStatus::Other("cancelled".into())
        );
    }

    #[test]
    fn test_job_tracker_serde_keeps_status_text() {
        let mut job = JobTracker::from_data(&data(json!({
            "task_id": "t-7",
            "status_url": "evaluate/status/t-7",
            "download_url": "evaluate/results/t-7"
        })));
        job.status = JobStatus::parse("cancelled");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "cancelled");
        let back: JobTracker = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_job_key_and_matches() {
        let job = JobTracker::from_data(&data(json!({
            "task_id": "t-7",
            "status_url": "evaluate/status/t-7/"
        })));
        assert_eq!(job.key().as_deref(), Some("t-7"));
        assert!(job.matches("t-7"));
        assert!(job.matches("evaluate/status/t-7"));
        assert!(!job.matches("t-8"));

        let by_url = JobTracker::for_status_url("http://h/api/status/9");
        assert_eq!(by_url.key().as_deref(), Some("http___h_api_status_9"));
        assert_eq!(JobTracker::from_data(&Map::new()).key(), None);
    }

    #[tokio::test]
    async fn test_refresh_transitions_to_completed() {
        let backend = MockBackend::new();
        backend.queue(Ok(ResponseResult::success(
            "",
            data(json!({ "status": "running" })),
        )));
        backend.queue(Ok(ResponseResult::success(
            "",
            data(json!({ "status": "completed" })),
        )));

        let mut job = JobTracker::from_data(&data(json!({
            "task_id": "t-1",
            "status_url": "/status/t-1",
            "download_url": "http://h/download/t-1/"
        })));

        job.refresh(&backend).await;
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.download_link(), None);

        job.refresh(&backend).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            job.download_link().as_deref(),
            Some("http://h/download/t-1/html")
        );
        assert_eq!(backend.status_requests(), vec!["/status/t-1", "/status/t-1"]);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_status() {
        let backend = MockBackend::with_reply(Err(SubmitError::Connectivity {
            message: "connection refused".into(),
        }));
        let mut job = JobTracker::for_status_url("/status/x");
        job.status = JobStatus::Running;

        let result = job.refresh(&backend).await;
        assert!(!result.success);
        assert!(result.message.starts_with("Server unreachable"));
        assert_eq!(job.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_refresh_without_url_makes_no_call() {
        let backend = MockBackend::new();
        let mut job = JobTracker::from_data(&data(json!({ "task_id": "t" })));
        let result = job.refresh(&backend).await;
        assert!(!result.success);
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_render_fields() {
        let result = ResponseResult::success(
            "done",
            data(json!({ "answer": "42", "confidence": 0.5, "empty": "" })),
        );
        let fields = vec![
            ResponseField {
                id: "message".into(),
                label: "Status".into(),
            },
            ResponseField {
                id: "answer".into(),
                label: "Answer".into(),
            },
            ResponseField {
                id: "confidence".into(),
                label: "Confidence".into(),
            },
            ResponseField {
                id: "empty".into(),
                label: "Empty".into(),
            },
            ResponseField {
                id: "sources".into(),
                label: "Sources".into(),
            },
        ];
        let rendered = render_fields(&result, &fields);
        assert_eq!(
            rendered,
            vec![
                ("Status".to_string(), "done".to_string()),
                ("Answer".to_string(), "42".to_string()),
                ("Confidence".to_string(), "0.5".to_string()),
                ("Empty".to_string(), "N/A".to_string()),
                ("Sources".to_string(), "N/A".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_single_query_text() {
        let view = ResponseView::SingleQuery {
            message: String::new(),
            answer: Some("X is Y".into()),
            snippets: vec![SearchSnippet {
                rank: 1,
                score: Some(0.5),
                content: "X is Y because".into(),
                filename: Some("x.pdf".into()),
                file_path: None,
            }],
        };
        let text = render_text(&view);
        assert!(text.contains("X is Y"));
        assert!(text.contains("#1 [x.pdf] score=0.500"));
    }
}
