//! The seam between the console and the remote RAG service.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::SubmitError;
use crate::payload::SubmissionPayload;
use crate::submit::ResponseResult;

/// A backend that accepts submissions and reports job status.
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Send one submission to the endpoint for its operation.
    async fn send(&self, payload: &SubmissionPayload) -> Result<ResponseResult, SubmitError>;

    /// Fetch the current state of an evaluation job.
    async fn fetch_status(&self, status_url: &str) -> Result<ResponseResult, SubmitError>;

    /// Post a flat JSON form to an arbitrary endpoint.
    async fn post_form(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ResponseResult, SubmitError>;

    /// Backend name, for logs.
    fn name(&self) -> &str;
}

/// A mock backend for testing.
///
/// Replies are taken from a queue in order. Every call is recorded so tests
/// can assert on what would have gone over the wire.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<Result<ResponseResult, SubmitError>>>,
    sent: Mutex<Vec<SubmissionPayload>>,
    status_requests: Mutex<Vec<String>>,
    forms: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next call.
    pub fn queue(&self, reply: Result<ResponseResult, SubmitError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn with_reply(reply: Result<ResponseResult, SubmitError>) -> Self {
        let backend = Self::new();
        backend.queue(reply);
        backend
    }

    pub fn sent(&self) -> Vec<SubmissionPayload> {
        self.sent.lock().unwrap().clone()
    }

    pub fn status_requests(&self) -> Vec<String> {
        self.status_requests.lock().unwrap().clone()
    }

    pub fn forms(&self) -> Vec<(String, serde_json::Value)> {
        self.forms.lock().unwrap().clone()
    }

    /// Number of calls of any kind.
    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
            + self.status_requests.lock().unwrap().len()
            + self.forms.lock().unwrap().len()
    }

    fn next_reply(&self) -> Result<ResponseResult, SubmitError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(SubmitError::Connectivity {
                    message: "no mock responses queued".to_string(),
                })
            })
    }
}

#[async_trait]
impl RagBackend for MockBackend {
    async fn send(&self, payload: &SubmissionPayload) -> Result<ResponseResult, SubmitError> {
        self.sent.lock().unwrap().push(payload.clone());
        self.next_reply()
    }

    async fn fetch_status(&self, status_url: &str) -> Result<ResponseResult, SubmitError> {
        self.status_requests
            .lock()
            .unwrap()
            .push(status_url.to_string());
        self.next_reply()
    }

    async fn post_form(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ResponseResult, SubmitError> {
        self.forms
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body.clone()));
        self.next_reply()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
