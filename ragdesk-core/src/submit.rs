//! Submission control and result normalization.
//!
//! Every network outcome, good or bad, ends up as a [`ResponseResult`]. The
//! renderer never sees a [`SubmitError`] directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::backend::RagBackend;
use crate::error::{SubmitError, ValidationError};
use crate::form::{FieldVisibility, FormField, FormState};
use crate::payload::{assemble, DeveloperSession};
use crate::render::ResponseView;

/// The normalized outcome of one submission or status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub success: bool,
    pub message: String,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseResult {
    pub fn success(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Decode a 2xx response body.
    ///
    /// Missing envelope fields take defaults. A body that carries
    /// `"status": "error"` but no `success` flag counts as a failure, and
    /// non-object `data` is kept under a `value` key.
    pub fn from_body(body: &str) -> Result<Self, SubmitError> {
        let value: Value = serde_json::from_str(body).map_err(|e| SubmitError::Decode {
            message: e.to_string(),
        })?;
        let Value::Object(mut obj) = value else {
            return Err(SubmitError::Decode {
                message: "expected a JSON object".to_string(),
            });
        };

        let success = match obj.get("success").and_then(Value::as_bool) {
            Some(flag) => flag,
            None => obj.get("status").and_then(Value::as_str) != Some("error"),
        };
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = match obj.remove("data") {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let timestamp = obj
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            success,
            message,
            data,
            timestamp,
        })
    }

    /// Fold any network outcome into a result the renderer can show.
    pub fn from_outcome(outcome: Result<ResponseResult, SubmitError>) -> Self {
        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Submission failed");
                Self::failure(e.to_string())
            }
        }
    }
}

/// Drives submissions for one form instance.
///
/// `submit` takes `&mut self`, so a second submission cannot start while
/// one is outstanding. Nothing is queued or retried.
pub struct SubmissionController<B> {
    backend: B,
    latest: Option<ResponseResult>,
}

impl<B: RagBackend> SubmissionController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            latest: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Validate the session, send it, and record the normalized result.
    ///
    /// A validation failure returns before any network call and leaves the
    /// previous result in place.
    pub async fn submit(
        &mut self,
        session: &DeveloperSession,
    ) -> Result<ResponseResult, ValidationError> {
        let payload = assemble(session)?;
        self.latest = None;
        info!(
            backend = self.backend.name(),
            operation = %payload.operation(),
            usecase_id = payload.usecase_id(),
            "Submitting request"
        );
        let result = ResponseResult::from_outcome(self.backend.send(&payload).await);
        info!(success = result.success, "Submission finished");
        self.latest = Some(result.clone());
        Ok(result)
    }

    /// Validate and post a generic use-case form as JSON.
    pub async fn submit_form(
        &mut self,
        endpoint: &str,
        fields: &[FormField],
        state: &mut FormState,
    ) -> Result<ResponseResult, ValidationError> {
        state.validate(fields, FieldVisibility::Visible);
        if let Some(err) = state.first_error(fields) {
            return Err(err);
        }
        self.latest = None;
        info!(endpoint, "Submitting form");
        let outcome = self.backend.post_form(endpoint, &state.to_json()).await;
        let result = ResponseResult::from_outcome(outcome);
        self.latest = Some(result.clone());
        Ok(result)
    }

    pub fn latest(&self) -> Option<&ResponseResult> {
        self.latest.as_ref()
    }

    /// The display state for the latest result.
    pub fn view(&self) -> ResponseView {
        ResponseView::classify(self.latest.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::payload::{MainMode, SubMode, SubmissionPayload};

    fn test_session() -> DeveloperSession {
        let mut session = DeveloperSession::default();
        session.main_mode = MainMode::Run;
        session.sub_mode = SubMode::Test;
        session.usecase_id = "demo".into();
        session.query = "hello".into();
        session
    }

    #[test]
    fn test_from_body_full_envelope() {
        let result = ResponseResult::from_body(
            r#"{"success":true,"message":"done","data":{"response":"hi"},"timestamp":"2025-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(result.message, "done");
        assert_eq!(result.data["response"], "hi");
        assert_eq!(result.timestamp.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_from_body_lenient_defaults() {
        let result = ResponseResult::from_body(r#"{"data":[1,2]}"#).unwrap();
        assert!(result.success);
        assert_eq!(result.message, "");
        assert_eq!(result.data["value"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_from_body_status_error() {
        let result =
            ResponseResult::from_body(r#"{"status":"error","message":"bad input"}"#).unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "bad input");
    }

    #[test]
    fn test_from_body_rejects_non_json() {
        let err = ResponseResult::from_body("<html>oops</html>").unwrap_err();
        assert!(matches!(err, SubmitError::Decode { .. }));
        let err = ResponseResult::from_body("[1,2,3]").unwrap_err();
        assert!(matches!(err, SubmitError::Decode { .. }));
    }

    #[test]
    fn test_from_outcome_http_error() {
        let result = ResponseResult::from_outcome(Err(SubmitError::Http {
            status: 500,
            body: "server error".into(),
        }));
        assert!(!result.success);
        assert!(result.message.contains("500"));
        assert!(result.data.is_empty());
    }

    #[test]
    fn test_from_outcome_connectivity_message() {
        let result = ResponseResult::from_outcome(Err(SubmitError::Connectivity {
            message: "connection refused".into(),
        }));
        assert!(result.message.starts_with("Server unreachable"));
    }

    #[tokio::test]
    async fn test_submit_sends_assembled_payload() {
        let backend =
            MockBackend::with_reply(Ok(ResponseResult::success("ok", Default::default())));
        let mut controller = SubmissionController::new(backend);

        let result = controller.submit(&test_session()).await.unwrap();
        assert!(result.success);
        assert_eq!(controller.latest(), Some(&result));

        let sent = controller.backend().sent();
        assert_eq!(sent.len(), 1);
        let SubmissionPayload::Test(req) = &sent[0] else {
            panic!("expected test payload");
        };
        assert_eq!(req.options.llm_parameters.top_k, 5);
    }

    #[tokio::test]
    async fn test_validation_failure_makes_no_call() {
        let mut session = DeveloperSession::default();
        session.usecase_id = "docs".into();

        let mut controller = SubmissionController::new(MockBackend::new());
        let err = controller.submit(&session).await.unwrap_err();
        assert_eq!(err, ValidationError::NoDocuments);
        assert_eq!(controller.backend().call_count(), 0);
        assert!(controller.latest().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_becomes_result() {
        let backend = MockBackend::with_reply(Err(SubmitError::Http {
            status: 500,
            body: "server error".into(),
        }));
        let mut controller = SubmissionController::new(backend);
        let result = controller.submit(&test_session()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Request failed with status 500: server error");
        assert!(matches!(controller.view(), ResponseView::Plain { .. }));
    }

    #[tokio::test]
    async fn test_submit_form_validates_first() {
        let fields: Vec<FormField> = serde_json::from_value(serde_json::json!([
            { "id": "question", "label": "Question", "required": true }
        ]))
        .unwrap();
        let mut state = FormState::new();
        let mut controller = SubmissionController::new(MockBackend::new());

        let err = controller
            .submit_form("http://x/api/query", &fields, &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::RequiredField { .. }));
        assert_eq!(controller.backend().call_count(), 0);

        controller
            .backend()
            .queue(Ok(ResponseResult::success("answered", Default::default())));
        state.set_field("question", "why?");
        let result = controller
            .submit_form("http://x/api/query", &fields, &mut state)
            .await
            .unwrap();
        assert_eq!(result.message, "answered");
        assert_eq!(
            controller.backend().forms(),
            vec![(
                "http://x/api/query".to_string(),
                serde_json::json!({ "question": "why?" })
            )]
        );
    }
}
