//! HTTP implementation of [`RagBackend`] over `reqwest`.
//!
//! Submissions go out as multipart forms: scalar inputs as text parts,
//! nested objects as JSON text parts, and attached documents as `files`
//! parts. Responses are read as text first so that a non-2xx body can be
//! reported verbatim.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::backend::RagBackend;
use crate::config::ApiEndpointConfig;
use crate::error::SubmitError;
use crate::payload::{Operation, SubmissionPayload};
use crate::submit::ResponseResult;

const PDF_MIME: &str = "application/pdf";

/// Multipart field name for attached documents.
const FILES_FIELD: &str = "files";

/// Talks to the RAG service over HTTP.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    endpoints: HashMap<Operation, String>,
}

impl HttpBackend {
    pub fn new(api: &ApiEndpointConfig) -> Result<Self, SubmitError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| SubmitError::Request {
                message: format!("HTTP client setup failed: {e}"),
            })?;

        // A trailing slash makes relative joins stay under the API prefix.
        let mut base = api.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).map_err(|e| SubmitError::Request {
            message: format!("invalid base URL '{}': {e}", api.base_url),
        })?;

        let endpoints = [Operation::Upload, Operation::Test, Operation::Evaluate]
            .into_iter()
            .map(|op| (op, api.endpoint(op)))
            .collect();

        Ok(Self {
            client,
            base_url,
            endpoints,
        })
    }

    /// Send one operation to a different endpoint, e.g. from a use-case file.
    pub fn with_endpoint(mut self, operation: Operation, url: impl Into<String>) -> Self {
        self.endpoints.insert(operation, url.into());
        self
    }

    pub fn endpoint(&self, operation: Operation) -> &str {
        self.endpoints
            .get(&operation)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Resolve a possibly relative URL returned by the backend.
    ///
    /// Absolute paths (`/x/y`) resolve against the origin; bare relative
    /// paths resolve under the API base.
    pub fn resolve_url(&self, url: &str) -> Result<String, SubmitError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .join(url)
                .map(|u| u.to_string())
                .map_err(|e| SubmitError::Request {
                    message: format!("invalid URL '{url}': {e}"),
                }),
            Err(e) => Err(SubmitError::Request {
                message: format!("invalid URL '{url}': {e}"),
            }),
        }
    }

    async fn build_form(payload: &SubmissionPayload) -> Result<Form, SubmitError> {
        let fields = payload.form_fields().map_err(|e| SubmitError::Request {
            message: format!("could not encode request: {e}"),
        })?;
        let mut form = fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        for path in payload.attachments() {
            form = form.part(FILES_FIELD, file_part(path).await?);
        }
        Ok(form)
    }

    async fn read_response(response: reqwest::Response) -> Result<ResponseResult, SubmitError> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        if !status.is_success() {
            return Err(SubmitError::Http {
                status: status.as_u16(),
                body,
            });
        }
        ResponseResult::from_body(&body)
    }
}

async fn file_part(path: &Path) -> Result<Part, SubmitError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SubmitError::Request {
            message: format!("could not read {}: {e}", path.display()),
        })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(PDF_MIME)
        .map_err(|e| SubmitError::Request {
            message: format!("MIME error: {e}"),
        })
}

fn transport_error(e: reqwest::Error) -> SubmitError {
    if e.is_builder() {
        SubmitError::Request {
            message: e.to_string(),
        }
    } else {
        SubmitError::Connectivity {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl RagBackend for HttpBackend {
    async fn send(&self, payload: &SubmissionPayload) -> Result<ResponseResult, SubmitError> {
        let url = self.endpoint(payload.operation()).to_string();
        let form = Self::build_form(payload).await?;
        info!(
            url = %url,
            attachments = payload.attachments().len(),
            "POST multipart"
        );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_response(response).await
    }

    async fn fetch_status(&self, status_url: &str) -> Result<ResponseResult, SubmitError> {
        let url = self.resolve_url(status_url)?;
        debug!(url = %url, "GET status");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_response(response).await
    }

    async fn post_form(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ResponseResult, SubmitError> {
        let url = self.resolve_url(endpoint)?;
        info!(url = %url, "POST json");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_response(response).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new(&ApiEndpointConfig::default()).unwrap()
    }

    #[test]
    fn test_default_endpoints() {
        let backend = backend();
        assert_eq!(
            backend.endpoint(Operation::Test),
            "http://localhost:8000/savi-rag-api/api/test"
        );
        assert_eq!(
            backend.endpoint(Operation::Upload),
            "http://localhost:8000/savi-rag-api/api/upload"
        );
    }

    #[test]
    fn test_endpoint_override() {
        let backend = backend().with_endpoint(Operation::Evaluate, "http://eval.test/run");
        assert_eq!(backend.endpoint(Operation::Evaluate), "http://eval.test/run");
        assert_eq!(
            backend.endpoint(Operation::Test),
            "http://localhost:8000/savi-rag-api/api/test"
        );
    }

    #[test]
    fn test_resolve_url() {
        let backend = backend();
        assert_eq!(
            backend.resolve_url("http://other:1/status/9").unwrap(),
            "http://other:1/status/9"
        );
        assert_eq!(
            backend.resolve_url("/savi-rag-api/api/evaluate/status/42").unwrap(),
            "http://localhost:8000/savi-rag-api/api/evaluate/status/42"
        );
        assert_eq!(
            backend.resolve_url("evaluate/status/42").unwrap(),
            "http://localhost:8000/savi-rag-api/api/evaluate/status/42"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let api = ApiEndpointConfig {
            base_url: "::not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpBackend::new(&api),
            Err(SubmitError::Request { .. })
        ));
    }
}
