//! Shared HTTP plumbing for FHIR endpoints.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::fhir::error::FhirError;
use crate::fhir::resource::OperationOutcome;

const HTTP_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 6;
const ERROR_PREVIEW_CHARS: usize = 180;

pub const FHIR_JSON: &str = "application/fhir+json";

static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("measure-probe/0.1")
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .expect("failed to build HTTP client")
});

/// GET a FHIR URL and return the JSON body.
pub async fn get_json(
    operation: &'static str,
    url: &str,
    token: Option<&str>,
) -> Result<Value, FhirError> {
    debug!(operation, url, "GET");
    let request = with_auth(HTTP.get(url).header(ACCEPT, FHIR_JSON), token);
    read_body(operation, url, request).await
}

/// POST a JSON body to a FHIR URL. Operations like `$submit-data` return an
/// empty body on success, which comes back as `Value::Null`.
pub async fn post_json(
    operation: &'static str,
    url: &str,
    token: Option<&str>,
    body: &Value,
) -> Result<Value, FhirError> {
    debug!(operation, url, "POST");
    let request = with_auth(
        HTTP.post(url)
            .header(ACCEPT, FHIR_JSON)
            .header(CONTENT_TYPE, FHIR_JSON)
            .json(body),
        token,
    );
    read_body(operation, url, request).await
}

fn with_auth(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn read_body(
    operation: &'static str,
    url: &str,
    request: RequestBuilder,
) -> Result<Value, FhirError> {
    let response = request.send().await.map_err(|source| FhirError::Transport {
        operation,
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    let body = response.text().await.map_err(|source| FhirError::Transport {
        operation,
        url: url.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(FhirError::Status {
            operation,
            url: url.to_string(),
            status: status.as_u16(),
            detail: error_detail(&body),
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|error| FhirError::InvalidJson {
        operation,
        url: url.to_string(),
        detail: error.to_string(),
    })
}

/// Best effort: pull the first issue out of an OperationOutcome body,
/// otherwise keep a short preview of whatever came back.
fn error_detail(body: &str) -> String {
    if let Ok(outcome) = serde_json::from_str::<OperationOutcome>(body) {
        if let Some(summary) = outcome.summary() {
            return summary;
        }
    }
    preview(body)
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(ERROR_PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_extracts_operation_outcome() {
        let body = r#"{
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "diagnostics": "Measure not found"}]
        }"#;
        assert_eq!(error_detail(body), "error: Measure not found");
    }

    #[test]
    fn error_detail_falls_back_to_preview() {
        assert_eq!(error_detail("<html>boom</html>"), "<html>boom</html>");
        let long = "x".repeat(400);
        let detail = error_detail(&long);
        assert!(detail.ends_with("..."));
        assert_eq!(detail.chars().count(), ERROR_PREVIEW_CHARS + 3);
    }
}
