use thiserror::Error;

/// Failures when talking to a FHIR server or reading what it returned.
///
/// Transport and status problems mean the fetch itself failed; the remaining
/// variants mean the server answered but the payload did not have the shape
/// the operation requires.
#[derive(Debug, Error)]
pub enum FhirError {
    #[error("Using {url} for {operation} caused: {source}")]
    Transport {
        operation: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Using {url} for {operation} returned {status}: {detail}")]
    Status {
        operation: &'static str,
        url: String,
        status: u16,
        detail: String,
    },
    #[error("Using {url} for {operation} returned invalid JSON: {detail}")]
    InvalidJson {
        operation: &'static str,
        url: String,
        detail: String,
    },
    #[error("malformed {resource_type} document: {detail}")]
    Malformed {
        resource_type: &'static str,
        detail: String,
    },
    #[error("malformed reference {raw:?}: expected {expected}/<id>")]
    Reference { raw: String, expected: &'static str },
}

impl FhirError {
    pub fn malformed(resource_type: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            resource_type,
            detail: detail.into(),
        }
    }

    /// The server answered, but the document shape was wrong.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::InvalidJson { .. } | Self::Malformed { .. } | Self::Reference { .. }
        )
    }

    /// The fetch itself failed: transport trouble or a non-success status.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}
