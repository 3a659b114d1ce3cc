//! The comparison engine: pit a fresh `$evaluate-measure` run against the
//! MeasureReports a server already holds and say whether they tell the same
//! story.

pub mod differ;
pub mod engine;
pub mod normalize;

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServerEndpoint;
use crate::fhir::resource::Subject;
use crate::fhir::FhirError;

pub use differ::{CountMismatch, MismatchKind};
pub use engine::{
    run_comparison, run_sweep, EvaluationSource, RemoteEvaluation, RemoteReportLookup,
    ReportSource,
};

/// One population tally: the display text of the population's first coding
/// plus its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationCount {
    pub code: String,
    pub count: u64,
}

impl PopulationCount {
    pub fn new(code: impl Into<String>, count: u64) -> Self {
        Self {
            code: code.into(),
            count,
        }
    }
}

/// Everything one comparison needs: where to ask, which measure, which
/// subject, and the reporting period.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub server: ServerEndpoint,
    pub measure: String,
    pub subject: Option<Subject>,
    pub period_start: String,
    pub period_end: String,
}

/// Outcome of one comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureComparison {
    pub measure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    pub period_start: String,
    pub period_end: String,
    pub evaluated: Vec<PopulationCount>,
    pub reported: Vec<PopulationCount>,
    pub fetched_report_count: usize,
    pub discrepancy: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<CountMismatch>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("evaluating measure: {0}")]
    Evaluation(#[source] FhirError),
    #[error("looking up stored reports: {0}")]
    ReportLookup(#[source] FhirError),
}

impl ComparisonError {
    pub fn fhir_error(&self) -> &FhirError {
        match self {
            Self::Evaluation(error) | Self::ReportLookup(error) => error,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.fhir_error().is_malformed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepVerdict {
    Match,
    Discrepancy,
    Failed,
}

impl Display for SweepVerdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match => write!(f, "MATCH"),
            Self::Discrepancy => write!(f, "DISCREPANCY"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One patient's line in a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRow {
    pub patient_id: String,
    pub patient_name: String,
    pub verdict: SweepVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A measure checked across a whole patient roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub measure: String,
    pub period_start: String,
    pub period_end: String,
    pub rows: Vec<SweepRow>,
    pub matching: usize,
    pub discrepant: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn from_rows(
        measure: impl Into<String>,
        period_start: impl Into<String>,
        period_end: impl Into<String>,
        rows: Vec<SweepRow>,
    ) -> Self {
        let matching = rows
            .iter()
            .filter(|row| row.verdict == SweepVerdict::Match)
            .count();
        let discrepant = rows
            .iter()
            .filter(|row| row.verdict == SweepVerdict::Discrepancy)
            .count();
        let failed = rows
            .iter()
            .filter(|row| row.verdict == SweepVerdict::Failed)
            .count();
        Self {
            measure: measure.into(),
            period_start: period_start.into(),
            period_end: period_end.into(),
            rows,
            matching,
            discrepant,
            failed,
        }
    }
}
