//! Running comparisons against live servers, and sweeping a roster.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::compare::differ::{counts_disagree, diff_population_counts};
use crate::compare::normalize::{combined_population_counts, population_counts};
use crate::compare::{
    ComparisonError, ComparisonRequest, MeasureComparison, SweepReport, SweepRow, SweepVerdict,
};
use crate::fhir::resource::{MeasureReport, Patient, Subject};
use crate::fhir::FhirError;
use crate::ops;

/// Where a fresh evaluation comes from.
#[async_trait]
pub trait EvaluationSource: Send + Sync {
    async fn fetch_evaluation(
        &self,
        request: &ComparisonRequest,
    ) -> Result<MeasureReport, FhirError>;
}

/// Where the already-stored reports come from.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_reports(
        &self,
        request: &ComparisonRequest,
    ) -> Result<Vec<MeasureReport>, FhirError>;
}

/// `$evaluate-measure` against the request's server.
pub struct RemoteEvaluation;

#[async_trait]
impl EvaluationSource for RemoteEvaluation {
    async fn fetch_evaluation(
        &self,
        request: &ComparisonRequest,
    ) -> Result<MeasureReport, FhirError> {
        ops::evaluate::evaluate_measure(
            &request.server,
            &request.measure,
            request.subject.as_ref(),
            &request.period_start,
            &request.period_end,
        )
        .await
    }
}

/// MeasureReport search against the request's server.
pub struct RemoteReportLookup {
    pub page_size: u32,
}

#[async_trait]
impl ReportSource for RemoteReportLookup {
    async fn fetch_reports(
        &self,
        request: &ComparisonRequest,
    ) -> Result<Vec<MeasureReport>, FhirError> {
        ops::reports::fetch_reports(
            &request.server,
            &request.measure,
            request.subject.as_ref(),
            &request.period_start,
            &request.period_end,
            self.page_size,
        )
        .await
    }
}

/// Evaluate the measure and fetch the stored reports concurrently, flatten
/// both sides into population tallies and compare them. Diff detail is only
/// computed when the verdict is discrepant.
pub async fn run_comparison(
    evaluation: &dyn EvaluationSource,
    reports: &dyn ReportSource,
    request: &ComparisonRequest,
) -> Result<MeasureComparison, ComparisonError> {
    let (evaluated_report, stored_reports) = tokio::join!(
        evaluation.fetch_evaluation(request),
        reports.fetch_reports(request)
    );
    let evaluated_report = evaluated_report.map_err(ComparisonError::Evaluation)?;
    let stored_reports = stored_reports.map_err(ComparisonError::ReportLookup)?;

    let evaluated = population_counts(&evaluated_report).map_err(ComparisonError::Evaluation)?;
    let reported =
        combined_population_counts(&stored_reports).map_err(ComparisonError::ReportLookup)?;

    let discrepancy = counts_disagree(&evaluated, &reported);
    let mismatches = if discrepancy {
        diff_population_counts(&evaluated, &reported)
    } else {
        Vec::new()
    };
    debug!(
        measure = %request.measure,
        discrepancy,
        stored = stored_reports.len(),
        "comparison finished"
    );

    Ok(MeasureComparison {
        measure: request.measure.clone(),
        subject: request.subject.clone(),
        period_start: request.period_start.clone(),
        period_end: request.period_end.clone(),
        evaluated,
        reported,
        fetched_report_count: stored_reports.len(),
        discrepancy,
        mismatches,
        checked_at: Utc::now(),
    })
}

/// Run the comparison once per patient. A failure marks that patient's row
/// and the sweep moves on.
pub async fn run_sweep(
    evaluation: &dyn EvaluationSource,
    reports: &dyn ReportSource,
    base: &ComparisonRequest,
    patients: &[Patient],
) -> SweepReport {
    let mut rows = Vec::with_capacity(patients.len());
    for patient in patients {
        let mut request = base.clone();
        request.subject = Some(Subject::Patient(patient.id.clone()));
        let row = match run_comparison(evaluation, reports, &request).await {
            Ok(comparison) => SweepRow {
                patient_id: patient.id.clone(),
                patient_name: patient.display_name(),
                verdict: if comparison.discrepancy {
                    SweepVerdict::Discrepancy
                } else {
                    SweepVerdict::Match
                },
                mismatch_count: if comparison.discrepancy {
                    Some(comparison.mismatches.len())
                } else {
                    None
                },
                error: None,
            },
            Err(error) => {
                warn!(patient = %patient.id, %error, "comparison failed during sweep");
                SweepRow {
                    patient_id: patient.id.clone(),
                    patient_name: patient.display_name(),
                    verdict: SweepVerdict::Failed,
                    mismatch_count: None,
                    error: Some(error.to_string()),
                }
            }
        };
        rows.push(row);
    }
    SweepReport::from_rows(
        base.measure.clone(),
        base.period_start.clone(),
        base.period_end.clone(),
        rows,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use crate::compare::MismatchKind;
    use crate::config::ServerEndpoint;
    use crate::fhir::resource::parse_resource;

    use super::*;

    fn report(pairs: &[(&str, u64)]) -> MeasureReport {
        let population: Vec<_> = pairs
            .iter()
            .map(|(code, count)| {
                json!({"code": {"coding": [{"display": code}]}, "count": count})
            })
            .collect();
        parse_resource(json!({
            "resourceType": "MeasureReport",
            "status": "complete",
            "group": [{"population": population}]
        }))
        .expect("fixture report should parse")
    }

    fn request(subject: Option<Subject>) -> ComparisonRequest {
        ComparisonRequest {
            server: ServerEndpoint::new("http://localhost:8080/fhir"),
            measure: "ColorectalScreening".to_string(),
            subject,
            period_start: "2026-01-01".to_string(),
            period_end: "2026-12-31".to_string(),
        }
    }

    fn patient(id: &str) -> Patient {
        parse_resource(json!({"resourceType": "Patient", "id": id})).expect("fixture patient")
    }

    struct FixedEvaluation(MeasureReport);

    #[async_trait]
    impl EvaluationSource for FixedEvaluation {
        async fn fetch_evaluation(
            &self,
            _request: &ComparisonRequest,
        ) -> Result<MeasureReport, FhirError> {
            Ok(self.0.clone())
        }
    }

    struct FixedReports(Vec<MeasureReport>);

    #[async_trait]
    impl ReportSource for FixedReports {
        async fn fetch_reports(
            &self,
            _request: &ComparisonRequest,
        ) -> Result<Vec<MeasureReport>, FhirError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEvaluation;

    #[async_trait]
    impl EvaluationSource for FailingEvaluation {
        async fn fetch_evaluation(
            &self,
            request: &ComparisonRequest,
        ) -> Result<MeasureReport, FhirError> {
            Err(FhirError::Status {
                operation: "evaluate-measure",
                url: request.server.url(&format!(
                    "Measure/{}/$evaluate-measure",
                    request.measure
                )),
                status: 500,
                detail: "internal error".to_string(),
            })
        }
    }

    struct ScriptedEvaluation(HashMap<String, MeasureReport>);

    #[async_trait]
    impl EvaluationSource for ScriptedEvaluation {
        async fn fetch_evaluation(
            &self,
            request: &ComparisonRequest,
        ) -> Result<MeasureReport, FhirError> {
            let Some(Subject::Patient(id)) = request.subject.as_ref() else {
                return Err(FhirError::malformed("MeasureReport", "sweep without subject"));
            };
            self.0.get(id).cloned().ok_or(FhirError::Status {
                operation: "evaluate-measure",
                url: "http://localhost:8080/fhir".to_string(),
                status: 500,
                detail: "evaluation blew up".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn matching_sides_compare_clean() {
        let evaluation = FixedEvaluation(report(&[("Initial Population", 10), ("Numerator", 4)]));
        let reports = FixedReports(vec![report(&[("Numerator", 4), ("Initial Population", 10)])]);
        let comparison = run_comparison(&evaluation, &reports, &request(None))
            .await
            .expect("comparison");
        assert!(!comparison.discrepancy);
        assert!(comparison.mismatches.is_empty());
        assert_eq!(comparison.fetched_report_count, 1);
    }

    #[tokio::test]
    async fn split_stored_reports_stay_discrepant() {
        let evaluation = FixedEvaluation(report(&[("Numerator", 5)]));
        let reports = FixedReports(vec![report(&[("Numerator", 2)]), report(&[("Numerator", 3)])]);
        let comparison = run_comparison(&evaluation, &reports, &request(None))
            .await
            .expect("comparison");
        assert!(comparison.discrepancy);
        assert_eq!(comparison.fetched_report_count, 2);
        assert_eq!(comparison.reported.len(), 2);
    }

    #[tokio::test]
    async fn no_stored_reports_against_counts_is_discrepant() {
        let evaluation = FixedEvaluation(report(&[("Numerator", 1)]));
        let reports = FixedReports(Vec::new());
        let comparison = run_comparison(&evaluation, &reports, &request(None))
            .await
            .expect("comparison");
        assert!(comparison.discrepancy);
        assert_eq!(
            comparison.mismatches[0].kind,
            MismatchKind::MissingFromReported
        );
    }

    #[tokio::test]
    async fn evaluation_failure_is_tagged_as_evaluation() {
        let reports = FixedReports(vec![report(&[("Numerator", 1)])]);
        let error = run_comparison(&FailingEvaluation, &reports, &request(None))
            .await
            .expect_err("must fail");
        assert!(matches!(error, ComparisonError::Evaluation(_)));
        assert!(!error.is_malformed());
        assert!(error.fhir_error().is_fetch_failure());
    }

    #[tokio::test]
    async fn malformed_stored_report_is_tagged_as_report_lookup() {
        let evaluation = FixedEvaluation(report(&[("Numerator", 1)]));
        let bad_report = parse_resource(json!({
            "resourceType": "MeasureReport",
            "group": [{"population": [{"code": {"coding": [{"code": "numerator"}]}, "count": 1}]}]
        }))
        .expect("fixture report should parse");
        let reports = FixedReports(vec![bad_report]);
        let error = run_comparison(&evaluation, &reports, &request(None))
            .await
            .expect_err("must fail");
        assert!(matches!(error, ComparisonError::ReportLookup(_)));
        assert!(error.is_malformed());
    }

    #[tokio::test]
    async fn sweep_keeps_going_after_failures() {
        let clean = report(&[("Numerator", 1)]);
        let off_by_one = report(&[("Numerator", 2)]);
        let evaluation = ScriptedEvaluation(HashMap::from([
            ("alice".to_string(), clean.clone()),
            ("bob".to_string(), off_by_one),
        ]));
        let reports = FixedReports(vec![clean]);
        let roster = [patient("alice"), patient("bob"), patient("carol")];

        let sweep = run_sweep(&evaluation, &reports, &request(None), &roster).await;

        assert_eq!(sweep.rows.len(), 3);
        assert_eq!(sweep.matching, 1);
        assert_eq!(sweep.discrepant, 1);
        assert_eq!(sweep.failed, 1);
        assert_eq!(sweep.rows[0].verdict, SweepVerdict::Match);
        assert_eq!(sweep.rows[1].verdict, SweepVerdict::Discrepancy);
        assert_eq!(sweep.rows[1].mismatch_count, Some(1));
        assert_eq!(sweep.rows[2].verdict, SweepVerdict::Failed);
        assert!(sweep.rows[2]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("evaluation blew up")));
    }
}
