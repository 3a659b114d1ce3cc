//! MeasureReport search and read.
//!
//! Servers are searched by measure and subject only; the reporting period is
//! filtered here because `period` search support varies across servers.

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::{parse_resource, Bundle, MeasureReport, Subject};
use crate::fhir::FhirError;

const SEARCH_OPERATION: &str = "measure-report-search";
const READ_OPERATION: &str = "measure-report-read";

pub fn reports_url(
    server: &ServerEndpoint,
    measure: &str,
    subject: Option<&Subject>,
    page_size: u32,
) -> String {
    let mut path = format!("MeasureReport?measure={measure}&_count={page_size}");
    if let Some(subject) = subject {
        path.push_str(&format!("&subject={subject}"));
    }
    server.url(&path)
}

pub fn report_url(server: &ServerEndpoint, id: &str) -> String {
    server.url(&format!("MeasureReport/{id}"))
}

fn report_matches_period(report: &MeasureReport, period_start: &str, period_end: &str) -> bool {
    report
        .period
        .as_ref()
        .map(|period| period.matches_dates(period_start, period_end))
        .unwrap_or(false)
}

/// Stored reports for the measure whose period covers the requested dates,
/// in server order.
pub async fn fetch_reports(
    server: &ServerEndpoint,
    measure: &str,
    subject: Option<&Subject>,
    period_start: &str,
    period_end: &str,
    page_size: u32,
) -> Result<Vec<MeasureReport>, FhirError> {
    let url = reports_url(server, measure, subject, page_size);
    let body = get_json(SEARCH_OPERATION, &url, server.token()).await?;
    let bundle: Bundle<MeasureReport> = parse_resource(body)?;
    Ok(bundle
        .into_resources()
        .into_iter()
        .filter(|report| report_matches_period(report, period_start, period_end))
        .collect())
}

pub async fn fetch_report(server: &ServerEndpoint, id: &str) -> Result<MeasureReport, FhirError> {
    let url = report_url(server, id);
    let body = get_json(READ_OPERATION, &url, server.token()).await?;
    parse_resource(body)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn search_url_includes_measure_and_page_size() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir");
        assert_eq!(
            reports_url(&server, "ColorectalScreening", None, 200),
            "http://localhost:8080/fhir/MeasureReport?measure=ColorectalScreening&_count=200"
        );
        let subject = Subject::Patient("p1".to_string());
        assert_eq!(
            reports_url(&server, "M", Some(&subject), 50),
            "http://localhost:8080/fhir/MeasureReport?measure=M&_count=50&subject=Patient/p1"
        );
    }

    #[test]
    fn period_filter_uses_date_prefixes() {
        let in_period: MeasureReport = parse_resource(json!({
            "resourceType": "MeasureReport",
            "period": {"start": "2026-01-01T00:00:00Z", "end": "2026-12-31T23:59:59Z"},
            "group": []
        }))
        .expect("report");
        let out_of_period: MeasureReport = parse_resource(json!({
            "resourceType": "MeasureReport",
            "period": {"start": "2025-01-01", "end": "2025-12-31"},
            "group": []
        }))
        .expect("report");
        let no_period: MeasureReport = parse_resource(json!({
            "resourceType": "MeasureReport",
            "group": []
        }))
        .expect("report");

        assert!(report_matches_period(&in_period, "2026-01-01", "2026-12-31"));
        assert!(!report_matches_period(&out_of_period, "2026-01-01", "2026-12-31"));
        assert!(!report_matches_period(&no_period, "2026-01-01", "2026-12-31"));
    }
}
