//! `Measure/{id}/$evaluate-measure`: ask the server to compute the measure
//! fresh from clinical data.

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::{parse_resource, MeasureReport, Subject};
use crate::fhir::FhirError;

const OPERATION: &str = "evaluate-measure";

pub fn evaluate_url(
    server: &ServerEndpoint,
    measure: &str,
    subject: Option<&Subject>,
    period_start: &str,
    period_end: &str,
) -> String {
    let mut path = format!(
        "Measure/{measure}/$evaluate-measure?periodStart={period_start}&periodEnd={period_end}"
    );
    match subject {
        Some(subject @ Subject::Patient(_)) => {
            path.push_str(&format!("&subject={subject}&reportType=subject"));
        }
        Some(subject @ Subject::Group(_)) => {
            path.push_str(&format!("&subject={subject}&reportType=population"));
        }
        None => path.push_str("&reportType=population"),
    }
    server.url(&path)
}

pub async fn evaluate_measure(
    server: &ServerEndpoint,
    measure: &str,
    subject: Option<&Subject>,
    period_start: &str,
    period_end: &str,
) -> Result<MeasureReport, FhirError> {
    let url = evaluate_url(server, measure, subject, period_start, period_end);
    let body = get_json(OPERATION, &url, server.token()).await?;
    parse_resource(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_evaluation_url() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir");
        let subject = Subject::Patient("p1".to_string());
        assert_eq!(
            evaluate_url(&server, "ColorectalScreening", Some(&subject), "2026-01-01", "2026-12-31"),
            "http://localhost:8080/fhir/Measure/ColorectalScreening/$evaluate-measure\
             ?periodStart=2026-01-01&periodEnd=2026-12-31&subject=Patient/p1&reportType=subject"
        );
    }

    #[test]
    fn group_and_population_evaluation_urls() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir/");
        let group = Subject::Group("g1".to_string());
        assert!(evaluate_url(&server, "M", Some(&group), "a", "b")
            .ends_with("?periodStart=a&periodEnd=b&subject=Group/g1&reportType=population"));
        assert!(evaluate_url(&server, "M", None, "a", "b")
            .ends_with("?periodStart=a&periodEnd=b&reportType=population"));
    }
}
