//! `Measure/{id}/$data-requirements`: the Library describing what clinical
//! data a measure needs.

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::{parse_resource, Library};
use crate::fhir::FhirError;

const OPERATION: &str = "data-requirements";

pub fn data_requirements_url(
    server: &ServerEndpoint,
    measure: &str,
    period_start: &str,
    period_end: &str,
) -> String {
    server.url(&format!(
        "Measure/{measure}/$data-requirements?periodStart={period_start}&periodEnd={period_end}"
    ))
}

pub async fn fetch_data_requirements(
    server: &ServerEndpoint,
    measure: &str,
    period_start: &str,
    period_end: &str,
) -> Result<Library, FhirError> {
    let url = data_requirements_url(server, measure, period_start, period_end);
    let body = get_json(OPERATION, &url, server.token()).await?;
    parse_resource(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_url_carries_the_period() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir");
        assert_eq!(
            data_requirements_url(&server, "M", "2026-01-01", "2026-12-31"),
            "http://localhost:8080/fhir/Measure/M/$data-requirements?periodStart=2026-01-01&periodEnd=2026-12-31"
        );
    }
}
