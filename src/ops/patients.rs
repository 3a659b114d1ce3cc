//! Patient listing. A `_summary=count` probe first, so the roster can say
//! how many patients exist beyond the fetched page.

use serde::{Deserialize, Serialize};

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::{parse_resource, Bundle, Patient};
use crate::fhir::FhirError;

const COUNT_OPERATION: &str = "patient-count";
const SEARCH_OPERATION: &str = "patient-search";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRoster {
    pub total: u64,
    pub patients: Vec<Patient>,
}

pub fn patient_count_url(server: &ServerEndpoint) -> String {
    server.url("Patient?_summary=count")
}

pub fn patients_url(server: &ServerEndpoint, page_size: u32) -> String {
    server.url(&format!("Patient?_count={page_size}"))
}

pub async fn fetch_patient_total(server: &ServerEndpoint) -> Result<u64, FhirError> {
    let url = patient_count_url(server);
    let body = get_json(COUNT_OPERATION, &url, server.token()).await?;
    let bundle: Bundle<Patient> = parse_resource(body)?;
    Ok(bundle.total.unwrap_or(0))
}

pub async fn fetch_patients(
    server: &ServerEndpoint,
    page_size: u32,
) -> Result<PatientRoster, FhirError> {
    let total = fetch_patient_total(server).await?;
    let url = patients_url(server, page_size);
    let body = get_json(SEARCH_OPERATION, &url, server.token()).await?;
    let bundle: Bundle<Patient> = parse_resource(body)?;
    Ok(PatientRoster {
        total,
        patients: bundle.into_resources(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_urls() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir");
        assert_eq!(
            patient_count_url(&server),
            "http://localhost:8080/fhir/Patient?_summary=count"
        );
        assert_eq!(
            patients_url(&server, 200),
            "http://localhost:8080/fhir/Patient?_count=200"
        );
    }
}
