//! `Measure/{id}/$collect-data`: gather the clinical data a measure depends
//! on, as a Parameters document ready for `$submit-data`.

use serde_json::Value;

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::expect_resource_type;
use crate::fhir::FhirError;

const OPERATION: &str = "collect-data";

pub fn collect_data_url(
    server: &ServerEndpoint,
    measure: &str,
    period_start: &str,
    period_end: &str,
    patient: Option<&str>,
) -> String {
    let mut path = format!(
        "Measure/{measure}/$collect-data?periodStart={period_start}&periodEnd={period_end}"
    );
    if let Some(patient) = patient {
        path.push_str(&format!("&subject=Patient/{patient}&reportType=subject-list"));
    }
    server.url(&path)
}

/// The Parameters document stays raw JSON: its entries are arbitrary
/// resources destined for submission, not something to model here.
pub async fn fetch_collected(
    server: &ServerEndpoint,
    measure: &str,
    period_start: &str,
    period_end: &str,
    patient: Option<&str>,
) -> Result<Value, FhirError> {
    let url = collect_data_url(server, measure, period_start, period_end, patient);
    let body = get_json(OPERATION, &url, server.token()).await?;
    expect_resource_type(&body, "Parameters")?;
    Ok(body)
}

pub fn collected_resource_count(parameters: &Value) -> usize {
    parameters
        .get("parameter")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| entry.get("resource").is_some())
                .count()
        })
        .unwrap_or(0)
}
