//! `Measure/{id}/$submit-data`: push collected clinical data to a server.

use serde_json::Value;

use crate::config::ServerEndpoint;
use crate::fhir::http::post_json;
use crate::fhir::FhirError;

const OPERATION: &str = "submit-data";

pub fn submit_data_url(server: &ServerEndpoint, measure: &str) -> String {
    server.url(&format!("Measure/{measure}/$submit-data"))
}

/// Success bodies vary by server (empty, OperationOutcome, echo); none of
/// them carry information this tool needs, so a 2xx is the whole contract.
pub async fn submit_data(
    server: &ServerEndpoint,
    measure: &str,
    payload: &Value,
) -> Result<(), FhirError> {
    let url = submit_data_url(server, measure);
    post_json(OPERATION, &url, server.token(), payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_url_targets_the_measure() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir/");
        assert_eq!(
            submit_data_url(&server, "ColorectalScreening"),
            "http://localhost:8080/fhir/Measure/ColorectalScreening/$submit-data"
        );
    }
}
