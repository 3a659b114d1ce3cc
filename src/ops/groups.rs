//! Patient group listing and read.

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::{parse_resource, Bundle, PatientGroup};
use crate::fhir::FhirError;

const SEARCH_OPERATION: &str = "group-search";
const READ_OPERATION: &str = "group-read";

pub fn groups_url(server: &ServerEndpoint, page_size: u32) -> String {
    server.url(&format!("Group?_count={page_size}"))
}

pub fn group_url(server: &ServerEndpoint, id: &str) -> String {
    server.url(&format!("Group/{id}"))
}

pub async fn fetch_groups(
    server: &ServerEndpoint,
    page_size: u32,
) -> Result<Vec<PatientGroup>, FhirError> {
    let url = groups_url(server, page_size);
    let body = get_json(SEARCH_OPERATION, &url, server.token()).await?;
    let bundle: Bundle<PatientGroup> = parse_resource(body)?;
    Ok(bundle.into_resources())
}

pub async fn fetch_group(server: &ServerEndpoint, id: &str) -> Result<PatientGroup, FhirError> {
    let url = group_url(server, id);
    let body = get_json(READ_OPERATION, &url, server.token()).await?;
    parse_resource(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_urls() {
        let server = ServerEndpoint::new("http://localhost:8080/fhir");
        assert_eq!(
            groups_url(&server, 100),
            "http://localhost:8080/fhir/Group?_count=100"
        );
        assert_eq!(
            group_url(&server, "g1"),
            "http://localhost:8080/fhir/Group/g1"
        );
    }
}
