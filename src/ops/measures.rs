//! Measure listing.

use crate::config::ServerEndpoint;
use crate::fhir::http::get_json;
use crate::fhir::resource::{parse_resource, Bundle, Measure};
use crate::fhir::FhirError;

const OPERATION: &str = "measure-search";

pub fn measures_url(server: &ServerEndpoint, page_size: u32) -> String {
    server.url(&format!("Measure?_count={page_size}"))
}

pub async fn fetch_measures(
    server: &ServerEndpoint,
    page_size: u32,
) -> Result<Vec<Measure>, FhirError> {
    let url = measures_url(server, page_size);
    let body = get_json(OPERATION, &url, server.token()).await?;
    let bundle: Bundle<Measure> = parse_resource(body)?;
    Ok(bundle.into_resources())
}
