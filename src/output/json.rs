use anyhow::{Context, Result};
use serde::Serialize;

/// Pretty JSON for any renderable value, FHIR documents included.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serializing output to JSON")
}
