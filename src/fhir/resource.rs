//! Typed models for the slices of FHIR R4 this tool reads.
//!
//! Parsing is an explicit step: a payload either becomes a typed document
//! here or the caller gets a malformed-document error. Nothing downstream
//! walks raw JSON.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fhir::error::FhirError;

/// A FHIR resource with a fixed `resourceType` discriminator.
pub trait Resource: DeserializeOwned {
    const TYPE: &'static str;
}

pub fn parse_resource<T: Resource>(value: Value) -> Result<T, FhirError> {
    expect_resource_type(&value, T::TYPE)?;
    serde_json::from_value(value).map_err(|error| FhirError::malformed(T::TYPE, error.to_string()))
}

pub fn expect_resource_type(value: &Value, expected: &'static str) -> Result<(), FhirError> {
    match value.get("resourceType").and_then(Value::as_str) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(FhirError::malformed(
            expected,
            format!("unexpected resourceType {actual:?}"),
        )),
        None => Err(FhirError::malformed(expected, "missing resourceType")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// Display text of the first coding entry.
    pub fn primary_display(&self) -> Option<&str> {
        self.coding.first().and_then(|coding| coding.display.as_deref())
    }

    pub fn primary_code(&self) -> Option<&str> {
        self.coding.first().and_then(|coding| coding.code.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Period {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl Period {
    /// Date-prefix match, so a stored `2024-01-01T00:00:00Z` satisfies a
    /// `2024-01-01` query. Both bounds must be present and match.
    pub fn matches_dates(&self, start: &str, end: &str) -> bool {
        let start_matches = self
            .start
            .as_deref()
            .map(|value| value.starts_with(start))
            .unwrap_or(false);
        let end_matches = self
            .end
            .as_deref()
            .map(|value| value.starts_with(end))
            .unwrap_or(false);
        start_matches && end_matches
    }

    pub fn label(&self) -> String {
        format!(
            "{} .. {}",
            self.start.as_deref().unwrap_or("-"),
            self.end.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// The id behind a `Patient/{id}` reference. Anything else is an error,
    /// never a blind string slice.
    pub fn patient_id(&self) -> Result<&str, FhirError> {
        let raw = self.reference.as_deref().unwrap_or("");
        match raw.strip_prefix("Patient/") {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(FhirError::Reference {
                raw: raw.to_string(),
                expected: "Patient",
            }),
        }
    }
}

/// Subject of a measure operation: one patient or one patient group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Subject {
    Patient(String),
    Group(String),
}

impl Display for Subject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patient(id) => write!(f, "Patient/{id}"),
            Self::Group(id) => write!(f, "Group/{id}"),
        }
    }
}

impl FromStr for Subject {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(id) = trimmed.strip_prefix("Patient/") {
            if !id.is_empty() {
                return Ok(Self::Patient(id.to_string()));
            }
        }
        if let Some(id) = trimmed.strip_prefix("Group/") {
            if !id.is_empty() {
                return Ok(Self::Group(id.to_string()));
            }
        }
        Err(FhirError::Reference {
            raw: s.to_string(),
            expected: "Patient or Group",
        })
    }
}

impl TryFrom<String> for Subject {
    type Error = FhirError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subject> for String {
    fn from(value: Subject) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Quantity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPopulation {
    pub code: CodeableConcept,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population: Option<Vec<ReportPopulation>>,
    #[serde(rename = "measureScore", skip_serializing_if = "Option::is_none")]
    pub measure_score: Option<Quantity>,
}

/// A MeasureReport with the fields the comparison path reads. `group` is
/// required: a report without it fails the parse instead of normalizing to
/// an empty tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureReport {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    pub group: Vec<ReportGroup>,
}

impl Resource for MeasureReport {
    const TYPE: &'static str = "MeasureReport";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry<T> {
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle<T> {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    // `default = "Vec::new"` rather than plain `default`: the bare form
    // makes the derive demand `T: Default`, which the entry resources
    // do not implement.
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry<T>>,
}

impl<T: DeserializeOwned> Resource for Bundle<T> {
    const TYPE: &'static str = "Bundle";
}

impl<T> Bundle<T> {
    /// Entry resources in bundle order.
    pub fn into_resources(self) -> Vec<T> {
        self.entry.into_iter().map(|entry| entry.resource).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HumanName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,
    #[serde(rename = "birthDate", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

impl Resource for Patient {
    const TYPE: &'static str = "Patient";
}

impl Patient {
    pub fn display_name(&self) -> String {
        let Some(name) = self.name.first() else {
            return self.id.clone();
        };
        let mut parts: Vec<&str> = name.given.iter().map(String::as_str).collect();
        if let Some(family) = name.family.as_deref() {
            parts.push(family);
        }
        if parts.is_empty() {
            return self.id.clone();
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<CodeableConcept>,
}

impl Resource for Measure {
    const TYPE: &'static str = "Measure";
}

impl Measure {
    pub fn scoring_code(&self) -> Option<&str> {
        self.scoring.as_ref().and_then(CodeableConcept::primary_code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub entity: Reference,
}

/// A FHIR Group resource holding a patient cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientGroup {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member: Vec<GroupMember>,
}

impl Resource for PatientGroup {
    const TYPE: &'static str = "Group";
}

impl PatientGroup {
    /// Member patient ids; a member that is not a `Patient/{id}` reference
    /// is an error.
    pub fn member_patient_ids(&self) -> Result<Vec<String>, FhirError> {
        self.member
            .iter()
            .map(|member| member.entity.patient_id().map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "valueSet", skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<Coding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequirement {
    #[serde(rename = "type")]
    pub requirement_type: String,
    #[serde(rename = "codeFilter", default, skip_serializing_if = "Vec::is_empty")]
    pub code_filter: Vec<CodeFilter>,
}

impl DataRequirement {
    pub fn filter_summary(&self) -> String {
        let mut parts = Vec::new();
        for filter in &self.code_filter {
            let target = filter.value_set.clone().or_else(|| {
                let codes: Vec<&str> = filter
                    .code
                    .iter()
                    .filter_map(|coding| coding.code.as_deref())
                    .collect();
                if codes.is_empty() {
                    None
                } else {
                    Some(codes.join("|"))
                }
            });
            match (&filter.path, target) {
                (Some(path), Some(target)) => parts.push(format!("{path} in {target}")),
                (Some(path), None) => parts.push(path.clone()),
                (None, Some(target)) => parts.push(target),
                (None, None) => {}
            }
        }
        parts.join(", ")
    }
}

/// The Library document `$data-requirements` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "dataRequirement", default, skip_serializing_if = "Vec::is_empty")]
    pub data_requirement: Vec<DataRequirement>,
}

impl Resource for Library {
    const TYPE: &'static str = "Library";
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeIssue {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub diagnostics: Option<String>,
}

/// Error body many FHIR servers attach to non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationOutcome {
    #[serde(default)]
    pub issue: Vec<OutcomeIssue>,
}

impl OperationOutcome {
    pub fn summary(&self) -> Option<String> {
        let issue = self.issue.first()?;
        let text = issue.diagnostics.as_deref().or(issue.code.as_deref())?;
        Some(match issue.severity.as_deref() {
            Some(severity) => format!("{severity}: {text}"),
            None => text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_measure_report_with_groups() {
        let report: MeasureReport = parse_resource(json!({
            "resourceType": "MeasureReport",
            "status": "complete",
            "type": "individual",
            "measure": "http://example.org/Measure/ColorectalScreening",
            "period": {"start": "2026-01-01", "end": "2026-12-31"},
            "group": [{
                "population": [
                    {"code": {"coding": [{"code": "initial-population", "display": "Initial Population"}]}, "count": 100},
                    {"code": {"coding": [{"code": "numerator", "display": "Numerator"}]}, "count": 42}
                ]
            }]
        }))
        .expect("report should parse");

        assert_eq!(report.group.len(), 1);
        let populations = report.group[0].population.as_ref().expect("populations");
        assert_eq!(populations[1].count, 42);
        assert_eq!(
            populations[0].code.primary_display(),
            Some("Initial Population")
        );
    }

    #[test]
    fn report_without_group_fails_parse() {
        let error = parse_resource::<MeasureReport>(json!({
            "resourceType": "MeasureReport",
            "status": "complete"
        }))
        .expect_err("missing group must fail");
        assert!(error.is_malformed());
        assert!(error.to_string().contains("group"));
    }

    #[test]
    fn negative_count_fails_parse() {
        let error = parse_resource::<MeasureReport>(json!({
            "resourceType": "MeasureReport",
            "group": [{"population": [{"code": {"coding": [{"display": "Numerator"}]}, "count": -3}]}]
        }))
        .expect_err("negative count must fail");
        assert!(error.is_malformed());
    }

    #[test]
    fn rejects_unexpected_resource_type() {
        let error = parse_resource::<MeasureReport>(json!({
            "resourceType": "OperationOutcome",
            "issue": []
        }))
        .expect_err("wrong resourceType must fail");
        assert!(error.to_string().contains("OperationOutcome"));
    }

    #[test]
    fn bundle_without_entries_is_empty() {
        let bundle: Bundle<MeasureReport> = parse_resource(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 0
        }))
        .expect("bundle should parse");
        assert!(bundle.entry.is_empty());
        assert_eq!(bundle.total, Some(0));
    }

    #[test]
    fn bundles_parse_for_every_searched_resource() {
        // None of the entry resource types implement Default, so the
        // missing-entry fallback must not require one.
        let empty = json!({"resourceType": "Bundle", "type": "searchset"});
        assert!(parse_resource::<Bundle<Patient>>(empty.clone()).is_ok());
        assert!(parse_resource::<Bundle<Measure>>(empty.clone()).is_ok());
        assert!(parse_resource::<Bundle<PatientGroup>>(empty).is_ok());

        let patients: Bundle<Patient> = parse_resource(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [{"resource": {"resourceType": "Patient", "id": "pat-1"}}]
        }))
        .expect("patient bundle should parse");
        assert_eq!(patients.entry[0].resource.id, "pat-1");
    }

    #[test]
    fn patient_reference_parses() {
        let reference = Reference {
            reference: Some("Patient/pat-7".to_string()),
            display: None,
        };
        assert_eq!(reference.patient_id().expect("patient id"), "pat-7");
    }

    #[test]
    fn non_patient_reference_is_rejected() {
        let reference = Reference {
            reference: Some("Practitioner/doc-1".to_string()),
            display: None,
        };
        assert!(reference.patient_id().is_err());
    }

    #[test]
    fn subject_parses_and_formats() {
        let subject: Subject = "Patient/abc".parse().expect("subject");
        assert_eq!(subject, Subject::Patient("abc".to_string()));
        assert_eq!(subject.to_string(), "Patient/abc");
        assert_eq!(
            "Group/g1".parse::<Subject>().expect("group subject"),
            Subject::Group("g1".to_string())
        );
        assert!("abc".parse::<Subject>().is_err());
        assert!("Patient/".parse::<Subject>().is_err());
    }

    #[test]
    fn period_matches_date_prefixes() {
        let period = Period {
            start: Some("2026-01-01T00:00:00Z".to_string()),
            end: Some("2026-12-31T23:59:59Z".to_string()),
        };
        assert!(period.matches_dates("2026-01-01", "2026-12-31"));
        assert!(!period.matches_dates("2025-01-01", "2026-12-31"));
    }

    #[test]
    fn patient_display_name_falls_back_to_id() {
        let named: Patient = parse_resource(json!({
            "resourceType": "Patient",
            "id": "pat-1",
            "name": [{"family": "Chalmers", "given": ["Peter", "James"]}]
        }))
        .expect("patient");
        assert_eq!(named.display_name(), "Peter James Chalmers");

        let anonymous: Patient = parse_resource(json!({
            "resourceType": "Patient",
            "id": "pat-2"
        }))
        .expect("patient");
        assert_eq!(anonymous.display_name(), "pat-2");
    }

    #[test]
    fn group_members_must_be_patients() {
        let group: PatientGroup = parse_resource(json!({
            "resourceType": "Group",
            "id": "g1",
            "member": [
                {"entity": {"reference": "Patient/a"}},
                {"entity": {"reference": "Patient/b"}}
            ]
        }))
        .expect("group");
        assert_eq!(group.member_patient_ids().expect("ids"), vec!["a", "b"]);

        let mixed: PatientGroup = parse_resource(json!({
            "resourceType": "Group",
            "id": "g2",
            "member": [{"entity": {"reference": "Device/d1"}}]
        }))
        .expect("group");
        assert!(mixed.member_patient_ids().is_err());
    }
}
