//! Flattening MeasureReports into comparable population tallies.

use crate::compare::PopulationCount;
use crate::fhir::resource::MeasureReport;
use crate::fhir::FhirError;

/// Walk a report's groups in document order and collect one
/// `(code, count)` pair per population. Groups without a population list
/// contribute nothing; a population whose first coding carries no display
/// text makes the whole report malformed.
pub fn population_counts(report: &MeasureReport) -> Result<Vec<PopulationCount>, FhirError> {
    let mut counts = Vec::new();
    for (group_index, group) in report.group.iter().enumerate() {
        let Some(populations) = group.population.as_ref() else {
            continue;
        };
        for (population_index, population) in populations.iter().enumerate() {
            let Some(display) = population.code.primary_display() else {
                return Err(FhirError::malformed(
                    "MeasureReport",
                    format!(
                        "group {group_index} population {population_index} has no coding display"
                    ),
                ));
            };
            counts.push(PopulationCount::new(display, population.count));
        }
    }
    Ok(counts)
}

/// Tallies for a set of stored reports, concatenated in fetch order. Counts
/// are never summed across reports: two halves of a total are not the same
/// thing as the total.
pub fn combined_population_counts(
    reports: &[MeasureReport],
) -> Result<Vec<PopulationCount>, FhirError> {
    let mut counts = Vec::new();
    for report in reports {
        counts.extend(population_counts(report)?);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::fhir::resource::parse_resource;

    use super::*;

    fn report(groups: serde_json::Value) -> MeasureReport {
        parse_resource(json!({
            "resourceType": "MeasureReport",
            "status": "complete",
            "group": groups
        }))
        .expect("fixture report should parse")
    }

    #[test]
    fn collects_counts_in_document_order() {
        let report = report(json!([
            {"population": [
                {"code": {"coding": [{"display": "Numerator"}]}, "count": 5},
                {"code": {"coding": [{"display": "Denominator"}]}, "count": 9}
            ]},
            {"population": [
                {"code": {"coding": [{"display": "Initial Population"}]}, "count": 12}
            ]}
        ]));
        let counts = population_counts(&report).expect("counts");
        assert_eq!(
            counts,
            vec![
                PopulationCount::new("Numerator", 5),
                PopulationCount::new("Denominator", 9),
                PopulationCount::new("Initial Population", 12),
            ]
        );
    }

    #[test]
    fn group_without_population_contributes_nothing() {
        let report = report(json!([
            {"measureScore": {"value": 0.5}},
            {"population": [
                {"code": {"coding": [{"display": "Numerator"}]}, "count": 1}
            ]}
        ]));
        let counts = population_counts(&report).expect("counts");
        assert_eq!(counts, vec![PopulationCount::new("Numerator", 1)]);
    }

    #[test]
    fn missing_display_is_malformed() {
        let report = report(json!([
            {"population": [
                {"code": {"coding": [{"code": "numerator"}]}, "count": 1}
            ]}
        ]));
        let error = population_counts(&report).expect_err("must fail");
        assert!(error.is_malformed());
        assert!(error.to_string().contains("group 0 population 0"));
    }

    #[test]
    fn empty_coding_list_is_malformed() {
        let report = report(json!([
            {"population": [{"code": {"text": "Numerator"}, "count": 1}]}
        ]));
        assert!(population_counts(&report).is_err());
    }

    #[test]
    fn combined_counts_concatenate_without_summing() {
        let first = report(json!([
            {"population": [{"code": {"coding": [{"display": "Numerator"}]}, "count": 2}]}
        ]));
        let second = report(json!([
            {"population": [{"code": {"coding": [{"display": "Numerator"}]}, "count": 3}]}
        ]));
        let counts = combined_population_counts(&[first, second]).expect("counts");
        assert_eq!(
            counts,
            vec![
                PopulationCount::new("Numerator", 2),
                PopulationCount::new("Numerator", 3),
            ]
        );
    }

    #[test]
    fn no_reports_means_no_counts() {
        assert!(combined_population_counts(&[]).expect("counts").is_empty());
    }
}
