use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::compare::differ::matched_counts;
use crate::compare::{MeasureComparison, MismatchKind, SweepReport, SweepVerdict};
use crate::fhir::resource::{Library, Measure, MeasureReport, PatientGroup};
use crate::ops::patients::PatientRoster;

pub fn render_comparison_table(comparison: &MeasureComparison) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Population", "Evaluated", "Reported", "Status"]);

    for entry in matched_counts(&comparison.evaluated, &comparison.reported) {
        table.add_row(Row::from(vec![
            Cell::new(&entry.code),
            Cell::new(entry.count.to_string()),
            Cell::new(entry.count.to_string()),
            Cell::new("OK").fg(Color::Green),
        ]));
    }
    for mismatch in &comparison.mismatches {
        let status = match mismatch.kind {
            MismatchKind::MissingFromEvaluated => "MISSING (evaluated)",
            MismatchKind::MissingFromReported => "MISSING (reported)",
            MismatchKind::CountDiffers => "COUNT DIFFERS",
        };
        table.add_row(Row::from(vec![
            Cell::new(&mismatch.code),
            Cell::new(
                mismatch
                    .evaluated
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                mismatch
                    .reported
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(status).fg(Color::Red),
        ]));
    }

    let verdict = if comparison.discrepancy {
        "DISCREPANCY"
    } else {
        "MATCH"
    };
    let mut out = String::new();
    out.push_str(&table.to_string());
    out.push_str(&format!(
        "\nStored reports compared: {}\nVerdict: {verdict}",
        comparison.fetched_report_count
    ));
    out
}

pub fn render_sweep_table(report: &SweepReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Patient", "Name", "Verdict", "Mismatches", "Error"]);

    for row in &report.rows {
        let verdict_cell = match row.verdict {
            SweepVerdict::Match => Cell::new(row.verdict.to_string()).fg(Color::Green),
            SweepVerdict::Discrepancy => Cell::new(row.verdict.to_string()).fg(Color::Red),
            SweepVerdict::Failed => Cell::new(row.verdict.to_string()).fg(Color::Yellow),
        };
        table.add_row(Row::from(vec![
            Cell::new(&row.patient_id),
            Cell::new(&row.patient_name),
            verdict_cell,
            Cell::new(
                row.mismatch_count
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(row.error.as_deref().unwrap_or("-")),
        ]));
    }

    let mut out = String::new();
    out.push_str(&table.to_string());
    out.push_str(&format!(
        "\n{} matching, {} discrepant, {} failed of {} patients",
        report.matching,
        report.discrepant,
        report.failed,
        report.rows.len()
    ));
    out
}

pub fn render_measures_table(measures: &[Measure]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Title", "Scoring"]);
    for measure in measures {
        table.add_row(vec![
            measure.id.clone(),
            measure.name.clone().unwrap_or_else(|| "-".to_string()),
            measure.title.clone().unwrap_or_else(|| "-".to_string()),
            measure
                .scoring_code()
                .map(str::to_string)
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.to_string()
}

pub fn render_patients_table(roster: &PatientRoster) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Birth Date"]);
    for patient in &roster.patients {
        table.add_row(vec![
            patient.id.clone(),
            patient.display_name(),
            patient.birth_date.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }

    let mut out = String::new();
    out.push_str(&table.to_string());
    out.push_str(&format!(
        "\nShowing {} of {} patients",
        roster.patients.len(),
        roster.total
    ));
    out
}

pub fn render_groups_table(groups: &[PatientGroup]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Members"]);
    for group in groups {
        let members = group
            .quantity
            .unwrap_or(group.member.len() as u64)
            .to_string();
        table.add_row(vec![
            group.id.clone(),
            group.name.clone().unwrap_or_else(|| "-".to_string()),
            members,
        ]);
    }
    table.to_string()
}

pub fn render_reports_table(reports: &[MeasureReport]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Type", "Status", "Subject", "Period", "Populations"]);
    for report in reports {
        let populations: usize = report
            .group
            .iter()
            .map(|group| group.population.as_ref().map(Vec::len).unwrap_or(0))
            .sum();
        table.add_row(vec![
            report.id.clone().unwrap_or_else(|| "-".to_string()),
            report.report_type.clone().unwrap_or_else(|| "-".to_string()),
            report.status.clone().unwrap_or_else(|| "-".to_string()),
            report
                .subject
                .as_ref()
                .and_then(|subject| subject.reference.clone())
                .unwrap_or_else(|| "-".to_string()),
            report
                .period
                .as_ref()
                .map(|period| period.label())
                .unwrap_or_else(|| "-".to_string()),
            populations.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_report_table(report: &MeasureReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Group", "Population", "Count"]);
    for (index, group) in report.group.iter().enumerate() {
        let group_label = group
            .code
            .as_ref()
            .and_then(|code| {
                code.primary_display()
                    .map(str::to_string)
                    .or_else(|| code.text.clone())
            })
            .unwrap_or_else(|| format!("group {index}"));
        for population in group.population.iter().flatten() {
            table.add_row(vec![
                group_label.clone(),
                population
                    .code
                    .primary_display()
                    .map(str::to_string)
                    .unwrap_or_else(|| "-".to_string()),
                population.count.to_string(),
            ]);
        }
        if let Some(score) = group.measure_score.as_ref().and_then(|score| score.value) {
            table.add_row(vec![
                group_label.clone(),
                "(measure score)".to_string(),
                format!("{score:.4}"),
            ]);
        }
    }
    table.to_string()
}

pub fn render_requirements_table(library: &Library) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Type", "Filters"]);
    for requirement in &library.data_requirement {
        let filters = requirement.filter_summary();
        table.add_row(vec![
            requirement.requirement_type.clone(),
            if filters.is_empty() {
                "-".to_string()
            } else {
                filters
            },
        ]);
    }
    table.to_string()
}
