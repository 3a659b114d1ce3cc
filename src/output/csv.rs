use anyhow::Result;

use crate::compare::differ::matched_counts;
use crate::compare::{MeasureComparison, MismatchKind, SweepReport};

pub fn comparison_to_csv(comparison: &MeasureComparison) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["population", "evaluated", "reported", "status"])?;
    for entry in matched_counts(&comparison.evaluated, &comparison.reported) {
        writer.write_record([
            entry.code.clone(),
            entry.count.to_string(),
            entry.count.to_string(),
            "ok".to_string(),
        ])?;
    }
    for mismatch in &comparison.mismatches {
        let status = match mismatch.kind {
            MismatchKind::MissingFromEvaluated => "missing_from_evaluated",
            MismatchKind::MissingFromReported => "missing_from_reported",
            MismatchKind::CountDiffers => "count_differs",
        };
        writer.write_record([
            mismatch.code.clone(),
            mismatch
                .evaluated
                .map(|count| count.to_string())
                .unwrap_or_default(),
            mismatch
                .reported
                .map(|count| count.to_string())
                .unwrap_or_default(),
            status.to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn sweep_to_csv(report: &SweepReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "patient_id",
        "patient_name",
        "verdict",
        "mismatches",
        "error",
    ])?;
    for row in &report.rows {
        writer.write_record([
            row.patient_id.clone(),
            row.patient_name.clone(),
            row.verdict.to_string().to_lowercase(),
            row.mismatch_count
                .map(|count| count.to_string())
                .unwrap_or_default(),
            row.error.clone().unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
