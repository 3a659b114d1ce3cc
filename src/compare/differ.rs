//! Verdict and detail for two population tallies.
//!
//! Both sides are sorted on `(code, count)` before comparison, so ordering
//! differences between servers never count as discrepancies and duplicate
//! codes pair up by count.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::compare::PopulationCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    MissingFromEvaluated,
    MissingFromReported,
    CountDiffers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub kind: MismatchKind,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<u64>,
}

impl CountMismatch {
    pub fn describe(&self) -> String {
        match self.kind {
            MismatchKind::MissingFromReported => format!(
                "{}: evaluated {}, missing from stored reports",
                self.code,
                self.evaluated.unwrap_or_default()
            ),
            MismatchKind::MissingFromEvaluated => format!(
                "{}: stored {}, missing from evaluation",
                self.code,
                self.reported.unwrap_or_default()
            ),
            MismatchKind::CountDiffers => format!(
                "{}: evaluated {}, stored {}",
                self.code,
                self.evaluated.unwrap_or_default(),
                self.reported.unwrap_or_default()
            ),
        }
    }
}

pub fn sorted_counts(counts: &[PopulationCount]) -> Vec<PopulationCount> {
    let mut sorted = counts.to_vec();
    sorted.sort_by(|a, b| (a.code.as_str(), a.count).cmp(&(b.code.as_str(), b.count)));
    sorted
}

/// The verdict. A length mismatch is an immediate disagreement; otherwise
/// the sorted tallies must match pairwise.
pub fn counts_disagree(evaluated: &[PopulationCount], reported: &[PopulationCount]) -> bool {
    if evaluated.len() != reported.len() {
        return true;
    }
    let evaluated = sorted_counts(evaluated);
    let reported = sorted_counts(reported);
    evaluated
        .iter()
        .zip(&reported)
        .any(|(left, right)| left != right)
}

struct SplitCounts {
    matched: Vec<PopulationCount>,
    only_evaluated: Vec<PopulationCount>,
    only_reported: Vec<PopulationCount>,
}

fn split_counts(evaluated: &[PopulationCount], reported: &[PopulationCount]) -> SplitCounts {
    let evaluated = sorted_counts(evaluated);
    let reported = sorted_counts(reported);
    let mut split = SplitCounts {
        matched: Vec::new(),
        only_evaluated: Vec::new(),
        only_reported: Vec::new(),
    };
    let (mut i, mut j) = (0, 0);
    while i < evaluated.len() && j < reported.len() {
        let left = &evaluated[i];
        let right = &reported[j];
        match (left.code.as_str(), left.count).cmp(&(right.code.as_str(), right.count)) {
            Ordering::Equal => {
                split.matched.push(left.clone());
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                split.only_evaluated.push(left.clone());
                i += 1;
            }
            Ordering::Greater => {
                split.only_reported.push(right.clone());
                j += 1;
            }
        }
    }
    split.only_evaluated.extend_from_slice(&evaluated[i..]);
    split.only_reported.extend_from_slice(&reported[j..]);
    split
}

/// Pairs that agree on both sides, for rendering alongside the mismatches.
pub fn matched_counts(
    evaluated: &[PopulationCount],
    reported: &[PopulationCount],
) -> Vec<PopulationCount> {
    split_counts(evaluated, reported).matched
}

/// Per-code detail behind a disagreement. Leftovers that share a code pair
/// up as `CountDiffers`; the rest stay one-sided.
pub fn diff_population_counts(
    evaluated: &[PopulationCount],
    reported: &[PopulationCount],
) -> Vec<CountMismatch> {
    let split = split_counts(evaluated, reported);

    let mut reported_by_code: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for entry in split.only_reported {
        reported_by_code.entry(entry.code).or_default().push(entry.count);
    }

    let mut mismatches = Vec::new();
    for entry in split.only_evaluated {
        match reported_by_code
            .get_mut(&entry.code)
            .and_then(|counts| counts.pop())
        {
            Some(reported_count) => mismatches.push(CountMismatch {
                kind: MismatchKind::CountDiffers,
                code: entry.code,
                evaluated: Some(entry.count),
                reported: Some(reported_count),
            }),
            None => mismatches.push(CountMismatch {
                kind: MismatchKind::MissingFromReported,
                code: entry.code,
                evaluated: Some(entry.count),
                reported: None,
            }),
        }
    }
    for (code, counts) in reported_by_code {
        for count in counts {
            mismatches.push(CountMismatch {
                kind: MismatchKind::MissingFromEvaluated,
                code: code.clone(),
                evaluated: None,
                reported: Some(count),
            });
        }
    }
    mismatches
}

/// Unified line diff of the two tallies, one `code: count` per line.
pub fn count_diff_text(evaluated: &[PopulationCount], reported: &[PopulationCount]) -> String {
    let evaluated_lines = count_lines(evaluated);
    let reported_lines = count_lines(reported);
    let diff = TextDiff::from_lines(&evaluated_lines, &reported_lines);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(&format!("{sign}{change}"));
    }
    out
}

fn count_lines(counts: &[PopulationCount]) -> String {
    let mut out = String::new();
    for entry in sorted_counts(counts) {
        out.push_str(&format!("{}: {}\n", entry.code, entry.count));
    }
    out
}
