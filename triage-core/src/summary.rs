// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregating a report into a summary.

use crate::{
    classify::classify_all,
    config::TriageConfig,
    group::{FailureGroup, group_failures},
    report::{Outcome, TestRecord},
};
use std::time::Duration;
use tracing::debug;
use triage_metadata::{
    FailureExcerptJson, FailureGroupJson, HintsJson, LocationJson, RunCountsJson, RunSummaryJson,
    SlowestFailureJson,
};

/// Analyzes loaded records: classifies failures, groups them and orders the groups.
///
/// This is a pure function of its inputs.
pub fn analyze(records: &[TestRecord], config: &TriageConfig) -> Summary {
    let counts = RunCounts::from_records(records);
    let failures = classify_all(records);
    debug!(
        "classified {} failures out of {} records",
        failures.len(),
        counts.total,
    );

    let mut groups = group_failures(failures, config.similarity_threshold);
    // Stable, so groups of equal size stay in first-seen order.
    groups.sort_by(|a, b| b.size().cmp(&a.size()));

    let hints = config.hints.then(|| Hints::from_records(records));

    Summary {
        counts,
        groups,
        display_limit: config.display_limit,
        hints,
    }
}

/// Outcome counts for a report.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunCounts {
    /// The total number of records.
    pub total: usize,

    /// The number of records that passed.
    pub passed: usize,

    /// The number of records that failed.
    pub failed: usize,

    /// The number of records that errored.
    pub errored: usize,

    /// The number of records that were skipped.
    pub skipped: usize,
}

impl RunCounts {
    /// Counts the outcomes of `records`.
    pub fn from_records(records: &[TestRecord]) -> Self {
        let mut counts = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.outcome {
                Outcome::Passed => counts.passed += 1,
                Outcome::Failed => counts.failed += 1,
                Outcome::Errored => counts.errored += 1,
                Outcome::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Returns the number of records that failed or errored.
    pub fn failing(&self) -> usize {
        self.failed + self.errored
    }
}

/// Hints about a report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hints {
    /// The failing test that took the longest. Ties go to the earliest record.
    pub slowest_failure: Option<(String, Duration)>,

    /// Failing tests whose message or captured output mentions flakiness, in report order.
    pub possibly_flaky: Vec<String>,

    /// The start of the captured output of the first failing test, if any test failed.
    pub failure_excerpt: Option<FailureExcerpt>,

    /// The summed duration of all records. Only set when there are records and none of them
    /// failed.
    pub total_duration: Option<Duration>,
}

impl Hints {
    /// The marker looked for, case-insensitively, when detecting flakiness.
    pub const FLAKY_MARKER: &'static str = "flake";

    /// The maximum number of captured output lines in a failure excerpt.
    pub const EXCERPT_LINES: usize = 3;

    /// Computes hints over `records`.
    pub fn from_records(records: &[TestRecord]) -> Self {
        let mut hints = Self::default();
        for record in records.iter().filter(|record| record.outcome.is_failure()) {
            let is_slower = hints
                .slowest_failure
                .as_ref()
                .is_none_or(|(_, duration)| record.duration > *duration);
            if is_slower {
                hints.slowest_failure = Some((record.id.clone(), record.duration));
            }

            let message = record
                .failure
                .as_ref()
                .map_or("", |failure| failure.message.as_str());
            if mentions_flakiness(message) || mentions_flakiness(&record.captured_output) {
                hints.possibly_flaky.push(record.id.clone());
            }

            if hints.failure_excerpt.is_none() {
                hints.failure_excerpt = Some(FailureExcerpt::new(record));
            }
        }

        if !records.is_empty() && hints.failure_excerpt.is_none() {
            hints.total_duration = Some(
                records
                    .iter()
                    .map(|record| record.duration)
                    .fold(Duration::ZERO, Duration::saturating_add),
            );
        }
        hints
    }

    fn to_json(&self) -> HintsJson {
        HintsJson {
            slowest_failure: self
                .slowest_failure
                .as_ref()
                .map(|(id, duration)| SlowestFailureJson {
                    id: id.clone(),
                    duration_secs: duration.as_secs_f64(),
                }),
            possibly_flaky: self.possibly_flaky.clone(),
            failure_excerpt: self.failure_excerpt.as_ref().map(|excerpt| FailureExcerptJson {
                id: excerpt.id.clone(),
                lines: excerpt.lines.clone(),
            }),
            total_duration_secs: self.total_duration.map(|duration| duration.as_secs_f64()),
        }
    }
}

/// The first lines of captured output from a failing test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureExcerpt {
    /// The test's identifier.
    pub id: String,

    /// Up to [`Hints::EXCERPT_LINES`] lines of the trimmed captured output. Empty if the test
    /// captured nothing.
    pub lines: Vec<String>,
}

impl FailureExcerpt {
    fn new(record: &TestRecord) -> Self {
        let lines = record
            .captured_output
            .trim()
            .lines()
            .take(Hints::EXCERPT_LINES)
            .map(str::to_owned)
            .collect();
        Self {
            id: record.id.clone(),
            lines,
        }
    }
}

fn mentions_flakiness(text: &str) -> bool {
    text.to_lowercase().contains(Hints::FLAKY_MARKER)
}

/// The result of analyzing a report.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    counts: RunCounts,
    groups: Vec<FailureGroup>,
    display_limit: usize,
    hints: Option<Hints>,
}

impl Summary {
    /// Returns the outcome counts.
    pub fn counts(&self) -> &RunCounts {
        &self.counts
    }

    /// Returns all groups, largest first.
    pub fn groups(&self) -> &[FailureGroup] {
        &self.groups
    }

    /// Returns the groups that fit within the display limit.
    pub fn displayed_groups(&self) -> &[FailureGroup] {
        &self.groups[..self.groups.len().min(self.display_limit)]
    }

    /// Returns the number of groups that did not fit within the display limit.
    pub fn suppressed_count(&self) -> usize {
        self.groups.len().saturating_sub(self.display_limit)
    }

    /// Returns true if some groups are not displayed.
    pub fn is_truncated(&self) -> bool {
        self.suppressed_count() > 0
    }

    /// Returns hints, if they were requested.
    pub fn hints(&self) -> Option<&Hints> {
        self.hints.as_ref()
    }

    /// Converts this summary into its serializable form.
    ///
    /// Like the text form, this only includes the displayed groups. Messages are not truncated.
    pub fn to_json(&self) -> RunSummaryJson {
        let counts = RunCountsJson {
            total: self.counts.total,
            passed: self.counts.passed,
            failed: self.counts.failed,
            errored: self.counts.errored,
            skipped: self.counts.skipped,
        };
        let groups = self
            .displayed_groups()
            .iter()
            .map(|group| {
                let representative = group.representative();
                FailureGroupJson {
                    size: group.size(),
                    category: representative.category,
                    exception_kind: representative.exception_kind.clone(),
                    message: representative.message.clone(),
                    location: representative.location.as_ref().map(|location| {
                        LocationJson {
                            file: location.file.to_string(),
                            line: location.line,
                        }
                    }),
                    members: group.members().to_vec(),
                }
            })
            .collect();

        RunSummaryJson::new(
            counts,
            groups,
            self.suppressed_count(),
            self.hints.as_ref().map(Hints::to_json),
        )
    }
}
