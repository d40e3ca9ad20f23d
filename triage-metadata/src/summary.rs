// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The normalized category a failure was classified into.
///
/// Categories are assigned by a fixed, ordered rule table over the exception kind, message and
/// failing phase of a test. The serialized form is kebab-case, e.g. `assertion-failure`.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    /// An assertion in the test body did not hold.
    AssertionFailure,

    /// A fixture failed to set up or tear down, or a requested fixture does not exist.
    FixtureError,

    /// A test module could not be collected (import errors, syntax errors and the like).
    CollectionError,

    /// The test ran out of time.
    Timeout,

    /// No rule matched.
    Unknown,
}

impl FailureCategory {
    /// Returns the kebab-case name of this category, as used in text and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssertionFailure => "assertion-failure",
            Self::FixtureError => "fixture-error",
            Self::CollectionError => "collection-error",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root element of `ci-triage --message-format json` output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct RunSummaryJson {
    /// Aggregate outcome counts for the report.
    pub counts: RunCountsJson,

    /// Displayed failure groups, largest first.
    pub groups: Vec<FailureGroupJson>,

    /// The number of groups that were not displayed because of the display limit.
    pub suppressed_groups: usize,

    /// Hints about the failing tests, if hints were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<HintsJson>,
}

impl RunSummaryJson {
    /// Creates a new summary from its parts.
    pub fn new(
        counts: RunCountsJson,
        groups: Vec<FailureGroupJson>,
        suppressed_groups: usize,
        hints: Option<HintsJson>,
    ) -> Self {
        Self {
            counts,
            groups,
            suppressed_groups,
            hints,
        }
    }

    /// Parses a summary from a JSON string.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }

    /// Returns true if any groups were left out of the summary.
    pub fn is_truncated(&self) -> bool {
        self.suppressed_groups > 0
    }
}

/// Outcome counts for a report.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunCountsJson {
    /// The total number of records in the report.
    pub total: usize,
    /// Records that passed.
    pub passed: usize,
    /// Records that failed.
    pub failed: usize,
    /// Records that errored.
    pub errored: usize,
    /// Records that were skipped.
    pub skipped: usize,
}

/// A group of failures believed to share a root cause.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureGroupJson {
    /// The number of failures in this group.
    pub size: usize,

    /// The category shared by every member.
    pub category: FailureCategory,

    /// The representative's exception kind. Empty if unknown.
    pub exception_kind: String,

    /// The representative's full, untruncated message.
    pub message: String,

    /// The representative's location, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationJson>,

    /// Identifiers of all members, in the order they appeared in the report.
    pub members: Vec<String>,
}

/// A source location.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LocationJson {
    /// The file, as recorded in the report.
    pub file: String,

    /// The 1-based line number, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Hints about a report, printed with `--hints`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HintsJson {
    /// The failing test that took the longest, and its duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slowest_failure: Option<SlowestFailureJson>,

    /// Failing tests whose output mentions flakiness.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possibly_flaky: Vec<String>,

    /// The start of the captured output of the first failing test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_excerpt: Option<FailureExcerptJson>,

    /// The summed duration of all tests, in seconds. Only set if nothing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_secs: Option<f64>,
}

/// The first lines of captured output from the first failing test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureExcerptJson {
    /// The test's identifier.
    pub id: String,

    /// Up to three lines of captured output. Empty if the test captured nothing.
    pub lines: Vec<String>,
}

/// The slowest failing test in a report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SlowestFailureJson {
    /// The test's identifier.
    pub id: String,

    /// The test's duration in seconds.
    pub duration_secs: f64,
}
