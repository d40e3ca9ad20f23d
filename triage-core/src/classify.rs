// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifying failures into categories.
//!
//! Classification is a fixed, ordered rule table: rules are evaluated top to bottom and the first
//! match wins. Grouping only ever merges failures of the same category, so changing the order of
//! the rules changes grouping results.

use crate::report::{Location, Phase, TestRecord};
use regex::Regex;
use std::sync::LazyLock;
use triage_metadata::FailureCategory;

/// A failed or errored test, with its failure normalized into a category.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedFailure {
    /// The identifier of the failing test.
    pub id: String,

    /// The category assigned by the rule table.
    pub category: FailureCategory,

    /// The exception kind. Empty if the report did not record one.
    pub exception_kind: String,

    /// The failure message. Empty if the report did not record one.
    pub message: String,

    /// Where the failure was raised, if known.
    pub location: Option<Location>,
}

/// Classifies a single record.
///
/// Returns `None` for passed and skipped records, which only contribute to counts.
pub fn classify(record: &TestRecord) -> Option<ClassifiedFailure> {
    if !record.outcome.is_failure() {
        return None;
    }

    let failure = match &record.failure {
        Some(payload) => {
            let exception_kind = payload.exception_kind.clone().unwrap_or_default();
            let category = categorize(Some(payload.phase), &exception_kind, &payload.message);
            ClassifiedFailure {
                id: record.id.clone(),
                category,
                exception_kind,
                message: payload.message.clone(),
                location: payload.location.clone(),
            }
        }
        None => ClassifiedFailure {
            id: record.id.clone(),
            category: FailureCategory::Unknown,
            exception_kind: String::new(),
            message: String::new(),
            location: None,
        },
    };
    Some(failure)
}

/// Classifies every failed or errored record, preserving record order.
pub fn classify_all(records: &[TestRecord]) -> Vec<ClassifiedFailure> {
    records.iter().filter_map(classify).collect()
}

/// Returns the category of the first rule that matches.
pub fn categorize(phase: Option<Phase>, exception_kind: &str, message: &str) -> FailureCategory {
    let facts = FailureFacts {
        phase,
        exception_kind,
        // Only the last path segment matters: `_pytest.nodes.Collector.CollectError` and
        // `CollectError` are the same kind.
        kind_name: exception_kind.rsplit('.').next().unwrap_or_default(),
        message: message.trim(),
    };

    CLASSIFY_RULES
        .iter()
        .find(|rule| (rule.matches)(&facts))
        .map_or(FailureCategory::Unknown, |rule| rule.category)
}

struct FailureFacts<'a> {
    phase: Option<Phase>,
    exception_kind: &'a str,
    kind_name: &'a str,
    message: &'a str,
}

struct ClassifyRule {
    category: FailureCategory,
    matches: fn(&FailureFacts<'_>) -> bool,
}

/// The rule table, in priority order.
static CLASSIFY_RULES: &[ClassifyRule] = &[
    ClassifyRule {
        category: FailureCategory::CollectionError,
        matches: |facts| facts.phase == Some(Phase::Collect) || facts.kind_name == "CollectError",
    },
    ClassifyRule {
        category: FailureCategory::Timeout,
        matches: |facts| {
            facts.exception_kind.contains("Timeout")
                || starts_with_ignore_ascii_case(facts.message, "timeout")
        },
    },
    ClassifyRule {
        category: FailureCategory::FixtureError,
        matches: |facts| {
            matches!(facts.phase, Some(Phase::Setup | Phase::Teardown))
                || FIXTURE_NOT_FOUND.is_match(facts.message)
        },
    },
    ClassifyRule {
        category: FailureCategory::AssertionFailure,
        matches: |facts| {
            facts.kind_name == "AssertionError"
                || facts.message.starts_with("assert ")
                || EXPECTED_GOT.is_match(facts.message)
        },
    },
];

static FIXTURE_NOT_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfixture '[^']+' not found").expect("regex is valid"));

static EXPECTED_GOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bexpected\b.*\b(got|but|actual)\b").expect("regex is valid")
});

fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|start| start.eq_ignore_ascii_case(prefix))
}
