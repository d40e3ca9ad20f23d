// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Grouping failures that likely share a root cause.
//!
//! Grouping is greedy and depends on input order. Each failure is compared against the
//! representative of every existing group, in the order the groups were created, and joins the
//! first group it is similar to. If there is none, it starts a new group and becomes that
//! group's representative.
//!
//! Two failures are similar if they have the same category and their normalized messages either
//! overlap enough (Jaccard index of their token sets at or above a threshold) or one is a prefix
//! of the other.
//!
//! Feeding the same failures in a different order can produce different groups. Feeding them in
//! the same order always produces the same groups.

use crate::classify::ClassifiedFailure;
use std::collections::BTreeSet;
use tracing::debug;

/// The similarity threshold used if none is configured.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// The token that every all-digit token is replaced with during normalization.
pub const NUMBER_PLACEHOLDER: &str = "#";

/// A set of failures believed to share a root cause.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailureGroup {
    representative: ClassifiedFailure,
    members: Vec<String>,
}

impl FailureGroup {
    fn new(representative: ClassifiedFailure) -> Self {
        let members = vec![representative.id.clone()];
        Self {
            representative,
            members,
        }
    }

    /// Returns the failure that describes this group: the first one encountered.
    pub fn representative(&self) -> &ClassifiedFailure {
        &self.representative
    }

    /// Returns the identifiers of all failures in this group, in the order they were
    /// encountered. The representative is always first.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Returns the number of failures in this group. Always at least 1.
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// A failure message broken into comparable tokens.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NormalizedMessage {
    tokens: Vec<String>,
    token_set: BTreeSet<String>,
}

impl NormalizedMessage {
    /// Normalizes a message.
    ///
    /// The message is lower-cased and split on every character that is not alphanumeric. Tokens
    /// made up entirely of ASCII digits become [`NUMBER_PLACEHOLDER`], so `expected 1 got 2` and
    /// `expected 3 got 4` normalize identically.
    pub fn new(message: &str) -> Self {
        let tokens: Vec<String> = message
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(|token| {
                if token.bytes().all(|b| b.is_ascii_digit()) {
                    NUMBER_PLACEHOLDER.to_owned()
                } else {
                    token.to_owned()
                }
            })
            .collect();
        let token_set = tokens.iter().cloned().collect();
        Self { tokens, token_set }
    }

    /// Returns the tokens in message order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns the Jaccard index of the two token sets, in `[0, 1]`.
    ///
    /// Two empty messages have an index of 1.
    pub fn jaccard(&self, other: &Self) -> f64 {
        let union = self.token_set.union(&other.token_set).count();
        if union == 0 {
            return 1.0;
        }
        let intersection = self.token_set.intersection(&other.token_set).count();
        intersection as f64 / union as f64
    }

    /// Returns true if the shorter token sequence is a non-empty prefix of the longer one.
    pub fn is_prefix_related(&self, other: &Self) -> bool {
        let (shorter, longer) = if self.tokens.len() <= other.tokens.len() {
            (&self.tokens, &other.tokens)
        } else {
            (&other.tokens, &self.tokens)
        };
        !shorter.is_empty() && longer.starts_with(shorter)
    }

    /// Returns true if the two messages are similar under `threshold`.
    pub fn is_similar(&self, other: &Self, threshold: f64) -> bool {
        self.jaccard(other) >= threshold || self.is_prefix_related(other)
    }
}

/// Partitions failures into groups.
///
/// Every failure ends up in exactly one group. Groups are returned in creation order, which is
/// the order in which their representatives appear in `failures`.
pub fn group_failures(
    failures: impl IntoIterator<Item = ClassifiedFailure>,
    similarity_threshold: f64,
) -> Vec<FailureGroup> {
    let mut groups: Vec<FailureGroup> = Vec::new();
    // Representatives never change, so their normalized messages are computed once.
    let mut normalized_reps: Vec<NormalizedMessage> = Vec::new();

    for failure in failures {
        let normalized = NormalizedMessage::new(&failure.message);
        let matching = groups
            .iter()
            .zip(&normalized_reps)
            .position(|(group, rep)| {
                group.representative.category == failure.category
                    && rep.is_similar(&normalized, similarity_threshold)
            });

        match matching {
            Some(index) => {
                debug!(
                    "`{}` joins group of `{}`",
                    failure.id, groups[index].representative.id,
                );
                groups[index].members.push(failure.id);
            }
            None => {
                groups.push(FailureGroup::new(failure));
                normalized_reps.push(normalized);
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use test_case::test_case;
    use test_strategy::proptest;
    use triage_metadata::FailureCategory;

    fn failure(id: &str, category: FailureCategory, message: &str) -> ClassifiedFailure {
        ClassifiedFailure {
            id: id.to_owned(),
            category,
            exception_kind: String::new(),
            message: message.to_owned(),
            location: None,
        }
    }

    fn member_ids(groups: &[FailureGroup]) -> Vec<Vec<&str>> {
        groups
            .iter()
            .map(|group| group.members().iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn normalization() {
        let normalized = NormalizedMessage::new("KeyError: 'user_42' not in {'a': 17}");
        assert_eq!(
            normalized.tokens(),
            ["keyerror", "user", "#", "not", "in", "a", "#"]
        );
    }

    #[test]
    fn normalization_tokens() {
        assert_eq!(
            NormalizedMessage::new("Expected 1.5 GOT  x-ray\n").tokens(),
            ["expected", "#", "#", "got", "x", "ray"]
        );
        assert!(NormalizedMessage::new("  ::  ").tokens().is_empty());
    }

    #[test_case("expected 1 got 2", "expected 3 got 4", 1.0 ; "numbers differ")]
    #[test_case("a b c d", "a b x y", 2.0 / 6.0 ; "partial overlap")]
    #[test_case("a b", "c d", 0.0 ; "disjoint")]
    #[test_case("", "", 1.0 ; "both empty")]
    #[test_case("", "a", 0.0 ; "one empty")]
    fn jaccard(a: &str, b: &str, expected: f64) {
        let a = NormalizedMessage::new(a);
        let b = NormalizedMessage::new(b);
        assert!((a.jaccard(&b) - expected).abs() < 1e-9);
        assert!((b.jaccard(&a) - expected).abs() < 1e-9);
    }

    #[test_case("connection reset", "connection reset by peer while reading", true ; "prefix")]
    #[test_case("connection reset by peer while reading", "connection reset", true ; "prefix reversed")]
    #[test_case("reset by peer", "connection reset by peer", false ; "not a prefix")]
    #[test_case("", "connection reset", false ; "empty is not a prefix")]
    fn prefix(a: &str, b: &str, expected: bool) {
        let a = NormalizedMessage::new(a);
        let b = NormalizedMessage::new(b);
        assert_eq!(a.is_prefix_related(&b), expected);
    }

    #[test]
    fn parameterized_messages_group_together() {
        let groups = group_failures(
            [
                failure("t1", FailureCategory::AssertionFailure, "expected 1 got 2"),
                failure("t2", FailureCategory::AssertionFailure, "expected 3 got 4"),
            ],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(member_ids(&groups), [vec!["t1", "t2"]]);
        assert_eq!(groups[0].size(), 2);
        assert_eq!(groups[0].representative().id, "t1");
    }

    #[test]
    fn categories_never_mix() {
        let groups = group_failures(
            [
                failure("t1", FailureCategory::AssertionFailure, "boom"),
                failure("t2", FailureCategory::Unknown, "boom"),
            ],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(member_ids(&groups), [vec!["t1"], vec!["t2"]]);
    }

    #[test]
    fn long_messages_with_a_shared_prefix_group_together() {
        // Jaccard is 2/8 here, but the first message is a prefix of the second.
        let groups = group_failures(
            [
                failure("t1", FailureCategory::Unknown, "connection reset"),
                failure(
                    "t2",
                    FailureCategory::Unknown,
                    "connection reset by remote peer while reading body",
                ),
            ],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(member_ids(&groups), [vec!["t1", "t2"]]);
    }

    #[test]
    fn first_matching_group_wins() {
        // t3 is similar to both t1 and t2, and t1's group was created first.
        let groups = group_failures(
            [
                failure("t1", FailureCategory::Unknown, "a b c"),
                failure("t2", FailureCategory::Unknown, "c d e"),
                failure("t3", FailureCategory::Unknown, "a b c d e"),
            ],
            0.5,
        );
        assert_eq!(member_ids(&groups), [vec!["t1", "t3"], vec!["t2"]]);
    }

    #[test]
    fn grouping_depends_on_order() {
        // "a b c d" joins whichever of "a b" and "c d" comes first.
        let forward = group_failures(
            [
                failure("ab", FailureCategory::Unknown, "a b"),
                failure("abcd", FailureCategory::Unknown, "a b c d"),
                failure("cd", FailureCategory::Unknown, "c d"),
            ],
            0.5,
        );
        assert_eq!(member_ids(&forward), [vec!["ab", "abcd"], vec!["cd"]]);

        let backward = group_failures(
            [
                failure("cd", FailureCategory::Unknown, "c d"),
                failure("abcd", FailureCategory::Unknown, "a b c d"),
                failure("ab", FailureCategory::Unknown, "a b"),
            ],
            0.5,
        );
        // "c d" vs "a b c d": Jaccard 2/4 = 0.5 meets the threshold, so abcd joins cd's group,
        // and "a b" vs "c d" shares nothing.
        assert_eq!(member_ids(&backward), [vec!["cd", "abcd"], vec!["ab"]]);
    }

    #[test]
    fn no_failures_no_groups() {
        assert!(group_failures(Vec::new(), DEFAULT_SIMILARITY_THRESHOLD).is_empty());
    }

    fn arb_failure() -> impl Strategy<Value = (FailureCategory, String)> {
        let category = prop_oneof![
            Just(FailureCategory::AssertionFailure),
            Just(FailureCategory::Timeout),
            Just(FailureCategory::Unknown),
        ];
        let message = prop::collection::vec(
            prop_oneof![
                Just("expected"),
                Just("got"),
                Just("1"),
                Just("42"),
                Just("timeout"),
                Just("db"),
            ],
            0..6,
        )
        .prop_map(|words| words.join(" "));
        (category, message)
    }

    #[proptest]
    fn groups_partition_failures(
        #[strategy(prop::collection::vec(arb_failure(), 0..40))]
        inputs: Vec<(FailureCategory, String)>,
        #[strategy(0.05f64..=1.0)] threshold: f64,
    ) {
        let failures: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(index, (category, message))| failure(&format!("t{index}"), *category, message))
            .collect();

        let groups = group_failures(failures.clone(), threshold);

        // Every failure is in exactly one group.
        let mut seen = BTreeMap::new();
        for (group_index, group) in groups.iter().enumerate() {
            prop_assert!(group.size() >= 1);
            prop_assert_eq!(&group.members()[0], &group.representative().id);
            for member in group.members() {
                prop_assert!(seen.insert(member.clone(), group_index).is_none());
            }
        }
        prop_assert_eq!(seen.len(), failures.len());
        let total: usize = groups.iter().map(FailureGroup::size).sum();
        prop_assert_eq!(total, failures.len());

        // Members share their representative's category.
        for group in &groups {
            for member in group.members() {
                let index: usize = member[1..].parse().unwrap();
                prop_assert_eq!(failures[index].category, group.representative().category);
            }
        }

        // Grouping the same sequence again gives the same result.
        prop_assert_eq!(group_failures(failures, threshold), groups);
    }
}
