// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "group" if `count` is 1, otherwise "groups".
    pub(crate) fn groups_str(count: usize) -> &'static str {
        if count == 1 { "group" } else { "groups" }
    }
}

/// The marker appended to text that was cut short.
pub(crate) const ELLIPSIS: &str = "...";

/// Collapses every run of whitespace (including newlines) into a single space and trims the ends.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Keeps at most `max_chars` characters of `s`, appending [`ELLIPSIS`] if anything was removed.
///
/// Counts `char`s rather than bytes so that multi-byte text is never split mid-character.
pub(crate) fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_owned(),
        Some((end, _)) => {
            let mut out = s[..end].trim_end().to_owned();
            out.push_str(ELLIPSIS);
            out
        }
    }
}
