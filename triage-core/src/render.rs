// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering a summary as text.
//!
//! The output is a header line with outcome counts, one line per displayed group, and a trailing
//! line for groups that did not fit within the display limit:
//!
//! ```text
//! total=7 passed=5 failed=2 errored=0 skipped=0
//! size=2 category=assertion-failure AssertionError: expected 1 got 2 [tests/test_x.py:12]
//! ... 3 more groups not shown
//! ```

use crate::{
    group::FailureGroup,
    helpers::{collapse_whitespace, plural, truncate_with_ellipsis},
    summary::{Hints, Summary},
    write_str::WriteStr,
};
use owo_colors::{OwoColorize, Style};
use std::io;

/// Printed instead of group lines when nothing failed.
pub const NO_FAILURES: &str = "no failures";

/// Printed in place of a location when the report did not record one.
pub const UNKNOWN_LOCATION: &str = "[unknown location]";

/// Printed in place of a description when a failure has neither a kind nor a message.
pub const NO_MESSAGE: &str = "<no message>";

/// Renders a [`Summary`] as human-readable text.
#[derive(Clone, Debug)]
pub struct SummaryRenderer<'a> {
    summary: &'a Summary,
    message_truncate_length: usize,
}

impl<'a> SummaryRenderer<'a> {
    /// Creates a new renderer. Descriptions longer than `message_truncate_length` characters are
    /// truncated.
    pub fn new(summary: &'a Summary, message_truncate_length: usize) -> Self {
        Self {
            summary,
            message_truncate_length,
        }
    }

    /// Writes the summary in human-readable form.
    ///
    /// With `colorize` false the output is plain text.
    pub fn write_human(&self, writer: &mut dyn WriteStr, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }

        self.write_header(writer, &styles)?;

        if self.summary.groups().is_empty() {
            writeln!(writer, "{}", NO_FAILURES.style(styles.pass))?;
        } else {
            for group in self.summary.displayed_groups() {
                self.write_group(group, writer, &styles)?;
            }

            let suppressed = self.summary.suppressed_count();
            if suppressed > 0 {
                let line = format!(
                    "... {suppressed} more {} not shown",
                    plural::groups_str(suppressed)
                );
                writeln!(writer, "{}", line.style(styles.suppressed))?;
            }
        }

        if let Some(hints) = self.summary.hints() {
            write_hints(hints, writer, &styles)?;
        }

        writer.write_str_flush()
    }

    /// Renders the summary as plain text.
    pub fn to_human_string(&self) -> String {
        let mut out = String::new();
        self.write_human(&mut out, false)
            .expect("writing to a String is infallible");
        out
    }

    fn write_header(&self, writer: &mut dyn WriteStr, styles: &Styles) -> io::Result<()> {
        let counts = self.summary.counts();
        let nonzero = |count: usize, style: Style| {
            if count > 0 { style } else { Style::new() }
        };

        writeln!(
            writer,
            "total={} passed={} failed={} errored={} skipped={}",
            counts.total.style(styles.count),
            counts.passed.style(nonzero(counts.passed, styles.pass)),
            counts.failed.style(nonzero(counts.failed, styles.fail)),
            counts.errored.style(nonzero(counts.errored, styles.fail)),
            counts.skipped.style(nonzero(counts.skipped, styles.skip)),
        )
    }

    fn write_group(
        &self,
        group: &FailureGroup,
        writer: &mut dyn WriteStr,
        styles: &Styles,
    ) -> io::Result<()> {
        let representative = group.representative();
        let description = describe(
            &representative.exception_kind,
            &representative.message,
            self.message_truncate_length,
        );

        write!(
            writer,
            "size={} category={} {} ",
            group.size().style(styles.count),
            representative.category.style(styles.category),
            description,
        )?;
        let location = match &representative.location {
            Some(location) => format!("[{location}]"),
            None => UNKNOWN_LOCATION.to_owned(),
        };
        writeln!(writer, "{}", location.style(styles.location))
    }
}

fn write_hints(hints: &Hints, writer: &mut dyn WriteStr, styles: &Styles) -> io::Result<()> {
    if let Some((id, duration)) = &hints.slowest_failure {
        writeln!(
            writer,
            "{} {} ({:.2}s)",
            "slowest failure:".style(styles.hint),
            id,
            duration.as_secs_f64(),
        )?;
    }
    if !hints.possibly_flaky.is_empty() {
        writeln!(
            writer,
            "{} {}",
            "possible flakiness:".style(styles.hint),
            hints.possibly_flaky.join(", "),
        )?;
    }
    if let Some(excerpt) = &hints.failure_excerpt {
        if excerpt.lines.is_empty() {
            writeln!(
                writer,
                "{} {}",
                "no captured output for first failure:".style(styles.hint),
                excerpt.id,
            )?;
        } else {
            writeln!(
                writer,
                "{} {} (first {} lines)",
                "output of first failure:".style(styles.hint),
                excerpt.id,
                Hints::EXCERPT_LINES,
            )?;
            for line in &excerpt.lines {
                writeln!(writer, "  > {line}")?;
            }
        }
    }
    if let Some(duration) = hints.total_duration {
        writeln!(
            writer,
            "{} {:.2}s",
            "total duration:".style(styles.hint),
            duration.as_secs_f64(),
        )?;
    }
    Ok(())
}

/// Builds the one-line `Kind: message` description of a failure.
fn describe(exception_kind: &str, message: &str, max_chars: usize) -> String {
    let exception_kind = exception_kind.trim();
    let message = collapse_whitespace(message);
    let description = match (exception_kind.is_empty(), message.is_empty()) {
        (false, false) => format!("{exception_kind}: {message}"),
        (false, true) => exception_kind.to_owned(),
        (true, false) => message,
        (true, true) => return NO_MESSAGE.to_owned(),
    };
    truncate_with_ellipsis(&description, max_chars)
}

#[derive(Clone, Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    category: Style,
    location: Style,
    suppressed: Style,
    hint: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().bold().green();
        self.fail = Style::new().bold().red();
        self.skip = Style::new().bold().yellow();
        self.category = Style::new().bold().magenta();
        self.location = Style::new().cyan();
        self.suppressed = Style::new().dimmed();
        self.hint = Style::new().bold().yellow();
    }
}
