// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `ci-triage` failures.
///
/// A report in which every test failed is still a successful run of `ci-triage`: the exit code
/// only describes whether a summary could be produced.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TriageExitCode {}

impl TriageExitCode {
    /// A summary was rendered. This says nothing about the test outcomes in the report.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up a `ci-triage` invocation, for example an invalid
    /// configuration value or an unreadable config file.
    pub const SETUP_ERROR: i32 = 96;

    /// The report file or standard input could not be read.
    pub const REPORT_READ_FAILED: i32 = 103;

    /// The report could not be parsed as JSON, or its shape is not a report.
    pub const MALFORMED_REPORT: i32 = 104;

    /// The report parsed, but a record is missing a required field or is otherwise invalid.
    pub const REPORT_SCHEMA_ERROR: i32 = 105;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
