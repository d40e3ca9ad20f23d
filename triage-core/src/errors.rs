// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by ci-triage.
//!
//! Only loading a report and resolving configuration can fail. Classification, grouping and
//! rendering are total over a loaded report.

use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// An error that occurred while loading a report.
#[derive(Debug, Error)]
pub enum ReportLoadError {
    /// The report could not be parsed.
    #[error(transparent)]
    Malformed(#[from] MalformedReportError),

    /// The report parsed, but a record in it is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// The report is not valid JSON, or it does not have the shape of a report.
#[derive(Debug, Error)]
#[error("failed to parse report at `{path}`")]
pub struct MalformedReportError {
    path: String,
    #[source]
    error: serde_json::Error,
}

impl MalformedReportError {
    pub(crate) fn new(path: impl Into<String>, error: serde_json::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }

    pub(crate) fn from_path_error(error: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = error.path().to_string();
        Self::new(path, error.into_inner())
    }

    /// Returns the JSON path at which parsing failed, e.g. `tests[3].duration`.
    ///
    /// The root of the document is `.`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the 1-based line at which parsing failed.
    pub fn line(&self) -> usize {
        self.error.line()
    }

    /// Returns the 1-based column at which parsing failed.
    pub fn column(&self) -> usize {
        self.error.column()
    }
}

/// A record in the report is missing a required field or is otherwise invalid.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid record {section}[{index}]{}: {kind}", DisplayRecordId(.id.as_deref()))]
pub struct SchemaError {
    section: RecordSection,
    index: usize,
    id: Option<String>,
    kind: SchemaErrorKind,
}

impl SchemaError {
    pub(crate) fn new(
        section: RecordSection,
        index: usize,
        id: Option<String>,
        kind: SchemaErrorKind,
    ) -> Self {
        Self {
            section,
            index,
            id,
            kind,
        }
    }

    /// Returns the section of the report the invalid record is in.
    pub fn section(&self) -> RecordSection {
        self.section
    }

    /// Returns the 0-based index of the invalid record within its section.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the identifier of the invalid record, if it has one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns what is wrong with the record.
    pub fn kind(&self) -> &SchemaErrorKind {
        &self.kind
    }
}

struct DisplayRecordId<'a>(Option<&'a str>);

impl fmt::Display for DisplayRecordId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, " (`{id}`)"),
            None => Ok(()),
        }
    }
}

/// The section of a report a record was read from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordSection {
    /// The `collectors` array.
    Collectors,

    /// The `tests` array.
    Tests,
}

impl fmt::Display for RecordSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collectors => f.write_str("collectors"),
            Self::Tests => f.write_str("tests"),
        }
    }
}

/// What is wrong with a record, as part of a [`SchemaError`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum SchemaErrorKind {
    /// A required field is absent or null.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The outcome is not one that ci-triage knows about.
    #[error(
        "unknown outcome `{0}` (known outcomes: passed, failed, error, skipped, xfailed, xpassed)"
    )]
    UnknownOutcome(String),

    /// Another record earlier in the report has the same identifier.
    #[error("identifier is not unique within the report")]
    DuplicateId,
}

/// An error that occurred while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file at `{path}`")]
    Read {
        /// The path that failed to be read.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The config file is not valid TOML, or a value has the wrong type.
    #[error("failed to parse config file at `{path}`")]
    Parse {
        /// The path that failed to parse.
        path: Utf8PathBuf,

        /// The underlying TOML error.
        #[source]
        error: toml::de::Error,
    },

    /// A setting has a value outside its allowed range.
    #[error("invalid value for `{key}`: {value} ({reason})")]
    InvalidValue {
        /// The setting, in config-file spelling.
        key: &'static str,

        /// The rejected value.
        value: String,

        /// The allowed range.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display() {
        let error = SchemaError::new(
            RecordSection::Tests,
            3,
            Some("tests/test_a.py::test_b".to_owned()),
            SchemaErrorKind::MissingField("outcome"),
        );
        assert_eq!(
            error.to_string(),
            "invalid record tests[3] (`tests/test_a.py::test_b`): missing required field `outcome`"
        );

        let error = SchemaError::new(
            RecordSection::Collectors,
            0,
            None,
            SchemaErrorKind::MissingField("nodeid"),
        );
        assert_eq!(
            error.to_string(),
            "invalid record collectors[0]: missing required field `nodeid`"
        );
    }
}
