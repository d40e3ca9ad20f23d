// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use owo_colors::OwoColorize;
use std::{error::Error, fmt, io};
use thiserror::Error;
use tracing::error;
use triage_core::errors::{ConfigError, MalformedReportError, ReportLoadError, SchemaError};
use triage_metadata::TriageExitCode;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Where a report was read from.
#[derive(Clone, Debug, Eq, PartialEq)]
#[doc(hidden)]
pub enum ReportSource {
    Stdin,
    Path(String),
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("<stdin>"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that stops ci-triage from producing a summary.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config error")]
    ConfigError {
        #[from]
        err: ConfigError,
    },
    #[error("failed to read report")]
    ReportReadError {
        source_name: ReportSource,
        #[source]
        err: io::Error,
    },
    #[error("malformed report")]
    MalformedReport {
        source_name: ReportSource,
        #[source]
        err: MalformedReportError,
    },
    #[error("report schema error")]
    ReportSchemaError {
        source_name: ReportSource,
        #[source]
        err: SchemaError,
    },
    #[error("failed to write output")]
    WriteOutputError {
        #[source]
        err: io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn report_read_error(source_name: ReportSource, err: io::Error) -> Self {
        Self::ReportReadError { source_name, err }
    }

    pub(crate) fn report_load_error(source_name: ReportSource, err: ReportLoadError) -> Self {
        match err {
            ReportLoadError::Malformed(err) => Self::MalformedReport { source_name, err },
            ReportLoadError::Schema(err) => Self::ReportSchemaError { source_name, err },
        }
    }

    pub(crate) fn write_output_error(err: io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigError { .. } => TriageExitCode::SETUP_ERROR,
            Self::ReportReadError { .. } => TriageExitCode::REPORT_READ_FAILED,
            Self::MalformedReport { .. } => TriageExitCode::MALFORMED_REPORT,
            Self::ReportSchemaError { .. } => TriageExitCode::REPORT_SCHEMA_ERROR,
            Self::WriteOutputError { .. } => TriageExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ConfigError { err } => {
                error!("{err}");
                err.source()
            }
            Self::ReportReadError { source_name, err } => {
                error!("failed to read report from {}", source_name.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::MalformedReport { source_name, err } => {
                // The underlying JSON error carries the line and column.
                error!(
                    "failed to parse report {} at `{}`",
                    source_name.style(styles.bold),
                    err.path(),
                );
                err.source()
            }
            Self::ReportSchemaError { source_name, err } => {
                error!("in report {}, {err}", source_name.style(styles.bold));
                None
            }
            Self::WriteOutputError { err } => {
                error!("failed to write summary to stdout");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
