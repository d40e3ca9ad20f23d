// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading test reports.
//!
//! The loader understands the JSON document produced by `pytest --json-report`. Only a small part
//! of that document matters here:
//!
//! * `tests`: one entry per test, with a `nodeid`, an `outcome`, and optional `setup`, `call`
//!   and `teardown` phases that carry crash information.
//! * `collectors`: one entry per collected node. Failed collectors represent modules that could
//!   not be imported, and are loaded as errored records.
//!
//! Everything else in the document is ignored, so producers are free to add metadata.

use crate::errors::{
    MalformedReportError, RecordSection, ReportLoadError, SchemaError, SchemaErrorKind,
};
use camino::Utf8PathBuf;
use serde::{
    Deserialize, Deserializer,
    de::{MapAccess, Visitor, value::MapAccessDeserializer},
};
use std::{collections::HashSet, fmt, time::Duration};
use tracing::debug;

/// The outcome of a single test execution.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// The test passed.
    Passed,

    /// The test body failed. Unexpected passes (`xpassed`) are counted here, since an `xfail`
    /// marker that no longer fails needs attention.
    Failed,

    /// The test could not run properly: a fixture or collection error.
    Errored,

    /// The test was skipped. Expected failures (`xfailed`) are counted here.
    Skipped,
}

impl Outcome {
    /// Parses an outcome as written in a report.
    ///
    /// Returns `None` for unrecognized outcomes.
    pub fn from_report_str(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(Self::Passed),
            "failed" | "xpassed" => Some(Self::Failed),
            "error" | "errored" => Some(Self::Errored),
            "skipped" | "xfailed" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns true if this outcome represents a failure that should be classified.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }
}

/// The stage of a test's lifecycle in which a failure happened.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Importing and collecting the test module.
    Collect,

    /// Running fixtures before the test body.
    Setup,

    /// Running the test body.
    Call,

    /// Running fixture finalizers after the test body.
    Teardown,
}

impl Phase {
    /// Returns the name of this phase as used in pytest reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Setup => "setup",
            Self::Call => "call",
            Self::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location in source code.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Location {
    /// The file, as recorded in the report.
    pub file: Utf8PathBuf,

    /// The 1-based line number, if known.
    pub line: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.file),
            None => write!(f, "{}", self.file),
        }
    }
}

/// Information about why a test failed, as recorded in the report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailurePayload {
    /// The phase that failed.
    pub phase: Phase,

    /// The exception type, e.g. `AssertionError` or `requests.exceptions.ReadTimeout`.
    pub exception_kind: Option<String>,

    /// The failure message with the exception kind removed. May span several lines.
    pub message: String,

    /// Where the failure was raised, if known.
    pub location: Option<Location>,
}

impl FailurePayload {
    fn from_raw_message(phase: Phase, raw: &str, location: Option<Location>) -> Self {
        let (exception_kind, message) = split_exception_kind(raw);
        Self {
            phase,
            exception_kind,
            message,
            location,
        }
    }
}

/// One observed test execution.
#[derive(Clone, Debug, PartialEq)]
pub struct TestRecord {
    /// The test's identifier, unique within a report.
    pub id: String,

    /// The test's outcome.
    pub outcome: Outcome,

    /// How long the test took.
    pub duration: Duration,

    /// Why the test failed. Only ever set for failed and errored records, and even then it may
    /// be missing if the report carries no details.
    pub failure: Option<FailurePayload>,

    /// Output captured while the test ran. Empty if the report does not include it.
    pub captured_output: String,
}

/// Loads test records from a JSON report, in the order they appear in the report.
///
/// Records from failed collectors come first, followed by records from `tests`.
pub fn load_report(input: &[u8]) -> Result<Vec<TestRecord>, ReportLoadError> {
    let mut deserializer = serde_json::Deserializer::from_slice(input);
    let ReportObject(raw) = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(MalformedReportError::from_path_error)?;
    // Reject trailing data after the top-level value.
    deserializer
        .end()
        .map_err(|error| MalformedReportError::new(".", error))?;

    let mut records = Vec::with_capacity(raw.collectors.len() + raw.tests.len());
    let mut seen_ids = HashSet::new();

    for (index, collector) in raw.collectors.into_iter().enumerate() {
        if let Some(record) = collector.into_record(index)? {
            push_unique(&mut records, &mut seen_ids, RecordSection::Collectors, index, record)?;
        }
    }
    let collector_count = records.len();

    for (index, test) in raw.tests.into_iter().enumerate() {
        let record = test.into_record(index)?;
        push_unique(&mut records, &mut seen_ids, RecordSection::Tests, index, record)?;
    }

    debug!(
        "loaded {} records ({} from failed collectors)",
        records.len(),
        collector_count,
    );
    Ok(records)
}

fn push_unique(
    records: &mut Vec<TestRecord>,
    seen_ids: &mut HashSet<String>,
    section: RecordSection,
    index: usize,
    record: TestRecord,
) -> Result<(), SchemaError> {
    if !seen_ids.insert(record.id.clone()) {
        return Err(SchemaError::new(
            section,
            index,
            Some(record.id),
            SchemaErrorKind::DuplicateId,
        ));
    }
    records.push(record);
    Ok(())
}

/// Splits `Kind: message` into its parts.
///
/// The kind must be a (possibly dotted) identifier on the first line, so messages that merely
/// contain a colon, like `assert x == {'a': 1}`, are left whole.
fn split_exception_kind(raw: &str) -> (Option<String>, String) {
    let raw = raw.trim();
    if let Some((kind, rest)) = raw.split_once(": ")
        && is_exception_kind(kind)
    {
        return (Some(kind.to_owned()), rest.trim().to_owned());
    }
    (None, raw.to_owned())
}

fn is_exception_kind(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Extracts the failure line from a pytest `longrepr`.
///
/// pytest prefixes the lines describing the raised exception with `E`. The first such line names
/// the exception and later ones continue its message, so only the first is used. If there is no
/// `E` line, the last non-empty line is the best guess.
fn longrepr_message(longrepr: &str) -> Option<&str> {
    let mut last_non_empty = None;
    for line in longrepr.lines() {
        if let Some(rest) = line.strip_prefix('E')
            && (rest.is_empty() || rest.starts_with(char::is_whitespace))
            && !rest.trim().is_empty()
        {
            return Some(rest.trim());
        }
        if !line.trim().is_empty() {
            last_non_empty = Some(line.trim());
        }
    }
    last_non_empty
}

fn secs_to_duration(secs: f64) -> Duration {
    // Clock skew in the producer can yield tiny negative durations.
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// A [`RawReport`] that must be written as a JSON object.
///
/// Derived struct deserializers also accept sequences, which would let `[]` load as an empty
/// report.
struct ReportObject(RawReport);

impl<'de> Deserialize<'de> for ReportObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;

        impl<'de> Visitor<'de> for V {
            type Value = ReportObject;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a JSON object")
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                RawReport::deserialize(MapAccessDeserializer::new(map)).map(ReportObject)
            }
        }

        deserializer.deserialize_map(V)
    }
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    collectors: Vec<RawCollector>,
    #[serde(default)]
    tests: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
struct RawCollector {
    nodeid: Option<String>,
    outcome: Option<String>,
    longrepr: Option<String>,
}

impl RawCollector {
    /// Returns a record if this collector failed, and `None` otherwise.
    fn into_record(self, index: usize) -> Result<Option<TestRecord>, SchemaError> {
        let section = RecordSection::Collectors;
        let Some(id) = self.nodeid else {
            return Err(SchemaError::new(
                section,
                index,
                None,
                SchemaErrorKind::MissingField("nodeid"),
            ));
        };
        let Some(outcome) = self.outcome else {
            return Err(SchemaError::new(
                section,
                index,
                Some(id),
                SchemaErrorKind::MissingField("outcome"),
            ));
        };
        match Outcome::from_report_str(&outcome) {
            Some(outcome) if outcome.is_failure() => {}
            Some(_) => return Ok(None),
            None => {
                return Err(SchemaError::new(
                    section,
                    index,
                    Some(id),
                    SchemaErrorKind::UnknownOutcome(outcome),
                ));
            }
        }

        // A collector's node ID is the path of the module that failed to import.
        let location = (!id.is_empty()).then(|| Location {
            file: Utf8PathBuf::from(id.split("::").next().unwrap_or_default()),
            line: None,
        });
        let raw_message = self
            .longrepr
            .as_deref()
            .and_then(longrepr_message)
            .unwrap_or_default();
        let failure = FailurePayload::from_raw_message(Phase::Collect, raw_message, location);

        Ok(Some(TestRecord {
            id,
            outcome: Outcome::Errored,
            duration: Duration::ZERO,
            failure: Some(failure),
            captured_output: String::new(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RawTest {
    nodeid: Option<String>,
    outcome: Option<String>,
    duration: Option<f64>,
    captured_output: Option<String>,
    setup: Option<RawPhase>,
    call: Option<RawPhase>,
    teardown: Option<RawPhase>,
}

impl RawTest {
    fn into_record(self, index: usize) -> Result<TestRecord, SchemaError> {
        let section = RecordSection::Tests;
        let Some(id) = self.nodeid else {
            return Err(SchemaError::new(
                section,
                index,
                None,
                SchemaErrorKind::MissingField("nodeid"),
            ));
        };
        let Some(outcome_str) = self.outcome else {
            return Err(SchemaError::new(
                section,
                index,
                Some(id),
                SchemaErrorKind::MissingField("outcome"),
            ));
        };
        let Some(outcome) = Outcome::from_report_str(&outcome_str) else {
            return Err(SchemaError::new(
                section,
                index,
                Some(id),
                SchemaErrorKind::UnknownOutcome(outcome_str),
            ));
        };

        let phases = [
            (Phase::Setup, self.setup.as_ref()),
            (Phase::Call, self.call.as_ref()),
            (Phase::Teardown, self.teardown.as_ref()),
        ];

        let duration = match self.duration {
            Some(secs) => secs_to_duration(secs),
            None => phases
                .iter()
                .filter_map(|(_, phase)| phase.and_then(|phase| phase.duration))
                .map(secs_to_duration)
                .fold(Duration::ZERO, Duration::saturating_add),
        };

        let captured_output = self.captured_output.unwrap_or_default();
        let failure = if outcome.is_failure() {
            let failure = failure_from_phases(&phases).or_else(|| {
                // Reports without phase details may still carry the failure text in the
                // captured output.
                captured_output
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(|line| FailurePayload::from_raw_message(Phase::Call, line, None))
            });
            if failure.is_none() {
                debug!("no failure details recorded for `{id}`");
            }
            failure
        } else {
            None
        };

        Ok(TestRecord {
            id,
            outcome,
            duration,
            failure,
            captured_output,
        })
    }
}

fn failure_from_phases(phases: &[(Phase, Option<&RawPhase>)]) -> Option<FailurePayload> {
    let (phase, raw) = phases.iter().find_map(|(phase, raw)| {
        raw.filter(|raw| raw.outcome.as_deref() == Some("failed"))
            .map(|raw| (*phase, raw))
    })?;

    if let Some(crash) = &raw.crash {
        let location = crash.path.as_ref().map(|path| Location {
            file: Utf8PathBuf::from(path),
            line: crash.lineno,
        });
        let raw_message = match crash.message.as_deref() {
            Some(message) => message,
            None => raw
                .longrepr
                .as_deref()
                .and_then(longrepr_message)
                .unwrap_or_default(),
        };
        return Some(FailurePayload::from_raw_message(phase, raw_message, location));
    }

    let raw_message = raw
        .longrepr
        .as_deref()
        .and_then(longrepr_message)
        .unwrap_or_default();
    Some(FailurePayload::from_raw_message(phase, raw_message, None))
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    outcome: Option<String>,
    duration: Option<f64>,
    crash: Option<RawCrash>,
    longrepr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCrash {
    path: Option<String>,
    lineno: Option<u32>,
    message: Option<String>,
}
