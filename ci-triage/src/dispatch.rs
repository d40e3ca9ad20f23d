// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, ReportSource, Result},
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, ValueEnum};
use std::io::{self, Read};
use tracing::{debug, warn};
use triage_core::{
    analyze,
    config::{ConfigOverrides, TriageConfig},
    load_report,
    render::SummaryRenderer,
    write_str::WriteStr,
};
use triage_metadata::{RunSummaryJson, TriageExitCode};

/// Condense a pytest JSON report into a short summary of failures.
///
/// Failures are classified, grouped by likely root cause and printed largest group first. The
/// exit code is 0 whenever a summary was produced, regardless of how many tests failed.
#[derive(Debug, Parser)]
#[command(
    version,
    name = "ci-triage",
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct CiTriageApp {
    /// Path to the report, or `-` to read it from standard input
    #[arg(value_name = "REPORT")]
    report: String,

    #[command(flatten)]
    triage_opts: TriageOpts,

    /// Output format
    #[arg(
        long,
        value_enum,
        default_value_t,
        help_heading = "Output options",
        value_name = "FMT"
    )]
    message_format: MessageFormatOpts,

    #[command(flatten)]
    output: OutputOpts,
}

impl CiTriageApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let config = self.triage_opts.make_config()?;

        let source = ReportSource::from_arg(&self.report);
        let input = source.read()?;
        let records = load_report(&input)
            .map_err(|err| ExpectedError::report_load_error(source.clone(), err))?;
        if records.is_empty() {
            warn!("no tests were collected in report {source}");
        }

        let summary = analyze(&records, &config);
        debug!(
            "{} groups, {} suppressed",
            summary.groups().len(),
            summary.suppressed_count(),
        );

        let mut writer = output_writer.stdout_writer();
        match self.message_format {
            MessageFormatOpts::Human => {
                SummaryRenderer::new(&summary, config.message_truncate_length)
                    .write_human(&mut writer, output.colorize_stdout())
                    .map_err(ExpectedError::write_output_error)?;
            }
            MessageFormatOpts::Json => {
                write_json(&summary.to_json(), false, &mut writer)
                    .map_err(ExpectedError::write_output_error)?;
            }
            MessageFormatOpts::JsonPretty => {
                write_json(&summary.to_json(), true, &mut writer)
                    .map_err(ExpectedError::write_output_error)?;
            }
        }

        Ok(TriageExitCode::OK)
    }
}

fn write_json(json: &RunSummaryJson, pretty: bool, writer: &mut dyn WriteStr) -> io::Result<()> {
    let serialized = if pretty {
        serde_json::to_string_pretty(json)?
    } else {
        serde_json::to_string(json)?
    };
    writeln!(writer, "{serialized}")?;
    writer.write_str_flush()
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Triage options")]
struct TriageOpts {
    /// Maximum number of failure groups to print [default: 10]
    #[arg(long, value_name = "N", env = "CI_TRIAGE_DISPLAY_LIMIT")]
    display_limit: Option<usize>,

    /// Minimum token overlap, in (0, 1], for two messages to be grouped [default: 0.5]
    #[arg(long, value_name = "F", env = "CI_TRIAGE_SIMILARITY_THRESHOLD")]
    similarity_threshold: Option<f64>,

    /// Truncate representative messages to this many characters [default: 120]
    #[arg(long, value_name = "N", env = "CI_TRIAGE_MESSAGE_TRUNCATE_LENGTH")]
    message_truncate_length: Option<usize>,

    /// Show hints: the slowest failure, possible flakiness and the first failure's output
    #[arg(long, overrides_with = "no_hints")]
    hints: bool,

    /// Do not show hints, even if the config file enables them
    #[arg(long, overrides_with = "hints")]
    no_hints: bool,

    /// Config file; command-line values take priority over it
    #[arg(long, value_name = "PATH", env = "CI_TRIAGE_CONFIG_FILE")]
    config_file: Option<Utf8PathBuf>,
}

impl TriageOpts {
    fn make_config(&self) -> Result<TriageConfig> {
        Ok(TriageConfig::from_sources(
            self.config_file.as_deref(),
            &self.overrides(),
        )?)
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            display_limit: self.display_limit,
            similarity_threshold: self.similarity_threshold,
            message_truncate_length: self.message_truncate_length,
            // The two flags override each other, so at most one is set.
            hints: match (self.hints, self.no_hints) {
                (true, _) => Some(true),
                (false, true) => Some(false),
                (false, false) => None,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormatOpts {
    /// A human-readable summary.
    #[default]
    Human,
    /// JSON with no whitespace.
    Json,
    /// JSON, prettified.
    JsonPretty,
}

impl ReportSource {
    /// The argument that selects standard input.
    const STDIN_ARG: &'static str = "-";

    fn from_arg(arg: &str) -> Self {
        if arg == Self::STDIN_ARG {
            Self::Stdin
        } else {
            Self::Path(arg.to_owned())
        }
    }

    fn read(&self) -> Result<Vec<u8>> {
        debug!("reading report from {self}");
        let result = match self {
            Self::Stdin => {
                let mut buf = Vec::new();
                io::stdin().lock().read_to_end(&mut buf).map(|_| buf)
            }
            Self::Path(path) => std::fs::read(path),
        };
        result.map_err(|err| ExpectedError::report_read_error(self.clone(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Color;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use indoc::indoc;
    use test_case::test_case;

    static REPORT: &str = indoc! {r#"
        {
          "tests": [
            { "nodeid": "tests/test_x.py::test_ok", "outcome": "passed", "duration": 0.1 },
            {
              "nodeid": "tests/test_x.py::test_eq[1-2]",
              "outcome": "failed",
              "duration": 0.3,
              "call": {
                "outcome": "failed",
                "crash": {
                  "path": "tests/test_x.py",
                  "lineno": 12,
                  "message": "AssertionError: expected 1 got 2"
                }
              }
            },
            {
              "nodeid": "tests/test_x.py::test_eq[3-4]",
              "outcome": "failed",
              "duration": 1.25,
              "captured_output": "known flake: retried once",
              "call": {
                "outcome": "failed",
                "crash": {
                  "path": "tests/test_x.py",
                  "lineno": 12,
                  "message": "AssertionError: expected 3 got 4"
                }
              }
            }
          ]
        }
    "#};

    fn write_report(contents: &str) -> (Utf8TempDir, Utf8PathBuf) {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("report.json");
        std::fs::write(&path, contents).unwrap();
        (temp_dir, path)
    }

    fn run(args: &[&str]) -> Result<String> {
        let args = std::iter::once("ci-triage").chain(args.iter().copied());
        let app = CiTriageApp::try_parse_from(args).expect("arguments are valid");
        let output = OutputContext {
            color: Color::Never,
        };
        let mut output_writer = OutputWriter::Test { stdout: Vec::new() };
        let code = app.exec(output, &mut output_writer)?;
        assert_eq!(code, TriageExitCode::OK);

        let OutputWriter::Test { stdout } = output_writer else {
            unreachable!("test writer was used")
        };
        Ok(String::from_utf8(stdout).expect("output is UTF-8"))
    }

    #[test]
    fn human_output() {
        let (_temp_dir, path) = write_report(REPORT);
        let stdout = run(&[path.as_str(), "--hints"]).expect("triage succeeds");
        insta::assert_snapshot!(stdout, @r"
        total=3 passed=1 failed=2 errored=0 skipped=0
        size=2 category=assertion-failure AssertionError: expected 1 got 2 [tests/test_x.py:12]
        slowest failure: tests/test_x.py::test_eq[3-4] (1.25s)
        possible flakiness: tests/test_x.py::test_eq[3-4]
        no captured output for first failure: tests/test_x.py::test_eq[1-2]
        ");
    }

    #[test]
    fn json_output() {
        let (_temp_dir, path) = write_report(REPORT);
        for format in ["json", "json-pretty"] {
            let stdout = run(&[path.as_str(), "--message-format", format]).expect("triage succeeds");
            let summary = RunSummaryJson::parse_json(&stdout).expect("output is a summary");
            assert_eq!(summary.counts.total, 3, "for format {format}");
            assert_eq!(summary.groups.len(), 1, "for format {format}");
            assert_eq!(summary.groups[0].members.len(), 2, "for format {format}");
            assert_eq!(summary.hints, None, "for format {format}");
        }
    }

    #[test]
    fn config_file_and_overrides() {
        let (temp_dir, path) = write_report(REPORT);
        let config_path = temp_dir.path().join("ci-triage.toml");
        std::fs::write(&config_path, "message-truncate-length = 20\nhints = true\n").unwrap();

        let stdout = run(&[path.as_str(), "--config-file", config_path.as_str()])
            .expect("triage succeeds");
        insta::assert_snapshot!(stdout, @r"
        total=3 passed=1 failed=2 errored=0 skipped=0
        size=2 category=assertion-failure AssertionError: expe... [tests/test_x.py:12]
        slowest failure: tests/test_x.py::test_eq[3-4] (1.25s)
        possible flakiness: tests/test_x.py::test_eq[3-4]
        no captured output for first failure: tests/test_x.py::test_eq[1-2]
        ");

        let stdout = run(&[
            path.as_str(),
            "--config-file",
            config_path.as_str(),
            "--message-truncate-length",
            "200",
        ])
        .expect("triage succeeds");
        assert!(
            stdout.contains("AssertionError: expected 1 got 2 "),
            "command line wins over the config file: {stdout}"
        );

        let stdout = run(&[path.as_str(), "--config-file", config_path.as_str(), "--no-hints"])
            .expect("triage succeeds");
        insta::assert_snapshot!(stdout, @r"
        total=3 passed=1 failed=2 errored=0 skipped=0
        size=2 category=assertion-failure AssertionError: expe... [tests/test_x.py:12]
        ");
    }

    #[test_case(&[], None ; "neither")]
    #[test_case(&["--hints"], Some(true) ; "hints")]
    #[test_case(&["--no-hints"], Some(false) ; "no hints")]
    #[test_case(&["--hints", "--no-hints"], Some(false) ; "last flag wins")]
    #[test_case(&["--no-hints", "--hints"], Some(true) ; "last flag wins reversed")]
    fn hints_flags(flags: &[&str], expected: Option<bool>) {
        let args = ["ci-triage", "report.json"].into_iter().chain(flags.iter().copied());
        let app = CiTriageApp::try_parse_from(args).expect("arguments are valid");
        assert_eq!(app.triage_opts.overrides().hints, expected);
    }

    #[test]
    fn empty_report() {
        let (_temp_dir, path) = write_report("{}");
        let stdout = run(&[path.as_str()]).expect("an empty report is valid");
        insta::assert_snapshot!(stdout, @r"
        total=0 passed=0 failed=0 errored=0 skipped=0
        no failures
        ");
    }

    #[test]
    fn error_exit_codes() {
        let (temp_dir, malformed) = write_report("{\"tests\": [}");
        let schema = temp_dir.path().join("schema.json");
        std::fs::write(&schema, r#"{"tests": [{"nodeid": "a", "outcome": "exploded"}]}"#)
            .unwrap();
        let missing = temp_dir.path().join("missing.json");

        let cases: [(&[&str], i32); 4] = [
            (&[malformed.as_str()], TriageExitCode::MALFORMED_REPORT),
            (&[schema.as_str()], TriageExitCode::REPORT_SCHEMA_ERROR),
            (&[missing.as_str()], TriageExitCode::REPORT_READ_FAILED),
            (
                &[malformed.as_str(), "--similarity-threshold", "0"],
                TriageExitCode::SETUP_ERROR,
            ),
        ];
        for (args, expected) in cases {
            let error = run(args).expect_err("triage fails");
            assert_eq!(error.process_exit_code(), expected, "for args {args:?}");
        }
    }

    #[test]
    fn usage_errors() {
        let cases: [&[&str]; 3] = [
            &["ci-triage"],
            &["ci-triage", "report.json", "--display-limit", "many"],
            &["ci-triage", "report.json", "--message-format", "xml"],
        ];
        for args in cases {
            CiTriageApp::try_parse_from(args).expect_err("arguments are invalid");
        }
    }
}
