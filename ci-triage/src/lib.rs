// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Condense a pytest JSON report into a short, prioritized summary of failures for CI logs.
//!
//! ```text
//! $ ci-triage report.json
//! total=7 passed=5 failed=2 errored=0 skipped=0
//! size=2 category=assertion-failure AssertionError: expected 1 got 2 [tests/test_x.py:12]
//! ```
//!
//! The analysis itself lives in the `triage-core` crate. This crate only parses arguments,
//! configures logging and maps errors to exit codes.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
