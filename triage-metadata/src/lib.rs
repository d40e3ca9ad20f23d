// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the machine-readable output of `ci-triage`.
//!
//! `ci-triage --message-format json` writes a [`RunSummaryJson`] to standard output. Tools that
//! post-process CI logs can deserialize it with this crate instead of scraping the text summary.
//!
//! The exit codes documented in [`TriageExitCode`] are also part of the stable interface.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
