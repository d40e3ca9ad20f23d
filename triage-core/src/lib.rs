// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [ci-triage](https://crates.io/crates/ci-triage): condensing a pytest
//! JSON report into a short summary of failures for CI logs.
//!
//! Data flows through the modules in order:
//!
//! 1. [`report::load_report`] parses a report into [`TestRecord`]s.
//! 2. [`classify`] assigns each failed or errored record a category.
//! 3. [`group`] clusters classified failures that likely share a root cause.
//! 4. [`analyze`] runs steps 2 and 3 and orders the groups into a [`Summary`], which
//!    [`render::SummaryRenderer`] turns into text.
//!
//! Nothing here performs IO other than reading an optional config file in
//! [`config::TriageConfig::from_sources`].

pub mod classify;
pub mod config;
pub mod errors;
pub mod group;
mod helpers;
pub mod render;
pub mod report;
pub mod summary;
pub mod write_str;

pub use report::{TestRecord, load_report};
pub use summary::{Summary, analyze};
