// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for ci-triage.
//!
//! Settings are resolved from three layers, highest priority first:
//!
//! 1. Values passed in through [`ConfigOverrides`], typically from the command line or the
//!    environment.
//! 2. A TOML config file, if one was given.
//! 3. The defaults embedded from `default-config.toml`.

use crate::errors::ConfigError;
use camino::Utf8Path;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeSet;
use swrite::{SWrite, swrite};
use tracing::{debug, warn};

/// Resolved configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct TriageConfig {
    /// The maximum number of groups to display.
    pub display_limit: usize,

    /// The minimum Jaccard index for two messages to be grouped together, in `(0, 1]`.
    pub similarity_threshold: f64,

    /// The number of characters a representative message is truncated to.
    pub message_truncate_length: usize,

    /// Whether to compute and display hints.
    pub hints: bool,
}

impl TriageConfig {
    /// The embedded default config TOML.
    const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Resolves configuration from an optional config file and overrides, then validates it.
    pub fn from_sources(
        config_file: Option<&Utf8Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        Self::from_sources_with_warnings(config_file, overrides, &mut DefaultConfigWarnings)
    }

    fn from_sources_with_warnings(
        config_file: Option<&Utf8Path>,
        overrides: &ConfigOverrides,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::from_embedded();

        if let Some(path) = config_file {
            let file_config = DeserializedConfig::from_path_with_warnings(path, warnings)?;
            config.apply_file(file_config);
        }
        config.apply_overrides(overrides);

        config.validate()?;
        debug!("resolved config: {config:?}");
        Ok(config)
    }

    /// Parses the embedded default config.
    ///
    /// Panics if the embedded TOML is invalid or contains unknown keys.
    pub fn from_embedded() -> Self {
        let deserializer = toml::Deserializer::parse(Self::DEFAULT_CONFIG)
            .expect("embedded default config should parse");
        let mut unknown = BTreeSet::new();
        let config: DefaultConfig =
            serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("embedded default config should be valid");

        // The default config ships with the binary, so unknown keys are a bug.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.iter().join(", ")
            );
        }

        Self {
            display_limit: config.display_limit,
            similarity_threshold: config.similarity_threshold,
            message_truncate_length: config.message_truncate_length,
            hints: config.hints,
        }
    }

    /// Checks that every setting is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written so that NaN is rejected too.
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "similarity-threshold",
                value: self.similarity_threshold.to_string(),
                reason: "must be greater than 0 and at most 1",
            });
        }
        if self.display_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "display-limit",
                value: self.display_limit.to_string(),
                reason: "must be at least 1",
            });
        }
        if self.message_truncate_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "message-truncate-length",
                value: self.message_truncate_length.to_string(),
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    fn apply_file(&mut self, file: DeserializedConfig) {
        if let Some(display_limit) = file.display_limit {
            self.display_limit = display_limit;
        }
        if let Some(similarity_threshold) = file.similarity_threshold {
            self.similarity_threshold = similarity_threshold;
        }
        if let Some(message_truncate_length) = file.message_truncate_length {
            self.message_truncate_length = message_truncate_length;
        }
        if let Some(hints) = file.hints {
            self.hints = hints;
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(display_limit) = overrides.display_limit {
            self.display_limit = display_limit;
        }
        if let Some(similarity_threshold) = overrides.similarity_threshold {
            self.similarity_threshold = similarity_threshold;
        }
        if let Some(message_truncate_length) = overrides.message_truncate_length {
            self.message_truncate_length = message_truncate_length;
        }
        if let Some(hints) = overrides.hints {
            self.hints = hints;
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self::from_embedded()
    }
}

/// Settings that take priority over both the config file and the defaults.
///
/// `None` means "not set at this layer".
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Overrides `display-limit`.
    pub display_limit: Option<usize>,
    /// Overrides `similarity-threshold`.
    pub similarity_threshold: Option<f64>,
    /// Overrides `message-truncate-length`.
    pub message_truncate_length: Option<usize>,
    /// Overrides `hints`.
    pub hints: Option<bool>,
}

/// Handles warnings produced while reading a config file.
trait ConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs warnings through `tracing`.
struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            swrite!(unknown_str, "key: {}", unknown.iter().join(""));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                swrite!(unknown_str, "\n  - {ignored_key}");
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

/// A config file as written by the user. Every setting is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    display_limit: Option<usize>,
    #[serde(default)]
    similarity_threshold: Option<f64>,
    #[serde(default)]
    message_truncate_length: Option<usize>,
    #[serde(default)]
    hints: Option<bool>,
}

impl DeserializedConfig {
    fn from_path_with_warnings(
        path: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigError> {
        debug!("config: loading from {path}");
        let contents = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_owned(),
            error,
        })?;

        let (config, unknown) =
            Self::deserialize_toml(&contents).map_err(|error| ConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }

        Ok(config)
    }

    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

/// The embedded defaults. Every setting is required.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultConfig {
    display_limit: usize,
    similarity_threshold: f64,
    message_truncate_length: usize,
    hints: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[derive(Default)]
    struct TestConfigWarnings {
        unknown_keys: Option<(Utf8PathBuf, BTreeSet<String>)>,
    }

    impl ConfigWarnings for TestConfigWarnings {
        fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown_keys = Some((config_file.to_owned(), unknown.clone()));
        }
    }

    fn write_config(contents: &str) -> (Utf8TempDir, Utf8PathBuf) {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("ci-triage.toml");
        std::fs::write(&config_path, contents).unwrap();
        (temp_dir, config_path)
    }

    #[test]
    fn default_config_is_valid() {
        let config = TriageConfig::from_embedded();
        config.validate().expect("default config is valid");
        assert_eq!(
            config,
            TriageConfig {
                display_limit: 10,
                similarity_threshold: 0.5,
                message_truncate_length: 120,
                hints: false,
            }
        );
    }

    #[test]
    fn layering() {
        let (_temp_dir, config_path) = write_config(indoc! {r#"
            display-limit = 3
            similarity-threshold = 0.8
        "#});
        let overrides = ConfigOverrides {
            display_limit: Some(5),
            hints: Some(true),
            ..Default::default()
        };

        let mut warnings = TestConfigWarnings::default();
        let config = TriageConfig::from_sources_with_warnings(
            Some(&config_path),
            &overrides,
            &mut warnings,
        )
        .expect("config is valid");

        assert_eq!(
            config,
            TriageConfig {
                // Overrides beat the file.
                display_limit: 5,
                // The file beats the defaults.
                similarity_threshold: 0.8,
                message_truncate_length: 120,
                hints: true,
            }
        );
        assert!(warnings.unknown_keys.is_none());
    }

    #[test]
    fn ignored_keys() {
        let (_temp_dir, config_path) = write_config(indoc! {r#"
            display-limit = 3
            group-by = "file"

            [ui]
            color = true
        "#});

        let mut warnings = TestConfigWarnings::default();
        let config = TriageConfig::from_sources_with_warnings(
            Some(&config_path),
            &ConfigOverrides::default(),
            &mut warnings,
        )
        .expect("unknown keys are not fatal");
        assert_eq!(config.display_limit, 3);

        let (path, unknown) = warnings.unknown_keys.expect("unknown keys were reported");
        assert_eq!(path, config_path);
        assert_eq!(
            unknown,
            BTreeSet::from(["group-by".to_owned(), "ui".to_owned()])
        );
    }

    #[test]
    fn missing_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("does-not-exist.toml");

        let error = TriageConfig::from_sources(Some(&config_path), &ConfigOverrides::default())
            .expect_err("missing file is an error");
        assert!(
            matches!(&error, ConfigError::Read { path, .. } if *path == config_path),
            "unexpected error: {error:?}"
        );
    }

    #[test_case("display-limit = \"ten\"" ; "wrong type")]
    #[test_case("display-limit = -1" ; "negative count")]
    #[test_case("similarity-threshold = " ; "invalid toml")]
    fn parse_errors(contents: &str) {
        let (_temp_dir, config_path) = write_config(contents);

        let error = TriageConfig::from_sources(Some(&config_path), &ConfigOverrides::default())
            .expect_err("config is invalid");
        assert!(
            matches!(error, ConfigError::Parse { .. }),
            "unexpected error: {error:?}"
        );
    }

    #[test_case(ConfigOverrides { similarity_threshold: Some(0.0), ..Default::default() }, "similarity-threshold" ; "zero threshold")]
    #[test_case(ConfigOverrides { similarity_threshold: Some(1.5), ..Default::default() }, "similarity-threshold" ; "threshold above one")]
    #[test_case(ConfigOverrides { similarity_threshold: Some(f64::NAN), ..Default::default() }, "similarity-threshold" ; "nan threshold")]
    #[test_case(ConfigOverrides { display_limit: Some(0), ..Default::default() }, "display-limit" ; "zero display limit")]
    #[test_case(ConfigOverrides { message_truncate_length: Some(0), ..Default::default() }, "message-truncate-length" ; "zero truncate length")]
    fn invalid_values(overrides: ConfigOverrides, expected_key: &str) {
        let error =
            TriageConfig::from_sources(None, &overrides).expect_err("override is out of range");
        match error {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, expected_key),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn threshold_of_one_is_valid() {
        let overrides = ConfigOverrides {
            similarity_threshold: Some(1.0),
            ..Default::default()
        };
        let config = TriageConfig::from_sources(None, &overrides).expect("1.0 is in range");
        assert_eq!(config.similarity_threshold, 1.0);
    }
}
