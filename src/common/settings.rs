// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: LGPL-3.0-or-later

use super::Error;
use serde::de::DeserializeOwned;
use serde::Deserialize;
#[allow(deprecated)]
use std::env::home_dir;
use std::fs::read_to_string;

/// Default number of steps of one wave that run at the same time.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Raw TOML settings, deserialized per section on demand.
#[derive(Debug)]
pub struct Settings {
    debug_enabled: bool,
    toml: String,
}

/// The `[aws]` section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AwsSettings {
    /// Named profile for the operator credentials.
    pub profile: Option<String>,
    /// Role assumed in every target account. When absent the operator
    /// credentials are used for all accounts.
    pub assume_role_name: Option<String>,
    /// Upper bound for concurrently executed steps.
    pub max_parallel: Option<usize>,
}

impl AwsSettings {
    /// `max_parallel` or the default, never zero.
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_PARALLEL)
    }
}

impl Settings {
    /// Creates a settings builder.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder {
            settings: None,
            debug_enabled: false,
            error: None,
        }
    }

    /// Empty settings, which leave every section at its default.
    pub fn empty() -> Self {
        Self {
            debug_enabled: false,
            toml: String::new(),
        }
    }

    /// Returns `true` if debug is enabled.
    pub fn debug(&self) -> bool {
        self.debug_enabled
    }

    /// Deserializes the whole document.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, Error> {
        toml::from_str(&self.toml).map_err(|e: toml::de::Error| Error::Config(format!("toml: {e}")))
    }

    /// The `[aws]` section, or defaults when it is missing.
    pub fn aws(&self) -> Result<AwsSettings, Error> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            aws: AwsSettings,
        }
        self.get::<Document>().map(|d| d.aws)
    }
}

/// Builds `Settings` from a file or a string.
pub struct SettingsBuilder {
    settings: Option<Settings>,
    debug_enabled: bool,
    error: Option<Error>,
}

impl SettingsBuilder {
    /// Completes the builder.
    pub fn build(self) -> Result<Settings, Error> {
        if let Some(error) = self.error {
            Err(error)
        } else if let Some(settings) = self.settings {
            Ok(settings)
        } else {
            Err(Error::Config("settings not set".to_string()))
        }
    }

    /// Echo log lines to stdout.
    pub fn debug(self, debug_enabled: bool) -> Self {
        Self {
            settings: self.settings.map(|s| Settings {
                debug_enabled,
                toml: s.toml,
            }),
            debug_enabled,
            error: self.error,
        }
    }

    /// Reads `file_name` from the working directory, falling back to the
    /// home directory.
    pub fn toml_file(self, file_name: &str) -> Self {
        let debug_enabled = self.debug_enabled;
        let local_path = format!("./{file_name}");
        #[allow(deprecated)]
        let home_path = home_dir()
            .and_then(|pathbuf| pathbuf.to_str().map(|path| format!("{path}/{file_name}")));
        let found = read_to_string(&local_path)
            .ok()
            .or_else(|| home_path.and_then(|path| read_to_string(path).ok()));
        match found {
            Some(toml) => Self {
                settings: Some(Settings {
                    toml,
                    debug_enabled,
                }),
                debug_enabled,
                error: None,
            },
            None => Self {
                settings: None,
                debug_enabled,
                error: Some(Error::Config(format!("{local_path}: cannot read"))),
            },
        }
    }

    /// Uses `toml` as the settings document.
    pub fn toml_str(self, toml: &str) -> Self {
        self.toml_string(toml.to_string())
    }

    /// Uses `toml` as the settings document.
    pub fn toml_string(self, toml: String) -> Self {
        Self {
            settings: Some(Settings {
                debug_enabled: self.debug_enabled,
                toml,
            }),
            debug_enabled: self.debug_enabled,
            error: None,
        }
    }
}
