// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: LGPL-3.0-or-later

/// An enum that encapsulates a variety of error types.
mod error;
/// TOML settings.
mod settings;
mod tests;

#[cfg(feature = "aws")]
pub use self::error::AnyhowError;
pub use self::error::Error;
pub use self::settings::{AwsSettings, Settings, SettingsBuilder, DEFAULT_MAX_PARALLEL};
