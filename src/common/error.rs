// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt::{Display, Formatter};

#[cfg(feature = "aws")]
/// A convenient alias for Anyhow so consuming code doesn't need to add to `Cargo.toml`
pub type AnyhowError = anyhow::Error;

#[derive(Debug)]
/// An enum that encapsulates a variety of error types.
///
/// # Example
///
/// Error::Config(format!("No account provided could not create delegation policy for {name}"))
pub enum Error {
    #[cfg(feature = "aws")]
    /// AWS SDK (or other wrapped) error with the call that produced it.
    Anyhow(AnyhowError, String),
    /// Configuration is invalid; nothing was changed.
    Config(String),
    /// A step could not run because a step it depends on did not succeed.
    Dependency(String),
    /// A principal is not allowed to perform the action (e.g. untrusted role).
    Denied(String),
    /// A zone, role, key or parameter does not exist.
    NotFound(String),
    /// JSON (policy document) serialization or deserialization error.
    Serde(serde_json::Error, String),
    /// String error.
    String(String),
}

impl Error {
    /// Returns `true` for `Error::NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            #[cfg(feature = "aws")]
            Error::Anyhow(e, context) => Display::fmt(&format!("{context}: {e}"), f),
            Error::Config(s) => Display::fmt(&format!("configuration: {s}"), f),
            Error::Dependency(s) => Display::fmt(&format!("dependency: {s}"), f),
            Error::Denied(s) => Display::fmt(&format!("denied: {s}"), f),
            Error::NotFound(s) => Display::fmt(&format!("not found: {s}"), f),
            Error::Serde(e, context) => Display::fmt(&format!("{context}: {e}"), f),
            Error::String(s) => Display::fmt(&s, f),
        }
    }
}

impl std::error::Error for Error {}
