// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// The configuration selected by branch.
mod configuration;
/// Account and region.
mod environment;
/// Names and parameter paths shared with other projects.
pub mod naming;

pub use self::configuration::{
    Configuration, DnsManagerConfig, RecordConfig, SubdomainConfiguration, DEFAULT_BRANCH,
};
pub use self::environment::{AccountId, Environment};
