// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Manages a DNS hierarchy spread over many AWS accounts: a toplevel hosted
//! zone, one delegated subzone per account, DNSSEC signing of the subzones
//! and the IAM roles that let each account register its subzone.

#[cfg(feature = "aws")]
/// The cloud traits over the AWS SDK.
pub mod aws;
#[cfg(feature = "aws")]
pub use aws::*;

/// Traits at the boundary to the cloud, and an in-memory cloud.
pub mod cloud;
pub use cloud::*;

/// Types common to multiple modules.
pub mod common;
pub use common::*;

/// The configuration per branch.
pub mod config;
pub use config::*;

/// DNSSEC signing keys and key-signing keys.
pub mod dnssec;
pub use dnssec::*;

/// IAM policies and roles.
pub mod iam;
pub use iam::*;

/// Thread-safe logging.
pub mod log;
pub use log::*;

/// Plans and runs the steps across accounts.
pub mod orchestrator;
pub use orchestrator::*;

/// Record sets and their reconciliation.
pub mod records;
pub use records::*;

/// Macros used with `serde` serialization and deserialization.
pub mod serde_utils;
pub use serde_utils::*;

/// Zone names and the desired zone hierarchy.
pub mod zone;
pub use zone::*;
