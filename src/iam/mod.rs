// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Creates and repairs roles.
mod manager;
/// IAM policy documents.
mod policy;
/// Role definitions.
mod roles;

pub use self::manager::{RoleManager, RoleOutcome};
pub use self::policy::{
    policy_matches, Conditions, Effect, PolicyDocument, PolicyStatement, Principal, POLICY_VERSION,
};
pub use self::roles::{delegation_role, dns_manager_role, RoleSpec};
