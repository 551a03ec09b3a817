// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{policy_matches, RoleSpec};
use crate::cloud::Roles;
use crate::common::Error;
use crate::log::StringLogger;

/// Result of reconciling one role.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleOutcome {
    /// Empty when a dry run found the role missing.
    pub arn: String,
    pub created: bool,
    /// Names of the policies that were rewritten (`trust` for the trust
    /// policy) or removed.
    pub updated: Vec<String>,
}

impl RoleOutcome {
    /// Whether nothing had to change.
    pub fn unchanged(&self) -> bool {
        !self.created && self.updated.is_empty()
    }
}

/// Brings roles in line with their `RoleSpec`.
pub struct RoleManager<'a> {
    roles: &'a (dyn Roles + Send + Sync),
    dry_run: bool,
}

impl<'a> RoleManager<'a> {
    pub fn new(roles: &'a (dyn Roles + Send + Sync)) -> Self {
        Self {
            roles,
            dry_run: false,
        }
    }

    /// Only report what would change.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn would(&self) -> &'static str {
        if self.dry_run {
            "would be "
        } else {
            ""
        }
    }

    /// Creates the role if it is missing, otherwise rewrites every policy
    /// that drifted and removes inline policies that are no longer wanted.
    pub async fn reconcile(
        &self,
        spec: &RoleSpec,
        logger: &StringLogger,
    ) -> Result<RoleOutcome, Error> {
        let name = &spec.name;
        let would = self.would();
        let Some(live) = self.roles.get_role(name).await? else {
            let mut arn = String::new();
            if !self.dry_run {
                arn = self.roles.create_role(spec).await?;
                for (policy_name, document) in &spec.inline_policies {
                    self.roles
                        .put_inline_policy(name, policy_name, &document.to_json()?)
                        .await?;
                }
            }
            logger.trace(format!("role {name}: {would}created {arn}"));
            return Ok(RoleOutcome {
                arn,
                created: true,
                updated: Vec::new(),
            });
        };

        let mut updated = Vec::new();
        if !policy_matches(&live.trust_policy, &spec.trust_policy) {
            if !self.dry_run {
                self.roles
                    .update_trust_policy(name, &spec.trust_policy.to_json()?)
                    .await?;
            }
            logger.warn(format!("role {name}: trust policy drifted, {would}rewritten"));
            updated.push("trust".to_owned());
        }
        for (policy_name, document) in &spec.inline_policies {
            let in_sync = live
                .inline_policies
                .get(policy_name)
                .is_some_and(|live| policy_matches(live, document));
            if !in_sync {
                if !self.dry_run {
                    self.roles
                        .put_inline_policy(name, policy_name, &document.to_json()?)
                        .await?;
                }
                logger.trace(format!("role {name}: policy {policy_name} {would}written"));
                updated.push(policy_name.clone());
            }
        }
        for policy_name in live.inline_policies.keys() {
            if !spec.inline_policies.contains_key(policy_name) {
                if !self.dry_run {
                    self.roles.delete_inline_policy(name, policy_name).await?;
                }
                logger.warn(format!(
                    "role {name}: unexpected policy {policy_name} {would}removed"
                ));
                updated.push(policy_name.clone());
            }
        }
        if updated.is_empty() {
            logger.trace(format!("role {name}: up to date"));
        }
        Ok(RoleOutcome {
            arn: live.arn,
            created: false,
            updated,
        })
    }
}
