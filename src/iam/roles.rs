// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{PolicyDocument, PolicyStatement, Principal};
use crate::common::Error;
use crate::config::naming::{
    delegation_role_name, role_arn, tags, DELEGATION_POLICY_NAME, DELEGATION_ROLE_PREFIX,
    DNS_MANAGER_ROLE_NAME,
};
use crate::config::{AccountId, Environment};
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything about a role that is reconciled.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleSpec {
    pub name: String,
    pub description: Option<String>,
    pub trust_policy: PolicyDocument,
    pub inline_policies: BTreeMap<String, PolicyDocument>,
    pub tags: Vec<(String, String)>,
}

impl RoleSpec {
    fn new(name: String, description: Option<String>, trust_policy: PolicyDocument) -> Self {
        Self {
            name,
            description,
            trust_policy,
            inline_policies: BTreeMap::new(),
            tags: tags(),
        }
    }
}

fn assume_role_statement(principal: Principal) -> PolicyStatement {
    PolicyStatement::allow(&["sts:AssumeRole"], &[]).with_principal(principal)
}

/// Role in the root account that lets `environment` register its subzone in
/// the root zone: assumable by that account only, allowed to change record
/// sets of exactly `zone_arn` and to look up zones by name.
pub fn delegation_role(
    zone_arn: &str,
    environment: &Environment,
    name: &str,
) -> Result<RoleSpec, Error> {
    let account = environment.account(&format!("create delegation policy for {name}"))?;
    let mut spec = RoleSpec::new(
        delegation_role_name(name),
        Some(format!("Zone delegation of {name} for account {account}")),
        PolicyDocument::new(vec![assume_role_statement(Principal::account(
            account.root_arn(),
        ))]),
    );
    spec.inline_policies.insert(
        DELEGATION_POLICY_NAME.to_owned(),
        PolicyDocument::new(vec![
            PolicyStatement::allow(&["route53:ChangeResourceRecordSets"], &[zone_arn]),
            PolicyStatement::allow(&["route53:ListHostedZonesByName"], &["*"]),
        ]),
    );
    Ok(spec)
}

/// Role for people managing DNS by hand, assumable from the IAM account
/// with MFA only.
pub fn dns_manager_role(root_account: &AccountId, iam_account: &AccountId) -> RoleSpec {
    let trust = assume_role_statement(Principal::account(iam_account.root_arn())).with_condition(
        "Bool",
        "aws:MultiFactorAuthPresent",
        Value::Bool(true),
    );
    let mut spec = RoleSpec::new(
        DNS_MANAGER_ROLE_NAME.to_owned(),
        Some(
            "Role for dns-management account with access rights to IAM (readonly) and Route53"
                .to_owned(),
        ),
        PolicyDocument::new(vec![trust]),
    );
    let delegation_roles = role_arn(root_account, &format!("{DELEGATION_ROLE_PREFIX}*"));
    spec.inline_policies.insert(
        "dns-management".to_owned(),
        PolicyDocument::new(vec![
            // route53domains has no resource level permissions
            PolicyStatement::allow(&["route53:*", "route53domains:*"], &["*"]),
            PolicyStatement::allow(&["iam:Get*", "iam:List*"], &[delegation_roles.as_str()]),
            PolicyStatement::allow(
                &[
                    "kms:Get*",
                    "kms:List*",
                    "kms:DescribeCustomKeyStores",
                    "kms:DescribeKey",
                ],
                &["*"],
            ),
        ]),
    );
    spec
}
