// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::config::naming::{tags, DNSSEC_KEY_REGION, DNSSEC_KMS_KEY_ALIAS};
use crate::config::AccountId;
use crate::iam::{PolicyDocument, PolicyStatement, Principal};
use serde_json::Value;

/// Service principal Route53 signs with.
pub const DNSSEC_SERVICE_PRINCIPAL: &str = "dnssec-route53.amazonaws.com";
/// The only key spec Route53 accepts for DNSSEC.
pub const KEY_SPEC: &str = "ECC_NIST_P256";
pub const KEY_USAGE: &str = "SIGN_VERIFY";

/// The per-account DNSSEC signing key.
#[derive(Clone, Debug, PartialEq)]
pub struct SigningKeySpec {
    pub alias: String,
    pub region: String,
    pub key_spec: String,
    pub key_usage: String,
    pub description: String,
    pub policy: PolicyDocument,
    pub tags: Vec<(String, String)>,
}

/// Key for the account: the account may sign and administer it, Route53
/// DNSSEC may create grants for AWS resources and sign with it.
pub fn signing_key_spec(account: &AccountId) -> SigningKeySpec {
    let root = || Principal::account(account.root_arn());
    let route53 = || Principal::service(DNSSEC_SERVICE_PRINCIPAL);
    let policy = PolicyDocument::new(vec![
        PolicyStatement::allow(&["kms:Sign"], &["*"]).with_principal(root()),
        // Without these the key policy could never be changed again.
        PolicyStatement::allow(
            &[
                "kms:Create*",
                "kms:Describe*",
                "kms:Enable*",
                "kms:List*",
                "kms:Put*",
                "kms:Update*",
                "kms:Revoke*",
                "kms:Disable*",
                "kms:Get*",
                "kms:Delete*",
                "kms:ScheduleKeyDeletion",
                "kms:CancelKeyDeletion",
                "kms:GenerateDataKey",
                "kms:TagResource",
                "kms:UntagResource",
            ],
            &["*"],
        )
        .with_principal(root()),
        PolicyStatement::allow(&["kms:CreateGrant"], &["*"])
            .with_sid("Allow Route 53 DNSSEC to CreateGrant")
            .with_principal(route53())
            .with_condition("Bool", "kms:GrantIsForAWSResource", Value::Bool(true)),
        PolicyStatement::allow(&["kms:DescribeKey", "kms:GetPublicKey", "kms:Sign"], &["*"])
            .with_sid("Allow Route 53 DNSSEC Service")
            .with_principal(route53()),
    ]);
    SigningKeySpec {
        alias: DNSSEC_KMS_KEY_ALIAS.to_owned(),
        region: DNSSEC_KEY_REGION.to_owned(),
        key_spec: KEY_SPEC.to_owned(),
        key_usage: KEY_USAGE.to_owned(),
        description: format!("DNSSEC signing key of account {account}"),
        policy,
        tags: tags(),
    }
}

/// Name of the key-signing key of subdomain `name`. Route53 allows 3 to 128
/// alphanumerics and underscores.
pub fn ksk_name(name: &str) -> String {
    let mut ksk: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    ksk.push_str("_ksk");
    ksk.truncate(128);
    ksk
}

/// Name of the replacement KSK created by a rotation at `generation`.
pub fn rotated_ksk_name(name: &str, generation: u32) -> String {
    let suffix = format!("_{generation}");
    let mut ksk = ksk_name(name);
    ksk.truncate(128 - suffix.len());
    ksk.push_str(&suffix);
    ksk
}

/// Whether `ksk` is the key-signing key of subdomain `name`, or one of its
/// rotations.
pub fn is_ksk_of(name: &str, ksk: &str) -> bool {
    if ksk == ksk_name(name) {
        return true;
    }
    ksk.rsplit_once('_')
        .and_then(|(_, generation)| generation.parse::<u32>().ok())
        .is_some_and(|generation| generation >= 2 && rotated_ksk_name(name, generation) == ksk)
}
