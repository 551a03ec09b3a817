// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Names shared between accounts and other projects. Other projects read
//! the SSM parameters below, so they must stay stable.

/// Project name, used in tags and session names.
pub const PROJECT_NAME: &str = "dns-management";

/// Tags put on every created role, key and zone.
pub const TAGS: [(&str, &str); 2] = [("cdkManaged", "yes"), ("Project", PROJECT_NAME)];

/// `TAGS` as owned pairs.
pub fn tags() -> Vec<(String, String)> {
    TAGS.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Hosted zone id of the account subzone, in every account region.
pub const SSM_HOSTED_ZONE_ID: &str = "/gemeente-nijmegen/account/hostedzone/id";
/// Hosted zone name of the account subzone, in every account region.
pub const SSM_HOSTED_ZONE_NAME: &str = "/gemeente-nijmegen/account/hostedzone/name";
/// ARN of the account DNSSEC signing key (stored in `DNSSEC_KEY_REGION`).
pub const SSM_DNSSEC_KMS_KEY_ARN: &str = "/gemeente-nijmegen/account/dnssec/kmskey/arn";
/// ARN of the `dns-manager` role in the root account.
pub const SSM_DNS_MANAGER_ROLE_ARN: &str = "/gemeente-nijmegen/dns-manager/role/arn";

/// Alias of the account DNSSEC signing key.
pub const DNSSEC_KMS_KEY_ALIAS: &str = "alias/gemeente-nijmegen/dnssec";
/// Route53 only accepts DNSSEC signing keys from this region.
pub const DNSSEC_KEY_REGION: &str = "us-east-1";

/// Role in the root account used by people managing DNS by hand.
pub const DNS_MANAGER_ROLE_NAME: &str = "dns-manager";
/// Every delegation role name starts with this.
pub const DELEGATION_ROLE_PREFIX: &str = "csp-nijmegen-delegation-";
/// Name of the inline policy on delegation roles.
pub const DELEGATION_POLICY_NAME: &str = "delegation";

/// Deterministic role name in the root account for subdomain `name`.
pub fn delegation_role_name(name: &str) -> String {
    format!("{DELEGATION_ROLE_PREFIX}{name}-role")
}

/// `arn:aws:iam::{account}:role/{role_name}`
pub fn role_arn(account: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account}:role/{role_name}")
}
