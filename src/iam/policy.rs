// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Error;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Condition operator → key → value, e.g. `Bool` → `aws:MultiFactorAuthPresent` → `true`.
pub type Conditions = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement applies to. IAM accepts a string or a list for each
/// key; both are read, lists are written.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Principal {
    #[serde(
        rename = "AWS",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub aws: Vec<String>,
    #[serde(
        rename = "Service",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub service: Vec<String>,
}

impl Principal {
    /// The root of an account, e.g. `arn:aws:iam::123456789012:root`.
    pub fn account(root_arn: String) -> Self {
        Self {
            aws: vec![root_arn],
            service: Vec::new(),
        }
    }

    /// An AWS service, e.g. `dnssec-route53.amazonaws.com`.
    pub fn service(service: &str) -> Self {
        Self {
            aws: Vec::new(),
            service: vec![service.to_owned()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    #[serde(deserialize_with = "one_or_many")]
    pub action: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Conditions>,
}

impl PolicyStatement {
    /// Allow `actions` on `resources`.
    pub fn allow(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: resources.iter().map(|r| r.to_string()).collect(),
            condition: None,
        }
    }

    pub fn with_sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_owned());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Adds a condition, e.g. `("Bool", "aws:MultiFactorAuthPresent", true)`.
    pub fn with_condition(mut self, operator: &str, key: &str, value: Value) -> Self {
        self.condition
            .get_or_insert_with(Default::default)
            .entry(operator.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        self
    }

    /// Whether this statement allows `action` on `resource`. Supports the
    /// trailing `*` wildcards used in this crate's policies.
    pub fn allows(&self, action: &str, resource: &str) -> bool {
        self.effect == Effect::Allow
            && self.action.iter().any(|a| wildcard_match(a, action))
            && (self.resource.is_empty() || self.resource.iter().any(|r| wildcard_match(r, resource)))
    }
}

/// An IAM policy document.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement", deserialize_with = "one_or_many_statements")]
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_owned(),
            statement,
        }
    }

    /// Parses a document as returned by IAM, which URL-encodes policies.
    pub fn parse(document: &str) -> Result<Self, Error> {
        let trimmed = document.trim();
        let decoded = if trimmed.starts_with('{') {
            trimmed.to_owned()
        } else {
            urlencoding::decode(trimmed)
                .map_err(|e| Error::String(format!("policy is not URL-encoded JSON: {e}")))?
                .into_owned()
        };
        serde_json::from_str(&decoded).map_err(|e| Error::Serde(e, "policy document".to_string()))
    }

    /// Compact JSON, as sent to IAM and KMS.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serde(e, "policy document".to_string()))
    }

    /// Order-independent form: sorted lists and statements, condition values
    /// as strings (IAM returns `true` as `"true"`).
    pub fn canonical(&self) -> Self {
        let mut statement: Vec<PolicyStatement> = self
            .statement
            .iter()
            .cloned()
            .map(|mut s| {
                s.action.sort();
                s.action.dedup();
                s.resource.sort();
                s.resource.dedup();
                if let Some(principal) = s.principal.as_mut() {
                    principal.aws.sort();
                    principal.service.sort();
                }
                if let Some(condition) = s.condition.as_mut() {
                    for values in condition.values_mut() {
                        for value in values.values_mut() {
                            *value = stringify(value);
                        }
                    }
                }
                s
            })
            .collect();
        statement.sort_by_key(|s| serde_json::to_string(s).unwrap_or_default());
        Self {
            version: self.version.clone(),
            statement,
        }
    }

    /// Whether the statements allow `action` on `resource`.
    pub fn allows(&self, action: &str, resource: &str) -> bool {
        self.statement.iter().any(|s| s.allows(action, resource))
    }

    /// Whether `principal_arn` may assume a role with this trust policy.
    pub fn trusts(&self, principal_arn: &str) -> bool {
        self.statement.iter().any(|s| {
            s.effect == Effect::Allow
                && s.action.iter().any(|a| wildcard_match(a, "sts:AssumeRole"))
                && s.principal
                    .as_ref()
                    .is_some_and(|p| p.aws.iter().any(|arn| arn == principal_arn))
        })
    }
}

/// Whether a live document (possibly URL-encoded) has the same meaning as
/// `desired`. Unparseable documents never match.
pub fn policy_matches(live: &str, desired: &PolicyDocument) -> bool {
    PolicyDocument::parse(live)
        .map(|live| live.canonical() == desired.canonical())
        .unwrap_or(false)
}

fn stringify(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(stringify).collect()),
        other => other.clone(),
    }
}

fn wildcard_match(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::<String>::deserialize(deserializer).map(Vec::from)
}

fn one_or_many_statements<'de, D>(deserializer: D) -> Result<Vec<PolicyStatement>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::<PolicyStatement>::deserialize(deserializer).map(Vec::from)
}
