// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Error;
use crate::config::Environment;
use crate::dnssec::SigningKeySpec;
use crate::iam::RoleSpec;
use crate::records::{Change, RecordSet};
use crate::zone::{HostedZoneId, ZoneName};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// A public hosted zone as seen by the API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostedZone {
    pub id: HostedZoneId,
    pub name: ZoneName,
    pub name_servers: Vec<String>,
}

/// Status of a key-signing key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KskStatus {
    Active,
    Inactive,
    ActionNeeded,
    Deleting,
    Other(String),
}

impl KskStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            "ACTION_NEEDED" => Self::ActionNeeded,
            "DELETING" => Self::Deleting,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Display for KskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Inactive => f.write_str("INACTIVE"),
            Self::ActionNeeded => f.write_str("ACTION_NEEDED"),
            Self::Deleting => f.write_str("DELETING"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// A key-signing key of a hosted zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeySigningKey {
    pub name: String,
    pub status: KskStatus,
    pub kms_arn: String,
    /// Route53 computes the DS record once the key is created.
    pub ds_record: Option<String>,
}

/// DNSSEC state of a hosted zone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DnssecState {
    /// `true` when Route53 serves signatures.
    pub signing: bool,
    pub key_signing_keys: Vec<KeySigningKey>,
}

impl DnssecState {
    pub fn ksk(&self, name: &str) -> Option<&KeySigningKey> {
        self.key_signing_keys.iter().find(|k| k.name == name)
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &KeySigningKey> {
        self.key_signing_keys
            .iter()
            .filter(|k| k.status == KskStatus::Active)
    }
}

/// A role as seen by the API; policies are decoded JSON.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleState {
    pub arn: String,
    pub trust_policy: String,
    pub inline_policies: BTreeMap<String, String>,
}

/// Route53 hosted zones, records and DNSSEC.
#[async_trait]
pub trait HostedZones {
    /// Find a public zone by exact name.
    async fn find_zone(&self, name: &ZoneName) -> Result<Option<HostedZone>, Error>;

    /// Create a public zone.
    async fn create_zone(
        &self,
        name: &ZoneName,
        caller_reference: &str,
        tags: &[(String, String)],
    ) -> Result<HostedZone, Error>;

    /// Every record set in the zone, alias records excluded.
    async fn list_records(&self, zone: &HostedZoneId) -> Result<Vec<RecordSet>, Error>;

    /// Apply changes atomically.
    async fn change_records(
        &self,
        zone: &HostedZoneId,
        changes: &[Change],
        comment: &str,
    ) -> Result<(), Error>;

    async fn dnssec(&self, zone: &HostedZoneId) -> Result<DnssecState, Error>;

    /// Create an active key-signing key backed by `kms_arn`.
    async fn create_ksk(
        &self,
        zone: &HostedZoneId,
        name: &str,
        kms_arn: &str,
        caller_reference: &str,
    ) -> Result<(), Error>;

    async fn set_ksk_active(&self, zone: &HostedZoneId, name: &str, active: bool)
        -> Result<(), Error>;

    /// Delete an inactive key-signing key.
    async fn delete_ksk(&self, zone: &HostedZoneId, name: &str) -> Result<(), Error>;

    /// Enable or disable DNSSEC signing.
    async fn set_dnssec(&self, zone: &HostedZoneId, enabled: bool) -> Result<(), Error>;
}

/// IAM roles with inline policies.
#[async_trait]
pub trait Roles {
    async fn get_role(&self, name: &str) -> Result<Option<RoleState>, Error>;

    /// Create the role with its trust policy and tags; returns the ARN.
    async fn create_role(&self, spec: &RoleSpec) -> Result<String, Error>;

    async fn update_trust_policy(&self, name: &str, document: &str) -> Result<(), Error>;

    async fn put_inline_policy(
        &self,
        name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), Error>;

    async fn delete_inline_policy(&self, name: &str, policy_name: &str) -> Result<(), Error>;
}

/// KMS asymmetric signing keys.
#[async_trait]
pub trait SigningKeys {
    /// ARN of the key behind `alias`, if any.
    async fn describe_alias(&self, alias: &str) -> Result<Option<String>, Error>;

    /// Create the key; returns its ARN.
    async fn create_key(&self, spec: &SigningKeySpec) -> Result<String, Error>;

    async fn create_alias(&self, alias: &str, key_arn: &str) -> Result<(), Error>;

    async fn key_policy(&self, key_arn: &str) -> Result<String, Error>;

    async fn put_key_policy(&self, key_arn: &str, document: &str) -> Result<(), Error>;
}

/// SSM string parameters.
#[async_trait]
pub trait Parameters {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, Error>;

    /// Create or overwrite.
    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), Error>;
}

/// API access to one account in one region.
#[derive(Clone)]
pub struct AccountSession {
    pub environment: Environment,
    pub zones: Arc<dyn HostedZones + Send + Sync>,
    pub roles: Arc<dyn Roles + Send + Sync>,
    pub keys: Arc<dyn SigningKeys + Send + Sync>,
    pub parameters: Arc<dyn Parameters + Send + Sync>,
}

/// Hands out account sessions.
#[async_trait]
pub trait SessionFactory {
    /// Session for `environment`.
    async fn session(&self, environment: &Environment) -> Result<AccountSession, Error>;

    /// Session obtained by assuming `role_arn` from inside `from`. Used by a
    /// subaccount to register its zone through its delegation role.
    async fn delegated(&self, from: &Environment, role_arn: &str)
        -> Result<AccountSession, Error>;
}
