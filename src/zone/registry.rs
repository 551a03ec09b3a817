// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{HostedZoneId, ZoneName};
use crate::common::Error;
use crate::config::naming::{delegation_role_name, role_arn};
use crate::config::{AccountId, Configuration, Environment, RecordConfig};
use std::collections::BTreeMap;

/// The toplevel zone. It already exists and is imported by id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RootZone {
    pub zone_name: ZoneName,
    pub zone_id: HostedZoneId,
    pub environment: Environment,
    pub account: AccountId,
}

impl RootZone {
    /// ARN that delegation roles are scoped to.
    pub fn zone_arn(&self) -> String {
        self.zone_id.arn()
    }
}

/// Desired state of one delegated account subzone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subzone {
    pub name: String,
    pub zone_name: ZoneName,
    pub environment: Environment,
    pub account: AccountId,
    pub dnssec: bool,
    /// DS record in the root zone. Only for signed zones: a DS record for
    /// an unsigned zone makes it fail validation.
    pub register_ds: bool,
    pub additional_regions: Vec<String>,
    pub delegation_role_name: String,
    pub stage_name: String,
    pub records: Vec<RecordConfig>,
}

/// Desired state of the root zone and every delegated subzone.
#[derive(Clone, Debug)]
pub struct ZoneRegistry {
    root: RootZone,
    subzones: Vec<Subzone>,
    index: BTreeMap<String, usize>,
}

impl ZoneRegistry {
    /// Builds the registry; fails on missing accounts and duplicate names.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, Error> {
        let root = RootZone {
            zone_name: configuration.toplevel_hostedzone_name.clone(),
            zone_id: configuration.root_zone_id()?.clone(),
            environment: configuration.toplevel_hostedzone_environment.clone(),
            account: configuration.root_account()?.clone(),
        };
        let mut subzones = Vec::with_capacity(configuration.subdomains.len());
        let mut index = BTreeMap::new();
        for subdomain in &configuration.subdomains {
            let name = subdomain.name.clone();
            if index.contains_key(&name) {
                return Err(Error::Config(format!(
                    "subdomain {name} is configured more than once"
                )));
            }
            let account = subdomain
                .environment
                .account(&format!("create delegation policy for {name}"))?
                .clone();
            index.insert(name.clone(), subzones.len());
            subzones.push(Subzone {
                zone_name: subdomain.zone_name(&root.zone_name)?,
                environment: subdomain.environment.clone(),
                account,
                dnssec: subdomain.enable_dns_sec,
                register_ds: subdomain.enable_dns_sec && subdomain.add_ds_record(),
                additional_regions: subdomain
                    .additional_regions
                    .iter()
                    .filter(|region| **region != subdomain.environment.region)
                    .cloned()
                    .collect(),
                delegation_role_name: delegation_role_name(&name),
                stage_name: subdomain.stage_name().to_owned(),
                records: subdomain.records.clone(),
                name,
            });
        }
        Ok(Self {
            root,
            subzones,
            index,
        })
    }

    pub fn root(&self) -> &RootZone {
        &self.root
    }

    /// Subzone by configured name.
    pub fn subzone(&self, name: &str) -> Option<&Subzone> {
        self.index.get(name).map(|i| &self.subzones[*i])
    }

    /// Subzone by name, or `Error::NotFound`.
    pub fn require(&self, name: &str) -> Result<&Subzone, Error> {
        self.subzone(name)
            .ok_or_else(|| Error::NotFound(format!("subdomain {name}")))
    }

    /// In configuration order.
    pub fn subzones(&self) -> &[Subzone] {
        &self.subzones
    }

    /// Subzones owned by `account`.
    pub fn subzones_in(&self, account: &AccountId) -> Vec<&Subzone> {
        self.subzones
            .iter()
            .filter(|subzone| subzone.account == *account)
            .collect()
    }

    /// ARN of the delegation role of a subzone, in the root account.
    pub fn delegation_role_arn(&self, subzone: &Subzone) -> String {
        role_arn(&self.root.account, &subzone.delegation_role_name)
    }
}
