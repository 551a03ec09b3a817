// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{AccountId, Environment};
use crate::common::{Error, Settings};
use crate::dnssec::DsRecordValue;
use crate::records::RecordType;
use crate::serde_utils::is_default;
use crate::zone::{is_valid_label, HostedZoneId, ZoneName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Branch used when `BRANCH_NAME` is not set.
pub const DEFAULT_BRANCH: &str = "main";

const BUILTIN: &str = include_str!("configurations.toml");

/// An extra record in a zone. `name` is relative to the zone; empty is the
/// apex.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RecordConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

/// One delegated account subdomain.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SubdomainConfiguration {
    pub environment: Environment,
    /// Used as the subdomain label: `my-test` results in a zone for
    /// `my-test.<toplevel zone>`. Also names the delegation role and KSK.
    pub name: String,
    /// Whether the subdomain is signed.
    pub enable_dns_sec: bool,
    /// Whether the DS record of the subdomain is added to the root zone
    /// (defaults to `true`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_ds_record: Option<bool>,
    /// Regions (besides the environment region) that receive copies of the
    /// hosted zone parameters.
    #[serde(default, skip_serializing_if = "is_default")]
    pub additional_regions: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub records: Vec<RecordConfig>,
    /// Name of the deployment stage when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_stage_name: Option<String>,
}

impl SubdomainConfiguration {
    /// `add_ds_record`, defaulting to `true`.
    pub fn add_ds_record(&self) -> bool {
        self.add_ds_record.unwrap_or(true)
    }

    /// `overwrite_stage_name` or `name`.
    pub fn stage_name(&self) -> &str {
        self.overwrite_stage_name.as_deref().unwrap_or(&self.name)
    }

    /// `{name}.{root}`
    pub fn zone_name(&self, root: &ZoneName) -> Result<ZoneName, Error> {
        root.child(&self.name)
    }
}

/// The IAM account whose users may assume the `dns-manager` role.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DnsManagerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_account: Option<AccountId>,
}

impl DnsManagerConfig {
    /// `iam_account`, or an error.
    pub fn account(&self) -> Result<&AccountId, Error> {
        self.iam_account.as_ref().ok_or_else(|| {
            Error::Config("No account provided, could not trust the IAM account".to_owned())
        })
    }
}

/// Everything deployed for one branch.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Configuration {
    /// The Git branch for which this configuration is applicable.
    pub branch_name: String,
    /// Source connection of the deployment pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_star_connection_arn: Option<String>,
    /// Deployment (build) account.
    pub deployment_environment: Environment,
    /// Account holding the toplevel hosted zone.
    pub toplevel_hostedzone_environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toplevel_hostedzone_id: Option<HostedZoneId>,
    pub toplevel_hostedzone_name: ZoneName,
    #[serde(default)]
    pub subdomains: Vec<SubdomainConfiguration>,
    /// CNAME records for the toplevel zone. Names are relative: do not add
    /// the toplevel zone suffix.
    #[serde(default, skip_serializing_if = "is_default")]
    pub cname_records: BTreeMap<String, String>,
    /// DS records for the toplevel zone, for subdomains signed outside this
    /// configuration. Names are relative. A subdomain that registers the DS
    /// record of its own KSK overrides its entry here.
    #[serde(default, skip_serializing_if = "is_default")]
    pub ds_records: BTreeMap<String, String>,
    /// Other records for the toplevel zone.
    #[serde(default, skip_serializing_if = "is_default")]
    pub records: Vec<RecordConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_manager: Option<DnsManagerConfig>,
}

#[derive(Default, Deserialize)]
struct ConfigurationTable {
    #[serde(default)]
    branches: BTreeMap<String, Configuration>,
}

impl Configuration {
    /// The configuration compiled into the crate for `branch`.
    pub fn builtin(branch: &str) -> Result<Configuration, Error> {
        let table: ConfigurationTable = toml::from_str(BUILTIN)
            .map_err(|e| Error::Config(format!("builtin configurations: {e}")))?;
        Self::select(table, branch)
    }

    /// The configuration for `branch`; `[branches.<branch>]` in the settings
    /// takes precedence over the builtin table. The result is validated.
    pub fn for_branch(settings: &Settings, branch: &str) -> Result<Configuration, Error> {
        let table: ConfigurationTable = settings.get()?;
        let configuration = if table.branches.contains_key(branch) {
            Self::select(table, branch)?
        } else {
            Self::builtin(branch)?
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// `for_branch` with the branch taken from `BRANCH_NAME`.
    pub fn from_env(settings: &Settings) -> Result<Configuration, Error> {
        let branch = std::env::var("BRANCH_NAME").unwrap_or_else(|_| DEFAULT_BRANCH.to_string());
        Self::for_branch(settings, &branch)
    }

    fn select(mut table: ConfigurationTable, branch: &str) -> Result<Configuration, Error> {
        table.branches.remove(branch).ok_or_else(|| {
            Error::Config(format!(
                "No configuration for branch {branch} found. Add a configuration in configurations.toml"
            ))
        })
    }

    /// Account of the toplevel hosted zone.
    pub fn root_account(&self) -> Result<&AccountId, Error> {
        self.toplevel_hostedzone_environment
            .account("manage the toplevel hosted zone")
    }

    /// Id of the toplevel hosted zone.
    pub fn root_zone_id(&self) -> Result<&HostedZoneId, Error> {
        self.toplevel_hostedzone_id.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "No hosted zone id provided for {}",
                self.toplevel_hostedzone_name
            ))
        })
    }

    /// Subdomain by name.
    pub fn subdomain(&self, name: &str) -> Option<&SubdomainConfiguration> {
        self.subdomains.iter().find(|s| s.name == name)
    }

    /// Whether the DS record of `name` in the toplevel zone is registered
    /// from the live KSK of a configured subdomain.
    pub fn registers_ds(&self, name: &str) -> bool {
        self.subdomain(name)
            .is_some_and(|s| s.enable_dns_sec && s.add_ds_record())
    }

    /// Checks everything that would otherwise only fail halfway through a
    /// deployment. All problems are reported at once.
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems: Vec<String> = Vec::new();
        let root = &self.toplevel_hostedzone_name;

        if let Err(e) = self.root_account() {
            problems.push(e.to_string());
        }
        if let Err(e) = self.root_zone_id() {
            problems.push(e.to_string());
        }
        if let Some(Err(e)) = self.dns_manager.as_ref().map(DnsManagerConfig::account) {
            problems.push(e.to_string());
        }

        let mut names = BTreeSet::new();
        // Parameters and the signing key are per account.
        let mut owners: BTreeMap<&AccountId, &str> = BTreeMap::new();
        for subdomain in &self.subdomains {
            let name = &subdomain.name;
            if !names.insert(name.as_str()) {
                problems.push(format!("subdomain {name} is configured more than once"));
            }
            if !is_valid_label(name) {
                problems.push(format!("subdomain {name} is not a valid DNS label"));
            }
            match &subdomain.environment.account {
                None => problems.push(format!("subdomain {name} has no account")),
                Some(account) => match owners.get(account) {
                    Some(owner) if *owner != name.as_str() => problems.push(format!(
                        "subdomains {owner} and {name} share account {account}"
                    )),
                    Some(_) => {}
                    None => {
                        owners.insert(account, name);
                    }
                },
            }
            let mut regions = BTreeSet::new();
            for region in &subdomain.additional_regions {
                if region.is_empty() || !regions.insert(region) {
                    problems.push(format!("subdomain {name}: invalid or duplicate region '{region}'"));
                }
            }
            if let Ok(zone) = subdomain.zone_name(root) {
                for record in &subdomain.records {
                    problems.extend(Self::check_record(&zone, record));
                }
            }
        }

        for (name, value) in &self.ds_records {
            if let Err(e) = value.parse::<DsRecordValue>() {
                problems.push(format!("DS record {name}: {e}"));
            }
            problems.extend(Self::check_relative(root, name, "DS"));
        }
        for (name, target) in &self.cname_records {
            problems.extend(Self::check_relative(root, name, "CNAME"));
            if target.trim().is_empty() {
                problems.push(format!("CNAME record {name} has no target"));
            }
        }
        for record in &self.records {
            problems.extend(Self::check_record(root, record));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "branch {}: {}",
                self.branch_name,
                problems.join("; ")
            )))
        }
    }

    fn check_relative(root: &ZoneName, name: &str, kind: &str) -> Option<String> {
        if !name.trim().is_empty() && root.relative(name).is_some() {
            Some(format!("{kind} record {name} must not include the {root} suffix"))
        } else if name.trim().is_empty() {
            Some(format!("{kind} record without name"))
        } else {
            None
        }
    }

    fn check_record(zone: &ZoneName, record: &RecordConfig) -> Vec<String> {
        let mut problems = Vec::new();
        if record.values.is_empty() {
            problems.push(format!(
                "{} record {} in {zone} has no values",
                record.record_type, record.name
            ));
        }
        if !record.record_type.is_managed() {
            problems.push(format!(
                "{} records in {zone} cannot be managed",
                record.record_type
            ));
        }
        if record.record_type == RecordType::Ds {
            for value in &record.values {
                if let Err(e) = value.parse::<DsRecordValue>() {
                    problems.push(format!("DS record {} in {zone}: {e}", record.name));
                }
            }
        }
        problems
    }
}
