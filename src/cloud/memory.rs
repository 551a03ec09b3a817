// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

//! An in-memory cloud with the behavior the reconcilers depend on: zone and
//! record bookkeeping, KSK lifecycle rules, role trust and inline policy
//! enforcement for assumed roles. Used by tests and dry runs without
//! credentials.

use super::{
    AccountSession, DnssecState, HostedZone, HostedZones, KeySigningKey, KskStatus, Parameters,
    RoleState, Roles, SessionFactory, SigningKeys,
};
use crate::common::Error;
use crate::config::naming::role_arn;
use crate::config::{AccountId, Environment};
use crate::dnssec::SigningKeySpec;
use crate::iam::{PolicyDocument, RoleSpec};
use crate::records::{Change, ChangeAction, RecordSet, RecordType, DELEGATION_TTL};
use crate::zone::{HostedZoneId, ZoneName};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug)]
struct ZoneState {
    name: ZoneName,
    name_servers: Vec<String>,
    records: BTreeMap<(String, RecordType), RecordSet>,
    dnssec: DnssecState,
}

#[derive(Clone, Debug)]
struct KeyState {
    key_spec: String,
    policy: String,
}

#[derive(Clone, Debug)]
struct StoredRole {
    arn: String,
    trust_policy: String,
    inline_policies: BTreeMap<String, String>,
}

#[derive(Default)]
struct AccountState {
    zones: BTreeMap<HostedZoneId, ZoneState>,
    roles: BTreeMap<String, StoredRole>,
    /// By ARN.
    keys: BTreeMap<String, KeyState>,
    /// (region, alias) → key ARN.
    aliases: BTreeMap<(String, String), String>,
    /// (region, name) → value.
    parameters: BTreeMap<(String, String), String>,
}

#[derive(Default)]
struct CloudState {
    accounts: BTreeMap<AccountId, AccountState>,
    counter: u64,
    calls: Vec<String>,
    failures: Vec<String>,
}

impl CloudState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// Shared in-memory state of every account. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<CloudState>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CloudState>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::String("memory cloud state poisoned".to_owned()))
    }

    /// Adds an existing zone, e.g. the imported toplevel zone.
    pub fn with_zone(self, account: &AccountId, id: &HostedZoneId, name: &ZoneName) -> Self {
        if let Ok(mut state) = self.lock() {
            let n = state.next();
            let zone = new_zone(name, n);
            state
                .accounts
                .entry(account.clone())
                .or_default()
                .zones
                .insert(id.clone(), zone);
        }
        self
    }

    /// Every later call whose log line contains `pattern` fails.
    pub fn fail_on(&self, pattern: &str) {
        if let Ok(mut state) = self.lock() {
            state.failures.push(pattern.to_owned());
        }
    }

    /// Log of every call, `{account}/{region} {operation} {argument}`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Calls whose log line contains `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(pattern))
            .collect()
    }

    /// Records of a zone, sorted by name and type.
    pub fn records(&self, account: &AccountId, zone: &HostedZoneId) -> Vec<RecordSet> {
        self.lock()
            .ok()
            .and_then(|state| {
                let zone = state.accounts.get(account)?.zones.get(zone)?;
                Some(zone.records.values().cloned().collect())
            })
            .unwrap_or_default()
    }

    /// Zone by name in `account`.
    pub fn zone(&self, account: &AccountId, name: &ZoneName) -> Option<HostedZone> {
        let state = self.lock().ok()?;
        state
            .accounts
            .get(account)?
            .zones
            .iter()
            .find(|(_, zone)| zone.name == *name)
            .map(|(id, zone)| HostedZone {
                id: id.clone(),
                name: zone.name.clone(),
                name_servers: zone.name_servers.clone(),
            })
    }

    pub fn dnssec_state(&self, account: &AccountId, zone: &HostedZoneId) -> Option<DnssecState> {
        let state = self.lock().ok()?;
        Some(state.accounts.get(account)?.zones.get(zone)?.dnssec.clone())
    }

    pub fn parameter(&self, account: &AccountId, region: &str, name: &str) -> Option<String> {
        let state = self.lock().ok()?;
        state
            .accounts
            .get(account)?
            .parameters
            .get(&(region.to_owned(), name.to_owned()))
            .cloned()
    }

    /// Role with decoded policies.
    pub fn role(&self, account: &AccountId, name: &str) -> Option<RoleState> {
        let state = self.lock().ok()?;
        let role = state.accounts.get(account)?.roles.get(name)?;
        Some(RoleState {
            arn: role.arn.clone(),
            trust_policy: role.trust_policy.clone(),
            inline_policies: role.inline_policies.clone(),
        })
    }

    /// Number of KMS keys in `account`.
    pub fn key_count(&self, account: &AccountId) -> usize {
        self.lock()
            .ok()
            .and_then(|state| Some(state.accounts.get(account)?.keys.len()))
            .unwrap_or(0)
    }

    fn api(&self, environment: &Environment, permissions: Option<PolicyDocument>) -> Result<AccountSession, Error> {
        let account = environment.account("open a session")?.clone();
        let api = Arc::new(MemoryApi {
            cloud: self.clone(),
            account,
            region: environment.region.clone(),
            permissions,
        });
        Ok(AccountSession {
            environment: environment.clone(),
            zones: api.clone(),
            roles: api.clone(),
            keys: api.clone(),
            parameters: api,
        })
    }
}

#[async_trait]
impl SessionFactory for MemoryCloud {
    async fn session(&self, environment: &Environment) -> Result<AccountSession, Error> {
        self.api(environment, None)
    }

    async fn delegated(
        &self,
        from: &Environment,
        role_arn: &str,
    ) -> Result<AccountSession, Error> {
        let caller = from.account("assume a delegation role")?.clone();
        let denied = || {
            Error::Denied(format!(
                "{} is not authorized to perform sts:AssumeRole on {role_arn}",
                caller.root_arn()
            ))
        };
        let (account, name) = parse_role_arn(role_arn).ok_or_else(denied)?;
        let (trust, inline) = {
            let state = self.lock()?;
            let role = state
                .accounts
                .get(&account)
                .and_then(|a| a.roles.get(&name))
                .ok_or_else(denied)?;
            (role.trust_policy.clone(), role.inline_policies.clone())
        };
        if !PolicyDocument::parse(&trust)?.trusts(&caller.root_arn()) {
            return Err(denied());
        }
        let mut statements = Vec::new();
        for document in inline.values() {
            statements.extend(PolicyDocument::parse(document)?.statement);
        }
        self.api(
            &Environment::new(account, &from.region),
            Some(PolicyDocument::new(statements)),
        )
    }
}

fn parse_role_arn(arn: &str) -> Option<(AccountId, String)> {
    let rest = arn.strip_prefix("arn:aws:iam::")?;
    let (account, role) = rest.split_once(":role/")?;
    Some((account.parse().ok()?, role.to_owned()))
}

fn new_zone(name: &ZoneName, n: u64) -> ZoneState {
    let name_servers: Vec<String> = (0..4)
        .map(|i| format!("ns-{}.awsdns-{:02}.{}", n * 4 + i, n % 64, ["com", "net", "org", "co.uk"][i as usize]))
        .collect();
    let mut records = BTreeMap::new();
    let ns = RecordSet::new(name.as_str(), RecordType::Ns, DELEGATION_TTL, name_servers.clone());
    let soa = RecordSet::new(
        name.as_str(),
        RecordType::Soa,
        900,
        vec![format!(
            "{}. awsdns-hostmaster.amazon.com. 1 7200 900 1209600 86400",
            name_servers[0]
        )],
    );
    records.insert((ns.name.clone(), RecordType::Ns), ns);
    records.insert((soa.name.clone(), RecordType::Soa), soa);
    ZoneState {
        name: name.clone(),
        name_servers,
        records,
        dnssec: DnssecState::default(),
    }
}

/// DS value Route53 would compute for a KSK: ECDSAP256SHA256 with a SHA-256
/// digest.
fn ds_value(zone: &ZoneName, ksk: &str, kms_arn: &str) -> String {
    let digest = Sha256::new()
        .chain_update(zone.as_bytes())
        .chain_update(ksk.as_bytes())
        .chain_update(kms_arn.as_bytes())
        .finalize();
    let key_tag = u16::from_be_bytes([digest[0], digest[1]]);
    format!("{key_tag} 13 2 {}", hex::encode_upper(digest))
}

/// One account and region, optionally restricted to the statements of an
/// assumed role.
struct MemoryApi {
    cloud: MemoryCloud,
    account: AccountId,
    region: String,
    permissions: Option<PolicyDocument>,
}

impl MemoryApi {
    /// Logs the call, applies injected failures and permissions, then runs
    /// `f` on the account state.
    fn call<T>(
        &self,
        operation: &str,
        argument: &str,
        action: &str,
        resource: &str,
        f: impl FnOnce(&mut AccountState, &mut u64) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let line = format!("{}/{} {operation} {argument}", self.account, self.region);
        let mut state = self.cloud.lock()?;
        state.calls.push(line.clone());
        if state.failures.iter().any(|pattern| line.contains(pattern)) {
            return Err(Error::String(format!("injected failure: {line}")));
        }
        if let Some(permissions) = &self.permissions {
            if !permissions.allows(action, resource) {
                return Err(Error::Denied(format!(
                    "not authorized to perform {action} on {resource}"
                )));
            }
        }
        let CloudState {
            accounts, counter, ..
        } = &mut *state;
        f(accounts.entry(self.account.clone()).or_default(), counter)
    }

    fn zone<'s>(
        account: &'s mut AccountState,
        id: &HostedZoneId,
    ) -> Result<&'s mut ZoneState, Error> {
        account
            .zones
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("hosted zone {id}")))
    }

    fn ksk<'s>(zone: &'s mut ZoneState, name: &str) -> Result<&'s mut KeySigningKey, Error> {
        zone.dnssec
            .key_signing_keys
            .iter_mut()
            .find(|k| k.name == name)
            .ok_or_else(|| Error::NotFound(format!("key signing key {name}")))
    }
}

#[async_trait]
impl HostedZones for MemoryApi {
    async fn find_zone(&self, name: &ZoneName) -> Result<Option<HostedZone>, Error> {
        self.call("find_zone", name, "route53:ListHostedZonesByName", "*", |account, _| {
            Ok(account
                .zones
                .iter()
                .find(|(_, zone)| zone.name == *name)
                .map(|(id, zone)| HostedZone {
                    id: id.clone(),
                    name: zone.name.clone(),
                    name_servers: zone.name_servers.clone(),
                }))
        })
    }

    async fn create_zone(
        &self,
        name: &ZoneName,
        _caller_reference: &str,
        _tags: &[(String, String)],
    ) -> Result<HostedZone, Error> {
        self.call("create_zone", name, "route53:CreateHostedZone", "*", |account, counter| {
            if account.zones.values().any(|zone| zone.name == *name) {
                return Err(Error::String(format!("hosted zone {name} already exists")));
            }
            *counter += 1;
            let id: HostedZoneId = format!("Z{:010}", *counter).parse()?;
            let zone = new_zone(name, *counter);
            let hosted = HostedZone {
                id: id.clone(),
                name: name.clone(),
                name_servers: zone.name_servers.clone(),
            };
            account.zones.insert(id, zone);
            Ok(hosted)
        })
    }

    async fn list_records(&self, zone: &HostedZoneId) -> Result<Vec<RecordSet>, Error> {
        self.call(
            "list_records",
            zone,
            "route53:ListResourceRecordSets",
            &zone.arn(),
            |account, _| Ok(Self::zone(account, zone)?.records.values().cloned().collect()),
        )
    }

    async fn change_records(
        &self,
        zone: &HostedZoneId,
        changes: &[Change],
        _comment: &str,
    ) -> Result<(), Error> {
        let argument = format!("{zone} {}", changes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("; "));
        self.call(
            "change_records",
            &argument,
            "route53:ChangeResourceRecordSets",
            &zone.arn(),
            |account, _| {
                let state = Self::zone(account, zone)?;
                // All or nothing.
                let mut records = state.records.clone();
                for change in changes {
                    let record = &change.record;
                    if !state.name.contains(&record.name) {
                        return Err(Error::String(format!(
                            "{} is not in zone {}",
                            record.name, state.name
                        )));
                    }
                    let key = (record.name.clone(), record.record_type);
                    match change.action {
                        ChangeAction::Create => {
                            if records.contains_key(&key) {
                                return Err(Error::String(format!("{record} already exists")));
                            }
                            records.insert(key, record.clone());
                        }
                        ChangeAction::Upsert => {
                            records.insert(key, record.clone());
                        }
                        ChangeAction::Delete => {
                            if records.get(&key) != Some(record) {
                                return Err(Error::String(format!(
                                    "{record} not found with matching values"
                                )));
                            }
                            if record.name == state.name.as_str()
                                && matches!(record.record_type, RecordType::Soa | RecordType::Ns)
                            {
                                return Err(Error::String(format!(
                                    "apex {} of {} cannot be deleted",
                                    record.record_type, state.name
                                )));
                            }
                            records.remove(&key);
                        }
                    }
                }
                state.records = records;
                Ok(())
            },
        )
    }

    async fn dnssec(&self, zone: &HostedZoneId) -> Result<DnssecState, Error> {
        self.call("dnssec", zone, "route53:GetDNSSEC", &zone.arn(), |account, _| {
            Ok(Self::zone(account, zone)?.dnssec.clone())
        })
    }

    async fn create_ksk(
        &self,
        zone: &HostedZoneId,
        name: &str,
        kms_arn: &str,
        _caller_reference: &str,
    ) -> Result<(), Error> {
        let key_account = kms_arn
            .split(':')
            .nth(4)
            .and_then(|account| account.parse::<AccountId>().ok());
        let key_known = {
            let state = self.cloud.lock()?;
            key_account
                .and_then(|account| state.accounts.get(&account)?.keys.get(kms_arn).cloned())
                .is_some_and(|key| key.key_spec == crate::dnssec::KEY_SPEC)
        };
        self.call(
            "create_ksk",
            &format!("{zone} {name}"),
            "route53:CreateKeySigningKey",
            &zone.arn(),
            |account, _| {
                if !key_known {
                    return Err(Error::String(format!(
                        "{kms_arn} is not an {} signing key",
                        crate::dnssec::KEY_SPEC
                    )));
                }
                let state = Self::zone(account, zone)?;
                if state.dnssec.ksk(name).is_some() {
                    return Err(Error::String(format!("key signing key {name} already exists")));
                }
                let ds_record = Some(ds_value(&state.name, name, kms_arn));
                state.dnssec.key_signing_keys.push(KeySigningKey {
                    name: name.to_owned(),
                    status: KskStatus::Active,
                    kms_arn: kms_arn.to_owned(),
                    ds_record,
                });
                Ok(())
            },
        )
    }

    async fn set_ksk_active(
        &self,
        zone: &HostedZoneId,
        name: &str,
        active: bool,
    ) -> Result<(), Error> {
        let action = if active {
            "route53:ActivateKeySigningKey"
        } else {
            "route53:DeactivateKeySigningKey"
        };
        self.call("set_ksk_active", &format!("{zone} {name} {active}"), action, &zone.arn(), |account, _| {
            let state = Self::zone(account, zone)?;
            let last_active = state.dnssec.signing && state.dnssec.active_keys().count() == 1;
            let ksk = Self::ksk(state, name)?;
            if !active && last_active && ksk.status == KskStatus::Active {
                return Err(Error::String(format!(
                    "key signing key {name} is in use by a signing zone"
                )));
            }
            ksk.status = if active {
                KskStatus::Active
            } else {
                KskStatus::Inactive
            };
            Ok(())
        })
    }

    async fn delete_ksk(&self, zone: &HostedZoneId, name: &str) -> Result<(), Error> {
        self.call(
            "delete_ksk",
            &format!("{zone} {name}"),
            "route53:DeleteKeySigningKey",
            &zone.arn(),
            |account, _| {
                let state = Self::zone(account, zone)?;
                if Self::ksk(state, name)?.status == KskStatus::Active {
                    return Err(Error::String(format!("key signing key {name} is active")));
                }
                state.dnssec.key_signing_keys.retain(|k| k.name != name);
                Ok(())
            },
        )
    }

    async fn set_dnssec(&self, zone: &HostedZoneId, enabled: bool) -> Result<(), Error> {
        let action = if enabled {
            "route53:EnableHostedZoneDNSSEC"
        } else {
            "route53:DisableHostedZoneDNSSEC"
        };
        self.call("set_dnssec", &format!("{zone} {enabled}"), action, &zone.arn(), |account, _| {
            let state = Self::zone(account, zone)?;
            if enabled && state.dnssec.active_keys().next().is_none() {
                return Err(Error::String(format!(
                    "zone {} has no active key signing key",
                    state.name
                )));
            }
            state.dnssec.signing = enabled;
            Ok(())
        })
    }
}

#[async_trait]
impl Roles for MemoryApi {
    async fn get_role(&self, name: &str) -> Result<Option<RoleState>, Error> {
        let arn = role_arn(&self.account, name);
        self.call("get_role", name, "iam:GetRole", &arn, |account, _| {
            // IAM returns URL-encoded policies.
            Ok(account.roles.get(name).map(|role| RoleState {
                arn: role.arn.clone(),
                trust_policy: urlencoding::encode(&role.trust_policy).into_owned(),
                inline_policies: role
                    .inline_policies
                    .iter()
                    .map(|(k, v)| (k.clone(), urlencoding::encode(v).into_owned()))
                    .collect(),
            }))
        })
    }

    async fn create_role(&self, spec: &RoleSpec) -> Result<String, Error> {
        let arn = role_arn(&self.account, &spec.name);
        let trust_policy = spec.trust_policy.to_json()?;
        self.call("create_role", &spec.name, "iam:CreateRole", &arn, |account, _| {
            if account.roles.contains_key(&spec.name) {
                return Err(Error::String(format!("role {} already exists", spec.name)));
            }
            account.roles.insert(
                spec.name.clone(),
                StoredRole {
                    arn: arn.clone(),
                    trust_policy,
                    inline_policies: BTreeMap::new(),
                },
            );
            Ok(arn.clone())
        })
    }

    async fn update_trust_policy(&self, name: &str, document: &str) -> Result<(), Error> {
        let arn = role_arn(&self.account, name);
        self.call("update_trust_policy", name, "iam:UpdateAssumeRolePolicy", &arn, |account, _| {
            let role = account
                .roles
                .get_mut(name)
                .ok_or_else(|| Error::NotFound(format!("role {name}")))?;
            role.trust_policy = document.to_owned();
            Ok(())
        })
    }

    async fn put_inline_policy(
        &self,
        name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), Error> {
        let arn = role_arn(&self.account, name);
        self.call(
            "put_inline_policy",
            &format!("{name} {policy_name}"),
            "iam:PutRolePolicy",
            &arn,
            |account, _| {
                let role = account
                    .roles
                    .get_mut(name)
                    .ok_or_else(|| Error::NotFound(format!("role {name}")))?;
                role.inline_policies
                    .insert(policy_name.to_owned(), document.to_owned());
                Ok(())
            },
        )
    }

    async fn delete_inline_policy(&self, name: &str, policy_name: &str) -> Result<(), Error> {
        let arn = role_arn(&self.account, name);
        self.call(
            "delete_inline_policy",
            &format!("{name} {policy_name}"),
            "iam:DeleteRolePolicy",
            &arn,
            |account, _| {
                account
                    .roles
                    .get_mut(name)
                    .and_then(|role| role.inline_policies.remove(policy_name))
                    .map(|_| ())
                    .ok_or_else(|| Error::NotFound(format!("policy {policy_name} of role {name}")))
            },
        )
    }
}

#[async_trait]
impl SigningKeys for MemoryApi {
    async fn describe_alias(&self, alias: &str) -> Result<Option<String>, Error> {
        let region = self.region.clone();
        self.call("describe_alias", alias, "kms:DescribeKey", "*", |account, _| {
            Ok(account.aliases.get(&(region, alias.to_owned())).cloned())
        })
    }

    async fn create_key(&self, spec: &SigningKeySpec) -> Result<String, Error> {
        let policy = spec.policy.to_json()?;
        let (region, owner) = (self.region.clone(), self.account.clone());
        self.call("create_key", &spec.alias, "kms:CreateKey", "*", |account, counter| {
            *counter += 1;
            let arn = format!("arn:aws:kms:{region}:{owner}:key/mrk-{:032x}", *counter);
            account.keys.insert(
                arn.clone(),
                KeyState {
                    key_spec: spec.key_spec.clone(),
                    policy,
                },
            );
            Ok(arn)
        })
    }

    async fn create_alias(&self, alias: &str, key_arn: &str) -> Result<(), Error> {
        let region = self.region.clone();
        self.call("create_alias", alias, "kms:CreateAlias", key_arn, |account, _| {
            let key = (region, alias.to_owned());
            if account.aliases.contains_key(&key) {
                return Err(Error::String(format!("alias {alias} already exists")));
            }
            account.aliases.insert(key, key_arn.to_owned());
            Ok(())
        })
    }

    async fn key_policy(&self, key_arn: &str) -> Result<String, Error> {
        self.call("key_policy", key_arn, "kms:GetKeyPolicy", key_arn, |account, _| {
            account
                .keys
                .get(key_arn)
                .map(|key| key.policy.clone())
                .ok_or_else(|| Error::NotFound(format!("key {key_arn}")))
        })
    }

    async fn put_key_policy(&self, key_arn: &str, document: &str) -> Result<(), Error> {
        self.call("put_key_policy", key_arn, "kms:PutKeyPolicy", key_arn, |account, _| {
            let key = account
                .keys
                .get_mut(key_arn)
                .ok_or_else(|| Error::NotFound(format!("key {key_arn}")))?;
            key.policy = document.to_owned();
            Ok(())
        })
    }
}

#[async_trait]
impl Parameters for MemoryApi {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, Error> {
        let region = self.region.clone();
        self.call("get_parameter", name, "ssm:GetParameter", name, |account, _| {
            Ok(account.parameters.get(&(region, name.to_owned())).cloned())
        })
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), Error> {
        let region = self.region.clone();
        self.call(
            "put_parameter",
            &format!("{name}={value}"),
            "ssm:PutParameter",
            name,
            |account, _| {
                account
                    .parameters
                    .insert((region, name.to_owned()), value.to_owned());
                Ok(())
            },
        )
    }
}
