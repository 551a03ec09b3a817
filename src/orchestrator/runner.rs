// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{Plan, Step};
use crate::cloud::{AccountSession, HostedZone, Parameters, SessionFactory};
use crate::common::{Error, DEFAULT_MAX_PARALLEL};
use crate::config::naming::{
    tags, DNSSEC_KEY_REGION, DNSSEC_KMS_KEY_ALIAS, SSM_DNS_MANAGER_ROLE_ARN, SSM_HOSTED_ZONE_ID,
    SSM_HOSTED_ZONE_NAME,
};
use crate::config::{AccountId, Environment};
use crate::dnssec::{is_ksk_of, ksk_name, KeyManager};
use crate::iam::{delegation_role, dns_manager_role, RoleManager};
use crate::log::StringLogger;
use crate::records::{
    desired_root_records, desired_subzone_records, ChangeSet, DiffOptions, Reconciler, RecordSet,
    RecordType, DEFAULT_TTL,
};
use crate::zone::{Subzone, ZoneName};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a run treats the live state.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Read everything, change nothing.
    pub dry_run: bool,
    /// Delete toplevel zone records that are not configured.
    pub prune: bool,
    /// Steps of one wave running at the same time.
    pub max_parallel: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            prune: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StepStatus {
    Succeeded,
    Failed(String),
    /// Not attempted because a dependency did not succeed.
    Skipped(String),
}

/// What happened to every step of a plan.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub dry_run: bool,
    /// In execution order.
    pub steps: Vec<(Step, StepStatus)>,
    /// Record changes per step, applied or (in a dry run) planned.
    pub changes: Vec<(Step, ChangeSet)>,
}

impl RunReport {
    pub fn status(&self, step: &Step) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|(s, _)| s == step)
            .map(|(_, status)| status)
    }

    /// Whether every step succeeded.
    pub fn is_success(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, status)| *status == StepStatus::Succeeded)
    }

    /// Failed and skipped steps.
    pub fn failures(&self) -> Vec<&(Step, StepStatus)> {
        self.steps
            .iter()
            .filter(|(_, status)| *status != StepStatus::Succeeded)
            .collect()
    }

    /// Total number of record changes.
    pub fn change_count(&self) -> usize {
        self.changes.iter().map(|(_, changes)| changes.len()).sum()
    }

    /// A dependency of `step` that did not succeed.
    fn blocking<'p>(&self, plan: &'p Plan, step: &Step) -> Option<&'p Step> {
        plan.dependencies(step)
            .find(|dependency| self.status(dependency) != Some(&StepStatus::Succeeded))
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let succeeded = self.steps.len() - self.failures().len();
        writeln!(
            f,
            "{}{} of {} steps succeeded, {} record changes",
            if self.dry_run { "dry run: " } else { "" },
            succeeded,
            self.steps.len(),
            self.change_count()
        )?;
        for (step, status) in self.failures() {
            match status {
                StepStatus::Failed(reason) => writeln!(f, "  failed {step}: {reason}")?,
                StepStatus::Skipped(reason) => writeln!(f, "  skipped {step}: {reason}")?,
                StepStatus::Succeeded => {}
            }
        }
        Ok(())
    }
}

/// Values produced by one step and used by later ones.
#[derive(Default)]
struct Outputs {
    zones: BTreeMap<String, HostedZone>,
    signing_keys: BTreeMap<AccountId, String>,
}

struct RunContext<'a> {
    plan: &'a Plan,
    root: AccountSession,
    outputs: Mutex<Outputs>,
}

impl RunContext<'_> {
    fn outputs(&self) -> Result<MutexGuard<'_, Outputs>, Error> {
        self.outputs
            .lock()
            .map_err(|_| Error::String("run outputs poisoned".to_owned()))
    }
}

/// Executes plans against the accounts of a session factory.
pub struct Orchestrator {
    factory: Arc<dyn SessionFactory + Send + Sync>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn SessionFactory + Send + Sync>, options: RunOptions) -> Self {
        Self { factory, options }
    }

    /// Runs the plan wave by wave. Steps of a wave run concurrently; a step
    /// whose dependency did not succeed is skipped. Only failing to reach
    /// the root account or an invalid plan is an error, step failures are
    /// reported.
    pub async fn run(&self, plan: &Plan, logger: &StringLogger) -> Result<RunReport, Error> {
        let waves = plan.waves()?;
        let root = self
            .factory
            .session(&plan.registry().root().environment)
            .await?;
        let context = RunContext {
            plan,
            root,
            outputs: Mutex::new(Outputs::default()),
        };
        let mut report = RunReport {
            dry_run: self.options.dry_run,
            ..Default::default()
        };
        for (i, wave) in waves.into_iter().enumerate() {
            let names: Vec<String> = wave.iter().map(|s| s.to_string()).collect();
            logger.trace(format!("wave {}: {}", i + 1, names.join(", ")));
            let order: BTreeMap<Step, usize> =
                wave.iter().cloned().enumerate().map(|(i, s)| (s, i)).collect();
            let context = &context;
            let finished = &report;
            let mut results: Vec<(Step, StringLogger, Result<ChangeSet, Error>)> =
                stream::iter(wave)
                    .map(|step| async move {
                        let child = logger.child();
                        let result = match finished.blocking(context.plan, &step) {
                            Some(dependency) => Err(Error::Dependency(format!(
                                "{dependency} did not succeed"
                            ))),
                            None => self.execute(&step, context, &child).await,
                        };
                        (step, child, result)
                    })
                    .buffer_unordered(self.options.max_parallel.max(1))
                    .collect()
                    .await;
            results.sort_by_key(|(step, _, _)| order.get(step).copied());
            for (step, child, result) in results {
                let status = match result {
                    Err(Error::Dependency(reason)) => {
                        logger.warn(format!("{step} skipped: {reason}"));
                        StepStatus::Skipped(reason)
                    }
                    result => match logger.append(&step.to_string(), &child, result) {
                        Ok(changes) => {
                            if !changes.is_empty() {
                                report.changes.push((step.clone(), changes));
                            }
                            StepStatus::Succeeded
                        }
                        Err(e) => StepStatus::Failed(e.to_string()),
                    },
                };
                report.steps.push((step, status));
            }
        }
        Ok(report)
    }

    async fn execute(
        &self,
        step: &Step,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let registry = context.plan.registry();
        match step {
            Step::DnsManagerRole => self.dns_manager_role(context, logger).await,
            Step::DelegationRole(name) => {
                let subzone = registry.require(name)?;
                let spec =
                    delegation_role(&registry.root().zone_arn(), &subzone.environment, name)?;
                RoleManager::new(context.root.roles.as_ref())
                    .dry_run(self.options.dry_run)
                    .reconcile(&spec, logger)
                    .await?;
                Ok(ChangeSet::default())
            }
            Step::RootRecords => self.root_records(context, logger).await,
            Step::Subzone(name) => self.subzone(registry.require(name)?, context, logger).await,
            Step::SigningKey(account) => self.signing_key(account, context, logger).await,
            Step::KeySigningKey(name) => {
                self.key_signing_key(registry.require(name)?, context, logger)
                    .await
            }
            Step::EnableDnssec(name) => {
                self.enable_dnssec(registry.require(name)?, context, logger)
                    .await
            }
            Step::DisableDnssec(name) => {
                self.disable_dnssec(registry.require(name)?, context, logger)
                    .await
            }
            Step::RegisterDs(name) => {
                self.register_ds(registry.require(name)?, context, logger)
                    .await
            }
            Step::ReplicateParameters(name, region) => {
                self.replicate_parameters(registry.require(name)?, region, context, logger)
                    .await
            }
            Step::SubzoneRecords(name) => {
                self.subzone_records(registry.require(name)?, context, logger)
                    .await
            }
        }
    }

    /// In a dry run a missing prerequisite is expected, otherwise it means a
    /// dependency did not do its job.
    fn missing(&self, what: String, logger: &StringLogger) -> Result<ChangeSet, Error> {
        if self.options.dry_run {
            logger.trace(format!("{what} does not exist yet"));
            Ok(ChangeSet::default())
        } else {
            Err(Error::Dependency(format!("{what} does not exist")))
        }
    }

    /// Writes a parameter if its value differs.
    async fn publish(
        &self,
        parameters: &(dyn Parameters + Send + Sync),
        name: &str,
        value: &str,
        logger: &StringLogger,
    ) -> Result<(), Error> {
        if parameters.get_parameter(name).await?.as_deref() == Some(value) {
            return Ok(());
        }
        if self.options.dry_run {
            logger.trace(format!("parameter {name} would be set to {value}"));
        } else {
            parameters.put_parameter(name, value).await?;
            logger.trace(format!("parameter {name} = {value}"));
        }
        Ok(())
    }

    /// The hosted zone of `subzone`, from an earlier step or looked up.
    async fn zone_of(
        &self,
        subzone: &Subzone,
        session: &AccountSession,
        context: &RunContext<'_>,
    ) -> Result<Option<HostedZone>, Error> {
        if let Some(zone) = context.outputs()?.zones.get(&subzone.name) {
            return Ok(Some(zone.clone()));
        }
        let zone = session.zones.find_zone(&subzone.zone_name).await?;
        if let Some(zone) = &zone {
            context
                .outputs()?
                .zones
                .insert(subzone.name.clone(), zone.clone());
        }
        Ok(zone)
    }

    /// Clients for the DNSSEC key region of `account`.
    async fn key_session(&self, account: &AccountId) -> Result<AccountSession, Error> {
        self.factory
            .session(&Environment::new(account.clone(), DNSSEC_KEY_REGION))
            .await
    }

    /// Writes one record into the toplevel zone through the delegation role
    /// of `subzone`, reading with the root account.
    async fn register(
        &self,
        subzone: &Subzone,
        record: RecordSet,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let registry = context.plan.registry();
        let delegated = self
            .factory
            .delegated(&subzone.environment, &registry.delegation_role_arn(subzone))
            .await?;
        let change = Reconciler::new(delegated.zones.as_ref())
            .reading_from(context.root.zones.as_ref())
            .ensure(
                &registry.root().zone_id,
                record,
                self.options.dry_run,
                logger,
            )
            .await?;
        Ok(ChangeSet {
            changes: change.into_iter().collect(),
        })
    }

    async fn dns_manager_role(
        &self,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let configuration = context.plan.configuration();
        let Some(dns_manager) = &configuration.dns_manager else {
            return Ok(ChangeSet::default());
        };
        let spec = dns_manager_role(
            &context.plan.registry().root().account,
            dns_manager.account()?,
        );
        let outcome = RoleManager::new(context.root.roles.as_ref())
            .dry_run(self.options.dry_run)
            .reconcile(&spec, logger)
            .await?;
        if !outcome.arn.is_empty() {
            self.publish(
                context.root.parameters.as_ref(),
                SSM_DNS_MANAGER_ROLE_ARN,
                &outcome.arn,
                logger,
            )
            .await?;
        }
        Ok(ChangeSet::default())
    }

    async fn root_records(
        &self,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let registry = context.plan.registry();
        let root = registry.root();
        let configuration = context.plan.configuration();
        for name in configuration.ds_records.keys() {
            if configuration.registers_ds(name) {
                logger.warn(format!(
                    "DS record {name} is registered from its KSK, the configured value is ignored"
                ));
            }
        }
        let desired = desired_root_records(configuration)?;
        // Delegations and DS records of configured subzones belong to their
        // subzone steps.
        let mut options = DiffOptions::new(root.zone_name.clone()).prune(self.options.prune);
        for subzone in registry.subzones() {
            options = options
                .protect(subzone.zone_name.as_str(), RecordType::Ns)
                .protect(subzone.zone_name.as_str(), RecordType::Ds);
        }
        Reconciler::new(context.root.zones.as_ref())
            .reconcile(
                &root.zone_id,
                &desired,
                &options,
                self.options.dry_run,
                logger,
            )
            .await
    }

    async fn subzone(
        &self,
        subzone: &Subzone,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.factory.session(&subzone.environment).await?;
        let zone = match self.zone_of(subzone, &session, context).await? {
            Some(zone) => {
                logger.trace(format!("zone {}: exists as {}", zone.name, zone.id));
                zone
            }
            None if self.options.dry_run => {
                logger.trace(format!("zone {} would be created", subzone.zone_name));
                return Ok(ChangeSet::default());
            }
            None => {
                let zone = session
                    .zones
                    .create_zone(
                        &subzone.zone_name,
                        &caller_reference(&subzone.zone_name),
                        &tags(),
                    )
                    .await?;
                logger.trace(format!("zone {}: created as {}", zone.name, zone.id));
                context
                    .outputs()?
                    .zones
                    .insert(subzone.name.clone(), zone.clone());
                zone
            }
        };
        let parameters = session.parameters.as_ref();
        self.publish(parameters, SSM_HOSTED_ZONE_ID, &zone.id, logger)
            .await?;
        self.publish(parameters, SSM_HOSTED_ZONE_NAME, &zone.name, logger)
            .await?;
        self.register(
            subzone,
            RecordSet::ns(&subzone.zone_name, &zone.name_servers),
            context,
            logger,
        )
        .await
    }

    async fn signing_key(
        &self,
        account: &AccountId,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.key_session(account).await?;
        let arn = if self.options.dry_run {
            match session.keys.describe_alias(DNSSEC_KMS_KEY_ALIAS).await? {
                Some(arn) => arn,
                None => {
                    logger.trace(format!("signing key of {account} would be created"));
                    return Ok(ChangeSet::default());
                }
            }
        } else {
            KeyManager::new(
                session.zones.as_ref(),
                session.keys.as_ref(),
                session.parameters.as_ref(),
            )
            .ensure_signing_key(account, logger)
            .await?
        };
        context
            .outputs()?
            .signing_keys
            .insert(account.clone(), arn);
        Ok(ChangeSet::default())
    }

    async fn key_signing_key(
        &self,
        subzone: &Subzone,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.factory.session(&subzone.environment).await?;
        let Some(zone) = self.zone_of(subzone, &session, context).await? else {
            return self.missing(format!("zone {}", subzone.zone_name), logger);
        };
        let known = context.outputs()?.signing_keys.get(&subzone.account).cloned();
        let keys = self.key_session(&subzone.account).await?;
        let kms_arn = match known {
            Some(arn) => arn,
            None => match keys.keys.describe_alias(DNSSEC_KMS_KEY_ALIAS).await? {
                Some(arn) => arn,
                None => {
                    return self.missing(format!("signing key of {}", subzone.account), logger)
                }
            },
        };
        if self.options.dry_run {
            let state = session.zones.dnssec(&zone.id).await?;
            let own: Vec<String> = state
                .key_signing_keys
                .iter()
                .filter(|key| is_ksk_of(&subzone.name, &key.name))
                .map(|key| format!("KSK {}: {}", key.name, key.status))
                .collect();
            if own.is_empty() {
                logger.trace(format!("KSK {} would be created", ksk_name(&subzone.name)));
            } else {
                logger.trace(own.join(", "));
            }
            return Ok(ChangeSet::default());
        }
        KeyManager::new(
            session.zones.as_ref(),
            keys.keys.as_ref(),
            keys.parameters.as_ref(),
        )
        .ensure_ksk(&zone.id, &subzone.name, &kms_arn, logger)
        .await?;
        Ok(ChangeSet::default())
    }

    async fn enable_dnssec(
        &self,
        subzone: &Subzone,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.factory.session(&subzone.environment).await?;
        let Some(zone) = self.zone_of(subzone, &session, context).await? else {
            return self.missing(format!("zone {}", subzone.zone_name), logger);
        };
        if self.options.dry_run {
            if !session.zones.dnssec(&zone.id).await?.signing {
                logger.trace(format!("zone {}: DNSSEC would be enabled", zone.name));
            }
            return Ok(ChangeSet::default());
        }
        KeyManager::new(
            session.zones.as_ref(),
            session.keys.as_ref(),
            session.parameters.as_ref(),
        )
        .enable_dnssec(&zone.id, logger)
        .await?;
        Ok(ChangeSet::default())
    }

    async fn disable_dnssec(
        &self,
        subzone: &Subzone,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.factory.session(&subzone.environment).await?;
        let Some(zone) = self.zone_of(subzone, &session, context).await? else {
            logger.trace(format!("zone {} does not exist yet", subzone.zone_name));
            return Ok(ChangeSet::default());
        };
        let state = session.zones.dnssec(&zone.id).await?;
        if !state.signing && state.active_keys().next().is_none() {
            logger.trace(format!("zone {}: not signed", zone.name));
            return Ok(ChangeSet::default());
        }
        let root = context.plan.registry().root();
        let live = context.root.zones.list_records(&root.zone_id).await?;
        if live
            .iter()
            .any(|r| r.name == zone.name.as_str() && r.record_type == RecordType::Ds)
        {
            return Err(Error::String(format!(
                "{} still has a DS record for {}; remove it and wait for its TTL before disabling DNSSEC",
                root.zone_name, zone.name
            )));
        }
        if self.options.dry_run {
            logger.trace(format!("zone {}: DNSSEC would be disabled", zone.name));
            return Ok(ChangeSet::default());
        }
        KeyManager::new(
            session.zones.as_ref(),
            session.keys.as_ref(),
            session.parameters.as_ref(),
        )
        .disable_dnssec(&zone.id, logger)
        .await?;
        Ok(ChangeSet::default())
    }

    async fn register_ds(
        &self,
        subzone: &Subzone,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.factory.session(&subzone.environment).await?;
        let Some(zone) = self.zone_of(subzone, &session, context).await? else {
            return self.missing(format!("zone {}", subzone.zone_name), logger);
        };
        let values = KeyManager::new(
            session.zones.as_ref(),
            session.keys.as_ref(),
            session.parameters.as_ref(),
        )
        .ds_records(&zone.id)
        .await?;
        if values.is_empty() {
            return self.missing(format!("active KSK of {}", zone.name), logger);
        }
        let record = RecordSet::new(
            subzone.zone_name.as_str(),
            RecordType::Ds,
            DEFAULT_TTL,
            values.iter().map(|value| value.to_string()).collect(),
        );
        self.register(subzone, record, context, logger).await
    }

    async fn replicate_parameters(
        &self,
        subzone: &Subzone,
        region: &str,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let session = self.factory.session(&subzone.environment).await?;
        let Some(zone) = self.zone_of(subzone, &session, context).await? else {
            return self.missing(format!("zone {}", subzone.zone_name), logger);
        };
        let target = self
            .factory
            .session(&subzone.environment.in_region(region))
            .await?;
        let parameters = target.parameters.as_ref();
        self.publish(parameters, SSM_HOSTED_ZONE_ID, &zone.id, logger)
            .await?;
        self.publish(parameters, SSM_HOSTED_ZONE_NAME, &zone.name, logger)
            .await?;
        Ok(ChangeSet::default())
    }

    async fn subzone_records(
        &self,
        subzone: &Subzone,
        context: &RunContext<'_>,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let desired = desired_subzone_records(subzone);
        if desired.is_empty() {
            return Ok(ChangeSet::default());
        }
        let session = self.factory.session(&subzone.environment).await?;
        let Some(zone) = self.zone_of(subzone, &session, context).await? else {
            return self.missing(format!("zone {}", subzone.zone_name), logger);
        };
        // Other projects add records to subzones, so nothing is pruned.
        Reconciler::new(session.zones.as_ref())
            .reconcile(
                &zone.id,
                &desired,
                &DiffOptions::new(subzone.zone_name.clone()),
                self.options.dry_run,
                logger,
            )
            .await
    }
}

/// Route53 wants a unique reference per zone creation request.
fn caller_reference(zone: &ZoneName) -> String {
    format!("{zone}-{}", chrono::Utc::now().timestamp_millis())
}
