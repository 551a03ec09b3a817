// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::Step;
use crate::common::Error;
use crate::config::Configuration;
use crate::zone::ZoneRegistry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Every step needed to converge a configuration, with the steps each one
/// depends on.
#[derive(Clone, Debug)]
pub struct Plan {
    configuration: Configuration,
    registry: ZoneRegistry,
    /// In insertion order, which is also the order within a wave.
    steps: Vec<Step>,
    dependencies: BTreeMap<Step, BTreeSet<Step>>,
}

impl Plan {
    /// Fails when a subdomain has no account or is configured twice.
    pub fn build(configuration: &Configuration) -> Result<Plan, Error> {
        let registry = ZoneRegistry::from_configuration(configuration)?;
        let mut plan = Plan {
            configuration: configuration.clone(),
            registry: registry.clone(),
            steps: Vec::new(),
            dependencies: BTreeMap::new(),
        };
        if configuration.dns_manager.is_some() {
            plan.insert(Step::DnsManagerRole, &[]);
        }
        plan.insert(Step::RootRecords, &[]);
        for subzone in registry.subzones() {
            let name = subzone.name.clone();
            let role = Step::DelegationRole(name.clone());
            let zone = Step::Subzone(name.clone());
            plan.insert(role.clone(), &[]);
            plan.insert(zone.clone(), &[role]);
            for region in &subzone.additional_regions {
                plan.insert(
                    Step::ReplicateParameters(name.clone(), region.clone()),
                    &[zone.clone()],
                );
            }
            if subzone.dnssec {
                let key = Step::SigningKey(subzone.account.clone());
                let ksk = Step::KeySigningKey(name.clone());
                let enable = Step::EnableDnssec(name.clone());
                plan.insert(key.clone(), &[]);
                plan.insert(ksk.clone(), &[zone.clone(), key]);
                plan.insert(enable.clone(), &[ksk]);
                if subzone.register_ds {
                    plan.insert(Step::RegisterDs(name.clone()), &[enable]);
                }
            } else {
                plan.insert(Step::DisableDnssec(name.clone()), &[zone.clone()]);
            }
            plan.insert(Step::SubzoneRecords(name), &[zone]);
        }
        Ok(plan)
    }

    /// Adds `step` (once) and makes it depend on `dependencies`.
    pub fn insert(&mut self, step: Step, dependencies: &[Step]) {
        if !self.dependencies.contains_key(&step) {
            self.steps.push(step.clone());
        }
        self.dependencies
            .entry(step)
            .or_default()
            .extend(dependencies.iter().cloned());
    }

    /// Makes `step` depend on `on`; both must be part of the plan.
    pub fn add_dependency(&mut self, step: &Step, on: Step) -> Result<(), Error> {
        if !self.dependencies.contains_key(&on) {
            return Err(Error::NotFound(format!("step {on}")));
        }
        self.dependencies
            .get_mut(step)
            .ok_or_else(|| Error::NotFound(format!("step {step}")))?
            .insert(on);
        Ok(())
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn contains(&self, step: &Step) -> bool {
        self.dependencies.contains_key(step)
    }

    /// Direct dependencies of `step`.
    pub fn dependencies(&self, step: &Step) -> impl Iterator<Item = &Step> {
        self.dependencies.get(step).into_iter().flatten()
    }

    /// Groups the steps in layers: every step only depends on steps of
    /// earlier layers. Fails on a dependency cycle.
    pub fn waves(&self) -> Result<Vec<Vec<Step>>, Error> {
        let mut done: BTreeSet<&Step> = BTreeSet::new();
        let mut remaining: Vec<&Step> = self.steps.iter().collect();
        let mut waves = Vec::new();
        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&Step>, Vec<&Step>) = std::mem::take(&mut remaining)
                .into_iter()
                .partition(|step| self.dependencies(step).all(|d| done.contains(d)));
            if ready.is_empty() {
                let blocked: Vec<String> = blocked.iter().map(|s| s.to_string()).collect();
                return Err(Error::String(format!(
                    "dependency cycle between {}",
                    blocked.join(", ")
                )));
            }
            done.extend(ready.iter().copied());
            waves.push(ready.into_iter().cloned().collect());
            remaining = blocked;
        }
        Ok(waves)
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "plan for branch {} ({} steps)",
            self.configuration.branch_name,
            self.steps.len()
        )?;
        match self.waves() {
            Ok(waves) => {
                for (i, wave) in waves.iter().enumerate() {
                    let steps: Vec<String> = wave.iter().map(|s| s.to_string()).collect();
                    writeln!(f, "  {}: {}", i + 1, steps.join(", "))?;
                }
                Ok(())
            }
            Err(e) => writeln!(f, "  {e}"),
        }
    }
}
