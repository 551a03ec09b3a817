// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{RecordSet, RecordType};
use crate::common::Error;
use crate::config::Configuration;
use crate::dnssec::DsRecordValue;
use crate::zone::{Subzone, ZoneName};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ChangeAction {
    Delete,
    Create,
    Upsert,
}

impl ChangeAction {
    /// Route53 spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Upsert => "UPSERT",
        }
    }
}

/// One change to one record set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Change {
    pub action: ChangeAction,
    /// The record set to write, or for `Delete` the live record set.
    pub record: RecordSet,
    /// Live record set replaced by an `Upsert`.
    pub previous: Option<RecordSet>,
}

impl Display for Change {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.action.as_str(),
            self.record.logical_id(),
            self.record
        )?;
        if let Some(previous) = &self.previous {
            write!(f, " (was {} [{}])", previous.ttl, previous.values.join(", "))?;
        }
        Ok(())
    }
}

/// Changes that bring a zone to its desired state. Deletes come first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Number of changes with `action`.
    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn extend(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }
}

impl Display for ChangeSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.changes.is_empty() {
            return f.write_str("no changes");
        }
        let lines: Vec<String> = self.changes.iter().map(|c| c.to_string()).collect();
        f.write_str(&lines.join("\n"))
    }
}

/// How live records outside the desired set are treated.
#[derive(Clone, Debug)]
pub struct DiffOptions {
    pub zone: ZoneName,
    /// Delete managed records that are not desired.
    pub prune: bool,
    /// (name, type) pairs owned by someone else; never deleted.
    pub protected: BTreeSet<(String, RecordType)>,
}

impl DiffOptions {
    pub fn new(zone: ZoneName) -> Self {
        Self {
            zone,
            prune: false,
            protected: BTreeSet::new(),
        }
    }

    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn protect(mut self, name: &str, record_type: RecordType) -> Self {
        self.protected.insert((name.to_owned(), record_type));
        self
    }

    fn prunable(&self, record: &RecordSet) -> bool {
        let apex = record.name == self.zone.as_str()
            && matches!(record.record_type, RecordType::Ns | RecordType::Soa);
        self.prune
            && record.record_type.is_managed()
            && !apex
            && self.zone.contains(&record.name)
            && !self
                .protected
                .contains(&(record.name.clone(), record.record_type))
    }
}

/// Minimal changes from `live` to `desired`. Equal record sets produce no
/// change; record sets that differ in values or TTL are upserted.
pub fn diff(desired: &[RecordSet], live: &[RecordSet], options: &DiffOptions) -> ChangeSet {
    let desired = RecordSet::merge_all(desired.to_vec());
    let live: BTreeMap<(String, RecordType), &RecordSet> = live
        .iter()
        .map(|record| ((record.name.clone(), record.record_type), record))
        .collect();

    let mut changes = Vec::new();
    let mut wanted = BTreeSet::new();
    for record in desired {
        let key = (record.name.clone(), record.record_type);
        match live.get(&key) {
            None => changes.push(Change {
                action: ChangeAction::Create,
                record: record.clone(),
                previous: None,
            }),
            Some(existing) if existing.values != record.values || existing.ttl != record.ttl => {
                changes.push(Change {
                    action: ChangeAction::Upsert,
                    record: record.clone(),
                    previous: Some((*existing).clone()),
                })
            }
            Some(_) => {}
        }
        wanted.insert(key);
    }
    for (key, record) in &live {
        if !wanted.contains(key) && options.prunable(record) {
            changes.push(Change {
                action: ChangeAction::Delete,
                record: (*record).clone(),
                previous: None,
            });
        }
    }
    // Deleting first frees names for CNAMEs created in the same batch.
    changes.sort_by(|a, b| {
        (a.action, &a.record.name, a.record.record_type).cmp(&(
            b.action,
            &b.record.name,
            b.record.record_type,
        ))
    });
    ChangeSet { changes }
}

/// Records of the toplevel zone that come straight from the configuration:
/// CNAME records, DS records of externally signed subdomains and other
/// records. Delegations of configured subzones, and the DS records of those
/// that register their own, are added when the subzones are deployed.
pub fn desired_root_records(configuration: &Configuration) -> Result<Vec<RecordSet>, Error> {
    let root = &configuration.toplevel_hostedzone_name;
    let mut records = Vec::new();
    for (name, target) in &configuration.cname_records {
        records.push(RecordSet::cname(root, name, target));
    }
    for (name, value) in &configuration.ds_records {
        if configuration.registers_ds(name) {
            continue;
        }
        let value: DsRecordValue = value.parse()?;
        records.push(RecordSet::ds(root, name, &value.to_string()));
    }
    records.extend(
        configuration
            .records
            .iter()
            .map(|record| RecordSet::from_config(root, record)),
    );
    Ok(RecordSet::merge_all(records))
}

/// Extra records of a subzone.
pub fn desired_subzone_records(subzone: &Subzone) -> Vec<RecordSet> {
    RecordSet::merge_all(
        subzone
            .records
            .iter()
            .map(|record| RecordSet::from_config(&subzone.zone_name, record))
            .collect(),
    )
}
