// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{diff, Change, ChangeAction, ChangeSet, DiffOptions, RecordSet};
use crate::cloud::HostedZones;
use crate::common::Error;
use crate::config::naming::PROJECT_NAME;
use crate::log::StringLogger;
use crate::zone::HostedZoneId;

/// Route53 rejects larger change batches.
pub const MAX_CHANGES_PER_BATCH: usize = 500;

/// Applies record changes to one zone.
pub struct Reconciler<'a> {
    zones: &'a (dyn HostedZones + Send + Sync),
    reader: &'a (dyn HostedZones + Send + Sync),
}

impl<'a> Reconciler<'a> {
    pub fn new(zones: &'a (dyn HostedZones + Send + Sync)) -> Self {
        Self {
            zones,
            reader: zones,
        }
    }

    /// Reads live records with `reader` and only writes with the zones
    /// given to `new`. Delegation roles may change records but not list
    /// them.
    pub fn reading_from(mut self, reader: &'a (dyn HostedZones + Send + Sync)) -> Self {
        self.reader = reader;
        self
    }

    /// Reads the live records, computes the changes and applies them unless
    /// `dry_run` is set.
    pub async fn reconcile(
        &self,
        zone: &HostedZoneId,
        desired: &[RecordSet],
        options: &DiffOptions,
        dry_run: bool,
        logger: &StringLogger,
    ) -> Result<ChangeSet, Error> {
        let live = self.reader.list_records(zone).await?;
        let change_set = diff(desired, &live, options);
        self.apply(zone, &change_set, dry_run, logger).await?;
        Ok(change_set)
    }

    /// Creates or updates a single record set, leaving everything else
    /// alone.
    pub async fn ensure(
        &self,
        zone: &HostedZoneId,
        record: RecordSet,
        dry_run: bool,
        logger: &StringLogger,
    ) -> Result<Option<Change>, Error> {
        let live = self.reader.list_records(zone).await?;
        let existing = live.into_iter().find(|live| live.same_key(&record));
        let change = match existing {
            None => Change {
                action: ChangeAction::Create,
                record,
                previous: None,
            },
            Some(existing) if existing.values != record.values || existing.ttl != record.ttl => {
                Change {
                    action: ChangeAction::Upsert,
                    record,
                    previous: Some(existing),
                }
            }
            Some(_) => return Ok(None),
        };
        let change_set = ChangeSet {
            changes: vec![change],
        };
        self.apply(zone, &change_set, dry_run, logger).await?;
        Ok(change_set.changes.into_iter().next())
    }

    async fn apply(
        &self,
        zone: &HostedZoneId,
        change_set: &ChangeSet,
        dry_run: bool,
        logger: &StringLogger,
    ) -> Result<(), Error> {
        if change_set.is_empty() {
            logger.trace(format!("zone {zone}: records up to date"));
            return Ok(());
        }
        for change in &change_set.changes {
            let line = format!("zone {zone}: {change}");
            if change.action == ChangeAction::Delete {
                logger.warn(line);
            } else {
                logger.trace(line);
            }
        }
        if dry_run {
            logger.trace(format!(
                "zone {zone}: dry run, {} changes not applied",
                change_set.len()
            ));
            return Ok(());
        }
        for batch in change_set.changes.chunks(MAX_CHANGES_PER_BATCH) {
            self.zones
                .change_records(
                    zone,
                    batch,
                    &format!("{PROJECT_NAME}: {} changes", batch.len()),
                )
                .await?;
        }
        Ok(())
    }
}
