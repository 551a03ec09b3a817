// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{is_ksk_of, ksk_name, rotated_ksk_name, signing_key_spec, DsRecordValue};
use crate::cloud::{HostedZones, KeySigningKey, KskStatus, Parameters, SigningKeys};
use crate::common::Error;
use crate::config::naming::SSM_DNSSEC_KMS_KEY_ARN;
use crate::config::AccountId;
use crate::iam::policy_matches;
use crate::log::StringLogger;
use crate::zone::HostedZoneId;

/// Route53 wants a unique reference per KSK creation request.
fn caller_reference(name: &str) -> String {
    format!("{name}-{}", chrono::Utc::now().timestamp_millis())
}

/// Signing keys, key-signing keys and DNSSEC signing of one account.
///
/// `keys` and `parameters` must be clients for the DNSSEC key region.
pub struct KeyManager<'a> {
    zones: &'a (dyn HostedZones + Send + Sync),
    keys: &'a (dyn SigningKeys + Send + Sync),
    parameters: &'a (dyn Parameters + Send + Sync),
}

impl<'a> KeyManager<'a> {
    pub fn new(
        zones: &'a (dyn HostedZones + Send + Sync),
        keys: &'a (dyn SigningKeys + Send + Sync),
        parameters: &'a (dyn Parameters + Send + Sync),
    ) -> Self {
        Self {
            zones,
            keys,
            parameters,
        }
    }

    /// Finds the account key by alias or creates it, repairs its policy and
    /// publishes its ARN. Returns the ARN.
    pub async fn ensure_signing_key(
        &self,
        account: &AccountId,
        logger: &StringLogger,
    ) -> Result<String, Error> {
        let spec = signing_key_spec(account);
        let arn = match self.keys.describe_alias(&spec.alias).await? {
            Some(arn) => {
                let live = self.keys.key_policy(&arn).await?;
                if !policy_matches(&live, &spec.policy) {
                    self.keys
                        .put_key_policy(&arn, &spec.policy.to_json()?)
                        .await?;
                    logger.warn(format!("signing key {arn}: policy drifted, rewritten"));
                }
                arn
            }
            None => {
                let arn = self.keys.create_key(&spec).await?;
                self.keys.create_alias(&spec.alias, &arn).await?;
                logger.trace(format!("signing key {}: created {arn}", spec.alias));
                arn
            }
        };
        let published = self.parameters.get_parameter(SSM_DNSSEC_KMS_KEY_ARN).await?;
        if published.as_deref() != Some(arn.as_str()) {
            self.parameters
                .put_parameter(SSM_DNSSEC_KMS_KEY_ARN, &arn)
                .await?;
            logger.trace(format!("parameter {SSM_DNSSEC_KMS_KEY_ARN} = {arn}"));
        }
        Ok(arn)
    }

    /// Makes sure the zone has an active KSK of `name` that uses `kms_arn`.
    /// Any active rotation of the key satisfies this; the base key is only
    /// created or activated when none is active.
    pub async fn ensure_ksk(
        &self,
        zone: &HostedZoneId,
        name: &str,
        kms_arn: &str,
        logger: &StringLogger,
    ) -> Result<KeySigningKey, Error> {
        let state = self.zones.dnssec(zone).await?;
        let own: Vec<&KeySigningKey> = state
            .key_signing_keys
            .iter()
            .filter(|key| is_ksk_of(name, &key.name))
            .collect();
        let active: Vec<&KeySigningKey> = own
            .iter()
            .copied()
            .filter(|key| key.status == KskStatus::Active)
            .collect();
        if let Some(key) = active.iter().rev().find(|key| key.kms_arn == kms_arn) {
            logger.trace(format!("KSK {}: active", key.name));
            return Ok(KeySigningKey::clone(key));
        }
        if let Some(key) = active.first() {
            return Err(Error::String(format!(
                "KSK {} of zone {zone} uses {} instead of {kms_arn}; rotate it",
                key.name, key.kms_arn
            )));
        }

        let ksk = ksk_name(name);
        match state.ksk(&ksk) {
            Some(existing) if existing.kms_arn != kms_arn => {
                return Err(Error::String(format!(
                    "KSK {ksk} of zone {zone} uses {} instead of {kms_arn}; rotate it",
                    existing.kms_arn
                )));
            }
            Some(_) => {
                self.zones.set_ksk_active(zone, &ksk, true).await?;
                logger.trace(format!("KSK {ksk}: activated"));
            }
            None => {
                self.zones
                    .create_ksk(zone, &ksk, kms_arn, &caller_reference(&ksk))
                    .await?;
                logger.trace(format!("KSK {ksk}: created in zone {zone}"));
            }
        }
        self.zones
            .dnssec(zone)
            .await?
            .ksk(&ksk)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("KSK {ksk} in zone {zone}")))
    }

    /// Enables signing. Returns `false` if it was already enabled.
    pub async fn enable_dnssec(
        &self,
        zone: &HostedZoneId,
        logger: &StringLogger,
    ) -> Result<bool, Error> {
        let state = self.zones.dnssec(zone).await?;
        if state.signing {
            logger.trace(format!("zone {zone}: already signing"));
            return Ok(false);
        }
        if state.active_keys().next().is_none() {
            return Err(Error::Dependency(format!(
                "zone {zone} has no active KSK, cannot enable DNSSEC"
            )));
        }
        self.zones.set_dnssec(zone, true).await?;
        logger.trace(format!("zone {zone}: DNSSEC enabled"));
        Ok(true)
    }

    /// Disables signing and deactivates every KSK. Returns `false` if there
    /// was nothing to do.
    pub async fn disable_dnssec(
        &self,
        zone: &HostedZoneId,
        logger: &StringLogger,
    ) -> Result<bool, Error> {
        let state = self.zones.dnssec(zone).await?;
        let mut changed = false;
        if state.signing {
            self.zones.set_dnssec(zone, false).await?;
            logger.warn(format!("zone {zone}: DNSSEC disabled"));
            changed = true;
        }
        for key in state.active_keys() {
            self.zones.set_ksk_active(zone, &key.name, false).await?;
            logger.trace(format!("KSK {}: deactivated", key.name));
            changed = true;
        }
        Ok(changed)
    }

    /// Adds a new active KSK next to the current one and returns its name
    /// and DS value. The old key keeps signing until it is retired, after the
    /// new DS record has propagated.
    pub async fn rotate_ksk(
        &self,
        zone: &HostedZoneId,
        name: &str,
        kms_arn: &str,
        logger: &StringLogger,
    ) -> Result<(String, DsRecordValue), Error> {
        let state = self.zones.dnssec(zone).await?;
        let mut generation = 2;
        let ksk = loop {
            let candidate = rotated_ksk_name(name, generation);
            if state.ksk(&candidate).is_none() {
                break candidate;
            }
            generation += 1;
        };
        self.zones
            .create_ksk(zone, &ksk, kms_arn, &caller_reference(&ksk))
            .await?;
        logger.trace(format!("KSK {ksk}: created in zone {zone} for rotation"));
        let ds = self.ds_record(zone, &ksk).await?;
        Ok((ksk, ds))
    }

    /// Deactivates and deletes `ksk`. Refuses to remove the last active key
    /// of a signing zone.
    pub async fn retire_ksk(
        &self,
        zone: &HostedZoneId,
        ksk: &str,
        logger: &StringLogger,
    ) -> Result<(), Error> {
        let state = self.zones.dnssec(zone).await?;
        let Some(key) = state.ksk(ksk) else {
            return Err(Error::NotFound(format!("KSK {ksk} in zone {zone}")));
        };
        if key.status == KskStatus::Active {
            if state.signing && state.active_keys().count() == 1 {
                return Err(Error::String(format!(
                    "KSK {ksk} is the last active key of signing zone {zone}"
                )));
            }
            self.zones.set_ksk_active(zone, ksk, false).await?;
        }
        self.zones.delete_ksk(zone, ksk).await?;
        logger.trace(format!("KSK {ksk}: retired"));
        Ok(())
    }

    /// DS value of `ksk`.
    pub async fn ds_record(&self, zone: &HostedZoneId, ksk: &str) -> Result<DsRecordValue, Error> {
        let state = self.zones.dnssec(zone).await?;
        state
            .ksk(ksk)
            .and_then(|key| key.ds_record.as_deref())
            .ok_or_else(|| Error::NotFound(format!("DS record of KSK {ksk} in zone {zone}")))?
            .parse()
    }

    /// DS values of every active KSK, sorted. During a rotation the parent
    /// publishes both.
    pub async fn ds_records(&self, zone: &HostedZoneId) -> Result<Vec<DsRecordValue>, Error> {
        let state = self.zones.dnssec(zone).await?;
        let mut values = state
            .active_keys()
            .filter_map(|key| key.ds_record.as_deref())
            .map(|value| value.parse::<DsRecordValue>())
            .collect::<Result<Vec<DsRecordValue>, Error>>()?;
        values.sort_by_key(|value| value.to_string());
        Ok(values)
    }
}
