// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cloud::{DnssecState, HostedZone, HostedZones, KeySigningKey, KskStatus};
use crate::common::Error;
use crate::records::{Change, ChangeAction as RecordChangeAction, RecordSet, RecordType};
use crate::zone::{HostedZoneId, ZoneName};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_route53::error::BuildError;
use aws_sdk_route53::types::{
    Change as Route53Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet,
    RrType, Tag, TagResourceType,
};
use aws_sdk_route53::Client;

const DEBUG: bool = false;

/// This struct implements `HostedZones` for Route53.
pub struct AwsRoute53 {
    client: Client,
}

impl AwsRoute53 {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    fn map_build_err(e: BuildError) -> Error {
        Error::Anyhow(e.into(), "cannot build container".to_string())
    }

    /// Our record set as a Route53 record set.
    pub(crate) fn to_resource_record_set(record: &RecordSet) -> Result<ResourceRecordSet, Error> {
        ResourceRecordSet::builder()
            .name(record.name.clone())
            .r#type(RrType::from(record.record_type.as_str()))
            .ttl(record.ttl as i64)
            .set_resource_records(Some(
                record
                    .values
                    .iter()
                    .map(|value| {
                        ResourceRecord::builder()
                            .value(value)
                            .build()
                            .map_err(Self::map_build_err)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ))
            .build()
            .map_err(Self::map_build_err)
    }

    /// Alias and routing policy record sets are not ours and are skipped.
    pub(crate) fn from_resource_record_set(rrs: &ResourceRecordSet) -> Option<RecordSet> {
        if rrs.alias_target().is_some() || rrs.set_identifier().is_some() {
            return None;
        }
        let record_type = rrs
            .r#type()
            .as_str()
            .parse::<RecordType>()
            .unwrap_or(RecordType::Other);
        Some(RecordSet::new(
            rrs.name(),
            record_type,
            rrs.ttl().unwrap_or_default().max(0) as u32,
            rrs.resource_records()
                .iter()
                .map(|rr| rr.value().to_owned())
                .collect(),
        ))
    }

    async fn name_servers(&self, zone: &HostedZoneId) -> Result<Vec<String>, Error> {
        let output = self
            .client
            .get_hosted_zone()
            .id(zone.as_str())
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("name_servers(zone={zone})")))?;
        Ok(output
            .delegation_set()
            .map(|set| set.name_servers().to_vec())
            .unwrap_or_default())
    }
}

#[async_trait]
impl HostedZones for AwsRoute53 {
    async fn find_zone(&self, name: &ZoneName) -> Result<Option<HostedZone>, Error> {
        let output = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(name.with_trailing_dot())
            .max_items(10)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("find_zone(name={name})")))?;
        let found = output
            .hosted_zones()
            .iter()
            .filter(|hz| !hz.config().is_some_and(|c| c.private_zone()))
            .find(|hz| hz.name().parse::<ZoneName>().is_ok_and(|n| n == *name))
            .map(|hz| hz.id().parse::<HostedZoneId>())
            .transpose()?;
        let Some(id) = found else {
            return Ok(None);
        };
        let name_servers = self.name_servers(&id).await?;
        Ok(Some(HostedZone {
            id,
            name: name.clone(),
            name_servers,
        }))
    }

    async fn create_zone(
        &self,
        name: &ZoneName,
        caller_reference: &str,
        tags: &[(String, String)],
    ) -> Result<HostedZone, Error> {
        let _ = self
            .client
            .create_hosted_zone()
            .name(name.as_str())
            .caller_reference(caller_reference)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("create_zone(name={name})")))?;
        let zone = self
            .find_zone(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("created hosted zone {name}")))?;
        if !tags.is_empty() {
            let _ = self
                .client
                .change_tags_for_resource()
                .resource_type(TagResourceType::Hostedzone)
                .resource_id(zone.id.as_str())
                .set_add_tags(Some(
                    tags.iter()
                        .map(|(k, v)| Tag::builder().key(k).value(v).build())
                        .collect(),
                ))
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), format!("tag_zone(zone={})", zone.id)))?;
        }
        Ok(zone)
    }

    async fn list_records(&self, zone: &HostedZoneId) -> Result<Vec<RecordSet>, Error> {
        let mut records = Vec::new();
        let mut start: Option<(String, RrType, Option<String>)> = None;
        loop {
            let mut request = self
                .client
                .list_resource_record_sets()
                .hosted_zone_id(zone.as_str());
            if let Some((name, record_type, identifier)) = start.take() {
                request = request
                    .start_record_name(name)
                    .start_record_type(record_type)
                    .set_start_record_identifier(identifier);
            }
            let output = request
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), format!("list_records(zone={zone})")))?;
            for rrs in output.resource_record_sets() {
                if DEBUG {
                    println!("DNS Record: {rrs:?}");
                }
                records.extend(Self::from_resource_record_set(rrs));
            }
            if !output.is_truncated() {
                break;
            }
            match (output.next_record_name(), output.next_record_type()) {
                (Some(name), Some(record_type)) => {
                    start = Some((
                        name.to_owned(),
                        record_type.clone(),
                        output.next_record_identifier().map(str::to_owned),
                    ));
                }
                _ => break,
            }
        }
        Ok(records)
    }

    async fn change_records(
        &self,
        zone: &HostedZoneId,
        changes: &[Change],
        comment: &str,
    ) -> Result<(), Error> {
        let changes = changes
            .iter()
            .map(|change| {
                let action = match change.action {
                    RecordChangeAction::Create => ChangeAction::Create,
                    RecordChangeAction::Delete => ChangeAction::Delete,
                    RecordChangeAction::Upsert => ChangeAction::Upsert,
                };
                Route53Change::builder()
                    .action(action)
                    .resource_record_set(Self::to_resource_record_set(&change.record)?)
                    .build()
                    .map_err(Self::map_build_err)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let batch = ChangeBatch::builder()
            .comment(comment)
            .set_changes(Some(changes))
            .build()
            .map_err(Self::map_build_err)?;
        let _ = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone.as_str())
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("change_records(zone={zone})")))?;
        Ok(())
    }

    async fn dnssec(&self, zone: &HostedZoneId) -> Result<DnssecState, Error> {
        let output = self
            .client
            .get_dnssec()
            .hosted_zone_id(zone.as_str())
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("dnssec(zone={zone})")))?;
        let signing = output
            .status()
            .and_then(|status| status.serve_signature())
            .is_some_and(|serving| serving == "SIGNING");
        let key_signing_keys = output
            .key_signing_keys()
            .iter()
            .map(|ksk| KeySigningKey {
                name: ksk.name().unwrap_or_default().to_owned(),
                status: KskStatus::parse(ksk.status().unwrap_or_default()),
                kms_arn: ksk.kms_arn().unwrap_or_default().to_owned(),
                ds_record: ksk.ds_record().map(str::to_owned),
            })
            .collect();
        Ok(DnssecState {
            signing,
            key_signing_keys,
        })
    }

    async fn create_ksk(
        &self,
        zone: &HostedZoneId,
        name: &str,
        kms_arn: &str,
        caller_reference: &str,
    ) -> Result<(), Error> {
        let _ = self
            .client
            .create_key_signing_key()
            .hosted_zone_id(zone.as_str())
            .name(name)
            .key_management_service_arn(kms_arn)
            .caller_reference(caller_reference)
            .status("ACTIVE")
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("create_ksk(zone={zone}, name={name})")))?;
        Ok(())
    }

    async fn set_ksk_active(
        &self,
        zone: &HostedZoneId,
        name: &str,
        active: bool,
    ) -> Result<(), Error> {
        let context = format!("set_ksk_active(zone={zone}, name={name}, active={active})");
        if active {
            let _ = self
                .client
                .activate_key_signing_key()
                .hosted_zone_id(zone.as_str())
                .name(name)
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), context))?;
        } else {
            let _ = self
                .client
                .deactivate_key_signing_key()
                .hosted_zone_id(zone.as_str())
                .name(name)
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), context))?;
        }
        Ok(())
    }

    async fn delete_ksk(&self, zone: &HostedZoneId, name: &str) -> Result<(), Error> {
        let _ = self
            .client
            .delete_key_signing_key()
            .hosted_zone_id(zone.as_str())
            .name(name)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("delete_ksk(zone={zone}, name={name})")))?;
        Ok(())
    }

    async fn set_dnssec(&self, zone: &HostedZoneId, enabled: bool) -> Result<(), Error> {
        let context = format!("set_dnssec(zone={zone}, enabled={enabled})");
        if enabled {
            let _ = self
                .client
                .enable_hosted_zone_dnssec()
                .hosted_zone_id(zone.as_str())
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), context))?;
        } else {
            let _ = self
                .client
                .disable_hosted_zone_dnssec()
                .hosted_zone_id(zone.as_str())
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), context))?;
        }
        Ok(())
    }
}
