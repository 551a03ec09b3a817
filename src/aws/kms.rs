// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cloud::SigningKeys;
use crate::common::Error;
use crate::dnssec::SigningKeySpec;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_kms::error::BuildError;
use aws_sdk_kms::types::{KeySpec, KeyState, KeyUsageType, Tag};
use aws_sdk_kms::Client;

/// KMS only supports this key policy name.
const KEY_POLICY_NAME: &str = "default";

/// This struct implements `SigningKeys` for KMS.
pub struct AwsKms {
    client: Client,
}

impl AwsKms {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    fn map_build_err(e: BuildError) -> Error {
        Error::Anyhow(e.into(), "cannot build container".to_string())
    }
}

#[async_trait]
impl SigningKeys for AwsKms {
    async fn describe_alias(&self, alias: &str) -> Result<Option<String>, Error> {
        let output = match self.client.describe_key().key_id(alias).send().await {
            Ok(output) => output,
            Err(e) => {
                let e = e.into_service_error();
                if e.is_not_found_exception() {
                    return Ok(None);
                }
                return Err(Error::Anyhow(e.into(), format!("describe_alias(alias={alias})")));
            }
        };
        let Some(metadata) = output.key_metadata() else {
            return Ok(None);
        };
        if metadata.key_state() == Some(&KeyState::PendingDeletion) {
            return Err(Error::String(format!(
                "key behind {alias} is pending deletion; cancel the deletion first"
            )));
        }
        Ok(metadata.arn().map(str::to_owned))
    }

    async fn create_key(&self, spec: &SigningKeySpec) -> Result<String, Error> {
        let tags = spec
            .tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .tag_key(k)
                    .tag_value(v)
                    .build()
                    .map_err(Self::map_build_err)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let output = self
            .client
            .create_key()
            .key_spec(KeySpec::from(spec.key_spec.as_str()))
            .key_usage(KeyUsageType::from(spec.key_usage.as_str()))
            .description(&spec.description)
            .policy(spec.policy.to_json()?)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("create_key(alias={})", spec.alias)))?;
        output
            .key_metadata()
            .and_then(|metadata| metadata.arn())
            .map(str::to_owned)
            .ok_or_else(|| Error::NotFound(format!("created key for {}", spec.alias)))
    }

    async fn create_alias(&self, alias: &str, key_arn: &str) -> Result<(), Error> {
        let _ = self
            .client
            .create_alias()
            .alias_name(alias)
            .target_key_id(key_arn)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("create_alias(alias={alias})")))?;
        Ok(())
    }

    async fn key_policy(&self, key_arn: &str) -> Result<String, Error> {
        let output = self
            .client
            .get_key_policy()
            .key_id(key_arn)
            .policy_name(KEY_POLICY_NAME)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("key_policy(key={key_arn})")))?;
        output
            .policy()
            .map(str::to_owned)
            .ok_or_else(|| Error::NotFound(format!("policy of key {key_arn}")))
    }

    async fn put_key_policy(&self, key_arn: &str, document: &str) -> Result<(), Error> {
        let _ = self
            .client
            .put_key_policy()
            .key_id(key_arn)
            .policy_name(KEY_POLICY_NAME)
            .policy(document)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("put_key_policy(key={key_arn})")))?;
        Ok(())
    }
}
