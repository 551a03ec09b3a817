// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cloud::{RoleState, Roles};
use crate::common::Error;
use crate::iam::RoleSpec;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::error::BuildError;
use aws_sdk_iam::types::Tag;
use aws_sdk_iam::Client;
use std::collections::BTreeMap;

/// This struct implements `Roles` for IAM.
pub struct AwsIam {
    client: Client,
}

impl AwsIam {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    fn map_build_err(e: BuildError) -> Error {
        Error::Anyhow(e.into(), "cannot build container".to_string())
    }

    async fn inline_policy_names(&self, name: &str) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .list_role_policies()
                .role_name(name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| Error::Anyhow(e.into(), format!("inline_policy_names(role={name})")))?;
            names.extend(output.policy_names().iter().cloned());
            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_owned()),
                _ => break,
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl Roles for AwsIam {
    async fn get_role(&self, name: &str) -> Result<Option<RoleState>, Error> {
        let output = match self.client.get_role().role_name(name).send().await {
            Ok(output) => output,
            Err(e) => {
                let e = e.into_service_error();
                if e.is_no_such_entity_exception() {
                    return Ok(None);
                }
                return Err(Error::Anyhow(e.into(), format!("get_role(role={name})")));
            }
        };
        let Some(role) = output.role() else {
            return Ok(None);
        };
        let mut inline_policies = BTreeMap::new();
        for policy_name in self.inline_policy_names(name).await? {
            let output = self
                .client
                .get_role_policy()
                .role_name(name)
                .policy_name(&policy_name)
                .send()
                .await
                .map_err(|e| {
                    Error::Anyhow(
                        e.into(),
                        format!("get_role_policy(role={name}, policy={policy_name})"),
                    )
                })?;
            inline_policies.insert(policy_name, output.policy_document().to_owned());
        }
        Ok(Some(RoleState {
            arn: role.arn().to_owned(),
            trust_policy: role
                .assume_role_policy_document()
                .unwrap_or_default()
                .to_owned(),
            inline_policies,
        }))
    }

    async fn create_role(&self, spec: &RoleSpec) -> Result<String, Error> {
        let tags = spec
            .tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(Self::map_build_err)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let output = self
            .client
            .create_role()
            .role_name(&spec.name)
            .assume_role_policy_document(spec.trust_policy.to_json()?)
            .set_description(spec.description.clone())
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("create_role(role={})", spec.name)))?;
        output
            .role()
            .map(|role| role.arn().to_owned())
            .ok_or_else(|| Error::NotFound(format!("created role {}", spec.name)))
    }

    async fn update_trust_policy(&self, name: &str, document: &str) -> Result<(), Error> {
        let _ = self
            .client
            .update_assume_role_policy()
            .role_name(name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("update_trust_policy(role={name})")))?;
        Ok(())
    }

    async fn put_inline_policy(
        &self,
        name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), Error> {
        let _ = self
            .client
            .put_role_policy()
            .role_name(name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| {
                Error::Anyhow(
                    e.into(),
                    format!("put_inline_policy(role={name}, policy={policy_name})"),
                )
            })?;
        Ok(())
    }

    async fn delete_inline_policy(&self, name: &str, policy_name: &str) -> Result<(), Error> {
        let _ = self
            .client
            .delete_role_policy()
            .role_name(name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| {
                Error::Anyhow(
                    e.into(),
                    format!("delete_inline_policy(role={name}, policy={policy_name})"),
                )
            })?;
        Ok(())
    }
}
