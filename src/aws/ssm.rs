// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::cloud::Parameters;
use crate::common::Error;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;

/// This struct implements `Parameters` for SSM Parameter Store.
pub struct AwsSsm {
    client: Client,
}

impl AwsSsm {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl Parameters for AwsSsm {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, Error> {
        match self.client.get_parameter().name(name).send().await {
            Ok(output) => Ok(output
                .parameter()
                .and_then(|parameter| parameter.value())
                .map(str::to_owned)),
            Err(e) => {
                let e = e.into_service_error();
                if e.is_parameter_not_found() {
                    Ok(None)
                } else {
                    Err(Error::Anyhow(e.into(), format!("get_parameter(name={name})")))
                }
            }
        }
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<(), Error> {
        let _ = self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| Error::Anyhow(e.into(), format!("put_parameter(name={name})")))?;
        Ok(())
    }
}
