// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::{assume_role_config, load_aws_config, regional_config, AwsIam, AwsKms, AwsRoute53, AwsSsm};
use crate::cloud::{AccountSession, SessionFactory};
use crate::common::{Error, Settings};
use crate::config::naming::role_arn;
use crate::config::{AccountId, Environment};
use async_trait::async_trait;
use aws_config::SdkConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Sessions over the AWS SDK. With `assume_role_name` the role of that name
/// is assumed in every target account, otherwise the operator credentials
/// are used as they are.
pub struct AwsSessionFactory {
    base: SdkConfig,
    assume_role_name: Option<String>,
    /// Per account credentials, keyed by account (and delegation role).
    cache: Mutex<HashMap<String, SdkConfig>>,
}

impl AwsSessionFactory {
    pub async fn new(settings: &Settings) -> Result<Self, Error> {
        let aws = settings.aws()?;
        Ok(Self {
            base: load_aws_config(settings).await,
            assume_role_name: aws.assume_role_name,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, key: &str) -> Option<SdkConfig> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn remember(&self, key: String, config: &SdkConfig) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, config.clone());
        }
    }

    async fn account_config(&self, account: &AccountId, region: &str) -> SdkConfig {
        let Some(role_name) = &self.assume_role_name else {
            return regional_config(&self.base, region);
        };
        let config = match self.cached(account) {
            Some(config) => config,
            None => {
                let config =
                    assume_role_config(&self.base, &role_arn(account, role_name), region).await;
                self.remember(account.to_string(), &config);
                config
            }
        };
        regional_config(&config, region)
    }

    fn session_from(environment: Environment, config: &SdkConfig) -> AccountSession {
        AccountSession {
            environment,
            zones: Arc::new(AwsRoute53::new(config)),
            roles: Arc::new(AwsIam::new(config)),
            keys: Arc::new(AwsKms::new(config)),
            parameters: Arc::new(AwsSsm::new(config)),
        }
    }
}

#[async_trait]
impl SessionFactory for AwsSessionFactory {
    async fn session(&self, environment: &Environment) -> Result<AccountSession, Error> {
        let account = environment.account("open a session")?;
        let config = self.account_config(account, &environment.region).await;
        Ok(Self::session_from(environment.clone(), &config))
    }

    async fn delegated(
        &self,
        from: &Environment,
        role_arn: &str,
    ) -> Result<AccountSession, Error> {
        let account: AccountId = role_arn
            .split(':')
            .nth(4)
            .ok_or_else(|| Error::Config(format!("{role_arn}: not a role ARN")))?
            .parse()?;
        let key = format!("{}>{role_arn}", from.account("assume a delegation role")?);
        let config = match self.cached(&key) {
            Some(config) => config,
            None => {
                let source = self
                    .account_config(from.account("assume a delegation role")?, &from.region)
                    .await;
                let config = assume_role_config(&source, role_arn, &from.region).await;
                self.remember(key, &config);
                config
            }
        };
        Ok(Self::session_from(
            Environment::new(account, &from.region),
            &config,
        ))
    }
}
