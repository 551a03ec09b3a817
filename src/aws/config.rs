// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Settings;
use crate::config::naming::PROJECT_NAME;
use aws_config::profile::ProfileFileRegionProvider;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, ConfigLoader, Region, SdkConfig};

/// Create an AWS config loader with profile and region.
pub fn create_aws_config_loader(settings: &Settings) -> ConfigLoader {
    let mut config_loader = aws_config::defaults(BehaviorVersion::v2023_11_09());
    if let Ok(aws) = settings.aws() {
        if let Some(profile_name) = aws.profile {
            if settings.debug() {
                println!("AWS using profile name {profile_name}");
            }
            let region = ProfileFileRegionProvider::builder()
                .profile_name(&profile_name)
                .build();
            config_loader = config_loader.profile_name(&profile_name).region(region)
        }
    }
    config_loader
}

/// Load AWS configuration with profile and region.
pub async fn load_aws_config(settings: &Settings) -> SdkConfig {
    create_aws_config_loader(settings).load().await
}

/// The same credentials in another region.
pub fn regional_config(config: &SdkConfig, region: &str) -> SdkConfig {
    config
        .to_builder()
        .region(Region::new(region.to_owned()))
        .build()
}

/// Credentials of `role_arn`, assumed with the credentials of `source`.
pub async fn assume_role_config(source: &SdkConfig, role_arn: &str, region: &str) -> SdkConfig {
    let provider = AssumeRoleProvider::builder(role_arn)
        .session_name(PROJECT_NAME)
        .region(Region::new(region.to_owned()))
        .configure(source)
        .build()
        .await;
    aws_config::defaults(BehaviorVersion::v2023_11_09())
        .credentials_provider(provider)
        .region(Region::new(region.to_owned()))
        .load()
        .await
}
