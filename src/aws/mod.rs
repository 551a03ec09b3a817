// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Loading SDK configuration and assuming roles.
mod config;
/// IAM roles.
mod iam;
/// KMS signing keys.
mod kms;
/// Route53 zones, records and DNSSEC.
mod route53;
/// Account sessions.
mod session;
/// SSM parameters.
mod ssm;
/// Unit tests.
mod tests;

pub use self::config::{
    assume_role_config, create_aws_config_loader, load_aws_config, regional_config,
};
pub use self::iam::AwsIam;
pub use self::kms::AwsKms;
pub use self::route53::AwsRoute53;
pub use self::session::AwsSessionFactory;
pub use self::ssm::AwsSsm;
