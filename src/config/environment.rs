// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Error;
use crate::{impl_wrapper_str, serde_str};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Twelve digit AWS account id.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AccountId(String);
impl_wrapper_str!(AccountId);
serde_str!(AccountId);

impl FromStr for AccountId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 12 && s.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::Config(format!("{s}: account id must be 12 digits")))
        }
    }
}

impl AccountId {
    /// Principal ARN of the account root.
    pub fn root_arn(&self) -> String {
        format!("arn:aws:iam::{}:root", self.0)
    }
}

/// An AWS account and region pair.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Environment {
    /// May be left out of the configuration, in which case every use of the
    /// environment fails with a configuration error.
    #[serde(default)]
    pub account: Option<AccountId>,
    pub region: String,
}

impl Environment {
    /// An environment with both account and region.
    pub fn new(account: AccountId, region: &str) -> Self {
        Self {
            account: Some(account),
            region: region.to_owned(),
        }
    }

    /// The account, or an error naming what needed it.
    pub fn account(&self, purpose: &str) -> Result<&AccountId, Error> {
        self.account
            .as_ref()
            .ok_or_else(|| Error::Config(format!("No account provided, could not {purpose}")))
    }

    /// The same account in another region.
    pub fn in_region(&self, region: &str) -> Self {
        Self {
            account: self.account.clone(),
            region: region.to_owned(),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.account {
            Some(account) => write!(f, "{account}/{}", self.region),
            None => write!(f, "?/{}", self.region),
        }
    }
}
