// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::config::AccountId;
use std::fmt::{Display, Formatter};

/// One unit of work. Subzones are referred to by configured name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Step {
    /// The `dns-manager` role in the root account.
    DnsManagerRole,
    /// Delegation role of a subzone, in the root account.
    DelegationRole(String),
    /// Records of the toplevel zone from the configuration.
    RootRecords,
    /// The subzone, its parameters and its NS delegation in the root zone.
    Subzone(String),
    /// DNSSEC signing key of an account.
    SigningKey(AccountId),
    KeySigningKey(String),
    EnableDnssec(String),
    DisableDnssec(String),
    /// DS record of a signed subzone in the root zone.
    RegisterDs(String),
    /// Copies of the subzone parameters in another region.
    ReplicateParameters(String, String),
    /// Extra records of a subzone.
    SubzoneRecords(String),
}

impl Step {
    /// Subdomain the step works on, if any.
    pub fn subzone(&self) -> Option<&str> {
        match self {
            Self::DelegationRole(name)
            | Self::Subzone(name)
            | Self::KeySigningKey(name)
            | Self::EnableDnssec(name)
            | Self::DisableDnssec(name)
            | Self::RegisterDs(name)
            | Self::ReplicateParameters(name, _)
            | Self::SubzoneRecords(name) => Some(name),
            Self::DnsManagerRole | Self::RootRecords | Self::SigningKey(_) => None,
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DnsManagerRole => write!(f, "dns-manager role"),
            Self::DelegationRole(name) => write!(f, "delegation role {name}"),
            Self::RootRecords => write!(f, "toplevel zone records"),
            Self::Subzone(name) => write!(f, "subzone {name}"),
            Self::SigningKey(account) => write!(f, "signing key {account}"),
            Self::KeySigningKey(name) => write!(f, "KSK {name}"),
            Self::EnableDnssec(name) => write!(f, "enable DNSSEC {name}"),
            Self::DisableDnssec(name) => write!(f, "disable DNSSEC {name}"),
            Self::RegisterDs(name) => write!(f, "DS record {name}"),
            Self::ReplicateParameters(name, region) => write!(f, "parameters {name} in {region}"),
            Self::SubzoneRecords(name) => write!(f, "records {name}"),
        }
    }
}
