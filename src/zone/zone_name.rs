// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Error;
use crate::{impl_wrapper_str, serde_str};
use std::str::FromStr;

/// Lowercase record name without trailing dot; Route53 escapes `*` as `\052`.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim().replace("\\052", "*").to_ascii_lowercase();
    name.strip_suffix('.').map(str::to_owned).unwrap_or(name)
}

/// Whether `label` is a valid hostname label (letters, digits, inner hyphens).
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// A fully qualified zone name such as `csp-nijmegen.nl`, normalized to
/// lowercase without trailing dot.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ZoneName(String);
impl_wrapper_str!(ZoneName);
serde_str!(ZoneName);

impl FromStr for ZoneName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = normalize_name(s);
        if name.len() > 253 || !name.contains('.') {
            return Err(Error::Config(format!("{s}: not a fully qualified zone name")));
        }
        if let Some(label) = name.split('.').find(|label| !is_valid_label(label)) {
            return Err(Error::Config(format!("{s}: invalid label '{label}'")));
        }
        Ok(Self(name))
    }
}

impl ZoneName {
    /// The zone of `label` directly below this zone.
    pub fn child(&self, label: &str) -> Result<ZoneName, Error> {
        if !is_valid_label(label) {
            return Err(Error::Config(format!("{label}: invalid subdomain label")));
        }
        Ok(Self(format!("{label}.{}", self.0)))
    }

    /// Whether `fqdn` is this zone or a name below it.
    pub fn contains(&self, fqdn: &str) -> bool {
        let fqdn = normalize_name(fqdn);
        fqdn == self.0 || fqdn.ends_with(&format!(".{}", self.0))
    }

    /// Expands a name relative to this zone. Empty and `@` denote the apex;
    /// names already inside the zone are kept.
    pub fn fully_qualified(&self, hostname: &str) -> String {
        let hostname = normalize_name(hostname);
        if hostname.is_empty() || hostname == "@" {
            self.0.clone()
        } else if self.contains(&hostname) {
            hostname
        } else {
            format!("{hostname}.{}", self.0)
        }
    }

    /// The part of `fqdn` in front of this zone, `Some("")` for the apex and
    /// `None` for names outside the zone.
    pub fn relative(&self, fqdn: &str) -> Option<String> {
        let fqdn = normalize_name(fqdn);
        if fqdn == self.0 {
            Some(String::new())
        } else {
            fqdn.strip_suffix(&format!(".{}", self.0)).map(str::to_owned)
        }
    }

    /// Form used in Route53 requests.
    pub fn with_trailing_dot(&self) -> String {
        format!("{}.", self.0)
    }
}

/// Route53 hosted zone id, without the `/hostedzone/` prefix.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HostedZoneId(String);
impl_wrapper_str!(HostedZoneId);
serde_str!(HostedZoneId);

impl FromStr for HostedZoneId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().trim_start_matches("/hostedzone/");
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!("{s}: invalid hosted zone id")));
        }
        Ok(Self(id.to_owned()))
    }
}

impl HostedZoneId {
    /// `arn:aws:route53:::hostedzone/{id}`
    pub fn arn(&self) -> String {
        format!("arn:aws:route53:::hostedzone/{}", self.0)
    }
}
