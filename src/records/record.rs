// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use super::logical_id;
use crate::common::Error;
use crate::config::RecordConfig;
use crate::serde_str;
use crate::zone::{normalize_name, ZoneName};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// TTL of records without an explicit TTL.
pub const DEFAULT_TTL: u32 = 1800;
/// TTL of NS records that delegate a subzone.
pub const DELEGATION_TTL: u32 = 172800;

/// The types of DNS records that are read and written.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Ds,
    Mx,
    Ns,
    Soa,
    Txt,
    /// Any type this crate leaves alone.
    Other,
}
serde_str!(RecordType);

impl RecordType {
    /// Route53 spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Ds => "DS",
            Self::Mx => "MX",
            Self::Ns => "NS",
            Self::Soa => "SOA",
            Self::Txt => "TXT",
            Self::Other => "OTHER",
        }
    }

    /// Types that may be created, changed and pruned.
    pub fn is_managed(&self) -> bool {
        matches!(
            self,
            Self::A | Self::Aaaa | Self::Cname | Self::Ds | Self::Mx | Self::Ns | Self::Txt
        )
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "Aaaa",
            Self::Cname => "Cname",
            Self::Ds => "Ds",
            Self::Mx => "Mx",
            Self::Ns => "Ns",
            Self::Soa => "Soa",
            Self::Txt => "Txt",
            Self::Other => "Other",
        }
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::Aaaa,
            "CNAME" => Self::Cname,
            "DS" => Self::Ds,
            "MX" => Self::Mx,
            "NS" => Self::Ns,
            "SOA" => Self::Soa,
            "TXT" => Self::Txt,
            _ => return Err(Error::Config(format!("{s}: unsupported record type"))),
        })
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All values of one (name, type) in a zone.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RecordSet {
    /// Fully qualified, lowercase, no trailing dot.
    pub name: String,
    pub record_type: RecordType,
    pub ttl: u32,
    /// Canonical, sorted and without duplicates.
    pub values: Vec<String>,
}

impl RecordSet {
    /// Creates a record set with canonical name and values.
    pub fn new(name: &str, record_type: RecordType, ttl: u32, values: Vec<String>) -> Self {
        let mut values: Vec<String> = values
            .iter()
            .map(|value| Self::canonical_value(record_type, value))
            .collect();
        values.sort();
        values.dedup();
        Self {
            name: normalize_name(name),
            record_type,
            ttl,
            values,
        }
    }

    /// `hostname` (relative to `zone`) is an alias of `target`.
    pub fn cname(zone: &ZoneName, hostname: &str, target: &str) -> Self {
        Self::new(
            &zone.fully_qualified(hostname),
            RecordType::Cname,
            DEFAULT_TTL,
            vec![target.to_owned()],
        )
    }

    /// Delegation signer for the child `hostname` of `zone`.
    pub fn ds(zone: &ZoneName, hostname: &str, value: &str) -> Self {
        Self::new(
            &zone.fully_qualified(hostname),
            RecordType::Ds,
            DEFAULT_TTL,
            vec![value.to_owned()],
        )
    }

    /// Delegation of `child` to its name servers.
    pub fn ns(child: &ZoneName, name_servers: &[String]) -> Self {
        Self::new(
            child.as_str(),
            RecordType::Ns,
            DELEGATION_TTL,
            name_servers.to_vec(),
        )
    }

    /// A record from the configuration, relative to `zone`.
    pub fn from_config(zone: &ZoneName, record: &RecordConfig) -> Self {
        Self::new(
            &zone.fully_qualified(&record.name),
            record.record_type,
            record.ttl.unwrap_or(DEFAULT_TTL),
            record.values.clone(),
        )
    }

    /// Content addressed identifier: equal name and values always give the
    /// same id, regardless of TTL or the order of values.
    pub fn logical_id(&self) -> String {
        format!(
            "{}Record{}",
            self.record_type.id_prefix(),
            logical_id(&self.name, &self.values.join("\n"))
        )
    }

    /// Same name and type.
    pub fn same_key(&self, other: &RecordSet) -> bool {
        self.name == other.name && self.record_type == other.record_type
    }

    /// Combines record sets with the same name and type, keeping the lowest
    /// TTL. Output is sorted by name and type.
    pub fn merge_all(records: Vec<RecordSet>) -> Vec<RecordSet> {
        let mut merged: BTreeMap<(String, RecordType), RecordSet> = BTreeMap::new();
        for record in records {
            let key = (record.name.clone(), record.record_type);
            match merged.get_mut(&key) {
                Some(existing) => {
                    existing.ttl = existing.ttl.min(record.ttl);
                    existing.values.extend(record.values);
                    existing.values.sort();
                    existing.values.dedup();
                }
                None => {
                    merged.insert(key, record);
                }
            }
        }
        merged.into_values().collect()
    }

    fn canonical_value(record_type: RecordType, value: &str) -> String {
        let value = value.trim();
        match record_type {
            RecordType::Cname | RecordType::Ns => normalize_name(value),
            RecordType::Mx => {
                let mut parts = value.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(priority), Some(host)) => format!("{priority} {}", normalize_name(host)),
                    _ => value.to_owned(),
                }
            }
            RecordType::Ds => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                match parts.as_slice() {
                    [tag, algorithm, digest_type, digest @ ..] if !digest.is_empty() => format!(
                        "{tag} {algorithm} {digest_type} {}",
                        digest.concat().to_ascii_uppercase()
                    ),
                    _ => value.to_owned(),
                }
            }
            RecordType::Txt => Self::double_quoted(value),
            _ => value.to_owned(),
        }
    }

    fn double_quoted(text: &str) -> String {
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            text.to_string()
        } else {
            format!("\"{text}\"")
        }
    }
}

impl Display for RecordSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.name,
            self.ttl,
            self.record_type,
            self.values.join(", ")
        )
    }
}
