// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Error;
use crate::serde_str;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Value of a DS record: `<key tag> <algorithm> <digest type> <digest>`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DsRecordValue {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    /// Uppercase hex.
    pub digest: String,
}
serde_str!(DsRecordValue);

impl DsRecordValue {
    /// Hex digits of a digest of `digest_type`, if the type is known.
    fn digest_len(digest_type: u8) -> Option<usize> {
        match digest_type {
            1 => Some(40),
            2 => Some(64),
            4 => Some(96),
            _ => None,
        }
    }
}

impl FromStr for DsRecordValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::Config(format!("DS record {s:?}: {reason}"));
        let mut parts = s.split_whitespace();
        let (Some(key_tag), Some(algorithm), Some(digest_type)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected key tag, algorithm, digest type and digest"));
        };
        // Some tools split long digests in groups.
        let digest: String = parts.collect::<Vec<_>>().concat().to_ascii_uppercase();
        let key_tag = key_tag.parse().map_err(|_| invalid("invalid key tag"))?;
        let algorithm = algorithm.parse().map_err(|_| invalid("invalid algorithm"))?;
        let digest_type = digest_type
            .parse()
            .map_err(|_| invalid("invalid digest type"))?;
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("digest must be hex"));
        }
        if let Some(len) = Self::digest_len(digest_type) {
            if digest.len() != len {
                return Err(invalid(&format!("digest type {digest_type} needs {len} hex digits")));
            }
        }
        Ok(Self {
            key_tag,
            algorithm,
            digest_type,
            digest,
        })
    }
}

impl Display for DsRecordValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.key_tag, self.algorithm, self.digest_type, self.digest
        )
    }
}
