// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::zone::normalize_name;
use sha2::{Digest, Sha256};

/// Number of hash bytes kept in an identifier.
const ID_BYTES: usize = 8;

/// Deterministic identifier of a (name, value) pair: the first bytes of
/// SHA-256 over the normalized name, a NUL separator and the value, as
/// uppercase hex. Independent of where the record appears in the
/// configuration.
pub fn logical_id(name: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_name(name).as_bytes());
    hasher.update([0u8]);
    hasher.update(value.trim().as_bytes());
    let digest = hasher.finalize();
    hex::encode_upper(&digest[..ID_BYTES])
}
