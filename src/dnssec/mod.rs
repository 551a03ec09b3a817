// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Delegation signer values.
mod ds_record;
/// Key-signing keys and zone signing.
mod manager;
/// The per-account KMS key.
mod signing_key;
mod tests;

pub use self::ds_record::DsRecordValue;
pub use self::manager::KeyManager;
pub use self::signing_key::{
    is_ksk_of, ksk_name, rotated_ksk_name, signing_key_spec, SigningKeySpec, DNSSEC_SERVICE_PRINCIPAL,
    KEY_SPEC, KEY_USAGE,
};
