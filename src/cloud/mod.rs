// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Traits at the boundary to the cloud APIs.
mod cloud_api;
/// All cloud traits, in memory.
pub mod memory;

pub use self::cloud_api::{
    AccountSession, DnssecState, HostedZone, HostedZones, KeySigningKey, KskStatus, Parameters,
    RoleState, Roles, SessionFactory, SigningKeys,
};
pub use self::memory::MemoryCloud;
