// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Desired state of the zone hierarchy.
mod registry;
/// Zone names and ids.
mod zone_name;

pub use self::registry::{RootZone, Subzone, ZoneRegistry};
pub use self::zone_name::{is_valid_label, normalize_name, HostedZoneId, ZoneName};
