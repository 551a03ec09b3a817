// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Desired records and the changes to reach them.
mod diff;
/// Content addressed record identifiers.
mod logical_id;
/// Applies changes.
mod reconciler;
/// Record sets.
mod record;

pub use self::diff::{
    desired_root_records, desired_subzone_records, diff, Change, ChangeAction, ChangeSet,
    DiffOptions,
};
pub use self::logical_id::logical_id;
pub use self::reconciler::{Reconciler, MAX_CHANGES_PER_BATCH};
pub use self::record::{RecordSet, RecordType, DEFAULT_TTL, DELEGATION_TTL};
