// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Thread-safe logging.
mod string_logger;

pub use self::string_logger::{Level, StringLogger};
