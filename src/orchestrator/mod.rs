// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Steps and their dependencies.
mod plan;
/// Executes plans.
mod runner;
mod step;
mod tests;

pub use self::plan::Plan;
pub use self::runner::{Orchestrator, RunOptions, RunReport, StepStatus};
pub use self::step::Step;
