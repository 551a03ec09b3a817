// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Converges the DNS hierarchy of the branch in `BRANCH_NAME`.
//!
//! Settings are read from `dns-management.toml` (working or home directory)
//! when present. Nothing is changed unless `DNS_MANAGEMENT_APPLY=1`;
//! `DNS_MANAGEMENT_PRUNE=1` also removes unconfigured toplevel records and
//! `DEBUG=1` echoes progress while running.

use dns_management::{
    AwsSessionFactory, Configuration, Error, Orchestrator, Plan, RunOptions, Settings,
    StringLogger,
};
use std::process::ExitCode;
use std::sync::Arc;

const SETTINGS_FILE: &str = "dns-management.toml";

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

fn load_settings() -> Result<Settings, Error> {
    let debug = flag("DEBUG");
    match Settings::builder().debug(debug).toml_file(SETTINGS_FILE).build() {
        Ok(settings) => Ok(settings),
        Err(Error::Config(_)) => Settings::builder().debug(debug).toml_str("").build(),
        Err(e) => Err(e),
    }
}

async fn run(logger: &StringLogger) -> Result<bool, Error> {
    let settings = load_settings()?;
    let configuration = Configuration::from_env(&settings)?;
    let plan = Plan::build(&configuration)?;
    println!("{plan}");

    let options = RunOptions {
        dry_run: !flag("DNS_MANAGEMENT_APPLY"),
        prune: flag("DNS_MANAGEMENT_PRUNE"),
        max_parallel: settings.aws()?.max_parallel(),
    };
    let factory = AwsSessionFactory::new(&settings).await?;
    let report = Orchestrator::new(Arc::new(factory), options)
        .run(&plan, logger)
        .await?;
    println!("{report}");
    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let debug = flag("DEBUG");
    let logger = StringLogger::new(debug);
    let result = run(&logger).await;
    if !debug {
        println!("{logger}");
    }
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
