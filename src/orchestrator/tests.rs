// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

#[cfg(test)]
mod orchestrator_tests {
    use crate::cloud::{MemoryCloud, SessionFactory};
    use crate::common::{Error, Settings};
    use crate::config::naming::{
        delegation_role_name, DNSSEC_KEY_REGION, SSM_DNSSEC_KMS_KEY_ARN, SSM_DNS_MANAGER_ROLE_ARN,
        SSM_HOSTED_ZONE_ID, SSM_HOSTED_ZONE_NAME,
    };
    use crate::config::{AccountId, Configuration, Environment};
    use crate::dnssec::KeyManager;
    use crate::iam::{delegation_role, policy_matches};
    use crate::log::StringLogger;
    use crate::orchestrator::{Orchestrator, Plan, RunOptions, RunReport, Step, StepStatus};
    use crate::records::{Change, ChangeAction, RecordSet, RecordType, DEFAULT_TTL};
    use crate::zone::{HostedZoneId, ZoneName};
    use std::sync::Arc;

    const CONFIGURATION: &str = r#"
        [branches.test]
        branch_name = "test"
        code_star_connection_arn = "arn:aws:codestar-connections:eu-central-1:111111111111:connection/test"
        deployment_environment = { account = "111111111111", region = "eu-central-1" }
        toplevel_hostedzone_environment = { account = "222222222222", region = "eu-central-1" }
        toplevel_hostedzone_id = "ZROOT000001"
        toplevel_hostedzone_name = "example.nl"
        dns_manager = { iam_account = "333333333333" }

        [branches.test.cname_records]
        www = "example.github.io"

        [[branches.test.subdomains]]
        name = "signed"
        enable_dns_sec = true
        environment = { account = "444444444444", region = "eu-central-1" }
        additional_regions = ["eu-west-1"]

        [[branches.test.subdomains.records]]
        name = "mail"
        type = "TXT"
        values = ["v=spf1 -all"]

        [[branches.test.subdomains]]
        name = "signed-two"
        enable_dns_sec = true
        add_ds_record = false
        environment = { account = "666666666666", region = "eu-central-1" }

        [[branches.test.subdomains]]
        name = "plain"
        enable_dns_sec = false
        environment = { account = "555555555555", region = "eu-central-1" }
    "#;

    const DS_VALUE: &str =
        "51061 13 2 83F061A07CDB0044033CEB74E91E92B054E0A92588420F137F9B54272158A13B";

    fn load(toml: &str) -> Result<Configuration, Error> {
        let settings = Settings::builder().toml_str(toml).build().expect("settings");
        Configuration::for_branch(&settings, "test")
    }

    fn configuration() -> Configuration {
        load(CONFIGURATION).expect("configuration")
    }

    fn account(id: &str) -> AccountId {
        id.parse().expect("account")
    }

    fn root_account() -> AccountId {
        account("222222222222")
    }

    fn signed_account() -> AccountId {
        account("444444444444")
    }

    fn root_id() -> HostedZoneId {
        "ZROOT000001".parse().expect("zone id")
    }

    fn zone_name(name: &str) -> ZoneName {
        name.parse().expect("zone name")
    }

    fn cloud() -> MemoryCloud {
        MemoryCloud::new().with_zone(&root_account(), &root_id(), &zone_name("example.nl"))
    }

    fn options(dry_run: bool, prune: bool) -> RunOptions {
        RunOptions {
            dry_run,
            prune,
            ..Default::default()
        }
    }

    async fn run(
        cloud: &MemoryCloud,
        configuration: &Configuration,
        options: RunOptions,
    ) -> (RunReport, StringLogger) {
        let plan = Plan::build(configuration).expect("plan");
        let logger = StringLogger::new(false);
        let report = Orchestrator::new(Arc::new(cloud.clone()), options)
            .run(&plan, &logger)
            .await
            .expect("run");
        (report, logger)
    }

    /// Calls after the first `since` that change something.
    fn writes(cloud: &MemoryCloud, since: usize) -> Vec<String> {
        cloud.calls()[since..]
            .iter()
            .filter(|call| {
                [
                    " create_",
                    " change_records",
                    " put_",
                    " set_",
                    " update_",
                    " delete_",
                ]
                .iter()
                .any(|write| call.contains(write))
            })
            .cloned()
            .collect()
    }

    fn root_record(cloud: &MemoryCloud, name: &str, record_type: RecordType) -> Option<RecordSet> {
        cloud
            .records(&root_account(), &root_id())
            .into_iter()
            .find(|r| r.name == name && r.record_type == record_type)
    }

    #[test]
    fn plan_tests() {
        let plan = Plan::build(&configuration()).expect("plan");
        let signed = |step: fn(String) -> Step| step("signed".to_string());
        assert_eq!(plan.steps()[0], Step::DnsManagerRole);
        assert!(plan.contains(&signed(Step::RegisterDs)));
        assert!(!plan.contains(&Step::RegisterDs("signed-two".to_string())));
        assert!(!plan.contains(&Step::DisableDnssec("signed".to_string())));
        assert!(plan.contains(&Step::DisableDnssec("plain".to_string())));
        assert!(!plan.contains(&Step::KeySigningKey("plain".to_string())));
        assert!(plan.contains(&Step::ReplicateParameters(
            "signed".to_string(),
            "eu-west-1".to_string()
        )));
        let signing_keys = plan
            .steps()
            .iter()
            .filter(|step| matches!(step, Step::SigningKey(_)))
            .count();
        assert_eq!(signing_keys, 2);
        assert_eq!(
            plan.dependencies(&signed(Step::KeySigningKey))
                .cloned()
                .collect::<Vec<_>>(),
            vec![
                signed(Step::Subzone),
                Step::SigningKey(signed_account()),
            ]
        );

        let waves = plan.waves().expect("waves");
        assert_eq!(waves.len(), 5);
        let wave_of = |step: &Step| waves.iter().position(|wave| wave.contains(step));
        assert_eq!(wave_of(&signed(Step::DelegationRole)), Some(0));
        assert_eq!(wave_of(&signed(Step::Subzone)), Some(1));
        assert_eq!(wave_of(&signed(Step::KeySigningKey)), Some(2));
        assert_eq!(wave_of(&signed(Step::EnableDnssec)), Some(3));
        assert_eq!(wave_of(&signed(Step::RegisterDs)), Some(4));
        assert_eq!(wave_of(&Step::RootRecords), Some(0));
        assert!(plan.to_string().contains("5: DS record signed"));

        // The builtin table has no accounts to plan for.
        assert!(matches!(
            Plan::build(&Configuration::builtin("main").expect("main")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn plan_cycle_tests() {
        let mut plan = Plan::build(&configuration()).expect("plan");
        let role = Step::DelegationRole("plain".to_string());
        plan.add_dependency(&role, Step::SubzoneRecords("plain".to_string()))
            .expect("dependency");
        match plan.waves() {
            Err(Error::String(message)) => {
                assert!(message.starts_with("dependency cycle between"));
                assert!(message.contains("delegation role plain"));
                assert!(!message.contains("toplevel zone records"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(plan.to_string().contains("dependency cycle"));
        assert!(matches!(
            plan.add_dependency(&role, Step::Subzone("unknown".to_string())),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            plan.add_dependency(&Step::Subzone("unknown".to_string()), role),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn full_run_tests() {
        let cloud = cloud();
        let (report, _) = run(&cloud, &configuration(), options(false, false)).await;
        assert!(report.is_success(), "{report}");
        assert!(!report.dry_run);
        // www, three delegations, one DS record and one subzone record.
        assert_eq!(report.change_count(), 6);

        assert_eq!(
            cloud.parameter(&root_account(), "eu-central-1", SSM_DNS_MANAGER_ROLE_ARN),
            Some("arn:aws:iam::222222222222:role/dns-manager".to_string())
        );
        assert!(cloud
            .role(&root_account(), &delegation_role_name("signed"))
            .is_some());

        let signed = cloud
            .zone(&signed_account(), &zone_name("signed.example.nl"))
            .expect("signed zone");
        for region in ["eu-central-1", "eu-west-1"] {
            assert_eq!(
                cloud.parameter(&signed_account(), region, SSM_HOSTED_ZONE_ID),
                Some(signed.id.to_string())
            );
        }
        assert_eq!(
            cloud.parameter(&signed_account(), "eu-central-1", SSM_HOSTED_ZONE_NAME),
            Some("signed.example.nl".to_string())
        );

        assert_eq!(cloud.key_count(&signed_account()), 1);
        assert_eq!(cloud.key_count(&account("666666666666")), 1);
        let key = cloud
            .parameter(&signed_account(), DNSSEC_KEY_REGION, SSM_DNSSEC_KMS_KEY_ARN)
            .expect("key arn");
        let dnssec = cloud
            .dnssec_state(&signed_account(), &signed.id)
            .expect("dnssec");
        assert!(dnssec.signing);
        assert_eq!(dnssec.ksk("signed_ksk").map(|k| k.kms_arn.clone()), Some(key));

        let ns = root_record(&cloud, "signed.example.nl", RecordType::Ns).expect("delegation");
        let mut name_servers = signed.name_servers.clone();
        name_servers.sort();
        assert_eq!(ns.values, name_servers);
        let ds = root_record(&cloud, "signed.example.nl", RecordType::Ds).expect("ds");
        assert_eq!(
            Some(ds.values[0].clone()),
            dnssec.ksk("signed_ksk").and_then(|k| k.ds_record.clone())
        );
        assert!(root_record(&cloud, "signed-two.example.nl", RecordType::Ns).is_some());
        assert!(root_record(&cloud, "signed-two.example.nl", RecordType::Ds).is_none());
        assert!(root_record(&cloud, "plain.example.nl", RecordType::Ns).is_some());
        assert!(root_record(&cloud, "www.example.nl", RecordType::Cname).is_some());

        let plain = cloud
            .zone(&account("555555555555"), &zone_name("plain.example.nl"))
            .expect("plain zone");
        assert!(!cloud
            .dnssec_state(&account("555555555555"), &plain.id)
            .expect("dnssec")
            .signing);

        let subzone_records = cloud.records(&signed_account(), &signed.id);
        assert!(subzone_records
            .iter()
            .any(|r| r.name == "mail.signed.example.nl" && r.record_type == RecordType::Txt));
    }

    #[tokio::test]
    async fn idempotent_run_tests() {
        let cloud = cloud();
        let configuration = configuration();
        let (first, _) = run(&cloud, &configuration, options(false, false)).await;
        assert!(first.is_success(), "{first}");

        let since = cloud.calls().len();
        let (second, logger) = run(&cloud, &configuration, options(false, false)).await;
        assert!(second.is_success(), "{second}");
        assert_eq!(second.change_count(), 0);
        assert_eq!(writes(&cloud, since), Vec::<String>::new());
        assert!(!logger.contains_warnings(), "{logger}");
    }

    #[tokio::test]
    async fn failed_step_tests() {
        let cloud = cloud();
        cloud.fail_on("create_ksk");
        let (report, logger) = run(&cloud, &configuration(), options(false, false)).await;
        assert!(!report.is_success());

        let ksk = Step::KeySigningKey("signed".to_string());
        assert!(matches!(
            report.status(&ksk),
            Some(StepStatus::Failed(reason)) if reason.contains("injected failure")
        ));
        assert_eq!(
            report.status(&Step::EnableDnssec("signed".to_string())),
            Some(&StepStatus::Skipped("KSK signed did not succeed".to_string()))
        );
        assert_eq!(
            report.status(&Step::RegisterDs("signed".to_string())),
            Some(&StepStatus::Skipped(
                "enable DNSSEC signed did not succeed".to_string()
            ))
        );
        // Independent steps still ran.
        assert_eq!(
            report.status(&Step::Subzone("signed".to_string())),
            Some(&StepStatus::Succeeded)
        );
        assert_eq!(
            report.status(&Step::SubzoneRecords("plain".to_string())),
            Some(&StepStatus::Succeeded)
        );
        assert_eq!(report.failures().len(), 5);
        assert!(report.to_string().contains("skipped enable DNSSEC signed"));
        assert!(logger.warnings().iter().any(|w| w.contains("KSK signed failed")));
        assert!(root_record(&cloud, "signed.example.nl", RecordType::Ds).is_none());
    }

    #[tokio::test]
    async fn dry_run_tests() {
        let cloud = cloud();
        let (report, _) = run(&cloud, &configuration(), options(true, false)).await;
        assert!(report.is_success(), "{report}");
        assert!(report.dry_run);
        assert_eq!(writes(&cloud, 0), Vec::<String>::new());
        assert_eq!(cloud.records(&root_account(), &root_id()).len(), 2);
        // The toplevel records are planned.
        assert_eq!(report.change_count(), 1);
        assert!(report.to_string().starts_with("dry run: "));

        // After a real run, a dry run reports drift without repairing it.
        run(&cloud, &configuration(), options(false, false)).await;
        let root = cloud
            .session(&Environment::new(root_account(), "eu-central-1"))
            .await
            .expect("session");
        let foreign = delegation_role(
            &root_id().arn(),
            &Environment::new(account("999999999999"), "eu-central-1"),
            "plain",
        )
        .expect("role");
        let name = delegation_role_name("plain");
        root.roles
            .update_trust_policy(&name, &foreign.trust_policy.to_json().expect("json"))
            .await
            .expect("tamper");
        let since = cloud.calls().len();
        let (report, logger) = run(&cloud, &configuration(), options(true, false)).await;
        assert_eq!(writes(&cloud, since), Vec::<String>::new());
        assert!(logger.warnings().iter().any(|w| w.contains("would be rewritten")));
        // The subaccount can no longer assume its role.
        assert!(matches!(
            report.status(&Step::Subzone("plain".to_string())),
            Some(StepStatus::Failed(reason)) if reason.contains("sts:AssumeRole")
        ));
    }

    #[tokio::test]
    async fn drifted_trust_tests() {
        let cloud = cloud();
        let configuration = configuration();
        run(&cloud, &configuration, options(false, false)).await;

        let root = cloud
            .session(&Environment::new(root_account(), "eu-central-1"))
            .await
            .expect("session");
        let name = delegation_role_name("plain");
        let foreign = delegation_role(
            &root_id().arn(),
            &Environment::new(account("999999999999"), "eu-central-1"),
            "plain",
        )
        .expect("role");
        root.roles
            .update_trust_policy(&name, &foreign.trust_policy.to_json().expect("json"))
            .await
            .expect("tamper");

        let (report, logger) = run(&cloud, &configuration, options(false, false)).await;
        assert!(report.is_success(), "{report}");
        assert!(logger.warnings().iter().any(|w| w.contains("trust policy drifted")));
        let plan = Plan::build(&configuration).expect("plan");
        let subzone = plan.registry().require("plain").expect("plain");
        let spec = delegation_role(&root_id().arn(), &subzone.environment, "plain").expect("role");
        let role = cloud.role(&root_account(), &name).expect("role");
        assert!(policy_matches(&role.trust_policy, &spec.trust_policy));
    }

    #[tokio::test]
    async fn prune_tests() {
        let cloud = cloud();
        let configuration = configuration();
        run(&cloud, &configuration, options(false, false)).await;

        let root = cloud
            .session(&Environment::new(root_account(), "eu-central-1"))
            .await
            .expect("session");
        let stray = RecordSet::new(
            "old.example.nl",
            RecordType::Cname,
            DEFAULT_TTL,
            vec!["gone.example.com".to_string()],
        );
        let stray_id = stray.logical_id();
        root.zones
            .change_records(
                &root_id(),
                &[Change {
                    action: ChangeAction::Create,
                    record: stray,
                    previous: None,
                }],
                "manual",
            )
            .await
            .expect("stray record");

        // Without prune the stray record stays.
        let (report, _) = run(&cloud, &configuration, options(false, false)).await;
        assert_eq!(report.change_count(), 0);
        assert!(root_record(&cloud, "old.example.nl", RecordType::Cname).is_some());

        let (report, logger) = run(&cloud, &configuration, options(false, true)).await;
        assert!(report.is_success(), "{report}");
        assert_eq!(report.change_count(), 1);
        let delete = format!("DELETE {stray_id} old.example.nl");
        assert!(logger.warnings().iter().any(|w| w.contains(&delete)));
        assert!(root_record(&cloud, "old.example.nl", RecordType::Cname).is_none());
        assert!(root_record(&cloud, "example.nl", RecordType::Ns).is_some());
        assert!(root_record(&cloud, "example.nl", RecordType::Soa).is_some());
        assert!(root_record(&cloud, "signed.example.nl", RecordType::Ns).is_some());
        assert!(root_record(&cloud, "signed.example.nl", RecordType::Ds).is_some());
        assert!(root_record(&cloud, "www.example.nl", RecordType::Cname).is_some());
    }

    #[tokio::test]
    async fn disable_dnssec_tests() {
        let cloud = cloud();
        let mut configuration = configuration();
        run(&cloud, &configuration, options(false, false)).await;

        let signed = cloud
            .zone(&signed_account(), &zone_name("signed.example.nl"))
            .expect("signed zone");
        configuration
            .subdomains
            .iter_mut()
            .filter(|s| s.name == "signed")
            .for_each(|s| s.enable_dns_sec = false);

        let (report, _) = run(&cloud, &configuration, options(false, false)).await;
        let disable = Step::DisableDnssec("signed".to_string());
        assert!(matches!(
            report.status(&disable),
            Some(StepStatus::Failed(reason)) if reason.contains("still has a DS record")
        ));
        assert!(cloud
            .dnssec_state(&signed_account(), &signed.id)
            .expect("dnssec")
            .signing);

        // Once the DS record is gone, signing can be switched off.
        let root = cloud
            .session(&Environment::new(root_account(), "eu-central-1"))
            .await
            .expect("session");
        let ds = root_record(&cloud, "signed.example.nl", RecordType::Ds).expect("ds");
        root.zones
            .change_records(
                &root_id(),
                &[Change {
                    action: ChangeAction::Delete,
                    record: ds,
                    previous: None,
                }],
                "manual",
            )
            .await
            .expect("remove ds");

        let (report, _) = run(&cloud, &configuration, options(false, false)).await;
        assert!(report.is_success(), "{report}");
        let dnssec = cloud
            .dnssec_state(&signed_account(), &signed.id)
            .expect("dnssec");
        assert!(!dnssec.signing);
        assert_eq!(dnssec.active_keys().count(), 0);
    }

    #[test]
    fn shared_account_tests() {
        // Hosted zone parameters are per account and region.
        let shared = CONFIGURATION.replace("666666666666", "444444444444");
        match load(&shared) {
            Err(Error::Config(message)) => assert!(
                message.contains("subdomains signed and signed-two share account 444444444444"),
                "{message}"
            ),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ds_record_ownership_tests() {
        let configuration =
            load(&format!("{CONFIGURATION}\n[branches.test.ds_records]\nsigned = \"{DS_VALUE}\"\n"))
                .expect("configuration");
        let cloud = cloud();
        let (first, logger) = run(&cloud, &configuration, options(false, false)).await;
        assert!(first.is_success(), "{first}");
        assert!(logger
            .warnings()
            .iter()
            .any(|w| w.contains("DS record signed is registered from its KSK")));
        // Only the KSK value is ever written.
        for (step, changes) in &first.changes {
            if *step != Step::RegisterDs("signed".to_string()) {
                assert!(
                    changes.changes.iter().all(|c| c.record.record_type != RecordType::Ds),
                    "{step}: {changes}"
                );
            }
        }
        let signed = cloud
            .zone(&signed_account(), &zone_name("signed.example.nl"))
            .expect("signed zone");
        let ksk = cloud
            .dnssec_state(&signed_account(), &signed.id)
            .and_then(|state| state.ksk("signed_ksk").and_then(|k| k.ds_record.clone()))
            .expect("ksk ds");
        let ds = root_record(&cloud, "signed.example.nl", RecordType::Ds).expect("ds");
        assert_eq!(ds.values, vec![ksk]);

        let since = cloud.calls().len();
        let (second, _) = run(&cloud, &configuration, options(false, false)).await;
        assert!(second.is_success(), "{second}");
        assert_eq!(second.change_count(), 0);
        assert_eq!(writes(&cloud, since), Vec::<String>::new());
    }

    #[tokio::test]
    async fn rotation_tests() {
        let cloud = cloud();
        let configuration = configuration();
        run(&cloud, &configuration, options(false, false)).await;

        let signed = cloud
            .zone(&signed_account(), &zone_name("signed.example.nl"))
            .expect("signed zone");
        let zones = cloud
            .session(&Environment::new(signed_account(), "eu-central-1"))
            .await
            .expect("zone session");
        let keys = cloud
            .session(&Environment::new(signed_account(), DNSSEC_KEY_REGION))
            .await
            .expect("key session");
        let manager = KeyManager::new(
            zones.zones.as_ref(),
            keys.keys.as_ref(),
            keys.parameters.as_ref(),
        );
        let logger = StringLogger::new(false);
        let arn = cloud
            .parameter(&signed_account(), DNSSEC_KEY_REGION, SSM_DNSSEC_KMS_KEY_ARN)
            .expect("key arn");
        let (rotated, rotated_ds) = manager
            .rotate_ksk(&signed.id, "signed", &arn, &logger)
            .await
            .expect("rotate");
        assert_eq!(rotated, "signed_ksk_2");

        // Both keys are published while the new DS record propagates.
        let (report, _) = run(&cloud, &configuration, options(false, false)).await;
        assert!(report.is_success(), "{report}");
        let ds = root_record(&cloud, "signed.example.nl", RecordType::Ds).expect("ds");
        assert_eq!(ds.values.len(), 2);
        assert!(ds.values.contains(&rotated_ds.to_string()));

        manager
            .retire_ksk(&signed.id, "signed_ksk", &logger)
            .await
            .expect("retire");
        let (report, _) = run(&cloud, &configuration, options(false, false)).await;
        assert!(report.is_success(), "{report}");
        let state = cloud
            .dnssec_state(&signed_account(), &signed.id)
            .expect("dnssec");
        let names: Vec<&str> = state
            .key_signing_keys
            .iter()
            .map(|k| k.name.as_str())
            .collect();
        assert_eq!(names, vec!["signed_ksk_2"]);
        assert!(state.signing);
        let ds = root_record(&cloud, "signed.example.nl", RecordType::Ds).expect("ds");
        assert_eq!(ds.values, vec![rotated_ds.to_string()]);
        let created = cloud
            .calls_matching("create_ksk")
            .into_iter()
            .filter(|call| call.ends_with(" signed_ksk"))
            .count();
        assert_eq!(created, 1);

        let since = cloud.calls().len();
        let (report, _) = run(&cloud, &configuration, options(false, false)).await;
        assert_eq!(report.change_count(), 0);
        assert_eq!(writes(&cloud, since), Vec::<String>::new());
    }
}
