// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

#[cfg(test)]
mod dnssec_tests {
    use crate::cloud::{AccountSession, KskStatus, MemoryCloud, SessionFactory};
    use crate::common::Error;
    use crate::config::naming::{DNSSEC_KEY_REGION, DNSSEC_KMS_KEY_ALIAS, SSM_DNSSEC_KMS_KEY_ARN};
    use crate::config::{AccountId, Environment};
    use crate::dnssec::{
        is_ksk_of, ksk_name, rotated_ksk_name, signing_key_spec, DsRecordValue, KeyManager,
        DNSSEC_SERVICE_PRINCIPAL, KEY_SPEC,
    };
    use crate::iam::policy_matches;
    use crate::log::StringLogger;
    use crate::zone::{HostedZoneId, ZoneName};

    const YIVI_ACCP: &str =
        "51061 13 2 83F061A07CDB0044033CEB74E91E92B054E0A92588420F137F9B54272158A13B";

    fn account() -> AccountId {
        "590183746529".parse().expect("account")
    }

    fn zone_id() -> HostedZoneId {
        "Z0000000SUB".parse().expect("zone id")
    }

    /// A cloud with the subzone and sessions for the zone and key regions.
    async fn setup() -> (MemoryCloud, AccountSession, AccountSession) {
        let zone_name: ZoneName = "mijn-dev.csp-nijmegen.nl".parse().expect("zone name");
        let cloud = MemoryCloud::new().with_zone(&account(), &zone_id(), &zone_name);
        let zones = cloud
            .session(&Environment::new(account(), "eu-central-1"))
            .await
            .expect("zone session");
        let keys = cloud
            .session(&Environment::new(account(), DNSSEC_KEY_REGION))
            .await
            .expect("key session");
        (cloud, zones, keys)
    }

    fn manager<'a>(zones: &'a AccountSession, keys: &'a AccountSession) -> KeyManager<'a> {
        KeyManager::new(zones.zones.as_ref(), keys.keys.as_ref(), keys.parameters.as_ref())
    }

    #[test]
    fn ds_record_tests() {
        let value: DsRecordValue = YIVI_ACCP.parse().expect("ds");
        assert_eq!(value.key_tag, 51061);
        assert_eq!(value.algorithm, 13);
        assert_eq!(value.digest_type, 2);
        assert_eq!(value.to_string(), YIVI_ACCP);

        // Grouped, lowercase digests are normalized.
        let grouped: DsRecordValue =
            "51061 13 2 83f061a07cdb0044033ceb74e91e92b0 54e0a92588420f137f9b54272158a13b"
                .parse()
                .expect("grouped");
        assert_eq!(grouped, value);

        for invalid in [
            "",
            "51061 13 2",
            "70000 13 2 83F061A07CDB0044033CEB74E91E92B054E0A92588420F137F9B54272158A13B",
            "51061 13 2 83F061A07CDB",
            "51061 13 2 XYZ061A07CDB0044033CEB74E91E92B054E0A92588420F137F9B54272158A13B",
        ] {
            assert!(
                matches!(invalid.parse::<DsRecordValue>(), Err(Error::Config(_))),
                "{invalid:?}"
            );
        }
        // Unknown digest types are not length checked.
        assert!("1 8 9 ABCDEF".parse::<DsRecordValue>().is_ok());
    }

    #[test]
    fn naming_tests() {
        assert_eq!(ksk_name("mijn-dev"), "mijn_dev_ksk");
        assert_eq!(rotated_ksk_name("mijn-dev", 2), "mijn_dev_ksk_2");
        let long = "a".repeat(200);
        assert_eq!(ksk_name(&long).len(), 128);
        assert!(rotated_ksk_name(&long, 12).ends_with("_12"));
        assert_eq!(rotated_ksk_name(&long, 12).len(), 128);

        assert!(is_ksk_of("mijn-dev", "mijn_dev_ksk"));
        assert!(is_ksk_of("mijn-dev", "mijn_dev_ksk_2"));
        assert!(is_ksk_of("mijn-dev", "mijn_dev_ksk_12"));
        assert!(!is_ksk_of("mijn-dev", "mijn_dev_ksk_1"));
        assert!(!is_ksk_of("mijn-dev", "other_ksk"));
        assert!(!is_ksk_of("mijn", "mijn_dev_ksk_2"));
    }

    #[test]
    fn signing_key_spec_tests() {
        let spec = signing_key_spec(&account());
        assert_eq!(spec.alias, DNSSEC_KMS_KEY_ALIAS);
        assert_eq!(spec.region, "us-east-1");
        assert_eq!(spec.key_spec, KEY_SPEC);
        assert_eq!(spec.key_usage, "SIGN_VERIFY");
        assert_eq!(spec.policy.statement.len(), 4);

        let grant = spec
            .policy
            .statement
            .iter()
            .find(|s| s.action == vec!["kms:CreateGrant".to_string()])
            .expect("grant statement");
        assert_eq!(
            grant.principal.as_ref().map(|p| p.service.clone()),
            Some(vec![DNSSEC_SERVICE_PRINCIPAL.to_string()])
        );
        assert!(grant.condition.is_some());

        let json = spec.policy.to_json().expect("json");
        assert!(json.contains("arn:aws:iam::590183746529:root"));
        assert!(json.contains(r#""Sid":"Allow Route 53 DNSSEC Service""#));
        assert!(spec.policy.allows("kms:PutKeyPolicy", "*"));
    }

    #[tokio::test]
    async fn signing_key_tests() {
        let (cloud, zones, keys) = setup().await;
        let logger = StringLogger::new(false);
        let arn = manager(&zones, &keys)
            .ensure_signing_key(&account(), &logger)
            .await
            .expect("create");
        assert!(arn.starts_with("arn:aws:kms:us-east-1:590183746529:key/"));
        assert_eq!(
            cloud.parameter(&account(), DNSSEC_KEY_REGION, SSM_DNSSEC_KMS_KEY_ARN),
            Some(arn.clone())
        );
        assert_eq!(cloud.key_count(&account()), 1);

        let again = manager(&zones, &keys)
            .ensure_signing_key(&account(), &logger)
            .await
            .expect("existing");
        assert_eq!(again, arn);
        assert_eq!(cloud.key_count(&account()), 1);
        assert_eq!(cloud.calls_matching("put_parameter").len(), 1);
        assert!(!logger.contains_warnings());

        keys.keys
            .put_key_policy(&arn, r#"{"Version":"2012-10-17","Statement":[]}"#)
            .await
            .expect("tamper");
        manager(&zones, &keys)
            .ensure_signing_key(&account(), &logger)
            .await
            .expect("repair");
        assert!(logger.contains_warnings());
        let policy = keys.keys.key_policy(&arn).await.expect("policy");
        assert!(policy_matches(&policy, &signing_key_spec(&account()).policy));
    }

    #[tokio::test]
    async fn ksk_lifecycle_tests() {
        let (cloud, zones, keys) = setup().await;
        let logger = StringLogger::new(false);
        let manager = manager(&zones, &keys);
        let zone = zone_id();

        match manager.enable_dnssec(&zone, &logger).await {
            Err(Error::Dependency(_)) => {}
            other => panic!("expected dependency error, got {other:?}"),
        }

        let arn = manager
            .ensure_signing_key(&account(), &logger)
            .await
            .expect("key");
        let ksk = manager
            .ensure_ksk(&zone, "mijn-dev", &arn, &logger)
            .await
            .expect("ksk");
        assert_eq!(ksk.name, "mijn_dev_ksk");
        assert_eq!(ksk.status, KskStatus::Active);
        let ds = ksk.ds_record.as_deref().expect("ds").parse::<DsRecordValue>();
        assert_eq!(ds.expect("ds value").digest_type, 2);

        assert!(manager.enable_dnssec(&zone, &logger).await.expect("enable"));
        assert!(!manager.enable_dnssec(&zone, &logger).await.expect("enabled"));
        let again = manager
            .ensure_ksk(&zone, "mijn-dev", &arn, &logger)
            .await
            .expect("existing");
        assert_eq!(again, ksk);
        assert_eq!(cloud.calls_matching("create_ksk").len(), 1);

        let other_key = keys
            .keys
            .create_key(&signing_key_spec(&account()))
            .await
            .expect("other key");
        let mismatch = manager
            .ensure_ksk(&zone, "mijn-dev", &other_key, &logger)
            .await;
        assert!(mismatch.is_err_and(|e| e.to_string().contains("rotate it")));

        // Rotation: both keys sign until the old one is retired.
        let (rotated, rotated_ds) = manager
            .rotate_ksk(&zone, "mijn-dev", &other_key, &logger)
            .await
            .expect("rotate");
        assert_eq!(rotated, "mijn_dev_ksk_2");
        let published = manager.ds_records(&zone).await.expect("ds records");
        assert_eq!(published.len(), 2);
        assert!(published.contains(&rotated_ds));

        manager
            .retire_ksk(&zone, "mijn_dev_ksk", &logger)
            .await
            .expect("retire");
        assert_eq!(
            manager.ds_records(&zone).await.expect("ds records"),
            vec![rotated_ds]
        );
        assert!(manager
            .retire_ksk(&zone, &rotated, &logger)
            .await
            .is_err_and(|e| e.to_string().contains("last active key")));
        assert!(manager
            .retire_ksk(&zone, "mijn_dev_ksk", &logger)
            .await
            .is_err_and(|e| e.is_not_found()));

        assert!(manager.disable_dnssec(&zone, &logger).await.expect("disable"));
        let state = cloud.dnssec_state(&account(), &zone).expect("state");
        assert!(!state.signing);
        assert_eq!(state.active_keys().count(), 0);
        assert!(!manager.disable_dnssec(&zone, &logger).await.expect("disabled"));
    }

    #[tokio::test]
    async fn rotated_ksk_tests() {
        let (cloud, zones, keys) = setup().await;
        let logger = StringLogger::new(false);
        let manager = manager(&zones, &keys);
        let zone = zone_id();
        let arn = manager
            .ensure_signing_key(&account(), &logger)
            .await
            .expect("key");
        manager
            .ensure_ksk(&zone, "mijn-dev", &arn, &logger)
            .await
            .expect("ksk");
        assert!(manager.enable_dnssec(&zone, &logger).await.expect("enable"));

        // Same signing key, new KSK.
        let (rotated, _) = manager
            .rotate_ksk(&zone, "mijn-dev", &arn, &logger)
            .await
            .expect("rotate");
        manager
            .retire_ksk(&zone, "mijn_dev_ksk", &logger)
            .await
            .expect("retire");

        let since = cloud.calls_matching("create_ksk").len();
        let current = manager
            .ensure_ksk(&zone, "mijn-dev", &arn, &logger)
            .await
            .expect("rotated ksk");
        assert_eq!(current.name, rotated);
        assert_eq!(current.status, KskStatus::Active);
        assert_eq!(cloud.calls_matching("create_ksk").len(), since);
        let state = cloud.dnssec_state(&account(), &zone).expect("state");
        assert!(state.ksk("mijn_dev_ksk").is_none());
        assert_eq!(state.active_keys().count(), 1);
    }
}
