// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

#[cfg(test)]
mod aws_tests {
    use crate::aws::{regional_config, AwsRoute53};
    use crate::records::{RecordSet, RecordType};
    use aws_config::{Region, SdkConfig};
    use aws_sdk_route53::types::{AliasTarget, ResourceRecord, ResourceRecordSet, RrType};

    fn rrs(name: &str, rr_type: RrType, ttl: i64, values: &[&str]) -> ResourceRecordSet {
        ResourceRecordSet::builder()
            .name(name)
            .r#type(rr_type)
            .ttl(ttl)
            .set_resource_records(Some(
                values
                    .iter()
                    .map(|v| ResourceRecord::builder().value(*v).build().unwrap())
                    .collect(),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn reads_route53_records() {
        let record = AwsRoute53::from_resource_record_set(&rrs(
            "Www.CSP-Nijmegen.nl.",
            RrType::Cname,
            300,
            &["Target.example.com."],
        ))
        .unwrap();
        assert_eq!(record.name, "www.csp-nijmegen.nl");
        assert_eq!(record.record_type, RecordType::Cname);
        assert_eq!(record.ttl, 300);
        assert_eq!(record.values, vec!["target.example.com"]);

        let wildcard = AwsRoute53::from_resource_record_set(&rrs(
            "\\052.csp-nijmegen.nl.",
            RrType::Txt,
            60,
            &["\"b\"", "\"a\""],
        ))
        .unwrap();
        assert_eq!(wildcard.name, "*.csp-nijmegen.nl");
        assert_eq!(wildcard.values, vec!["\"a\"", "\"b\""]);

        let other = AwsRoute53::from_resource_record_set(&rrs(
            "csp-nijmegen.nl.",
            RrType::Caa,
            300,
            &["0 issue \"amazon.com\""],
        ))
        .unwrap();
        assert_eq!(other.record_type, RecordType::Other);
    }

    #[test]
    fn skips_alias_records() {
        let alias = ResourceRecordSet::builder()
            .name("cdn.csp-nijmegen.nl.")
            .r#type(RrType::A)
            .alias_target(
                AliasTarget::builder()
                    .hosted_zone_id("Z2FDTNDATAQYW2")
                    .dns_name("d111111abcdef8.cloudfront.net.")
                    .evaluate_target_health(false)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        assert!(AwsRoute53::from_resource_record_set(&alias).is_none());
    }

    #[test]
    fn writes_route53_records() {
        let record = RecordSet::new(
            "_dmarc.csp-nijmegen.nl",
            RecordType::Txt,
            1800,
            vec!["v=DMARC1; p=reject".to_string()],
        );
        let rrs = AwsRoute53::to_resource_record_set(&record).unwrap();
        assert_eq!(rrs.name(), "_dmarc.csp-nijmegen.nl");
        assert_eq!(rrs.r#type(), &RrType::Txt);
        assert_eq!(rrs.ttl(), Some(1800));
        assert_eq!(rrs.resource_records().len(), 1);
        assert_eq!(rrs.resource_records()[0].value(), "\"v=DMARC1; p=reject\"");

        let round_trip = AwsRoute53::from_resource_record_set(&rrs).unwrap();
        assert_eq!(round_trip, record);
    }

    #[test]
    fn regional_config_keeps_other_settings() {
        let base = SdkConfig::builder()
            .region(Region::new("eu-central-1"))
            .build();
        let regional = regional_config(&base, "us-east-1");
        assert_eq!(regional.region(), Some(&Region::new("us-east-1")));
        assert_eq!(base.region(), Some(&Region::new("eu-central-1")));
    }
}
