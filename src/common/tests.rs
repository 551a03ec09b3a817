// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: LGPL-3.0-or-later

#[cfg(test)]
mod common_tests {
    use crate::common::{Error, Settings, DEFAULT_MAX_PARALLEL};

    #[test]
    fn aws_settings_tests() {
        let settings = Settings::builder()
            .toml_str(
                r#"
                [aws]
                profile = "dns-operator"
                assume_role_name = "dns-management-deploy"
                max_parallel = 8
                "#,
            )
            .build()
            .expect("aws settings");
        let aws = settings.aws().expect("aws section");
        assert_eq!(aws.profile.as_deref(), Some("dns-operator"));
        assert_eq!(aws.assume_role_name.as_deref(), Some("dns-management-deploy"));
        assert_eq!(aws.max_parallel(), 8);

        let empty = Settings::empty().aws().expect("defaults");
        assert!(empty.profile.is_none());
        assert_eq!(empty.max_parallel(), DEFAULT_MAX_PARALLEL);

        let zero = Settings::builder()
            .toml_str("[aws]\nmax_parallel = 0\n")
            .build()
            .expect("zero");
        assert_eq!(zero.aws().expect("aws").max_parallel(), DEFAULT_MAX_PARALLEL);
    }

    #[test]
    fn settings_builder_tests() {
        match Settings::builder().build() {
            Err(Error::Config(_)) => {}
            other => panic!("expected config error, got {other:?}"),
        }
        let missing = Settings::builder()
            .toml_file("no-such-dns-management-settings.toml")
            .build();
        assert!(missing.is_err());

        let settings = Settings::builder()
            .toml_str("[aws]\n")
            .debug(true)
            .build()
            .expect("debug settings");
        assert!(settings.debug());

        let broken = Settings::builder()
            .toml_str("[aws\n")
            .build()
            .expect("raw toml is parsed lazily");
        assert!(broken.aws().is_err());
    }
}
