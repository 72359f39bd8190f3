use super::*;

fn raw_with_database() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://localhost/rondo".to_string());
    raw
}

#[test]
fn database_url_is_required() {
    let raw = RawSettings::default();
    let err = Settings::from_raw(raw).expect_err("missing database url must fail");
    assert!(matches!(
        err,
        SettingsError::InvalidValue {
            field: "database.url",
            ..
        }
    ));
}

#[test]
fn defaults_fill_unset_sections() {
    let settings = Settings::from_raw(raw_with_database()).expect("valid settings");

    assert_eq!(settings.database.max_connections, 8);
    assert_eq!(settings.dispatch.batch_size.get(), 1);
    assert_eq!(settings.dispatch.timezone, chrono_tz::Asia::Seoul);
    assert_eq!(settings.dispatch.times.len(), 9);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.cache.url.is_none());
}

#[test]
fn cli_flags_win_over_file_values() {
    let mut raw = raw_with_database();
    raw.dispatch.batch_size = Some(3);
    raw.logging.level = Some("info".to_string());

    let overrides = Overrides {
        batch_size: Some(5),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };
    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.dispatch.batch_size.get(), 5);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn log_json_flag_switches_format() {
    let mut raw = raw_with_database();
    let overrides = Overrides {
        log_json: true,
        ..Default::default()
    };
    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_batch_size_is_rejected() {
    let mut raw = raw_with_database();
    raw.dispatch.batch_size = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero batch size must fail");
    assert!(matches!(
        err,
        SettingsError::InvalidValue {
            field: "dispatch.batch_size",
            ..
        }
    ));
}

#[test]
fn unknown_timezone_is_rejected() {
    let mut raw = raw_with_database();
    raw.dispatch.timezone = Some("Mars/Olympus_Mons".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown timezone must fail");
    assert!(matches!(
        err,
        SettingsError::InvalidValue {
            field: "dispatch.timezone",
            ..
        }
    ));
}

#[test]
fn empty_dispatch_times_are_rejected() {
    let mut raw = raw_with_database();
    raw.dispatch.times = Some(Vec::new());
    let err = Settings::from_raw(raw).expect_err("empty times must fail");
    assert!(matches!(
        err,
        SettingsError::InvalidValue {
            field: "dispatch.times",
            ..
        }
    ));
}

#[test]
fn dispatch_times_parse_and_validate() {
    assert_eq!(
        "08:30".parse::<DispatchTime>().unwrap(),
        DispatchTime {
            hour: 8,
            minute: 30
        }
    );
    assert!("25:00".parse::<DispatchTime>().is_err());
    assert!("12:60".parse::<DispatchTime>().is_err());
    assert!("noon".parse::<DispatchTime>().is_err());
    assert_eq!(
        DispatchTime {
            hour: 8,
            minute: 5
        }
        .to_string(),
        "08:05"
    );
}

#[test]
fn invalid_log_format_is_rejected() {
    let mut raw = raw_with_database();
    raw.logging.format = Some("xml".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown format must fail");
    assert!(matches!(
        err,
        SettingsError::InvalidValue {
            field: "logging.format",
            ..
        }
    ));
}
