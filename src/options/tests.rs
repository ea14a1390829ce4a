use super::*;
use encoding_rs::{WINDOWS_1251, WINDOWS_874, UTF_8};

#[test]
fn test_single_encoding_applies_to_every_field() {
    let resolver = EncodingResolver::new(Some(&EncodingConfig::from("utf-8"))).unwrap();
    assert_eq!(resolver.for_field("NAME"), UTF_8);
    assert_eq!(resolver.for_field("CITY"), UTF_8);
}

#[test]
fn test_per_field_encoding_falls_back_to_default() {
    let config = EncodingConfig::from_map(vec![
        ("default", "tis-620"),
        ("NAME", "windows-1251")
    ]).unwrap();
    let resolver = EncodingResolver::new(Some(&config)).unwrap();

    assert_eq!(resolver.for_field("NAME"), WINDOWS_1251);
    assert_eq!(resolver.for_field("CITY"), WINDOWS_874);
}

#[test]
fn test_encoding_map_without_default_is_rejected() {
    let result = EncodingConfig::from_map(vec![("NAME", "utf-8")]);
    assert!(matches!(result, Err(DbfError::InvalidConfiguration(_))));
}

#[test]
fn test_unknown_label_is_rejected() {
    let config = EncodingConfig::PerField {
        default: "utf-8".to_owned(),
        fields: vec![("NAME".to_owned(), "no-such-charset".to_owned())].into_iter().collect()
    };
    assert!(matches!(EncodingResolver::new(Some(&config)), Err(DbfError::InvalidConfiguration(_))));
}

#[test]
fn test_unconfigured_resolver_uses_fallback() {
    let resolver = EncodingResolver::new(None).unwrap();
    assert_eq!(resolver.for_field("NAME"), WINDOWS_1252);

    let resolver = resolver.with_fallback(WINDOWS_1251);
    assert_eq!(resolver.for_field("NAME"), WINDOWS_1251);
}

#[test]
fn test_configured_encoding_wins_over_fallback() {
    let resolver = EncodingResolver::new(Some(&EncodingConfig::from("utf-8")))
        .unwrap()
        .with_fallback(WINDOWS_1251);
    assert_eq!(resolver.for_field("NAME"), UTF_8);
}

#[test]
fn test_codepage_labels_resolve() {
    for driver in 0..=255u8 {
        if let Some(label) = codepage_label(driver) {
            assert!(Encoding::for_label(label.as_bytes()).is_some(), "label {} for driver {}", label, driver);
        }
    }
    assert_eq!(codepage_label(124), Some("tis-620"));
    assert_eq!(codepage_label(1), None);
}

#[test]
fn test_read_mode_maps_to_tolerance() {
    assert_eq!(Tolerance::from(ReadMode::Strict).structure, Policy::Reject);
    assert_eq!(Tolerance::from(ReadMode::Loose).field_types, Policy::Tolerate);

    let options = Options::default().loose();
    assert_eq!(options.tolerance.structure, Policy::Tolerate);
    assert_eq!(options.file_version, Version::DBaseIIIPlus);
    assert!(!options.include_deleted_records);
}

#[test]
fn test_language_driver_reverses_codepage_label() {
    assert_eq!(language_driver(WINDOWS_874), Some(124));
    assert_eq!(language_driver(WINDOWS_1251), Some(201));
    assert_eq!(language_driver(WINDOWS_1252), Some(3));
    assert_eq!(language_driver(UTF_8), None);
}
