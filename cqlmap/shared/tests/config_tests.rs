use cqlmap_shared::config::{defaults, BatchDispatch, LogFormat, MapperConfig, VersionCheck};
use cqlmap_shared::MapperError;
use std::io::Write;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
versioning = "verify_read"

[paging]
default_page_size = 50
max_page_size = 200

[batch]
batch_size = 10
dispatch = "individual"

[logging]
level = "debug"
format = "json"
"#
    )
    .unwrap();

    let config = MapperConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.paging.default_page_size, 50);
    assert_eq!(config.paging.max_page_size, 200);
    assert_eq!(config.batch.batch_size, 10);
    assert_eq!(config.batch.dispatch, BatchDispatch::Individual);
    assert_eq!(config.versioning, VersionCheck::VerifyRead);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cqlmap.toml");

    let mut config = MapperConfig::default();
    config.batch.batch_size = 7;
    config.save_to_file(&path).unwrap();

    let reloaded = MapperConfig::load_from_file(&path).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_empty_file_gives_defaults() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = MapperConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.batch.batch_size, defaults::DEFAULT_BATCH_SIZE);
    assert_eq!(config.paging.max_page_size, defaults::DEFAULT_MAX_PAGE_SIZE);
}

#[test]
fn test_missing_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MapperConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, MapperError::Configuration(_)));
}

#[test]
fn test_malformed_toml_is_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[paging\ndefault_page_size = ").unwrap();
    let err = MapperConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, MapperError::Configuration(_)));
}
