//! Global subscriber setup; kept in its own test binary

use composite_resolver::LoggingSettings;
use composite_resolver::logging;

#[test]
fn test_init_with_log_directory() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    let settings = LoggingSettings {
        filter: Some("composite_resolver=debug".to_string()),
        directory: Some(logs.clone()),
        ansi: false,
        ..LoggingSettings::default()
    };

    logging::init(&settings).unwrap();
    tracing::info!("logging initialized");
    assert!(logs.is_dir());

    // Only one global subscriber per process.
    assert!(logging::init(&settings).is_err());
}
