use std::fs;

use gleaner_logging::{glean_debug, glean_warn, initialize, LogDestination, LogSettings};
use log::LevelFilter;

#[test]
fn file_destination_writes_records_at_configured_level() {
    let dir = tempfile::tempdir().unwrap();
    let settings = LogSettings {
        destination: LogDestination::File,
        level: LevelFilter::Warn,
        file_path: dir.path().join("scrape.log"),
    };

    assert!(initialize(&settings));
    glean_warn!("two objects share id {}", 42);
    glean_debug!("filtered out by level");

    let content = fs::read_to_string(&settings.file_path).unwrap();
    assert!(content.contains("two objects share id 42"), "{content}");
    assert!(!content.contains("filtered out by level"), "{content}");

    // A second logger cannot replace the first one.
    assert!(!initialize(&LogSettings::default()));
}

#[test]
fn default_settings_log_to_terminal_at_info() {
    let settings = LogSettings::default();
    assert_eq!(settings.destination, LogDestination::Terminal);
    assert_eq!(settings.level, LevelFilter::Info);
}
