use palmsync_lib::config::{load_from_path, Config};
use palmsync_lib::SyncError;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn write_config(contents: &str) -> Result<tempfile::NamedTempFile, std::io::Error> {
    let file = tempfile::NamedTempFile::new()?;
    std::fs::write(file.path(), contents)?;
    Ok(file)
}

#[test]
fn minimal_config_gets_the_documented_defaults() -> TestResult {
    let file = write_config("")?;
    let config = load_from_path(file.path())?;
    assert_eq!(config.net.port, 14238);
    assert_eq!(config.net.bridge_port, 6416);
    assert_eq!(config.serial.max_baud, 115_200);
    assert_eq!(config.data_dir, std::path::PathBuf::from("palm-data"));
    Ok(())
}

#[test]
fn full_config_overrides_everything() -> TestResult {
    let file = write_config(
        r#"
data_dir = "/var/lib/palmsync"
pc_id = 305419896
host_name = "workstation"

[net]
bind = "127.0.0.1"
port = 24238
bridge_port = 24239

[serial]
device = "/dev/ttyUSB0"
max_baud = 57600
"#,
    )?;
    let config = load_from_path(file.path())?;
    assert_eq!(config.net.bind, "127.0.0.1");
    assert_eq!(config.net.port, 24238);
    assert_eq!(config.serial.device.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(config.host_identity().pc_id, 0x1234_5678);
    Ok(())
}

#[test]
fn colliding_ports_are_rejected() -> TestResult {
    let file = write_config("[net]\nport = 7000\nbridge_port = 7000\n")?;
    assert!(matches!(load_from_path(file.path()), Err(SyncError::Validation(_))));
    Ok(())
}

#[test]
fn sub_initial_baud_is_rejected() -> TestResult {
    let file = write_config("[serial]\nmax_baud = 1200\n")?;
    assert!(matches!(load_from_path(file.path()), Err(SyncError::Validation(_))));
    Ok(())
}

#[test]
fn missing_file_is_a_validation_error() {
    assert!(matches!(
        load_from_path("/nonexistent/palmsync.toml"),
        Err(SyncError::Validation(_))
    ));
}

#[test]
fn derived_pc_id_is_stable_and_nonzero() {
    let mut config = Config::default();
    config.host_name = "some-host".into();
    config.pc_id = None;
    let first = config.host_identity().pc_id;
    let second = config.host_identity().pc_id;
    assert_eq!(first, second, "pc id must not change between runs");
    assert_ne!(first, 0, "zero means 'never synced' on the wire");
}
