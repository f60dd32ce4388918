//! TOML configuration for the CLI and the servers.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::conduit::HostIdentity;
use crate::error::{Result, SyncError};
use crate::netsync::{NETSYNC_DATA_PORT, SERIAL_BRIDGE_PORT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// The device directory: `databases/`, `install/` and the pairing file
    /// live underneath.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Overrides the identity derived from `host_name`. The device stores
    /// this as `lastSyncPc`; changing it downgrades the next sync to a slow
    /// sync.
    #[serde(default)]
    pub pc_id: Option<u32>,
    /// Name announced in sync log entries and hashed into the default pc id.
    #[serde(default = "default_host_name")]
    pub host_name: String,
    #[serde(default)]
    pub net: NetConfig,
    #[serde(default)]
    pub serial: SerialConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetConfig {
    /// Bind address for both listeners.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Network HotSync data port.
    #[serde(default = "default_data_port")]
    pub port: u16,
    /// Serial-over-network bridge port (emulators).
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Serial device node, e.g. `/dev/ttyUSB0`.
    #[serde(default)]
    pub device: Option<String>,
    /// Cap on the rate CMP may negotiate.
    #[serde(default = "default_max_baud")]
    pub max_baud: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("palm-data")
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "palmsync-host".to_string())
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_data_port() -> u16 {
    NETSYNC_DATA_PORT
}

fn default_bridge_port() -> u16 {
    SERIAL_BRIDGE_PORT
}

fn default_max_baud() -> u32 {
    crate::cmp::DEFAULT_HOST_MAX_BAUD
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            pc_id: None,
            host_name: default_host_name(),
            net: NetConfig::default(),
            serial: SerialConfig::default(),
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            bind: default_bind(),
            port: default_data_port(),
            bridge_port: default_bridge_port(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig { device: None, max_baud: default_max_baud() }
    }
}

impl Config {
    /// The identity the device will remember this host by. The pc id must
    /// be stable across runs, so the fallback is a deterministic fold of
    /// the host name rather than anything random.
    pub fn host_identity(&self) -> HostIdentity {
        let pc_id = self.pc_id.unwrap_or_else(|| fnv1a(self.host_name.as_bytes()).max(1));
        HostIdentity { pc_id, host_name: self.host_name.clone() }
    }
}

/// 32-bit FNV-1a.
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash = 0x811C_9DC5u32;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .map_err(|e| SyncError::Validation(format!("failed to read config file: {e}")))?;
    let config: Config = toml::from_str(&raw)
        .map_err(|e| SyncError::Validation(format!("failed to parse config: {e}")))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.net.port == config.net.bridge_port {
        return Err(SyncError::Validation(format!(
            "data port and bridge port are both {}",
            config.net.port
        )));
    }
    if config.serial.max_baud < crate::cmp::INITIAL_BAUD {
        return Err(SyncError::Validation(format!(
            "max_baud {} is below the initial rate {}",
            config.serial.max_baud,
            crate::cmp::INITIAL_BAUD
        )));
    }
    Ok(())
}
