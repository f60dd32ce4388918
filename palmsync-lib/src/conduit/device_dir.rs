//! The per-device directory on the host: backed-up databases, the install
//! staging area, and the JSON identity file for the pairing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::pdb::Database;

const PAIRING_FILE: &str = "palm-id.json";
const DATABASES_DIR: &str = "databases";
const INSTALL_DIR: &str = "install";

/// The persisted identity of the device this directory belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    #[serde(rename = "userId")]
    pub user_id: u32,
    #[serde(rename = "userName")]
    pub user_name: String,
}

pub struct DeviceDir {
    root: PathBuf,
}

impl DeviceDir {
    /// Open (creating as needed) the directory layout under `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(DATABASES_DIR)).await?;
        fs::create_dir_all(root.join(INSTALL_DIR)).await?;
        Ok(DeviceDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn databases_dir(&self) -> PathBuf {
        self.root.join(DATABASES_DIR)
    }

    pub fn install_dir(&self) -> PathBuf {
        self.root.join(INSTALL_DIR)
    }

    pub async fn load_pairing(&self) -> Result<Option<Pairing>> {
        let path = self.root.join(PAIRING_FILE);
        match fs::read_to_string(&path).await {
            Ok(raw) => {
                let pairing = serde_json::from_str(&raw)
                    .map_err(|e| SyncError::Validation(format!("corrupt {PAIRING_FILE}: {e}")))?;
                Ok(Some(pairing))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_pairing(&self, pairing: &Pairing) -> Result<()> {
        let raw = serde_json::to_string_pretty(pairing)
            .map_err(|e| SyncError::Validation(format!("pairing serialization: {e}")))?;
        fs::write(self.root.join(PAIRING_FILE), raw).await?;
        Ok(())
    }

    /// File name a database is stored under: the database name with path
    /// separators replaced, plus the conventional extension.
    pub fn database_path(&self, name: &str, resource_db: bool) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
            .collect();
        let ext = if resource_db { "prc" } else { "pdb" };
        self.databases_dir().join(format!("{safe}.{ext}"))
    }

    pub async fn save_database(&self, database: &Database) -> Result<PathBuf> {
        let path = self.database_path(&database.header.name, database.header.is_resource_db());
        let raw = database.emit()?;
        fs::write(&path, raw).await?;
        debug!(name = %database.header.name, path = %path.display(), "database saved");
        Ok(path)
    }

    pub async fn load_database(&self, path: &Path) -> Result<Database> {
        let raw = fs::read(path).await?;
        Database::parse(&raw)
    }

    /// Names of all databases currently backed up here, with their paths.
    pub async fn backed_up_databases(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(self.databases_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match self.load_database(&path).await {
                Ok(database) => out.push((database.header.name.clone(), path)),
                Err(err) => {
                    debug!(path = %path.display(), %err, "skipping unreadable database file");
                }
            }
        }
        Ok(out)
    }

    /// Files staged for installation.
    pub async fn install_files(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(self.install_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Move an installed file out of the staging area into `databases/`.
    pub async fn mark_installed(&self, path: &Path, database: &Database) -> Result<()> {
        let target = self.database_path(&database.header.name, database.header.is_resource_db());
        fs::rename(path, &target).await?;
        Ok(())
    }
}
