//! The sync orchestrator: the conduits that run, in order, once a session
//! is up, and the state that decides how much they trust the device's
//! sync flags.

pub mod device_dir;
pub mod transfer;
pub mod twoway;

pub use device_dir::{DeviceDir, Pairing};
pub use transfer::{
    list_databases, read_database, scan_db_list, write_database, ReadOptions, WriteOptions,
};

use rand::Rng;
use tracing::{info, warn};

use crate::dlp::commands::{
    OpenConduit, SetSysDateTime, SyncTermination, UserInfoFields, WriteUserInfo,
};
use crate::dlp::types::DbInfo;
use crate::dlp::{DbListFlags, DlpDateTime, UserInfo};
use crate::error::{Result, SyncError};
use crate::pdb::DbAttrs;
use crate::session::SyncSession;

/// How much the orchestrator trusts the device's per-record sync flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Never synced before: the device has no user id for this pairing.
    First,
    /// Last synced against a different host; flags are unreliable.
    Slow,
    /// Last synced against this host; flags can drive the record merge.
    Fast,
}

/// The host's identity as the device will remember it.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub pc_id: u32,
    pub host_name: String,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub mode: Option<SyncMode>,
    pub downloaded: usize,
    pub synced: usize,
    pub installed: usize,
    pub skipped: usize,
}

impl SyncSummary {
    fn log_line(&self) -> String {
        format!(
            "palmsync: {} new, {} synced, {} installed{}",
            self.downloaded,
            self.synced,
            self.installed,
            if self.skipped > 0 { format!(", {} skipped", self.skipped) } else { String::new() }
        )
    }
}

/// Run a full device sync against a per-device directory.
///
/// The session must have completed `handshake()` and `start()`. Per-database
/// failures are logged and skipped; the remaining databases still sync. A
/// failure before the conduits start, or while ending the session, aborts.
pub async fn sync_device(
    session: &mut SyncSession,
    dir: &DeviceDir,
    host: &HostIdentity,
) -> Result<SyncSummary> {
    session.dlp().execute(&OpenConduit).await?;

    let user_info = session
        .user_info()
        .cloned()
        .ok_or_else(|| SyncError::Protocol("sync started before session.start()".into()))?;
    let mode = establish_pairing(session, dir, host, user_info).await?;
    info!(?mode, "sync mode decided");

    let mut summary = SyncSummary { mode: Some(mode), ..SyncSummary::default() };
    let sys_info = session
        .sys_info()
        .cloned()
        .ok_or_else(|| SyncError::Protocol("sync started before session.start()".into()))?;

    let device_databases = list_databases(session.dlp(), DbListFlags::RAM, 0).await?;
    let backed_up = dir.backed_up_databases().await?;

    // Conduit 1: download databases the host has never seen.
    for info in &device_databases {
        if backed_up.iter().any(|(name, _)| name == &info.name) {
            continue;
        }
        match read_database(session.dlp(), &sys_info, &info.name, ReadOptions::default()).await {
            Ok(database) => {
                dir.save_database(&database).await?;
                summary.downloaded += 1;
            }
            Err(err) => {
                warn!(name = %info.name, %err, "download failed, skipping database");
                summary.skipped += 1;
            }
        }
    }

    // Conduit 2: two-way record sync for databases present on both sides.
    for (name, path) in &backed_up {
        let Some(info) = device_databases.iter().find(|db| &db.name == name) else {
            continue;
        };
        if info.attributes.contains(DbAttrs::RES_DB) {
            continue;
        }
        match sync_one(session, dir, path, mode).await {
            Ok(changed) => {
                if changed {
                    summary.synced += 1;
                }
            }
            Err(err) => {
                warn!(name = %name, %err, "two-way sync failed, skipping database");
                summary.skipped += 1;
            }
        }
    }

    // Conduit 3: install staged databases the device lacks.
    for path in dir.install_files().await? {
        match install_one(session, dir, &path, &device_databases).await {
            Ok(true) => summary.installed += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(path = %path.display(), %err, "install failed, skipping file");
                summary.skipped += 1;
            }
        }
    }

    // Conduit 4: set the device clock from the host's.
    if let Err(err) = session
        .dlp()
        .execute(&SetSysDateTime { date_time: DlpDateTime::now() })
        .await
    {
        warn!(%err, "clock update failed");
    }

    // Final bookkeeping: remember this host and this sync on the device.
    let now = DlpDateTime::now();
    session
        .dlp()
        .execute(&WriteUserInfo {
            user_id: 0,
            viewer_id: 0,
            last_sync_pc: host.pc_id,
            last_sync_date: now,
            fields: UserInfoFields::LAST_SYNC_PC | UserInfoFields::LAST_SYNC_DATE,
            user_name: String::new(),
        })
        .await?;

    session.end(&summary.log_line(), SyncTermination::Normal).await?;
    Ok(summary)
}

/// Assign a user id on first contact and decide the sync mode.
async fn establish_pairing(
    session: &mut SyncSession,
    dir: &DeviceDir,
    host: &HostIdentity,
    mut user_info: UserInfo,
) -> Result<SyncMode> {
    if user_info.user_id == 0 {
        let user_id: u32 = rand::rng().random_range(1..=u32::MAX);
        info!(user_id, "device has no user id, assigning one");
        session
            .dlp()
            .execute(&WriteUserInfo {
                user_id,
                viewer_id: 0,
                last_sync_pc: host.pc_id,
                last_sync_date: DlpDateTime::now(),
                fields: UserInfoFields::USER_ID | UserInfoFields::LAST_SYNC_PC,
                user_name: user_info.user_name.clone(),
            })
            .await?;
        user_info.user_id = user_id;
        dir.save_pairing(&Pairing { user_id, user_name: user_info.user_name.clone() })
            .await?;
        session.set_user_info(user_info);
        return Ok(SyncMode::First);
    }

    match dir.load_pairing().await? {
        None => {
            // Known device, new host directory: remember it and resync
            // everything.
            dir.save_pairing(&Pairing {
                user_id: user_info.user_id,
                user_name: user_info.user_name.clone(),
            })
            .await?;
            Ok(SyncMode::Slow)
        }
        Some(pairing) if pairing.user_id != user_info.user_id => Err(SyncError::Validation(
            format!(
                "directory belongs to user id {:#010x}, device reports {:#010x}",
                pairing.user_id, user_info.user_id
            ),
        )),
        Some(_) if user_info.last_sync_pc != host.pc_id => Ok(SyncMode::Slow),
        Some(_) => Ok(SyncMode::Fast),
    }
}

async fn sync_one(
    session: &mut SyncSession,
    dir: &DeviceDir,
    path: &std::path::Path,
    mode: SyncMode,
) -> Result<bool> {
    let mut host_db = dir.load_database(path).await?;
    let stats = twoway::sync_database(session.dlp(), &mut host_db, mode).await?;
    if stats.changed() {
        dir.save_database(&host_db).await?;
    }
    Ok(stats.changed())
}

async fn install_one(
    session: &mut SyncSession,
    dir: &DeviceDir,
    path: &std::path::Path,
    device_databases: &[DbInfo],
) -> Result<bool> {
    let database = dir.load_database(path).await?;
    if device_databases.iter().any(|db| db.name == database.header.name) {
        info!(name = %database.header.name, "already on device, leaving staged file in place");
        return Ok(false);
    }
    write_database(session.dlp(), &database, WriteOptions::default()).await?;
    dir.mark_installed(path, &database).await?;
    Ok(true)
}
