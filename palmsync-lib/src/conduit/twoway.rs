//! Two-way record reconciliation between a backed-up database and its live
//! copy on the device, driven by the dirty/delete/archive flags.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::dlp::commands::{
    CleanUpDatabase, CloseDb, OpenDb, ReadOpenDbInfo, ReadRecordById, ReadRecordIdList,
    ResetSyncFlags, WriteRecord,
};
use crate::dlp::types::RecordPayload;
use crate::dlp::{DlpClient, DlpOutcome, DlpStatus, OpenMode};
use crate::error::Result;
use crate::pdb::{Database, DatabaseEntries, Record, RecordAttrs};

use super::SyncMode;

/// What the reconciliation did, for the sync log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TwoWayStats {
    pub taken_from_device: usize,
    pub sent_to_device: usize,
    pub deleted_on_host: usize,
}

impl TwoWayStats {
    pub fn changed(&self) -> bool {
        *self != TwoWayStats::default()
    }
}

/// Reconcile one record database. The host copy is updated in place; the
/// caller persists it afterwards. Resource databases are not reconciled
/// record-wise and must not be passed here.
pub async fn sync_database(
    dlp: &mut DlpClient,
    host_db: &mut Database,
    mode: SyncMode,
) -> Result<TwoWayStats> {
    let handle = dlp
        .execute(&OpenDb {
            card_no: 0,
            mode: OpenMode::READ | OpenMode::WRITE | OpenMode::SECRET,
            name: host_db.header.name.clone(),
        })
        .await?;

    let result = reconcile(dlp, handle, host_db, mode).await;

    if result.is_ok() {
        // Post-sync bookkeeping: purge deleted records and clear dirty
        // flags on the device. Older devices may not support either.
        dlp.execute_with(&CleanUpDatabase { handle }, &[DlpStatus::Unsupported, DlpStatus::IllegalRequest])
            .await?;
        dlp.execute_with(&ResetSyncFlags { handle }, &[DlpStatus::Unsupported, DlpStatus::IllegalRequest])
            .await?;
    }
    dlp.execute(&CloseDb { handle }).await?;
    result
}

async fn reconcile(
    dlp: &mut DlpClient,
    handle: crate::dlp::commands::DbHandle,
    host_db: &mut Database,
    mode: SyncMode,
) -> Result<TwoWayStats> {
    let DatabaseEntries::Records(host_records) = &mut host_db.entries else {
        return Ok(TwoWayStats::default());
    };

    let device_records = read_device_records(dlp, handle).await?;
    let device_by_id: BTreeMap<u32, &RecordPayload> =
        device_records.iter().map(|r| (r.record_id & 0x00FF_FFFF, r)).collect();

    let mut host_by_id: BTreeMap<u32, Record> = std::mem::take(host_records)
        .into_iter()
        .map(|r| (r.unique_id, r))
        .collect();

    let mut stats = TwoWayStats::default();

    for device_record in &device_records {
        let unique_id = device_record.record_id & 0x00FF_FFFF;
        let attrs = device_record.attributes;
        if attrs.is_deleted() || attrs.is_archived() {
            // TODO: land archived payloads in an archive directory instead
            // of dropping them with the deletions.
            if host_by_id.remove(&unique_id).is_some() {
                stats.deleted_on_host += 1;
            }
            continue;
        }
        let device_is_authoritative = match mode {
            // Fast sync trusts the flags: only flagged records moved.
            SyncMode::Fast => attrs.is_dirty(),
            // Slow and first syncs cannot trust them; the device copy wins
            // for every record it holds.
            SyncMode::Slow | SyncMode::First => true,
        };
        let known_to_host = host_by_id.contains_key(&unique_id);
        if device_is_authoritative || !known_to_host {
            host_by_id.insert(
                unique_id,
                Record {
                    attributes: clear_dirty(attrs),
                    unique_id,
                    payload: device_record.payload.clone(),
                },
            );
            stats.taken_from_device += 1;
        }
    }

    // Host-side records the device does not hold, and host edits made since
    // the last sync. A dirty host record always goes to the device; a clean
    // one the device lacks only goes over when the flags cannot be trusted.
    let mut sent_ids = std::collections::BTreeSet::new();
    for record in host_by_id.values_mut() {
        let on_device = device_by_id.contains_key(&record.unique_id);
        let send = record.attributes.is_dirty() || (!on_device && mode != SyncMode::Fast);
        if send {
            let assigned = dlp
                .execute(&WriteRecord {
                    handle,
                    record_id: record.unique_id,
                    attributes: clear_dirty(record.attributes),
                    payload: record.payload.clone(),
                })
                .await?;
            record.unique_id = assigned.0 & 0x00FF_FFFF;
            record.attributes = clear_dirty(record.attributes);
            sent_ids.insert(record.unique_id);
            stats.sent_to_device += 1;
        }
    }

    let mut merged: Vec<Record> = host_by_id.into_values().collect();
    if mode == SyncMode::Fast {
        // On a fast sync, a clean host record the device no longer holds was
        // deleted on the device.
        let before = merged.len();
        merged.retain(|r| {
            device_by_id.contains_key(&r.unique_id) || sent_ids.contains(&r.unique_id)
        });
        stats.deleted_on_host += before - merged.len();
    }
    *host_records = merged;
    host_db.header.modification_number += 1;

    info!(
        name = %host_db.header.name,
        from_device = stats.taken_from_device,
        to_device = stats.sent_to_device,
        deleted = stats.deleted_on_host,
        "two-way sync complete"
    );
    Ok(stats)
}

fn clear_dirty(attrs: RecordAttrs) -> RecordAttrs {
    match attrs {
        RecordAttrs::Live { category, secret, .. } => {
            RecordAttrs::Live { category, dirty: false, secret }
        }
        dead @ RecordAttrs::Dead { .. } => dead,
    }
}

async fn read_device_records(
    dlp: &mut DlpClient,
    handle: crate::dlp::commands::DbHandle,
) -> Result<Vec<RecordPayload>> {
    let total = dlp.execute(&ReadOpenDbInfo { handle }).await?.record_count;
    let mut record_ids = Vec::with_capacity(usize::from(total));
    while record_ids.len() < usize::from(total) {
        let page = dlp
            .execute(&ReadRecordIdList {
                handle,
                sorted: false,
                start_index: record_ids.len() as u16,
                max_ids: 500,
            })
            .await?;
        if page.record_ids.is_empty() {
            break;
        }
        record_ids.extend(page.record_ids);
    }
    let mut records = Vec::with_capacity(record_ids.len());
    for record_id in record_ids {
        match dlp
            .execute_with(&ReadRecordById { handle, record_id }, &[DlpStatus::NotFound])
            .await?
        {
            DlpOutcome::Ok(record) => records.push(record),
            DlpOutcome::Status(_) => {
                debug!(record_id, "record vanished between id-list and read");
            }
        }
    }
    Ok(records)
}
