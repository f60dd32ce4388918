//! Single-database transfer: pull one database off the device into a
//! container, or push a container onto the device.

use tracing::{debug, warn};

use crate::dlp::commands::{
    CloseDb, CreateDb, DbHandle, DeleteDb, FindDbByOpenHandle, FoundDb, OpenDb, ReadAppBlock,
    ReadDbList, ReadOpenDbInfo, ReadRecordById, ReadRecordIdList, ReadResourceByIndex,
    ReadSortBlock, ResetSystem, WriteAppBlock, WriteRecord, WriteResource, WriteSortBlock,
};
use crate::dlp::types::DbInfo;
use crate::dlp::{
    DbListFlags, DlpClient, DlpDateTime, DlpOutcome, DlpStatus, FindDbOptions, OpenMode, SysInfo,
};
use crate::error::{Result, SyncError};
use crate::pdb::{
    Database, DatabaseEntries, DatabaseHeader, DbAttrs, DbTimestamp, Record, Resource,
};
use crate::wire::TypeTag;

/// Installing anything with this creator forces a reset when the sync ends.
const SYSTEM_PATCH_CREATOR: TypeTag = TypeTag(*b"ptch");
const BOOT_RESOURCE_TYPE: TypeTag = TypeTag(*b"boot");

const ID_LIST_PAGE: u16 = 500;

#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub card_no: u8,
    /// Keep records whose attributes mark them deleted or archived.
    pub include_dead: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions { card_no: 0, include_dead: false }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub card_no: u8,
    /// Delete any existing database of the same name first.
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { card_no: 0, overwrite: true }
    }
}

fn to_db_timestamp(value: DlpDateTime) -> DbTimestamp {
    match value.to_datetime() {
        Ok(Some(dt)) => DbTimestamp::from_unix_seconds(dt.unix_timestamp()),
        _ => DbTimestamp::EPOCH,
    }
}

/// Read one database off the device and re-materialize it as a container.
pub async fn read_database(
    dlp: &mut DlpClient,
    sys_info: &SysInfo,
    name: &str,
    options: ReadOptions,
) -> Result<Database> {
    let handle = dlp
        .execute(&OpenDb {
            card_no: options.card_no,
            mode: OpenMode::READ | OpenMode::SECRET,
            name: name.to_string(),
        })
        .await?;
    let result = read_open_database(dlp, sys_info, handle, name, options).await;
    // Close regardless of how the read went; an error here is secondary.
    if let Err(close_err) = dlp.execute(&CloseDb { handle }).await {
        warn!(name, %close_err, "close after read failed");
    }
    result
}

async fn read_open_database(
    dlp: &mut DlpClient,
    sys_info: &SysInfo,
    handle: DbHandle,
    name: &str,
    options: ReadOptions,
) -> Result<Database> {
    // DLP 1.2 devices report metadata for an open handle directly; older
    // ones need a catalog scan.
    let found: Option<FoundDb> = if sys_info.supports_find_db() {
        match dlp
            .execute_with(
                &FindDbByOpenHandle {
                    handle,
                    options: FindDbOptions::ATTRIBUTES | FindDbOptions::SIZE,
                },
                &[DlpStatus::IllegalRequest, DlpStatus::Unsupported],
            )
            .await?
        {
            DlpOutcome::Ok(found) => Some(found),
            DlpOutcome::Status(status) => {
                debug!(name, ?status, "FindDB unavailable, scanning the catalog");
                None
            }
        }
    } else {
        None
    };

    let info = match &found {
        Some(found) => found.info.clone(),
        None => scan_db_list(dlp, name, options.card_no).await?,
    };

    // Block reads are skipped only when the device told us the size is zero.
    let sizes = found.as_ref().and_then(|f| f.sizes.clone());
    let app_info = if sizes.as_ref().is_none_or(|s| s.app_block_size > 0) {
        read_block(dlp, ReadAppBlock { handle }).await?
    } else {
        None
    };
    let sort_info = if sizes.as_ref().is_none_or(|s| s.sort_block_size > 0) {
        read_block(dlp, ReadSortBlock { handle }).await?
    } else {
        None
    };

    let entries = if info.attributes.contains(DbAttrs::RES_DB) {
        let count = dlp.execute(&ReadOpenDbInfo { handle }).await?.record_count;
        let mut resources = Vec::with_capacity(usize::from(count));
        for index in 0..count {
            let payload = dlp.execute(&ReadResourceByIndex { handle, index }).await?;
            resources.push(Resource {
                type_tag: payload.type_tag,
                id: payload.id,
                payload: payload.payload,
            });
        }
        DatabaseEntries::Resources(resources)
    } else {
        let total = dlp.execute(&ReadOpenDbInfo { handle }).await?.record_count;
        let mut record_ids = Vec::with_capacity(usize::from(total));
        while record_ids.len() < usize::from(total) {
            let page = dlp
                .execute(&ReadRecordIdList {
                    handle,
                    sorted: false,
                    start_index: record_ids.len() as u16,
                    max_ids: ID_LIST_PAGE,
                })
                .await?;
            if page.record_ids.is_empty() {
                break;
            }
            record_ids.extend(page.record_ids);
        }

        let mut records = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            let payload = dlp.execute(&ReadRecordById { handle, record_id }).await?;
            let attrs = payload.attributes;
            if !options.include_dead && (attrs.is_deleted() || attrs.is_archived()) {
                continue;
            }
            records.push(Record {
                attributes: attrs,
                unique_id: payload.record_id & 0x00FF_FFFF,
                payload: payload.payload,
            });
        }
        DatabaseEntries::Records(records)
    };

    Ok(Database {
        header: DatabaseHeader {
            name: info.name,
            attributes: info.attributes & !DbAttrs::OPEN,
            version: info.version,
            created: to_db_timestamp(info.created),
            modified: to_db_timestamp(info.modified),
            backed_up: to_db_timestamp(info.backed_up),
            modification_number: info.modification_number,
            type_tag: info.type_tag,
            creator: info.creator,
            unique_id_seed: 0,
        },
        app_info,
        sort_info,
        entries,
    })
}

async fn read_block<C>(dlp: &mut DlpClient, command: C) -> Result<Option<Vec<u8>>>
where
    C: crate::dlp::DlpCommand<Response = crate::dlp::commands::BlockData>,
{
    match dlp.execute_with(&command, &[DlpStatus::NotFound]).await? {
        DlpOutcome::Ok(block) if block.data.is_empty() => Ok(None),
        DlpOutcome::Ok(block) => Ok(Some(block.data)),
        DlpOutcome::Status(_) => Ok(None),
    }
}

/// Find a database by name in the device catalog, RAM first, then ROM.
pub async fn scan_db_list(dlp: &mut DlpClient, name: &str, card_no: u8) -> Result<DbInfo> {
    for store in [DbListFlags::RAM, DbListFlags::ROM] {
        let databases = list_databases(dlp, store, card_no).await?;
        if let Some(info) = databases.into_iter().find(|db| db.name == name) {
            return Ok(info);
        }
    }
    Err(SyncError::Remote { command: "ReadDBList", status: DlpStatus::NotFound })
}

/// Enumerate one store of the device catalog, advancing past the last
/// returned index until the device answers NOT_FOUND.
pub async fn list_databases(
    dlp: &mut DlpClient,
    store: DbListFlags,
    card_no: u8,
) -> Result<Vec<DbInfo>> {
    let mut out = Vec::new();
    let mut start_index = 0u16;
    loop {
        let outcome = dlp
            .execute_with(
                &ReadDbList { flags: store | DbListFlags::MULTIPLE, card_no, start_index },
                &[DlpStatus::NotFound],
            )
            .await?;
        match outcome {
            DlpOutcome::Ok(page) => {
                let last_index = page.last_index;
                out.extend(page.databases);
                start_index = last_index.wrapping_add(1);
                if start_index == 0 {
                    break;
                }
            }
            DlpOutcome::Status(_) => break,
        }
    }
    Ok(out)
}

/// Push a container onto the device, creating the database from scratch.
pub async fn write_database(
    dlp: &mut DlpClient,
    database: &Database,
    options: WriteOptions,
) -> Result<()> {
    let header = &database.header;
    if options.overwrite {
        dlp.execute_with(
            &DeleteDb { card_no: options.card_no, name: header.name.clone() },
            &[DlpStatus::NotFound],
        )
        .await?;
    }

    let handle = dlp
        .execute(&CreateDb {
            creator: header.creator,
            type_tag: header.type_tag,
            card_no: options.card_no,
            attributes: header.attributes & !DbAttrs::OPEN,
            version: header.version,
            name: header.name.clone(),
        })
        .await?;

    if let Some(block) = database.app_info.as_ref().filter(|b| !b.is_empty()) {
        dlp.execute(&WriteAppBlock { handle, data: block.clone() }).await?;
    }
    if let Some(block) = database.sort_info.as_ref().filter(|b| !b.is_empty()) {
        dlp.execute(&WriteSortBlock { handle, data: block.clone() }).await?;
    }

    let mut has_boot_resource = false;
    match &database.entries {
        DatabaseEntries::Records(records) => {
            for record in records {
                dlp.execute(&WriteRecord {
                    handle,
                    record_id: record.unique_id,
                    attributes: record.attributes,
                    payload: record.payload.clone(),
                })
                .await?;
            }
        }
        DatabaseEntries::Resources(resources) => {
            for resource in resources {
                has_boot_resource |= resource.type_tag == BOOT_RESOURCE_TYPE;
                dlp.execute(&WriteResource {
                    handle,
                    type_tag: resource.type_tag,
                    id: resource.id,
                    payload: resource.payload.clone(),
                })
                .await?;
            }
        }
    }

    let needs_reset = header.attributes.contains(DbAttrs::RESET_AFTER_INSTALL)
        || header.creator == SYSTEM_PATCH_CREATOR
        || has_boot_resource;
    if needs_reset {
        debug!(name = %header.name, "scheduling reset after install");
        dlp.execute(&ResetSystem).await?;
    }

    dlp.execute(&CloseDb { handle }).await?;
    Ok(())
}
