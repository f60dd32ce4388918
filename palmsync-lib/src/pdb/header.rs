//! The fixed 72-byte database header.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SyncError};
use crate::pdb::attrs::DbAttrs;
use crate::pdb::timestamp::DbTimestamp;
use crate::wire::{put_padded_string, Reader, TypeTag};

pub const HEADER_LEN: usize = 72;
pub const NAME_FIELD_WIDTH: usize = 32;
pub const MAX_NAME_LEN: usize = NAME_FIELD_WIDTH - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHeader {
    /// Database name, at most 31 latin-1 bytes.
    pub name: String,
    pub attributes: DbAttrs,
    pub version: u16,
    pub created: DbTimestamp,
    pub modified: DbTimestamp,
    pub backed_up: DbTimestamp,
    pub modification_number: u32,
    pub type_tag: TypeTag,
    pub creator: TypeTag,
    pub unique_id_seed: u32,
}

impl DatabaseHeader {
    pub fn new(name: &str, type_tag: TypeTag, creator: TypeTag) -> Self {
        DatabaseHeader {
            name: name.to_string(),
            attributes: DbAttrs::empty(),
            version: 0,
            created: DbTimestamp::now(),
            modified: DbTimestamp::now(),
            backed_up: DbTimestamp::EPOCH,
            modification_number: 0,
            type_tag,
            creator,
            unique_id_seed: 0,
        }
    }

    pub fn is_resource_db(&self) -> bool {
        self.attributes.contains(DbAttrs::RES_DB)
    }
}

/// Offsets lifted from the raw header; they only exist on the wire and are
/// recomputed from scratch on emit.
#[derive(Debug, Clone, Copy)]
pub struct BlockOffsets {
    pub app_info: u32,
    pub sort_info: u32,
}

pub fn parse_header(r: &mut Reader<'_>) -> Result<(DatabaseHeader, BlockOffsets)> {
    let name = r.padded_string(NAME_FIELD_WIDTH)?;
    let attributes = DbAttrs::from_bits_retain(r.u16()?);
    let version = r.u16()?;
    let created = DbTimestamp::from_raw(r.u32()?);
    let modified = DbTimestamp::from_raw(r.u32()?);
    let backed_up = DbTimestamp::from_raw(r.u32()?);
    let modification_number = r.u32()?;
    let app_info = r.u32()?;
    let sort_info = r.u32()?;
    let type_tag = r.tag()?;
    let creator = r.tag()?;
    let unique_id_seed = r.u32()?;
    Ok((
        DatabaseHeader {
            name,
            attributes,
            version,
            created,
            modified,
            backed_up,
            modification_number,
            type_tag,
            creator,
            unique_id_seed,
        },
        BlockOffsets { app_info, sort_info },
    ))
}

pub fn emit_header(
    buf: &mut BytesMut,
    header: &DatabaseHeader,
    offsets: BlockOffsets,
) -> Result<()> {
    if header.name.len() > MAX_NAME_LEN {
        return Err(SyncError::Validation(format!(
            "database name {:?} exceeds {MAX_NAME_LEN} bytes",
            header.name
        )));
    }
    put_padded_string(buf, &header.name, NAME_FIELD_WIDTH)?;
    buf.put_u16(header.attributes.bits());
    buf.put_u16(header.version);
    buf.put_u32(header.created.to_raw()?);
    buf.put_u32(header.modified.to_raw()?);
    buf.put_u32(header.backed_up.to_raw()?);
    buf.put_u32(header.modification_number);
    buf.put_u32(offsets.app_info);
    buf.put_u32(offsets.sort_info);
    buf.extend_from_slice(&header.type_tag.0);
    buf.extend_from_slice(&header.creator.0);
    buf.put_u32(header.unique_id_seed);
    Ok(())
}
