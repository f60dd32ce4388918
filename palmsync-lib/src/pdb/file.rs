//! Whole-file parse and emit for PDB (record) and PRC (resource) databases.
//!
//! The on-disk layout is: 72-byte header, then a metadata list (8-byte
//! record entries or 10-byte resource entries, selected by the header's
//! resource-database bit), two bytes of padding, and finally the AppInfo
//! block, SortInfo block and entry payloads, in that order. Payload extents
//! are implicit: each one runs to the next entry's offset, or end of file.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SyncError};
use crate::pdb::attrs::RecordAttrs;
use crate::pdb::header::{emit_header, parse_header, BlockOffsets, DatabaseHeader, HEADER_LEN};
use crate::wire::{put_u24, Reader, TypeTag};

const RECORD_ENTRY_LEN: usize = 8;
const RESOURCE_ENTRY_LEN: usize = 10;
const LIST_HEADER_LEN: usize = 6;
const LIST_PADDING_LEN: usize = 2;

/// One record: payload plus the 8-bit attribute byte and 24-bit unique id
/// from its metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub attributes: RecordAttrs,
    pub unique_id: u32,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub type_tag: TypeTag,
    pub id: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEntries {
    Records(Vec<Record>),
    Resources(Vec<Resource>),
}

impl DatabaseEntries {
    pub fn len(&self) -> usize {
        match self {
            DatabaseEntries::Records(records) => records.len(),
            DatabaseEntries::Resources(resources) => resources.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    pub header: DatabaseHeader,
    pub app_info: Option<Vec<u8>>,
    pub sort_info: Option<Vec<u8>>,
    pub entries: DatabaseEntries,
}

impl Database {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut r = Reader::new(raw);
        let (header, offsets) = parse_header(&mut r)?;

        let next_list_id = r.u32()?;
        if next_list_id != 0 {
            return Err(SyncError::framing(
                format!("chained metadata lists are not supported (next id {next_list_id:#x})"),
                raw,
            ));
        }
        let count = usize::from(r.u16()?);

        // Collect the raw entries before slicing payloads so the boundary of
        // entry i can come from entry i + 1.
        enum RawEntry {
            Record { offset: u32, attr: u8, unique_id: u32 },
            Resource { type_tag: TypeTag, id: u16, offset: u32 },
        }
        let resource_db = header.is_resource_db();
        let mut raw_entries = Vec::with_capacity(count);
        for _ in 0..count {
            if resource_db {
                let type_tag = r.tag()?;
                let id = r.u16()?;
                let offset = r.u32()?;
                raw_entries.push(RawEntry::Resource { type_tag, id, offset });
            } else {
                let offset = r.u32()?;
                let attr = r.u8()?;
                let unique_id = r.u24()?;
                raw_entries.push(RawEntry::Record { offset, attr, unique_id });
            }
        }

        let payload_offsets: Vec<u32> = raw_entries
            .iter()
            .map(|e| match e {
                RawEntry::Record { offset, .. } | RawEntry::Resource { offset, .. } => *offset,
            })
            .collect();
        let payload_region_start = payload_offsets
            .first()
            .copied()
            .unwrap_or(raw.len() as u32);
        for pair in payload_offsets.windows(2) {
            if pair[1] < pair[0] {
                return Err(SyncError::framing(
                    format!("payload offsets decrease: {:#x} after {:#x}", pair[1], pair[0]),
                    raw,
                ));
            }
        }
        if let Some(&last) = payload_offsets.last() {
            if usize::try_from(last).unwrap_or(usize::MAX) > raw.len() {
                return Err(SyncError::framing(
                    format!("payload offset {last:#x} is past end of file"),
                    raw,
                ));
            }
        }

        let slice = |start: u32, end: u32| -> Result<Vec<u8>> {
            let (start, end) = (start as usize, end as usize);
            raw.get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| SyncError::framing(format!("bad block extent {start}..{end}"), raw))
        };

        let app_info = if offsets.app_info != 0 {
            let end = if offsets.sort_info != 0 { offsets.sort_info } else { payload_region_start };
            Some(slice(offsets.app_info, end)?)
        } else {
            None
        };
        let sort_info = if offsets.sort_info != 0 {
            Some(slice(offsets.sort_info, payload_region_start)?)
        } else {
            None
        };

        let boundary = |index: usize| -> u32 {
            payload_offsets.get(index + 1).copied().unwrap_or(raw.len() as u32)
        };
        let entries = if resource_db {
            let mut resources = Vec::with_capacity(count);
            for (index, entry) in raw_entries.into_iter().enumerate() {
                if let RawEntry::Resource { type_tag, id, offset } = entry {
                    resources.push(Resource { type_tag, id, payload: slice(offset, boundary(index))? });
                }
            }
            DatabaseEntries::Resources(resources)
        } else {
            let mut records = Vec::with_capacity(count);
            for (index, entry) in raw_entries.into_iter().enumerate() {
                if let RawEntry::Record { offset, attr, unique_id } = entry {
                    records.push(Record {
                        attributes: RecordAttrs::from_byte(attr),
                        unique_id,
                        payload: slice(offset, boundary(index))?,
                    });
                }
            }
            DatabaseEntries::Records(records)
        };

        Ok(Database { header, app_info, sort_info, entries })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let resource_db = matches!(self.entries, DatabaseEntries::Resources(_));
        if resource_db != self.header.is_resource_db() {
            return Err(SyncError::Validation(
                "resource-database attribute does not match the entry kind".into(),
            ));
        }

        let entry_len = if resource_db { RESOURCE_ENTRY_LEN } else { RECORD_ENTRY_LEN };
        let count = self.entries.len();
        let mut offset = (HEADER_LEN + LIST_HEADER_LEN + count * entry_len + LIST_PADDING_LEN) as u32;

        let app_info_offset = match &self.app_info {
            Some(block) => {
                let at = offset;
                offset += block.len() as u32;
                at
            }
            None => 0,
        };
        let sort_info_offset = match &self.sort_info {
            Some(block) => {
                let at = offset;
                offset += block.len() as u32;
                at
            }
            None => 0,
        };

        let mut buf = BytesMut::with_capacity(offset as usize);
        emit_header(
            &mut buf,
            &self.header,
            BlockOffsets { app_info: app_info_offset, sort_info: sort_info_offset },
        )?;
        buf.put_u32(0); // next list id: always a single list
        buf.put_u16(count as u16);

        match &self.entries {
            DatabaseEntries::Records(records) => {
                for record in records {
                    buf.put_u32(offset);
                    buf.put_u8(record.attributes.to_byte());
                    if record.unique_id > 0x00FF_FFFF {
                        return Err(SyncError::Validation(format!(
                            "record id {:#x} does not fit in 24 bits",
                            record.unique_id
                        )));
                    }
                    put_u24(&mut buf, record.unique_id);
                    offset += record.payload.len() as u32;
                }
            }
            DatabaseEntries::Resources(resources) => {
                for resource in resources {
                    buf.extend_from_slice(&resource.type_tag.0);
                    buf.put_u16(resource.id);
                    buf.put_u32(offset);
                    offset += resource.payload.len() as u32;
                }
            }
        }
        buf.put_bytes(0, LIST_PADDING_LEN);

        if let Some(block) = &self.app_info {
            buf.extend_from_slice(block);
        }
        if let Some(block) = &self.sort_info {
            buf.extend_from_slice(block);
        }
        match &self.entries {
            DatabaseEntries::Records(records) => {
                for record in records {
                    buf.extend_from_slice(&record.payload);
                }
            }
            DatabaseEntries::Resources(resources) => {
                for resource in resources {
                    buf.extend_from_slice(&resource.payload);
                }
            }
        }
        Ok(buf.to_vec())
    }
}
