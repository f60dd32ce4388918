//! Value types shared across the DLP command catalog.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::error::{Result, SyncError};
use crate::pdb::{DbAttrs, RecordAttrs};
use crate::wire::{Reader, TypeTag};

/// The DLP calendar timestamp: year, month, day, hour, minute, second and a
/// reserved byte, eight bytes total. All zeros is the canonical epoch and
/// stands for "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlpDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DlpDateTime {
    pub const LEN: usize = 8;

    pub fn is_epoch(&self) -> bool {
        *self == DlpDateTime::default()
    }

    pub fn emit(&self, buf: &mut BytesMut) {
        buf.put_u16(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u8(self.hour);
        buf.put_u8(self.minute);
        buf.put_u8(self.second);
        buf.put_u8(0);
    }

    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let year = r.u16()?;
        let month = r.u8()?;
        let day = r.u8()?;
        let hour = r.u8()?;
        let minute = r.u8()?;
        let second = r.u8()?;
        r.skip(1)?;
        Ok(DlpDateTime { year, month, day, hour, minute, second })
    }

    pub fn from_datetime(value: OffsetDateTime) -> Self {
        DlpDateTime {
            year: value.year().clamp(0, i32::from(u16::MAX)) as u16,
            month: value.month() as u8,
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
        }
    }

    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    pub fn to_datetime(&self) -> Result<Option<OffsetDateTime>> {
        if self.is_epoch() {
            return Ok(None);
        }
        let month = Month::try_from(self.month)
            .map_err(|_| SyncError::Validation(format!("month {} out of range", self.month)))?;
        let date = Date::from_calendar_date(i32::from(self.year), month, self.day)
            .map_err(|e| SyncError::Validation(format!("invalid date: {e}")))?;
        let time = Time::from_hms(self.hour, self.minute, self.second)
            .map_err(|e| SyncError::Validation(format!("invalid time: {e}")))?;
        Ok(Some(PrimitiveDateTime::new(date, time).assume_utc()))
    }
}

bitflags! {
    /// Database open modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenMode: u8 {
        const READ      = 0x80;
        const WRITE     = 0x40;
        const EXCLUSIVE = 0x20;
        const SECRET    = 0x10;
    }
}

bitflags! {
    /// Which store `ReadDBList` enumerates, and whether the device may pack
    /// several entries into one response.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DbListFlags: u8 {
        const RAM      = 0x80;
        const ROM      = 0x40;
        const MULTIPLE = 0x20;
    }
}

bitflags! {
    /// What `FindDBByOpenHandle` should report back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FindDbOptions: u8 {
        const ATTRIBUTES   = 0x80;
        const SIZE         = 0x40;
        const MAX_REC_SIZE = 0x20;
    }
}

/// One database as described by `ReadDBList` or `FindDBByOpenHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInfo {
    pub misc_flags: u8,
    pub attributes: DbAttrs,
    pub type_tag: TypeTag,
    pub creator: TypeTag,
    pub version: u16,
    pub modification_number: u32,
    pub created: DlpDateTime,
    pub modified: DlpDateTime,
    pub backed_up: DlpDateTime,
    pub index: u16,
    pub name: String,
}

impl DbInfo {
    /// Parse one entry. The leading size byte covers the whole entry so a
    /// reader can skip trailing fields it does not understand.
    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let size = usize::from(r.u8()?);
        let after_size = r.remaining();
        let misc_flags = r.u8()?;
        let attributes = DbAttrs::from_bits_retain(r.u16()?);
        let type_tag = r.tag()?;
        let creator = r.tag()?;
        let version = r.u16()?;
        let modification_number = r.u32()?;
        let created = DlpDateTime::parse(r)?;
        let modified = DlpDateTime::parse(r)?;
        let backed_up = DlpDateTime::parse(r)?;
        let index = r.u16()?;
        let name = r.cstring()?;
        // Entries are even-padded; the size byte is authoritative and
        // covers itself.
        let consumed = (after_size - r.remaining()) + 1;
        if size > consumed {
            r.skip(size - consumed)?;
        }
        Ok(DbInfo {
            misc_flags,
            attributes,
            type_tag,
            creator,
            version,
            modification_number,
            created,
            modified,
            backed_up,
            index,
            name,
        })
    }

    pub fn emit(&self, buf: &mut BytesMut) -> Result<()> {
        let name_raw = crate::wire::string_to_latin1(&self.name)?;
        let mut size = 44 + name_raw.len() + 1;
        let pad = size % 2;
        size += pad;
        buf.put_u8(size as u8);
        buf.put_u8(self.misc_flags);
        buf.put_u16(self.attributes.bits());
        buf.extend_from_slice(&self.type_tag.0);
        buf.extend_from_slice(&self.creator.0);
        buf.put_u16(self.version);
        buf.put_u32(self.modification_number);
        self.created.emit(buf);
        self.modified.emit(buf);
        self.backed_up.emit(buf);
        buf.put_u16(self.index);
        buf.extend_from_slice(&name_raw);
        buf.put_u8(0);
        buf.put_bytes(0, pad);
        Ok(())
    }
}

/// The device's user identity, as read and written during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub user_id: u32,
    pub viewer_id: u32,
    pub last_sync_pc: u32,
    pub successful_sync_date: DlpDateTime,
    pub last_sync_date: DlpDateTime,
    pub user_name: String,
    pub password: Vec<u8>,
}

/// Static system information reported by `ReadSysInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SysInfo {
    pub rom_version: u32,
    pub locale: u32,
    pub product_id: Vec<u8>,
    /// DLP protocol version; 1.2 and later support `FindDBByOpenHandle`.
    pub dlp_major: u16,
    pub dlp_minor: u16,
    pub compat_major: u16,
    pub compat_minor: u16,
    pub max_record_size: u32,
}

impl SysInfo {
    pub fn supports_find_db(&self) -> bool {
        (self.dlp_major, self.dlp_minor) >= (1, 2)
    }
}

/// A record as carried by the read/write record calls: the container form
/// plus the index the device reported it at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPayload {
    pub record_id: u32,
    pub index: u16,
    pub attributes: RecordAttrs,
    pub payload: Vec<u8>,
}

/// DLP carries the flag bits and the category in separate bytes, unlike the
/// container's packed attribute byte where the category shares the low
/// nibble with the archive flag.
pub fn record_attrs_from_dlp(attr: u8, category: u8) -> RecordAttrs {
    if attr & 0xA0 != 0 {
        // delete or busy: the packed low nibble carries archive, and the
        // separate category byte is meaningless.
        RecordAttrs::from_byte(attr)
    } else {
        RecordAttrs::from_byte((attr & 0xF0) | (category & 0x0F))
    }
}

/// Split a record attribute into DLP's `(flags, category)` byte pair.
pub fn record_attrs_to_dlp(attrs: RecordAttrs) -> (u8, u8) {
    let packed = attrs.to_byte();
    match attrs {
        RecordAttrs::Live { category, .. } => (packed & 0xF0, category),
        RecordAttrs::Dead { .. } => (packed, 0),
    }
}
