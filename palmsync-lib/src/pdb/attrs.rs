//! Database and record attribute words.

use bitflags::bitflags;

bitflags! {
    /// The 16-bit attribute word in the database header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DbAttrs: u16 {
        const RES_DB              = 0x0001;
        const READ_ONLY           = 0x0002;
        const APP_INFO_DIRTY      = 0x0004;
        const BACKUP              = 0x0008;
        const OK_TO_INSTALL_NEWER = 0x0010;
        const RESET_AFTER_INSTALL = 0x0020;
        const COPY_PREVENTION     = 0x0040;
        const STREAM              = 0x0080;
        const HIDDEN              = 0x0100;
        const LAUNCHABLE_DATA     = 0x0200;
        const RECYCLABLE          = 0x0400;
        const BUNDLE              = 0x0800;
        const OPEN                = 0x8000;
    }
}

/// A record's attribute byte.
///
/// The low four bits are overloaded: they carry the category for a live
/// record, but the archive flag (at bit 0x08) once `delete` or `busy` is
/// set. The two layouts are mutually exclusive, so the byte decodes into a
/// two-variant sum instead of one struct with conflicting fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAttrs {
    Live { category: u8, dirty: bool, secret: bool },
    Dead { archive: bool, delete: bool, busy: bool, secret: bool },
}

const ATTR_DELETE: u8 = 0x80;
const ATTR_DIRTY: u8 = 0x40;
const ATTR_BUSY: u8 = 0x20;
const ATTR_SECRET: u8 = 0x10;
const ATTR_ARCHIVE: u8 = 0x08;

impl RecordAttrs {
    pub fn from_byte(byte: u8) -> Self {
        let delete = byte & ATTR_DELETE != 0;
        let busy = byte & ATTR_BUSY != 0;
        let secret = byte & ATTR_SECRET != 0;
        if delete || busy {
            RecordAttrs::Dead { archive: byte & ATTR_ARCHIVE != 0, delete, busy, secret }
        } else {
            RecordAttrs::Live {
                category: byte & 0x0F,
                dirty: byte & ATTR_DIRTY != 0,
                secret,
            }
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            RecordAttrs::Live { category, dirty, secret } => {
                debug_assert!(category <= 0x0F);
                (category & 0x0F)
                    | if dirty { ATTR_DIRTY } else { 0 }
                    | if secret { ATTR_SECRET } else { 0 }
            }
            RecordAttrs::Dead { archive, delete, busy, secret } => {
                debug_assert!(delete || busy, "dead layout requires delete or busy");
                (if archive { ATTR_ARCHIVE } else { 0 })
                    | if delete { ATTR_DELETE } else { 0 }
                    | if busy { ATTR_BUSY } else { 0 }
                    | if secret { ATTR_SECRET } else { 0 }
            }
        }
    }

    pub fn is_deleted(self) -> bool {
        matches!(self, RecordAttrs::Dead { delete: true, .. })
    }

    pub fn is_archived(self) -> bool {
        matches!(self, RecordAttrs::Dead { archive: true, .. })
    }

    pub fn is_dirty(self) -> bool {
        matches!(self, RecordAttrs::Live { dirty: true, .. })
    }

    pub fn is_secret(self) -> bool {
        match self {
            RecordAttrs::Live { secret, .. } | RecordAttrs::Dead { secret, .. } => secret,
        }
    }

    pub fn category(self) -> u8 {
        match self {
            RecordAttrs::Live { category, .. } => category,
            RecordAttrs::Dead { .. } => 0,
        }
    }
}

impl Default for RecordAttrs {
    fn default() -> Self {
        RecordAttrs::Live { category: 0, dirty: false, secret: false }
    }
}
