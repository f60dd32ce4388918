//! The typed DLP command catalog.
//!
//! One struct per request, with its arguments serialized in declaration
//! order starting at id 0x20, and a typed response parsed back out of the
//! response argument set. Command ids follow the published DLP function
//! numbering.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::dlp::arg::{ArgSet, DlpArg, FIRST_ARG_ID};
use crate::dlp::types::{
    record_attrs_from_dlp, record_attrs_to_dlp, DbInfo, DbListFlags, DlpDateTime, FindDbOptions,
    OpenMode, RecordPayload, SysInfo, UserInfo,
};
use crate::dlp::{DlpCommand, DlpResponse};
use crate::error::{Result, SyncError};
use crate::pdb::{DbAttrs, RecordAttrs};
use crate::wire::{latin1_to_string, put_cstring, Reader, TypeTag};

const ARG_1: u8 = FIRST_ARG_ID;
const ARG_2: u8 = FIRST_ARG_ID + 1;
const ARG_3: u8 = FIRST_ARG_ID + 2;

fn single_arg(data: BytesMut) -> Result<Vec<DlpArg>> {
    Ok(vec![DlpArg::new(ARG_1, data.to_vec())])
}

// --- user and system information ---------------------------------------

/// `ReadUserInfo`: the identity block the HotSync pairing is keyed on.
pub struct ReadUserInfo;

impl DlpCommand for ReadUserInfo {
    const COMMAND_ID: u8 = 0x10;
    const NAME: &'static str = "ReadUserInfo";
    type Response = UserInfo;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        Ok(Vec::new())
    }
}

impl DlpResponse for UserInfo {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadUserInfo")?);
        let user_id = r.u32()?;
        let viewer_id = r.u32()?;
        let last_sync_pc = r.u32()?;
        let successful_sync_date = DlpDateTime::parse(&mut r)?;
        let last_sync_date = DlpDateTime::parse(&mut r)?;
        let name_len = usize::from(r.u8()?);
        let password_len = usize::from(r.u8()?);
        let name_raw = r.bytes(name_len)?;
        let user_name = latin1_to_string(name_raw.strip_suffix(&[0]).unwrap_or(name_raw));
        let password = r.bytes(password_len)?.to_vec();
        Ok(UserInfo {
            user_id,
            viewer_id,
            last_sync_pc,
            successful_sync_date,
            last_sync_date,
            user_name,
            password,
        })
    }
}

bitflags! {
    /// Which fields a `WriteUserInfo` actually updates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UserInfoFields: u8 {
        const USER_ID        = 0x80;
        const LAST_SYNC_PC   = 0x40;
        const LAST_SYNC_DATE = 0x20;
        const USER_NAME      = 0x10;
        const VIEWER_ID      = 0x08;
    }
}

pub struct WriteUserInfo {
    pub user_id: u32,
    pub viewer_id: u32,
    pub last_sync_pc: u32,
    pub last_sync_date: DlpDateTime,
    pub fields: UserInfoFields,
    pub user_name: String,
}

impl DlpCommand for WriteUserInfo {
    const COMMAND_ID: u8 = 0x11;
    const NAME: &'static str = "WriteUserInfo";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let name_raw = crate::wire::string_to_latin1(&self.user_name)?;
        let mut buf = BytesMut::new();
        buf.put_u32(self.user_id);
        buf.put_u32(self.viewer_id);
        buf.put_u32(self.last_sync_pc);
        self.last_sync_date.emit(&mut buf);
        buf.put_u8(self.fields.bits());
        buf.put_u8((name_raw.len() + 1) as u8);
        buf.extend_from_slice(&name_raw);
        buf.put_u8(0);
        single_arg(buf)
    }
}

pub struct ReadSysInfo;

impl DlpCommand for ReadSysInfo {
    const COMMAND_ID: u8 = 0x12;
    const NAME: &'static str = "ReadSysInfo";
    type Response = SysInfo;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        // Announce the host's DLP version so the device can enable the
        // calls added after 1.0.
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u16(2);
        single_arg(buf)
    }
}

impl DlpResponse for SysInfo {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadSysInfo")?);
        let rom_version = r.u32()?;
        let locale = r.u32()?;
        r.skip(1)?;
        let product_id_len = usize::from(r.u8()?);
        let product_id = r.bytes(product_id_len)?.to_vec();

        let mut info = SysInfo {
            rom_version,
            locale,
            product_id,
            // Devices predating DLP 1.2 omit the version argument.
            dlp_major: 1,
            dlp_minor: 0,
            compat_major: 1,
            compat_minor: 0,
            max_record_size: 0,
        };
        if let Some(raw) = args.get(ARG_2) {
            let mut r = Reader::new(raw);
            info.dlp_major = r.u16()?;
            info.dlp_minor = r.u16()?;
            info.compat_major = r.u16()?;
            info.compat_minor = r.u16()?;
            info.max_record_size = r.u32()?;
        }
        Ok(info)
    }
}

pub struct GetSysDateTime;

impl DlpCommand for GetSysDateTime {
    const COMMAND_ID: u8 = 0x13;
    const NAME: &'static str = "GetSysDateTime";
    type Response = SysDateTime;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        Ok(Vec::new())
    }
}

pub struct SysDateTime(pub DlpDateTime);

impl DlpResponse for SysDateTime {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "GetSysDateTime")?);
        Ok(SysDateTime(DlpDateTime::parse(&mut r)?))
    }
}

pub struct SetSysDateTime {
    pub date_time: DlpDateTime,
}

impl DlpCommand for SetSysDateTime {
    const COMMAND_ID: u8 = 0x14;
    const NAME: &'static str = "SetSysDateTime";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        self.date_time.emit(&mut buf);
        single_arg(buf)
    }
}

// --- database enumeration and lifecycle ---------------------------------

pub struct ReadDbList {
    pub flags: DbListFlags,
    pub card_no: u8,
    pub start_index: u16,
}

impl DlpCommand for ReadDbList {
    const COMMAND_ID: u8 = 0x16;
    const NAME: &'static str = "ReadDBList";
    type Response = DbListPage;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.card_no);
        buf.put_u16(self.start_index);
        single_arg(buf)
    }
}

/// One page of the database list; iterate by resuming at `last_index + 1`
/// until the device answers NOT_FOUND.
pub struct DbListPage {
    pub last_index: u16,
    pub more: bool,
    pub databases: Vec<DbInfo>,
}

impl DlpResponse for DbListPage {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadDBList")?);
        let last_index = r.u16()?;
        let flags = r.u8()?;
        let count = usize::from(r.u8()?);
        let mut databases = Vec::with_capacity(count);
        for _ in 0..count {
            databases.push(DbInfo::parse(&mut r)?);
        }
        Ok(DbListPage { last_index, more: flags & 0x80 != 0, databases })
    }
}

pub struct OpenDb {
    pub card_no: u8,
    pub mode: OpenMode,
    pub name: String,
}

impl DlpCommand for OpenDb {
    const COMMAND_ID: u8 = 0x17;
    const NAME: &'static str = "OpenDB";
    type Response = DbHandle;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.card_no);
        buf.put_u8(self.mode.bits());
        put_cstring(&mut buf, &self.name)?;
        single_arg(buf)
    }
}

/// A server-assigned opaque database handle, valid until the database is
/// closed or the session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHandle(pub u8);

impl DlpResponse for DbHandle {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "OpenDB")?);
        Ok(DbHandle(r.u8()?))
    }
}

pub struct CreateDb {
    pub creator: TypeTag,
    pub type_tag: TypeTag,
    pub card_no: u8,
    pub attributes: DbAttrs,
    pub version: u16,
    pub name: String,
}

impl DlpCommand for CreateDb {
    const COMMAND_ID: u8 = 0x18;
    const NAME: &'static str = "CreateDB";
    type Response = DbHandle;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&self.creator.0);
        buf.extend_from_slice(&self.type_tag.0);
        buf.put_u8(self.card_no);
        buf.put_u8(0);
        buf.put_u16(self.attributes.bits());
        buf.put_u16(self.version);
        put_cstring(&mut buf, &self.name)?;
        single_arg(buf)
    }
}

pub struct CloseDb {
    pub handle: DbHandle,
}

impl DlpCommand for CloseDb {
    const COMMAND_ID: u8 = 0x19;
    const NAME: &'static str = "CloseDB";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        single_arg(buf)
    }
}

pub struct DeleteDb {
    pub card_no: u8,
    pub name: String,
}

impl DlpCommand for DeleteDb {
    const COMMAND_ID: u8 = 0x1A;
    const NAME: &'static str = "DeleteDB";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.card_no);
        buf.put_u8(0);
        put_cstring(&mut buf, &self.name)?;
        single_arg(buf)
    }
}

// --- app/sort blocks -----------------------------------------------------

/// Ask for the whole block in one response.
const WHOLE_BLOCK: u16 = 0xFFFF;

macro_rules! block_read_command {
    ($request:ident, $id:expr, $name:literal) => {
        pub struct $request {
            pub handle: DbHandle,
        }

        impl DlpCommand for $request {
            const COMMAND_ID: u8 = $id;
            const NAME: &'static str = $name;
            type Response = BlockData;

            fn arguments(&self) -> Result<Vec<DlpArg>> {
                let mut buf = BytesMut::new();
                buf.put_u8(self.handle.0);
                buf.put_u8(0);
                buf.put_u16(0); // offset
                buf.put_u16(WHOLE_BLOCK);
                single_arg(buf)
            }
        }
    };
}

macro_rules! block_write_command {
    ($request:ident, $id:expr, $name:literal) => {
        pub struct $request {
            pub handle: DbHandle,
            pub data: Vec<u8>,
        }

        impl DlpCommand for $request {
            const COMMAND_ID: u8 = $id;
            const NAME: &'static str = $name;
            type Response = ();

            fn arguments(&self) -> Result<Vec<DlpArg>> {
                let mut buf = BytesMut::new();
                buf.put_u8(self.handle.0);
                buf.put_u8(0);
                buf.put_u16(self.data.len() as u16);
                buf.extend_from_slice(&self.data);
                single_arg(buf)
            }
        }
    };
}

block_read_command!(ReadAppBlock, 0x1B, "ReadAppBlock");
block_write_command!(WriteAppBlock, 0x1C, "WriteAppBlock");
block_read_command!(ReadSortBlock, 0x1D, "ReadSortBlock");
block_write_command!(WriteSortBlock, 0x1E, "WriteSortBlock");

pub struct BlockData {
    pub data: Vec<u8>,
}

impl DlpResponse for BlockData {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let raw = args.require(ARG_1, "ReadAppBlock/ReadSortBlock")?;
        let mut r = Reader::new(raw);
        let size = usize::from(r.u16()?);
        let data = r.bytes(r.remaining())?.to_vec();
        if data.len() != size {
            return Err(SyncError::Protocol(format!(
                "block size field says {size}, argument carries {}",
                data.len()
            )));
        }
        Ok(BlockData { data })
    }
}

// --- records -------------------------------------------------------------

pub struct ReadRecordById {
    pub handle: DbHandle,
    pub record_id: u32,
}

impl DlpCommand for ReadRecordById {
    const COMMAND_ID: u8 = 0x20;
    const NAME: &'static str = "ReadRecordByID";
    type Response = RecordPayload;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.put_u32(self.record_id);
        buf.put_u16(0); // offset
        buf.put_u16(WHOLE_BLOCK);
        single_arg(buf)
    }
}

/// Same command id as [`ReadRecordById`]; the by-index form is selected by
/// the argument id.
pub struct ReadRecordByIndex {
    pub handle: DbHandle,
    pub index: u16,
}

impl DlpCommand for ReadRecordByIndex {
    const COMMAND_ID: u8 = 0x20;
    const NAME: &'static str = "ReadRecordByIndex";
    type Response = RecordPayload;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.put_u16(self.index);
        buf.put_u16(0); // offset
        buf.put_u16(WHOLE_BLOCK);
        Ok(vec![DlpArg::new(ARG_2, buf.to_vec())])
    }
}

impl DlpResponse for RecordPayload {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadRecord")?);
        let record_id = r.u32()?;
        let index = r.u16()?;
        let size = usize::from(r.u16()?);
        let attr = r.u8()?;
        let category = r.u8()?;
        let payload = r.bytes(r.remaining())?.to_vec();
        if payload.len() != size {
            return Err(SyncError::Protocol(format!(
                "record size field says {size}, argument carries {}",
                payload.len()
            )));
        }
        Ok(RecordPayload {
            record_id,
            index,
            attributes: record_attrs_from_dlp(attr, category),
            payload,
        })
    }
}

pub struct WriteRecord {
    pub handle: DbHandle,
    pub record_id: u32,
    pub attributes: RecordAttrs,
    pub payload: Vec<u8>,
}

impl DlpCommand for WriteRecord {
    const COMMAND_ID: u8 = 0x21;
    const NAME: &'static str = "WriteRecord";
    type Response = RecordId;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let (attr, category) = record_attrs_to_dlp(self.attributes);
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(0x80); // data-included flag, always set
        buf.put_u32(self.record_id);
        buf.put_u8(attr);
        buf.put_u8(category);
        buf.extend_from_slice(&self.payload);
        single_arg(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub u32);

impl DlpResponse for RecordId {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "WriteRecord")?);
        Ok(RecordId(r.u32()?))
    }
}

pub struct DeleteRecord {
    pub handle: DbHandle,
    pub record_id: u32,
}

impl DlpCommand for DeleteRecord {
    const COMMAND_ID: u8 = 0x22;
    const NAME: &'static str = "DeleteRecord";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.put_u32(self.record_id);
        single_arg(buf)
    }
}

pub struct ReadRecordIdList {
    pub handle: DbHandle,
    pub sorted: bool,
    pub start_index: u16,
    pub max_ids: u16,
}

impl DlpCommand for ReadRecordIdList {
    const COMMAND_ID: u8 = 0x31;
    const NAME: &'static str = "ReadRecordIDList";
    type Response = RecordIdList;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(if self.sorted { 0x80 } else { 0 });
        buf.put_u16(self.start_index);
        buf.put_u16(self.max_ids);
        single_arg(buf)
    }
}

pub struct RecordIdList {
    pub record_ids: Vec<u32>,
}

impl DlpResponse for RecordIdList {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadRecordIDList")?);
        let record_ids = r.list16(Reader::u32)?;
        Ok(RecordIdList { record_ids })
    }
}

// --- resources -----------------------------------------------------------

pub struct ReadResourceByIndex {
    pub handle: DbHandle,
    pub index: u16,
}

impl DlpCommand for ReadResourceByIndex {
    const COMMAND_ID: u8 = 0x23;
    const NAME: &'static str = "ReadResourceByIndex";
    type Response = ResourcePayload;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.put_u16(self.index);
        buf.put_u16(0); // offset
        buf.put_u16(WHOLE_BLOCK);
        single_arg(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePayload {
    pub type_tag: TypeTag,
    pub id: u16,
    pub index: u16,
    pub payload: Vec<u8>,
}

impl DlpResponse for ResourcePayload {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadResourceByIndex")?);
        let type_tag = r.tag()?;
        let id = r.u16()?;
        let index = r.u16()?;
        let size = usize::from(r.u16()?);
        let payload = r.bytes(r.remaining())?.to_vec();
        if payload.len() != size {
            return Err(SyncError::Protocol(format!(
                "resource size field says {size}, argument carries {}",
                payload.len()
            )));
        }
        Ok(ResourcePayload { type_tag, id, index, payload })
    }
}

pub struct WriteResource {
    pub handle: DbHandle,
    pub type_tag: TypeTag,
    pub id: u16,
    pub payload: Vec<u8>,
}

impl DlpCommand for WriteResource {
    const COMMAND_ID: u8 = 0x24;
    const NAME: &'static str = "WriteResource";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.extend_from_slice(&self.type_tag.0);
        buf.put_u16(self.id);
        buf.put_u16(self.payload.len() as u16);
        buf.extend_from_slice(&self.payload);
        single_arg(buf)
    }
}

// --- sync bookkeeping ----------------------------------------------------

pub struct CleanUpDatabase {
    pub handle: DbHandle,
}

impl DlpCommand for CleanUpDatabase {
    const COMMAND_ID: u8 = 0x26;
    const NAME: &'static str = "CleanUpDatabase";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        single_arg(buf)
    }
}

pub struct ResetSyncFlags {
    pub handle: DbHandle,
}

impl DlpCommand for ResetSyncFlags {
    const COMMAND_ID: u8 = 0x27;
    const NAME: &'static str = "ResetSyncFlags";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        single_arg(buf)
    }
}

/// Schedule a soft reset after the session ends; required after installing
/// system software.
pub struct ResetSystem;

impl DlpCommand for ResetSystem {
    const COMMAND_ID: u8 = 0x29;
    const NAME: &'static str = "ResetSystem";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        Ok(Vec::new())
    }
}

pub struct AddSyncLogEntry {
    pub text: String,
}

impl DlpCommand for AddSyncLogEntry {
    const COMMAND_ID: u8 = 0x2A;
    const NAME: &'static str = "AddSyncLogEntry";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        put_cstring(&mut buf, &self.text)?;
        single_arg(buf)
    }
}

pub struct ReadOpenDbInfo {
    pub handle: DbHandle,
}

impl DlpCommand for ReadOpenDbInfo {
    const COMMAND_ID: u8 = 0x2B;
    const NAME: &'static str = "ReadOpenDBInfo";
    type Response = OpenDbInfo;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.handle.0);
        single_arg(buf)
    }
}

pub struct OpenDbInfo {
    pub record_count: u16,
}

impl DlpResponse for OpenDbInfo {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "ReadOpenDBInfo")?);
        Ok(OpenDbInfo { record_count: r.u16()? })
    }
}

pub struct OpenConduit;

impl DlpCommand for OpenConduit {
    const COMMAND_ID: u8 = 0x2E;
    const NAME: &'static str = "OpenConduit";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        Ok(Vec::new())
    }
}

/// How the session ended, shown by the device in its HotSync log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTermination {
    Normal,
    OutOfMemory,
    UserCancelled,
    Other,
}

impl SyncTermination {
    fn code(self) -> u16 {
        match self {
            SyncTermination::Normal => 0,
            SyncTermination::OutOfMemory => 1,
            SyncTermination::UserCancelled => 2,
            SyncTermination::Other => 3,
        }
    }
}

pub struct EndOfSync {
    pub termination: SyncTermination,
}

impl DlpCommand for EndOfSync {
    const COMMAND_ID: u8 = 0x2F;
    const NAME: &'static str = "EndOfSync";
    type Response = ();

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u16(self.termination.code());
        single_arg(buf)
    }
}

// --- FindDB --------------------------------------------------------------

/// `FindDBByOpenHandle` (DLP 1.2): database metadata without a second
/// catalog scan. Older devices answer ILLEGAL_REQUEST and callers fall back
/// to `ReadDBList`.
pub struct FindDbByOpenHandle {
    pub handle: DbHandle,
    pub options: FindDbOptions,
}

impl DlpCommand for FindDbByOpenHandle {
    const COMMAND_ID: u8 = 0x63;
    const NAME: &'static str = "FindDBByOpenHandle";
    type Response = FoundDb;

    fn arguments(&self) -> Result<Vec<DlpArg>> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.options.bits());
        buf.put_u8(self.handle.0);
        // The by-open-handle form is the third variant of FindDB.
        Ok(vec![DlpArg::new(ARG_3, buf.to_vec())])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FoundDbSizes {
    pub record_count: u32,
    pub total_bytes: u32,
    pub data_bytes: u32,
    pub app_block_size: u32,
    pub sort_block_size: u32,
    pub max_record_size: u32,
}

pub struct FoundDb {
    pub card_no: u8,
    pub local_id: u32,
    pub open_ref: u32,
    pub info: DbInfo,
    /// Present only when [`FindDbOptions::SIZE`] was requested.
    pub sizes: Option<FoundDbSizes>,
}

impl DlpResponse for FoundDb {
    fn parse_args(args: &ArgSet) -> Result<Self> {
        let mut r = Reader::new(args.require(ARG_1, "FindDBByOpenHandle")?);
        let card_no = r.u8()?;
        r.skip(1)?;
        let local_id = r.u32()?;
        let open_ref = r.u32()?;
        let info = DbInfo::parse(&mut r)?;
        let sizes = match args.get(ARG_2) {
            Some(raw) => {
                let mut r = Reader::new(raw);
                Some(FoundDbSizes {
                    record_count: r.u32()?,
                    total_bytes: r.u32()?,
                    data_bytes: r.u32()?,
                    app_block_size: r.u32()?,
                    sort_block_size: r.u32()?,
                    max_record_size: r.u32()?,
                })
            }
            None => None,
        };
        Ok(FoundDb { card_no, local_id, open_ref, info, sizes })
    }
}
