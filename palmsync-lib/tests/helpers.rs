//! Shared test helpers: an in-memory handheld that answers DLP over the
//! network framing, plus small fixture builders.

#![allow(dead_code)]

use bytes::{BufMut, BytesMut};

use palmsync_lib::dlp::arg::{ArgSet, DlpArg, FIRST_ARG_ID};
use palmsync_lib::dlp::types::{record_attrs_from_dlp, record_attrs_to_dlp, DbInfo, DlpDateTime};
use palmsync_lib::dlp::DlpStatus;
use palmsync_lib::netsync::NetSyncLink;
use palmsync_lib::pdb::{
    Category, CategoryTable, Database, DatabaseEntries, DatabaseHeader, DbAttrs, DbTimestamp,
    Record, RecordAttrs, Resource,
};
use palmsync_lib::transport::PalmStream;
use palmsync_lib::wire::{latin1_to_string, Reader, TypeTag};

pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const ARG_1: u8 = FIRST_ARG_ID;
const ARG_2: u8 = FIRST_ARG_ID + 1;
const ARG_3: u8 = FIRST_ARG_ID + 2;

/// Build the MemoDB fixture: two categories and ten "Memo #n" records.
pub fn memo_database() -> Database {
    let mut header = DatabaseHeader::new(
        "MemoDB",
        TypeTag::new(*b"DATA"),
        TypeTag::new(*b"memo"),
    );
    header.created = DbTimestamp::Mac(0xB000_0000);
    header.modified = DbTimestamp::Mac(0xB000_0100);
    header.backed_up = DbTimestamp::EPOCH;
    let categories = CategoryTable {
        categories: vec![
            Category { name: "Unfiled".into(), id: 0, renamed: false },
            Category { name: "Personal".into(), id: 1, renamed: false },
        ],
        last_unique_id: 1,
    };
    let records = (0..10)
        .map(|n| Record {
            attributes: RecordAttrs::Live { category: 0, dirty: false, secret: false },
            unique_id: 0x10_0000 + n,
            payload: format!("Memo #{n}").into_bytes(),
        })
        .collect();
    Database {
        header,
        app_info: Some(categories.emit().expect("category table emits")),
        sort_info: None,
        entries: DatabaseEntries::Records(records),
    }
}

/// An in-memory handheld: enough DLP to drive backup, restore and the full
/// sync orchestration in tests.
pub struct FakeDevice {
    pub user_id: u32,
    pub user_name: String,
    pub last_sync_pc: u32,
    pub databases: Vec<Database>,
    pub sync_log: Vec<String>,
    pub ended: bool,
    open: Vec<(u8, usize)>,
    next_handle: u8,
    next_uid: u32,
}

impl FakeDevice {
    pub fn new(databases: Vec<Database>) -> Self {
        FakeDevice {
            user_id: 0xCAFE_F00D,
            user_name: "Test User".into(),
            last_sync_pc: 0,
            databases,
            sync_log: Vec::new(),
            ended: false,
            open: Vec::new(),
            next_handle: 1,
            next_uid: 0x20_0000,
        }
    }

    pub fn database(&self, name: &str) -> Option<&Database> {
        self.databases.iter().find(|db| db.header.name == name)
    }

    fn db_info(&self, index: usize) -> DbInfo {
        let db = &self.databases[index];
        DbInfo {
            misc_flags: 0,
            attributes: db.header.attributes,
            type_tag: db.header.type_tag,
            creator: db.header.creator,
            version: db.header.version,
            modification_number: db.header.modification_number,
            created: DlpDateTime::default(),
            modified: DlpDateTime::default(),
            backed_up: DlpDateTime::default(),
            index: index as u16,
            name: db.header.name.clone(),
        }
    }

    fn opened(&self, handle: u8) -> Option<usize> {
        self.open.iter().find(|(h, _)| *h == handle).map(|(_, i)| *i)
    }

    /// Answer one DLP request frame with one DLP response frame.
    pub fn respond(&mut self, raw: &[u8]) -> Vec<u8> {
        let mut r = Reader::new(raw);
        let command = r.u8().expect("request command byte");
        let argc = usize::from(r.u8().expect("request arg count"));
        let args = ArgSet::parse(&mut r, argc).expect("request args parse");
        match self.handle(command, &args) {
            Ok(response_args) => frame_response(command, DlpStatus::Ok, response_args),
            Err(status) => frame_response(command, status, Vec::new()),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn handle(&mut self, command: u8, args: &ArgSet) -> Result<Vec<DlpArg>, DlpStatus> {
        match command {
            // ReadUserInfo
            0x10 => {
                let mut buf = BytesMut::new();
                buf.put_u32(self.user_id);
                buf.put_u32(0);
                buf.put_u32(self.last_sync_pc);
                DlpDateTime::default().emit(&mut buf);
                DlpDateTime::default().emit(&mut buf);
                let name = self.user_name.as_bytes();
                buf.put_u8((name.len() + 1) as u8);
                buf.put_u8(0); // no password
                buf.extend_from_slice(name);
                buf.put_u8(0);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // WriteUserInfo
            0x11 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let user_id = r.u32().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.u32().map_err(|_| DlpStatus::InvalidArgSize)?; // viewer id
                let last_sync_pc = r.u32().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(8).map_err(|_| DlpStatus::InvalidArgSize)?; // last sync date
                let flags = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                if flags & 0x80 != 0 {
                    self.user_id = user_id;
                }
                if flags & 0x40 != 0 {
                    self.last_sync_pc = last_sync_pc;
                }
                if flags & 0x10 != 0 {
                    let len = usize::from(r.u8().map_err(|_| DlpStatus::InvalidArgSize)?);
                    let raw = r.bytes(len).map_err(|_| DlpStatus::InvalidArgSize)?;
                    self.user_name =
                        latin1_to_string(raw.strip_suffix(&[0]).unwrap_or(raw));
                }
                Ok(Vec::new())
            }
            // ReadSysInfo
            0x12 => {
                let mut buf = BytesMut::new();
                buf.put_u32(0x0350_3000); // Palm OS 3.5 ROM
                buf.put_u32(0);
                buf.put_u8(0);
                buf.put_u8(0); // no product id
                let mut versions = BytesMut::new();
                versions.put_u16(1);
                versions.put_u16(2);
                versions.put_u16(1);
                versions.put_u16(0);
                versions.put_u32(0xFFFF);
                Ok(vec![
                    DlpArg::new(ARG_1, buf.to_vec()),
                    DlpArg::new(ARG_2, versions.to_vec()),
                ])
            }
            // GetSysDateTime
            0x13 => {
                let mut buf = BytesMut::new();
                DlpDateTime { year: 2007, month: 6, day: 1, hour: 12, minute: 0, second: 0 }
                    .emit(&mut buf);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // SetSysDateTime
            0x14 => Ok(Vec::new()),
            // ReadDBList
            0x16 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let flags = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let _card_no = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let start = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                if flags & 0x80 == 0 {
                    // Everything this device holds lives in RAM.
                    return Err(DlpStatus::NotFound);
                }
                if start >= self.databases.len() {
                    return Err(DlpStatus::NotFound);
                }
                let infos: Vec<DbInfo> =
                    (start..self.databases.len()).map(|i| self.db_info(i)).collect();
                let mut buf = BytesMut::new();
                buf.put_u16((self.databases.len() - 1) as u16);
                buf.put_u8(0); // no more pages
                buf.put_u8(infos.len() as u8);
                for info in &infos {
                    info.emit(&mut buf).map_err(|_| DlpStatus::System)?;
                }
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // OpenDB
            0x17 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let _card_no = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let _mode = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let name = r.cstring().map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = self
                    .databases
                    .iter()
                    .position(|db| db.header.name == name)
                    .ok_or(DlpStatus::NotFound)?;
                let handle = self.next_handle;
                self.next_handle += 1;
                self.open.push((handle, index));
                let mut buf = BytesMut::new();
                buf.put_u8(handle);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // CreateDB
            0x18 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let creator = r.tag().map_err(|_| DlpStatus::InvalidArgSize)?;
                let type_tag = r.tag().map_err(|_| DlpStatus::InvalidArgSize)?;
                let _card_no = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let attributes = r.u16().map_err(|_| DlpStatus::InvalidArgSize)?;
                let version = r.u16().map_err(|_| DlpStatus::InvalidArgSize)?;
                let name = r.cstring().map_err(|_| DlpStatus::InvalidArgSize)?;
                if self.databases.iter().any(|db| db.header.name == name) {
                    return Err(DlpStatus::AlreadyExists);
                }
                let attributes = DbAttrs::from_bits_retain(attributes);
                let mut header = DatabaseHeader::new(&name, type_tag, creator);
                header.attributes = attributes;
                header.version = version;
                let entries = if attributes.contains(DbAttrs::RES_DB) {
                    DatabaseEntries::Resources(Vec::new())
                } else {
                    DatabaseEntries::Records(Vec::new())
                };
                self.databases.push(Database {
                    header,
                    app_info: None,
                    sort_info: None,
                    entries,
                });
                let handle = self.next_handle;
                self.next_handle += 1;
                self.open.push((handle, self.databases.len() - 1));
                let mut buf = BytesMut::new();
                buf.put_u8(handle);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // CloseDB
            0x19 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                self.open.retain(|(h, _)| *h != handle);
                Ok(Vec::new())
            }
            // DeleteDB
            0x1A => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let _card_no = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let name = r.cstring().map_err(|_| DlpStatus::InvalidArgSize)?;
                let before = self.databases.len();
                self.databases.retain(|db| db.header.name != name);
                if self.databases.len() == before {
                    return Err(DlpStatus::NotFound);
                }
                Ok(Vec::new())
            }
            // ReadAppBlock / ReadSortBlock
            0x1B | 0x1D => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let db = &self.databases[index];
                let block = if command == 0x1B { &db.app_info } else { &db.sort_info };
                let block = block.as_ref().ok_or(DlpStatus::NotFound)?;
                let mut buf = BytesMut::new();
                buf.put_u16(block.len() as u16);
                buf.extend_from_slice(block);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // WriteAppBlock / WriteSortBlock
            0x1C | 0x1E => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let len = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                let data = r.bytes(len).map_err(|_| DlpStatus::InvalidArgSize)?.to_vec();
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let db = &mut self.databases[index];
                if command == 0x1C {
                    db.app_info = Some(data);
                } else {
                    db.sort_info = Some(data);
                }
                Ok(Vec::new())
            }
            // ReadRecord (by id or by index)
            0x20 => {
                if let Some(raw) = args.get(ARG_1) {
                    let mut r = Reader::new(raw);
                    let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                    r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                    let record_id = r.u32().map_err(|_| DlpStatus::InvalidArgSize)?;
                    self.read_record(handle, |records| {
                        records.iter().position(|rec| rec.unique_id == record_id)
                    })
                } else if let Some(raw) = args.get(ARG_2) {
                    let mut r = Reader::new(raw);
                    let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                    r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                    let index = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                    self.read_record(handle, move |records| {
                        (index < records.len()).then_some(index)
                    })
                } else {
                    Err(DlpStatus::MissingArg)
                }
            }
            // WriteRecord
            0x21 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let record_id = r.u32().map_err(|_| DlpStatus::InvalidArgSize)?;
                let attr = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let category = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let payload = r.bytes(r.remaining()).map_err(|_| DlpStatus::InvalidArgSize)?.to_vec();
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let assigned = if record_id == 0 {
                    self.next_uid += 1;
                    self.next_uid
                } else {
                    record_id
                };
                let DatabaseEntries::Records(records) = &mut self.databases[index].entries
                else {
                    return Err(DlpStatus::IllegalRequest);
                };
                let record = Record {
                    attributes: record_attrs_from_dlp(attr, category),
                    unique_id: assigned,
                    payload,
                };
                match records.iter_mut().find(|rec| rec.unique_id == assigned) {
                    Some(existing) => *existing = record,
                    None => records.push(record),
                }
                let mut buf = BytesMut::new();
                buf.put_u32(assigned);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // DeleteRecord
            0x22 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let record_id = r.u32().map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let DatabaseEntries::Records(records) = &mut self.databases[index].entries
                else {
                    return Err(DlpStatus::IllegalRequest);
                };
                let before = records.len();
                records.retain(|rec| rec.unique_id != record_id);
                if records.len() == before {
                    return Err(DlpStatus::NotFound);
                }
                Ok(Vec::new())
            }
            // ReadResourceByIndex
            0x23 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                let db_index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let DatabaseEntries::Resources(resources) = &self.databases[db_index].entries
                else {
                    return Err(DlpStatus::IllegalRequest);
                };
                let resource = resources.get(index).ok_or(DlpStatus::NotFound)?;
                let mut buf = BytesMut::new();
                buf.extend_from_slice(&resource.type_tag.0);
                buf.put_u16(resource.id);
                buf.put_u16(index as u16);
                buf.put_u16(resource.payload.len() as u16);
                buf.extend_from_slice(&resource.payload);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // WriteResource
            0x24 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let type_tag = r.tag().map_err(|_| DlpStatus::InvalidArgSize)?;
                let id = r.u16().map_err(|_| DlpStatus::InvalidArgSize)?;
                let len = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                let payload = r.bytes(len).map_err(|_| DlpStatus::InvalidArgSize)?.to_vec();
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let DatabaseEntries::Resources(resources) = &mut self.databases[index].entries
                else {
                    return Err(DlpStatus::IllegalRequest);
                };
                resources.push(Resource { type_tag, id, payload });
                Ok(Vec::new())
            }
            // CleanUpDatabase / ResetSyncFlags
            0x26 | 0x27 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                if let DatabaseEntries::Records(records) = &mut self.databases[index].entries {
                    if command == 0x26 {
                        records.retain(|rec| {
                            !(rec.attributes.is_deleted() || rec.attributes.is_archived())
                        });
                    } else {
                        for rec in records.iter_mut() {
                            if let RecordAttrs::Live { category, secret, .. } = rec.attributes {
                                rec.attributes =
                                    RecordAttrs::Live { category, dirty: false, secret };
                            }
                        }
                    }
                }
                Ok(Vec::new())
            }
            // ResetSystem
            0x29 => Ok(Vec::new()),
            // AddSyncLogEntry
            0x2A => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let text = r.cstring().map_err(|_| DlpStatus::InvalidArgSize)?;
                self.sync_log.push(text);
                Ok(Vec::new())
            }
            // ReadOpenDBInfo
            0x2B => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let mut buf = BytesMut::new();
                buf.put_u16(self.databases[index].entries.len() as u16);
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // OpenConduit
            0x2E => Ok(Vec::new()),
            // EndOfSync
            0x2F => {
                self.ended = true;
                Ok(Vec::new())
            }
            // ReadRecordIDList
            0x31 => {
                let mut r = Reader::new(args.get(ARG_1).ok_or(DlpStatus::MissingArg)?);
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                r.skip(1).map_err(|_| DlpStatus::InvalidArgSize)?;
                let start = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                let max = usize::from(r.u16().map_err(|_| DlpStatus::InvalidArgSize)?);
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let DatabaseEntries::Records(records) = &self.databases[index].entries else {
                    return Err(DlpStatus::IllegalRequest);
                };
                let ids: Vec<u32> = records
                    .iter()
                    .skip(start)
                    .take(max)
                    .map(|rec| rec.unique_id)
                    .collect();
                let mut buf = BytesMut::new();
                buf.put_u16(ids.len() as u16);
                for id in ids {
                    buf.put_u32(id);
                }
                Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
            }
            // FindDBByOpenHandle
            0x63 => {
                let mut r = Reader::new(args.get(ARG_3).ok_or(DlpStatus::MissingArg)?);
                let options = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let handle = r.u8().map_err(|_| DlpStatus::InvalidArgSize)?;
                let index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
                let info = self.db_info(index);
                let db = &self.databases[index];
                let mut buf = BytesMut::new();
                buf.put_u8(0); // card
                buf.put_u8(0);
                buf.put_u32(0); // local id
                buf.put_u32(u32::from(handle));
                info.emit(&mut buf).map_err(|_| DlpStatus::System)?;
                let mut out = vec![DlpArg::new(ARG_1, buf.to_vec())];
                if options & 0x40 != 0 {
                    let mut sizes = BytesMut::new();
                    sizes.put_u32(db.entries.len() as u32);
                    sizes.put_u32(0);
                    sizes.put_u32(0);
                    sizes.put_u32(db.app_info.as_ref().map_or(0, |b| b.len() as u32));
                    sizes.put_u32(db.sort_info.as_ref().map_or(0, |b| b.len() as u32));
                    sizes.put_u32(0);
                    out.push(DlpArg::new(ARG_2, sizes.to_vec()));
                }
                Ok(out)
            }
            _ => Err(DlpStatus::IllegalRequest),
        }
    }

    fn read_record(
        &mut self,
        handle: u8,
        locate: impl FnOnce(&[Record]) -> Option<usize>,
    ) -> Result<Vec<DlpArg>, DlpStatus> {
        let db_index = self.opened(handle).ok_or(DlpStatus::NoneOpen)?;
        let DatabaseEntries::Records(records) = &self.databases[db_index].entries else {
            return Err(DlpStatus::IllegalRequest);
        };
        let index = locate(records).ok_or(DlpStatus::NotFound)?;
        let record = &records[index];
        let (attr, category) = record_attrs_to_dlp(record.attributes);
        let mut buf = BytesMut::new();
        buf.put_u32(record.unique_id);
        buf.put_u16(index as u16);
        buf.put_u16(record.payload.len() as u16);
        buf.put_u8(attr);
        buf.put_u8(category);
        buf.extend_from_slice(&record.payload);
        Ok(vec![DlpArg::new(ARG_1, buf.to_vec())])
    }
}

fn frame_response(command: u8, status: DlpStatus, args: Vec<DlpArg>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(command | 0x80);
    buf.put_u8(args.len() as u8);
    buf.put_u16(status.code());
    for arg in &args {
        arg.emit(&mut buf);
    }
    buf.to_vec()
}

/// Serve one session over the network framing, answering until EndOfSync or
/// until the peer goes away. Returns the device so tests can inspect it.
pub async fn run_network_device(
    stream: impl PalmStream + 'static,
    mut device: FakeDevice,
) -> FakeDevice {
    let mut link = NetSyncLink::new(Box::new(stream));
    if link.handshake_as_device().await.is_err() {
        return device;
    }
    while !device.ended {
        let request = match link.recv_message().await {
            Ok(message) => message,
            Err(_) => break,
        };
        let response = device.respond(&request);
        if link.send_message(&response).await.is_err() {
            break;
        }
    }
    device
}
