//! DLP argument wrappers.
//!
//! Each argument is a 6-bit id plus a payload, wrapped in one of three
//! encodings selected by payload size. The wrapper kind lives in the two
//! high bits of the id byte: `00` tiny (8-bit length), `10` short (16-bit
//! length), `01` long (32-bit length). The emitter always picks the most
//! compact wrapper that fits.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SyncError};
use crate::wire::Reader;

/// Argument ids count up from 0x20 in declaration order.
pub const FIRST_ARG_ID: u8 = 0x20;

const KIND_MASK: u8 = 0xC0;
const KIND_TINY: u8 = 0x00;
const KIND_SHORT: u8 = 0x80;
const KIND_LONG: u8 = 0x40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlpArg {
    pub id: u8,
    pub data: Vec<u8>,
}

impl DlpArg {
    pub fn new(id: u8, data: Vec<u8>) -> Self {
        debug_assert!(id & KIND_MASK == 0, "argument ids are 6-bit");
        DlpArg { id, data }
    }

    /// Size of the wrapper this argument will be emitted with.
    pub fn header_len(&self) -> usize {
        if self.data.len() <= usize::from(u8::MAX) {
            2
        } else if self.data.len() <= usize::from(u16::MAX) {
            4
        } else {
            6
        }
    }

    pub fn emit(&self, buf: &mut BytesMut) {
        let id = self.id & 0x3F;
        if self.data.len() <= usize::from(u8::MAX) {
            buf.put_u8(id | KIND_TINY);
            buf.put_u8(self.data.len() as u8);
        } else if self.data.len() <= usize::from(u16::MAX) {
            buf.put_u8(id | KIND_SHORT);
            buf.put_u8(0);
            buf.put_u16(self.data.len() as u16);
        } else {
            buf.put_u8(id | KIND_LONG);
            buf.put_u8(0);
            buf.put_u32(self.data.len() as u32);
        }
        buf.extend_from_slice(&self.data);
    }

    pub fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let id_byte = r.u8()?;
        let id = id_byte & 0x3F;
        let len = match id_byte & KIND_MASK {
            KIND_TINY => usize::from(r.u8()?),
            KIND_SHORT => {
                r.skip(1)?;
                usize::from(r.u16()?)
            }
            KIND_LONG => {
                r.skip(1)?;
                r.u32()? as usize
            }
            _ => {
                return Err(SyncError::Protocol(format!(
                    "invalid DLP argument wrapper {id_byte:#04x}"
                )))
            }
        };
        let data = r.bytes(len)?.to_vec();
        Ok(DlpArg { id, data })
    }
}

/// Collect a response's arguments into id order for lookup by the typed
/// response parsers. Optional trailing arguments are simply absent.
#[derive(Debug, Default)]
pub struct ArgSet {
    args: Vec<DlpArg>,
}

impl ArgSet {
    pub fn parse(r: &mut Reader<'_>, count: usize) -> Result<Self> {
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            args.push(DlpArg::parse(r)?);
        }
        Ok(ArgSet { args })
    }

    pub fn get(&self, id: u8) -> Option<&[u8]> {
        self.args.iter().find(|a| a.id == id).map(|a| a.data.as_slice())
    }

    pub fn require(&self, id: u8, command: &'static str) -> Result<&[u8]> {
        self.get(id).ok_or_else(|| {
            SyncError::Protocol(format!("{command} response is missing argument {id:#04x}"))
        })
    }
}
