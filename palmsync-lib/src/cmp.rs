//! The Connection Management Protocol: a 10-byte handshake exchanged over
//! PADP before DLP starts, negotiating the serial line rate.

use bytes::{BufMut, BytesMut};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::padp::PadpEndpoint;
use crate::transport::BaudControl;
use crate::wire::Reader;

pub const CMP_VERSION_MAJOR: u8 = 1;
pub const CMP_VERSION_MINOR: u8 = 1;

/// The rate both sides start at, and the fallback when the device does not
/// announce a maximum.
pub const INITIAL_BAUD: u32 = 9_600;
pub const DEFAULT_HOST_MAX_BAUD: u32 = 115_200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    Wakeup,
    Init,
    Abort,
    Extended,
}

impl CmpKind {
    fn to_byte(self) -> u8 {
        match self {
            CmpKind::Wakeup => 1,
            CmpKind::Init => 2,
            CmpKind::Abort => 3,
            CmpKind::Extended => 4,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(CmpKind::Wakeup),
            2 => Ok(CmpKind::Init),
            3 => Ok(CmpKind::Abort),
            4 => Ok(CmpKind::Extended),
            other => Err(SyncError::Protocol(format!("unknown CMP packet type {other:#x}"))),
        }
    }
}

/// Set on an init packet to tell the device to switch its line rate.
pub const CMP_FLAG_CHANGE_BAUD: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmpPacket {
    pub kind: CmpKind,
    pub flags: u8,
    pub major: u8,
    pub minor: u8,
    pub baud: u32,
}

impl CmpPacket {
    pub fn emit(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(10);
        buf.put_u8(self.kind.to_byte());
        buf.put_u8(self.flags);
        buf.put_u8(self.major);
        buf.put_u8(self.minor);
        buf.put_u16(0); // reserved
        buf.put_u32(self.baud);
        buf.to_vec()
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut r = Reader::new(raw);
        let kind = CmpKind::from_byte(r.u8()?)?;
        let flags = r.u8()?;
        let major = r.u8()?;
        let minor = r.u8()?;
        r.skip(2)?;
        let baud = r.u32()?;
        Ok(CmpPacket { kind, flags, major, minor, baud })
    }
}

/// Host side of the CMP exchange: wait for the device's wakeup, answer with
/// an init naming the rate to use, then apply the rate change.
///
/// `baud_control` switches the physical line; it is `None` for tunneled
/// serial, where the exchange still happens but no rate changes hands.
pub async fn negotiate(
    padp: &mut PadpEndpoint,
    host_max_baud: u32,
    mut baud_control: Option<BaudControl>,
) -> Result<u32> {
    let raw = padp.recv_message().await?;
    let wakeup = CmpPacket::parse(&raw)?;
    if wakeup.kind != CmpKind::Wakeup {
        return Err(SyncError::Protocol(format!(
            "expected CMP wakeup, got {:?}",
            wakeup.kind
        )));
    }
    debug!(
        device_max_baud = wakeup.baud,
        major = wakeup.major,
        minor = wakeup.minor,
        "CMP wakeup received"
    );

    let device_max = if wakeup.baud == 0 { INITIAL_BAUD } else { wakeup.baud };
    let baud = device_max.min(host_max_baud).max(INITIAL_BAUD);
    let flags = if baud != INITIAL_BAUD { CMP_FLAG_CHANGE_BAUD } else { 0 };
    let init = CmpPacket {
        kind: CmpKind::Init,
        flags,
        major: CMP_VERSION_MAJOR,
        minor: CMP_VERSION_MINOR,
        baud,
    };
    padp.send_message(&init.emit()).await?;

    if let Some(control) = baud_control.as_mut() {
        control(baud)?;
    }
    info!(baud, "CMP negotiation complete");
    Ok(baud)
}
