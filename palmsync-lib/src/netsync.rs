//! Network HotSync framing: a 6-byte header over a reliable byte stream,
//! plus the fixed pre-DLP handshake.
//!
//! Unlike the serial stack there are no acknowledgements and no retries;
//! TCP provides the ordering and delivery guarantees PADP exists for.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Result, SyncError};
use crate::transport::BoxedStream;

/// Default TCP port a device connects to for network HotSync.
pub const NETSYNC_DATA_PORT: u16 = 14238;
/// Default port of the development serial-over-network bridge (emulators).
pub const SERIAL_BRIDGE_PORT: u16 = 6416;

const HEADER_LEN: usize = 6;
const DATAGRAM_TYPE: u8 = 1;

/// The three device messages and two host replies exchanged before any DLP
/// traffic. These are wire captures; the exchange is validated by the
/// leading opcode byte of each device message, not byte-for-byte.
pub const HANDSHAKE_MSG_1_OPCODE: u8 = 0x90;
pub const HANDSHAKE_MSG_2_OPCODE: u8 = 0x92;
pub const HANDSHAKE_MSG_3_OPCODE: u8 = 0x93;

pub const HANDSHAKE_MSG_1: &[u8] = &[
    0x90, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x08, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
pub const HANDSHAKE_REPLY_1: &[u8] = &[
    0x12, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x24, 0xff,
    0xff, 0xff, 0xff, 0x3c, 0x00, 0x3c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0xa8, 0xa5, 0x1f, 0x04, 0x27, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];
pub const HANDSHAKE_MSG_2: &[u8] = &[
    0x92, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x24, 0xff,
    0xff, 0xff, 0xff, 0x00, 0x3c, 0x00, 0x3c, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0xa8, 0xa5, 0x1e, 0x04, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];
pub const HANDSHAKE_REPLY_2: &[u8] = &[
    0x13, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
];
pub const HANDSHAKE_MSG_3: &[u8] = &[0x93, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Framing endpoint for network HotSync.
pub struct NetSyncLink {
    stream: BoxedStream,
    next_xid: u8,
}

impl NetSyncLink {
    pub fn new(stream: BoxedStream) -> Self {
        NetSyncLink { stream, next_xid: 0 }
    }

    fn allocate_xid(&mut self) -> u8 {
        self.next_xid = match self.next_xid {
            255 => 1,
            n => n + 1,
        };
        self.next_xid
    }

    pub async fn send_message(&mut self, payload: &[u8]) -> Result<()> {
        let xid = self.allocate_xid();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u8(DATAGRAM_TYPE);
        buf.put_u8(xid);
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        trace!(xid, len = payload.len(), "netsync tx");
        self.stream
            .write_all(&buf)
            .await
            .map_err(|e| SyncError::Transport(format!("netsync write: {e}")))?;
        self.stream
            .flush()
            .await
            .map_err(|e| SyncError::Transport(format!("netsync flush: {e}")))?;
        Ok(())
    }

    pub async fn recv_message(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| SyncError::Transport(format!("netsync header read: {e}")))?;
        if header[0] != DATAGRAM_TYPE {
            return Err(SyncError::framing(
                format!("unexpected netsync datagram type {:#x}", header[0]),
                &header,
            ));
        }
        let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| SyncError::Transport(format!("netsync body read: {e}")))?;
        trace!(xid = header[1], len, "netsync rx");
        Ok(payload)
    }

    /// Host side of the fixed pre-DLP exchange: three device messages, two
    /// host replies, in strict alternation.
    pub async fn handshake_as_host(&mut self) -> Result<()> {
        self.expect_handshake_message(HANDSHAKE_MSG_1_OPCODE).await?;
        self.send_message(HANDSHAKE_REPLY_1).await?;
        self.expect_handshake_message(HANDSHAKE_MSG_2_OPCODE).await?;
        self.send_message(HANDSHAKE_REPLY_2).await?;
        self.expect_handshake_message(HANDSHAKE_MSG_3_OPCODE).await?;
        debug!("netsync handshake complete");
        Ok(())
    }

    /// Device side of the exchange, used by the bridge client and by test
    /// doubles standing in for a handheld.
    pub async fn handshake_as_device(&mut self) -> Result<()> {
        self.send_message(HANDSHAKE_MSG_1).await?;
        self.recv_message().await?;
        self.send_message(HANDSHAKE_MSG_2).await?;
        self.recv_message().await?;
        self.send_message(HANDSHAKE_MSG_3).await?;
        Ok(())
    }

    async fn expect_handshake_message(&mut self, opcode: u8) -> Result<()> {
        let message = self.recv_message().await?;
        match message.first() {
            Some(&first) if first == opcode => Ok(()),
            Some(&first) => Err(SyncError::Protocol(format!(
                "handshake message opcode {first:#04x}, expected {opcode:#04x}"
            ))),
            None => Err(SyncError::Protocol("empty handshake message".into())),
        }
    }
}
