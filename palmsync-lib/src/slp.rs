//! The Serial Link Protocol: signature-framed datagrams with an additive
//! header checksum and a trailing CRC-16 over the whole datagram.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Result, SyncError};
use crate::wire::crc16;

pub const SLP_SIGNATURE: [u8; 3] = [0xBE, 0xEF, 0xED];
pub const SLP_HEADER_LEN: usize = 10;

/// The socket id both ends use for DLP traffic.
pub const SOCKET_DLP: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlpPacketType {
    System,
    Padp,
    Loopback,
}

impl SlpPacketType {
    pub fn to_byte(self) -> u8 {
        match self {
            SlpPacketType::System => 0,
            SlpPacketType::Padp => 2,
            SlpPacketType::Loopback => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(SlpPacketType::System),
            2 => Ok(SlpPacketType::Padp),
            3 => Ok(SlpPacketType::Loopback),
            other => Err(SyncError::framing(format!("unknown SLP packet type {other:#x}"), &[other])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlpPacket {
    pub dest: u8,
    pub src: u8,
    pub packet_type: SlpPacketType,
    pub xid: u8,
    pub payload: Vec<u8>,
}

/// Sum of the first nine header bytes, truncated to a byte.
fn header_checksum(header: &[u8]) -> u8 {
    header[..9].iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

impl SlpPacket {
    pub fn emit(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SLP_HEADER_LEN + self.payload.len() + 2);
        buf.extend_from_slice(&SLP_SIGNATURE);
        buf.put_u8(self.dest);
        buf.put_u8(self.src);
        buf.put_u8(self.packet_type.to_byte());
        buf.put_u16(self.payload.len() as u16);
        buf.put_u8(self.xid);
        let checksum = header_checksum(&buf);
        buf.put_u8(checksum);
        buf.extend_from_slice(&self.payload);
        let crc = crc16(&buf);
        buf.put_u16(crc);
        buf.to_vec()
    }

    /// Parse one complete datagram (header, payload, trailing CRC).
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < SLP_HEADER_LEN + 2 {
            return Err(SyncError::framing("short SLP datagram", raw));
        }
        let (header, rest) = raw.split_at(SLP_HEADER_LEN);
        if header[..3] != SLP_SIGNATURE {
            return Err(SyncError::framing("bad SLP signature", raw));
        }
        if header_checksum(header) != header[9] {
            return Err(SyncError::framing(
                format!("SLP header checksum mismatch (got {:#04x})", header[9]),
                raw,
            ));
        }
        let payload_len = usize::from(u16::from_be_bytes([header[6], header[7]]));
        if rest.len() != payload_len + 2 {
            return Err(SyncError::framing(
                format!("SLP length field says {payload_len}, datagram carries {}", rest.len()),
                raw,
            ));
        }
        let (payload, crc_bytes) = rest.split_at(payload_len);
        let expected = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);
        let actual = crc16(&raw[..SLP_HEADER_LEN + payload_len]);
        if actual != expected {
            return Err(SyncError::framing(
                format!("SLP CRC mismatch: computed {actual:#06x}, datagram says {expected:#06x}"),
                raw,
            ));
        }
        Ok(SlpPacket {
            dest: header[3],
            src: header[4],
            packet_type: SlpPacketType::from_byte(header[5])?,
            xid: header[8],
            payload: payload.to_vec(),
        })
    }

    /// Read one datagram from the stream: the fixed header first, which
    /// names the total length, then the remainder.
    pub async fn read_from<S>(stream: &mut S) -> Result<Self>
    where
        S: AsyncRead + Unpin + ?Sized,
    {
        let mut header = [0u8; SLP_HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| SyncError::Transport(format!("SLP header read: {e}")))?;
        let payload_len = usize::from(u16::from_be_bytes([header[6], header[7]]));
        let mut rest = vec![0u8; payload_len + 2];
        stream
            .read_exact(&mut rest)
            .await
            .map_err(|e| SyncError::Transport(format!("SLP body read: {e}")))?;
        let mut raw = Vec::with_capacity(SLP_HEADER_LEN + rest.len());
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&rest);
        let packet = Self::parse(&raw)?;
        trace!(
            dest = packet.dest,
            src = packet.src,
            xid = packet.xid,
            len = packet.payload.len(),
            "slp rx"
        );
        Ok(packet)
    }

    pub async fn write_to<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        trace!(
            dest = self.dest,
            src = self.src,
            xid = self.xid,
            len = self.payload.len(),
            "slp tx"
        );
        let raw = self.emit();
        stream
            .write_all(&raw)
            .await
            .map_err(|e| SyncError::Transport(format!("SLP write: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| SyncError::Transport(format!("SLP flush: {e}")))?;
        Ok(())
    }
}
