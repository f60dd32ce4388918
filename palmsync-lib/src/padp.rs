//! The Packet Assembly/Disassembly Protocol: reliable ordered delivery on
//! top of SLP.
//!
//! Outbound messages are split into fragments of up to 1024 bytes. Every
//! fragment is sent under a fresh transaction id and must be acknowledged
//! within two seconds, with up to ten retransmissions before the send fails.
//! Inbound fragments are acknowledged immediately, de-duplicated against the
//! last acknowledged transaction id, and reassembled in a single-slot buffer
//! keyed by the running byte offset each fragment carries.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use tokio::time::{timeout, Duration};
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};
use crate::slp::{SlpPacket, SlpPacketType, SOCKET_DLP};
use crate::transport::BoxedStream;
use crate::wire::Reader;

pub const MAX_FRAGMENT_PAYLOAD: usize = 1024;
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Data,
    Ack,
    Tickle,
    Abort,
}

impl FragmentKind {
    fn to_byte(self) -> u8 {
        match self {
            FragmentKind::Data => 1,
            FragmentKind::Ack => 2,
            FragmentKind::Tickle => 4,
            FragmentKind::Abort => 8,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(FragmentKind::Data),
            2 => Ok(FragmentKind::Ack),
            4 => Ok(FragmentKind::Tickle),
            8 => Ok(FragmentKind::Abort),
            other => Err(SyncError::Protocol(format!("unknown PADP fragment type {other:#x}"))),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FragmentAttrs: u8 {
        const FIRST        = 0x01;
        const LAST         = 0x02;
        const MEMORY_ERROR = 0x04;
        const LONG_FORM    = 0x08;
    }
}

/// One PADP fragment. `len_or_offset` is the total message length on the
/// first fragment and the running offset on every later one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub attrs: FragmentAttrs,
    pub len_or_offset: u32,
    pub payload: Vec<u8>,
}

impl Fragment {
    pub fn emit(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(6 + self.payload.len());
        buf.put_u8(self.kind.to_byte());
        buf.put_u8(self.attrs.bits());
        if self.attrs.contains(FragmentAttrs::LONG_FORM) {
            buf.put_u32(self.len_or_offset);
        } else {
            buf.put_u16(self.len_or_offset as u16);
        }
        buf.extend_from_slice(&self.payload);
        buf.to_vec()
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut r = Reader::new(raw);
        let kind = FragmentKind::from_byte(r.u8()?)?;
        let attrs = FragmentAttrs::from_bits_retain(r.u8()?);
        let len_or_offset = if attrs.contains(FragmentAttrs::LONG_FORM) {
            r.u32()?
        } else {
            u32::from(r.u16()?)
        };
        let payload = r.bytes(r.remaining())?.to_vec();
        Ok(Fragment { kind, attrs, len_or_offset, payload })
    }
}

#[derive(Debug)]
struct Inbound {
    expected: usize,
    data: Vec<u8>,
}

/// A PADP endpoint bound to a stream. Owns the outbound transaction id
/// sequence, the duplicate-suppression state, and the single-slot inbound
/// reassembly buffer.
pub struct PadpEndpoint {
    stream: BoxedStream,
    next_xid: u8,
    /// xid of the last inbound DATA we acknowledged, plus the
    /// length-or-offset value to echo when the peer retransmits it.
    last_acked: Option<(u8, u32)>,
    inbound: Option<Inbound>,
    /// A message fully assembled while we were waiting for an ACK; handed
    /// out by the next `recv_message` call.
    pending_delivery: Option<Vec<u8>>,
}

impl PadpEndpoint {
    pub fn new(stream: BoxedStream) -> Self {
        PadpEndpoint {
            stream,
            next_xid: 0,
            last_acked: None,
            inbound: None,
            pending_delivery: None,
        }
    }

    /// Advance the outbound transaction id: 1..=255, never 0.
    fn allocate_xid(&mut self) -> u8 {
        self.next_xid = match self.next_xid {
            255 => 1,
            n => n + 1,
        };
        self.next_xid
    }

    /// Send one message, fragmenting as needed. Each fragment is
    /// individually acknowledged before the next is sent.
    pub async fn send_message(&mut self, message: &[u8]) -> Result<()> {
        let total = message.len();
        let long_form = total > usize::from(u16::MAX);
        let chunks: Vec<&[u8]> = if message.is_empty() {
            vec![&[]]
        } else {
            message.chunks(MAX_FRAGMENT_PAYLOAD).collect()
        };
        let count = chunks.len();
        let mut offset = 0usize;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut attrs = FragmentAttrs::empty();
            if index == 0 {
                attrs |= FragmentAttrs::FIRST;
            }
            if index == count - 1 {
                attrs |= FragmentAttrs::LAST;
            }
            if long_form {
                attrs |= FragmentAttrs::LONG_FORM;
            }
            let fragment = Fragment {
                kind: FragmentKind::Data,
                attrs,
                len_or_offset: if index == 0 { total as u32 } else { offset as u32 },
                payload: chunk.to_vec(),
            };
            let xid = self.allocate_xid();
            self.send_fragment_reliably(xid, &fragment).await?;
            offset += chunk.len();
        }
        Ok(())
    }

    /// Receive one fully assembled message, acknowledging fragments as they
    /// arrive.
    pub async fn recv_message(&mut self) -> Result<Vec<u8>> {
        if let Some(message) = self.pending_delivery.take() {
            return Ok(message);
        }
        loop {
            let packet = SlpPacket::read_from(&mut self.stream).await?;
            if let Some(message) = self.handle_packet(packet).await? {
                return Ok(message);
            }
        }
    }

    async fn send_fragment_reliably(&mut self, xid: u8, fragment: &Fragment) -> Result<()> {
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                debug!(xid, attempt, "retransmitting PADP fragment");
            }
            self.write_fragment(xid, fragment).await?;
            match timeout(ACK_TIMEOUT, self.wait_for_ack(xid)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err @ SyncError::Protocol(_))) => return Err(err),
                Ok(Err(err)) => {
                    // Transient transport or framing trouble: burn a retry.
                    warn!(xid, %err, "PADP ack wait failed, retrying");
                }
                Err(_) => {
                    trace!(xid, "PADP ack timeout");
                }
            }
        }
        Err(SyncError::Transport(format!(
            "no ACK for PADP fragment xid {xid} after {MAX_RETRIES} retries"
        )))
    }

    async fn wait_for_ack(&mut self, xid: u8) -> Result<()> {
        loop {
            let packet = SlpPacket::read_from(&mut self.stream).await?;
            if packet.packet_type != SlpPacketType::Padp {
                trace!(packet_type = ?packet.packet_type, "discarding non-PADP packet");
                continue;
            }
            let fragment = Fragment::parse(&packet.payload)?;
            match fragment.kind {
                FragmentKind::Ack => {
                    if fragment.attrs.contains(FragmentAttrs::MEMORY_ERROR) {
                        return Err(SyncError::Protocol(
                            "peer signalled a memory error in its ACK".into(),
                        ));
                    }
                    if packet.xid != xid {
                        return Err(SyncError::Protocol(format!(
                            "ACK for xid {} while waiting on xid {xid}",
                            packet.xid
                        )));
                    }
                    return Ok(());
                }
                FragmentKind::Data if packet.xid == xid => {
                    // The peer already answered: its ACK to us was lost but
                    // the reply itself proves delivery. Consume the data and
                    // treat the send as acknowledged.
                    debug!(xid, "inbound DATA carries our outstanding xid; implicit ACK");
                    if let Some(message) = self.accept_data(packet.xid, packet.dest, packet.src, fragment).await? {
                        self.pending_delivery = Some(message);
                    }
                    return Ok(());
                }
                FragmentKind::Data => {
                    if let Some(message) = self.accept_data(packet.xid, packet.dest, packet.src, fragment).await? {
                        self.pending_delivery = Some(message);
                    }
                }
                FragmentKind::Tickle => {
                    trace!(xid = packet.xid, "discarding tickle");
                }
                FragmentKind::Abort => {
                    warn!(xid = packet.xid, "peer aborted inbound message");
                    self.inbound = None;
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: SlpPacket) -> Result<Option<Vec<u8>>> {
        match packet.packet_type {
            SlpPacketType::Loopback | SlpPacketType::System => {
                trace!(packet_type = ?packet.packet_type, "discarding non-PADP packet");
                return Ok(None);
            }
            SlpPacketType::Padp => {}
        }
        let fragment = Fragment::parse(&packet.payload)?;
        match fragment.kind {
            FragmentKind::Data => self.accept_data(packet.xid, packet.dest, packet.src, fragment).await,
            FragmentKind::Tickle => {
                trace!(xid = packet.xid, "discarding tickle");
                Ok(None)
            }
            FragmentKind::Ack => {
                trace!(xid = packet.xid, "stray ACK outside a send, discarding");
                Ok(None)
            }
            FragmentKind::Abort => {
                warn!(xid = packet.xid, "peer aborted inbound message");
                self.inbound = None;
                Ok(None)
            }
        }
    }

    /// Fold one inbound DATA fragment into the reassembly buffer, emit its
    /// ACK, and return the complete message if this fragment finished one.
    async fn accept_data(
        &mut self,
        xid: u8,
        our_socket: u8,
        peer_socket: u8,
        fragment: Fragment,
    ) -> Result<Option<Vec<u8>>> {
        if self.last_acked.map(|(acked, _)| acked) == Some(xid) {
            debug!(xid, "duplicate PADP fragment, re-sending ACK");
            let echo = self.last_acked.map(|(_, echo)| echo).unwrap_or(0);
            self.write_ack(xid, our_socket, peer_socket, echo, fragment.attrs).await?;
            return Ok(None);
        }

        if fragment.attrs.contains(FragmentAttrs::FIRST) {
            if self.inbound.is_some() {
                return Err(SyncError::Protocol(
                    "first-fragment flag in the middle of a message".into(),
                ));
            }
            self.inbound = Some(Inbound {
                expected: fragment.len_or_offset as usize,
                data: Vec::with_capacity(fragment.len_or_offset as usize),
            });
        }
        let inbound = self.inbound.as_mut().ok_or_else(|| {
            SyncError::Protocol("data fragment with no message in progress".into())
        })?;
        if !fragment.attrs.contains(FragmentAttrs::FIRST)
            && fragment.len_or_offset as usize != inbound.data.len()
        {
            return Err(SyncError::Protocol(format!(
                "fragment offset {} but {} bytes received so far",
                fragment.len_or_offset,
                inbound.data.len()
            )));
        }
        inbound.data.extend_from_slice(&fragment.payload);
        if inbound.data.len() > inbound.expected {
            return Err(SyncError::Protocol(format!(
                "message overran its declared length ({} > {})",
                inbound.data.len(),
                inbound.expected
            )));
        }

        self.write_ack(xid, our_socket, peer_socket, fragment.len_or_offset, fragment.attrs)
            .await?;
        self.last_acked = Some((xid, fragment.len_or_offset));

        if fragment.attrs.contains(FragmentAttrs::LAST) {
            let Some(inbound) = self.inbound.take() else {
                return Err(SyncError::Protocol("last fragment with no message in progress".into()));
            };
            if inbound.data.len() != inbound.expected {
                return Err(SyncError::Protocol(format!(
                    "last fragment with {} of {} bytes delivered",
                    inbound.data.len(),
                    inbound.expected
                )));
            }
            return Ok(Some(inbound.data));
        }
        Ok(None)
    }

    async fn write_ack(
        &mut self,
        xid: u8,
        our_socket: u8,
        peer_socket: u8,
        echo: u32,
        data_attrs: FragmentAttrs,
    ) -> Result<()> {
        let ack = Fragment {
            kind: FragmentKind::Ack,
            attrs: data_attrs & (FragmentAttrs::FIRST | FragmentAttrs::LAST | FragmentAttrs::LONG_FORM),
            len_or_offset: echo,
            payload: Vec::new(),
        };
        // Source and destination swap relative to the fragment being acked.
        let packet = SlpPacket {
            dest: peer_socket,
            src: our_socket,
            packet_type: SlpPacketType::Padp,
            xid,
            payload: ack.emit(),
        };
        packet.write_to(&mut self.stream).await
    }

    async fn write_fragment(&mut self, xid: u8, fragment: &Fragment) -> Result<()> {
        let packet = SlpPacket {
            dest: SOCKET_DLP,
            src: SOCKET_DLP,
            packet_type: SlpPacketType::Padp,
            xid,
            payload: fragment.emit(),
        };
        packet.write_to(&mut self.stream).await
    }
}
