//! The framing seam between a raw transport stream and the DLP engine.
//!
//! Serial-class transports run CMP + PADP + SLP; network transports run the
//! 6-byte datagram framing. Above this enum, both look like an ordered,
//! reliable message pipe.

use crate::cmp;
use crate::error::Result;
use crate::netsync::NetSyncLink;
use crate::padp::PadpEndpoint;
use crate::transport::{BaudControl, BoxedStream};

pub enum SyncLink {
    Serial(PadpEndpoint),
    Network(NetSyncLink),
}

impl SyncLink {
    pub fn serial(stream: BoxedStream) -> Self {
        SyncLink::Serial(PadpEndpoint::new(stream))
    }

    pub fn network(stream: BoxedStream) -> Self {
        SyncLink::Network(NetSyncLink::new(stream))
    }

    pub async fn send_message(&mut self, payload: &[u8]) -> Result<()> {
        match self {
            SyncLink::Serial(padp) => padp.send_message(payload).await,
            SyncLink::Network(net) => net.send_message(payload).await,
        }
    }

    pub async fn recv_message(&mut self) -> Result<Vec<u8>> {
        match self {
            SyncLink::Serial(padp) => padp.recv_message().await,
            SyncLink::Network(net) => net.recv_message().await,
        }
    }

    /// Run the stack's pre-DLP handshake: CMP baud negotiation on the serial
    /// stack, the fixed three-message exchange on the network stack.
    pub async fn handshake(&mut self, host_max_baud: u32, baud_control: Option<BaudControl>) -> Result<()> {
        match self {
            SyncLink::Serial(padp) => {
                cmp::negotiate(padp, host_max_baud, baud_control).await?;
                Ok(())
            }
            SyncLink::Network(net) => net.handshake_as_host().await,
        }
    }
}
