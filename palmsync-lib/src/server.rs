//! Listeners that wait for a device to initiate a sync: the network
//! HotSync data port, and the serial-over-network bridge used by emulators.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::conduit::{sync_device, DeviceDir, HostIdentity};
use crate::error::Result;
use crate::session::SyncSession;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub data_dir: std::path::PathBuf,
    pub host: HostIdentity,
}

/// Which framing stack an accepted connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    /// Network HotSync (the device's "Modem Sync" over TCP).
    NetSync,
    /// Serial stack tunneled over TCP, as emulators speak it. No physical
    /// line rate exists, so CMP negotiates but changes nothing.
    SerialBridge,
}

pub struct SyncServer {
    options: Arc<ServerOptions>,
}

impl SyncServer {
    pub fn new(options: ServerOptions) -> Self {
        SyncServer { options: Arc::new(options) }
    }

    /// Accept and serve sessions until the shutdown signal fires. Sessions
    /// run one at a time: a sync in progress finishes before the next
    /// connection is accepted, and a shutdown waits for it too.
    pub async fn run(
        &self,
        listener: TcpListener,
        kind: Listener,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                res = listener.accept() => res,
                res = shutdown.changed() => {
                    if res.is_ok() {
                        info!("shutdown signal received, stopping accept loop");
                        break;
                    } else {
                        // sender dropped; treat as no shutdown signal
                        continue;
                    }
                }
            };
            let (stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            info!(%addr, ?kind, "device connected");
            match self.serve(stream, kind).await {
                Ok(()) => info!(%addr, "sync finished"),
                Err(err) => warn!(%addr, %err, "sync failed"),
            }
        }
        Ok(())
    }

    async fn serve(&self, stream: TcpStream, kind: Listener) -> Result<()> {
        let mut session = match kind {
            Listener::NetSync => SyncSession::network(Box::new(stream)),
            Listener::SerialBridge => SyncSession::serial(Box::new(stream), None),
        };
        session.handshake().await?;
        session.start().await?;
        let dir = DeviceDir::open(&self.options.data_dir).await?;
        let summary = sync_device(&mut session, &dir, &self.options.host).await?;
        info!(
            mode = ?summary.mode,
            downloaded = summary.downloaded,
            synced = summary.synced,
            installed = summary.installed,
            skipped = summary.skipped,
            "sync summary"
        );
        Ok(())
    }
}
