//! A sync session: one transport stream, one framing stack, one DLP engine,
//! and the lifecycle that brackets every conversation with a device.

pub mod recorder;

pub use recorder::{shared_recorder, Recorder, ReplayStream, SharedRecorder, TapStream};

use tracing::{debug, info};

use crate::cmp::DEFAULT_HOST_MAX_BAUD;
use crate::dlp::commands::{
    AddSyncLogEntry, EndOfSync, ReadSysInfo, ReadUserInfo, SyncTermination,
};
use crate::dlp::{DlpClient, SysInfo, UserInfo};
use crate::error::Result;
use crate::link::SyncLink;
use crate::transport::{BaudControl, BoxedStream};

/// Which framing stack a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stack {
    Serial,
    Network,
}

pub struct SyncSession {
    dlp: DlpClient,
    stack: Stack,
    host_max_baud: u32,
    baud_control: Option<BaudControl>,
    sys_info: Option<SysInfo>,
    user_info: Option<UserInfo>,
}

impl SyncSession {
    /// A session over the serial stack (SLP + PADP, CMP handshake).
    /// `baud_control` switches the physical line rate; pass `None` for
    /// tunneled serial where no such line exists.
    pub fn serial(stream: BoxedStream, baud_control: Option<BaudControl>) -> Self {
        SyncSession {
            dlp: DlpClient::new(SyncLink::serial(stream)),
            stack: Stack::Serial,
            host_max_baud: DEFAULT_HOST_MAX_BAUD,
            baud_control,
            sys_info: None,
            user_info: None,
        }
    }

    /// A session over the network stack (6-byte datagrams, fixed handshake).
    pub fn network(stream: BoxedStream) -> Self {
        SyncSession {
            dlp: DlpClient::new(SyncLink::network(stream)),
            stack: Stack::Network,
            host_max_baud: DEFAULT_HOST_MAX_BAUD,
            baud_control: None,
            sys_info: None,
            user_info: None,
        }
    }

    pub fn with_host_max_baud(mut self, baud: u32) -> Self {
        self.host_max_baud = baud;
        self
    }

    pub fn stack(&self) -> Stack {
        self.stack
    }

    /// Run the stack's pre-DLP handshake.
    pub async fn handshake(&mut self) -> Result<()> {
        let baud_control = self.baud_control.take();
        self.dlp
            .link_mut()
            .handshake(self.host_max_baud, baud_control)
            .await
    }

    /// First DLP traffic of a session: read and cache the device's system
    /// and user information.
    pub async fn start(&mut self) -> Result<()> {
        let sys_info = self.dlp.execute(&ReadSysInfo).await?;
        debug!(
            rom = format_args!("{:#010x}", sys_info.rom_version),
            dlp = format_args!("{}.{}", sys_info.dlp_major, sys_info.dlp_minor),
            "device system info"
        );
        let user_info = self.dlp.execute(&ReadUserInfo).await?;
        info!(
            user = %user_info.user_name,
            user_id = user_info.user_id,
            "session started"
        );
        self.sys_info = Some(sys_info);
        self.user_info = Some(user_info);
        Ok(())
    }

    pub fn dlp(&mut self) -> &mut DlpClient {
        &mut self.dlp
    }

    pub fn sys_info(&self) -> Option<&SysInfo> {
        self.sys_info.as_ref()
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    /// Replace the cached user info after writing a new one to the device.
    pub fn set_user_info(&mut self, user_info: UserInfo) {
        self.user_info = Some(user_info);
    }

    /// Close the session: append a log entry the device will display, then
    /// end the sync.
    pub async fn end(&mut self, log_text: &str, termination: SyncTermination) -> Result<()> {
        self.dlp
            .execute(&AddSyncLogEntry { text: log_text.to_string() })
            .await?;
        self.dlp.execute(&EndOfSync { termination }).await?;
        info!(?termination, "session ended");
        Ok(())
    }
}
