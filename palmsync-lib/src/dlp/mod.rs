//! The Desktop Link Protocol: the request/response layer every device
//! operation goes through.
//!
//! A request is one framed message (command id, argument count, wrapped
//! arguments); the response echoes the command id with the top bit set,
//! carries a status word, and has arguments only on success. The engine is
//! strictly synchronous: one outbound message, then one inbound message.

pub mod arg;
pub mod commands;
pub mod status;
pub mod types;

pub use arg::{ArgSet, DlpArg, FIRST_ARG_ID};
pub use status::DlpStatus;
pub use types::{
    DbInfo, DbListFlags, DlpDateTime, FindDbOptions, OpenMode, SysInfo, UserInfo,
};

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::error::{Result, SyncError};
use crate::link::SyncLink;
use crate::wire::Reader;

const RESPONSE_BIT: u8 = 0x80;

/// A typed DLP request. `arguments` returns the wrapped arguments in
/// declaration order; optional trailing arguments are simply not returned
/// when unset.
pub trait DlpCommand {
    const COMMAND_ID: u8;
    const NAME: &'static str;
    type Response: DlpResponse;

    fn arguments(&self) -> Result<Vec<DlpArg>>;
}

/// A typed DLP response, parsed out of the response's argument set.
pub trait DlpResponse: Sized {
    fn parse_args(args: &ArgSet) -> Result<Self>;
}

impl DlpResponse for () {
    fn parse_args(_args: &ArgSet) -> Result<Self> {
        Ok(())
    }
}

/// Outcome of [`DlpClient::execute_with`]: the parsed response, or a status
/// the caller asked to see instead of an error.
#[derive(Debug)]
pub enum DlpOutcome<R> {
    Ok(R),
    Status(DlpStatus),
}

impl<R> DlpOutcome<R> {
    pub fn status(&self) -> DlpStatus {
        match self {
            DlpOutcome::Ok(_) => DlpStatus::Ok,
            DlpOutcome::Status(status) => *status,
        }
    }
}

/// The request/response engine. Owns the framing layer exclusively.
pub struct DlpClient {
    link: SyncLink,
}

impl DlpClient {
    pub fn new(link: SyncLink) -> Self {
        DlpClient { link }
    }

    pub fn link_mut(&mut self) -> &mut SyncLink {
        &mut self.link
    }

    /// Execute a command, raising `Remote` for any status other than OK.
    pub async fn execute<C: DlpCommand>(&mut self, command: &C) -> Result<C::Response> {
        match self.execute_with(command, &[]).await? {
            DlpOutcome::Ok(response) => Ok(response),
            DlpOutcome::Status(status) => {
                // execute_with only returns statuses from the ignore list,
                // which was empty.
                Err(SyncError::Remote { command: C::NAME, status })
            }
        }
    }

    /// Execute a command. A response whose status is in `ignored` is handed
    /// back to the caller instead of raising.
    pub async fn execute_with<C: DlpCommand>(
        &mut self,
        command: &C,
        ignored: &[DlpStatus],
    ) -> Result<DlpOutcome<C::Response>> {
        let args = command.arguments()?;
        let mut buf = BytesMut::new();
        buf.put_u8(C::COMMAND_ID);
        buf.put_u8(args.len() as u8);
        for arg in &args {
            arg.emit(&mut buf);
        }
        trace!(command = C::NAME, args = args.len(), len = buf.len(), "dlp request");
        self.link.send_message(&buf).await?;

        let raw = self.link.recv_message().await?;
        let mut r = Reader::new(&raw);
        let command_echo = r.u8()?;
        if command_echo != C::COMMAND_ID | RESPONSE_BIT {
            return Err(SyncError::Protocol(format!(
                "response command {command_echo:#04x} does not match request {:#04x}",
                C::COMMAND_ID
            )));
        }
        let arg_count = usize::from(r.u8()?);
        let status = DlpStatus::from_code(r.u16()?);
        trace!(command = C::NAME, ?status, args = arg_count, "dlp response");

        if status == DlpStatus::Ok {
            let args = ArgSet::parse(&mut r, arg_count)?;
            return Ok(DlpOutcome::Ok(C::Response::parse_args(&args)?));
        }
        if ignored.contains(&status) {
            debug!(command = C::NAME, ?status, "non-OK status accepted by caller");
            return Ok(DlpOutcome::Status(status));
        }
        Err(SyncError::Remote { command: C::NAME, status })
    }
}
