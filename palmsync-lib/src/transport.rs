//! Stream plumbing shared by both protocol stacks.

use tokio::io::{AsyncRead, AsyncWrite};

/// Anything the framing layers can read and write: a TCP connection, a
/// serial device node, an in-memory duplex pipe in tests, or a tap/replay
/// wrapper. Only the framing layer ever touches the stream.
pub trait PalmStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> PalmStream for T {}

pub type BoxedStream = Box<dyn PalmStream>;

/// Applied after CMP settles on a rate. Physical serial transports change
/// the line rate here; tunneled transports pass `None` and the exchange
/// still happens without a rate change.
pub type BaudControl = Box<dyn FnMut(u32) -> crate::Result<()> + Send>;
