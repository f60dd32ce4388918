#![forbid(unsafe_code)]

//! Host-side HotSync: the layered protocols, container formats and sync
//! orchestration for talking to Palm OS handhelds.

pub mod cmp;
pub mod conduit;
pub mod config;
pub mod dlp;
pub mod error;
pub mod link;
pub mod netsync;
pub mod padp;
pub mod palmdoc;
pub mod pdb;
pub mod server;
pub mod session;
pub mod slp;
pub mod transport;
pub mod wire;

pub use conduit::{sync_device, DeviceDir, HostIdentity, SyncMode};
pub use config::{load_from_path, Config};
pub use dlp::{DlpClient, DlpStatus};
pub use error::{Result, SyncError};
pub use link::SyncLink;
pub use pdb::Database;
pub use server::{Listener, ServerOptions, SyncServer};
pub use session::SyncSession;
pub use transport::{BoxedStream, PalmStream};
