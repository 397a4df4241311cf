//! # wts-bridge – Windows Terminal Services native bridge
//!
//! Typed access to the Remote Desktop Services API in `wtsapi32.dll`.
//! Provides:
//!
//! - **Server handles** – the local server or a remote RD Session Host
//!   opened by name, closed automatically
//! - **Sessions** – enumerate, query typed information, disconnect, logoff
//! - **Processes** – enumerate (basic and extended), terminate
//! - **Messaging** – message boxes on session desktops
//! - **Virtual channels** – static and dynamic channels with `Read`/`Write`
//! - **Session notifications** – callbacks for logon, lock, connect and
//!   friends
//! - **Service** – an async facade keeping a registry of open servers
//!
//! Every native failure surfaces as [`WtsError`] carrying the call name and
//! the OS error code. Buffers allocated by the API are owned by scoped
//! wrappers and released exactly once.
//!
//! The data types, configuration and decoders compile everywhere; the
//! native layer only on Windows.

pub mod abi;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;
pub mod wide;

#[cfg(windows)]
pub(crate) mod loader;

#[cfg(windows)]
pub mod wts_ffi;

#[cfg(windows)]
pub mod server;

#[cfg(windows)]
pub mod sessions;

#[cfg(windows)]
pub mod processes;

#[cfg(windows)]
pub mod messaging;

#[cfg(windows)]
pub mod channel;

#[cfg(windows)]
pub mod notify;

#[cfg(windows)]
pub mod service;

pub use config::{BridgeConfig, ConfigError};
pub use error::{WtsError, WtsResult};
pub use types::*;

#[cfg(windows)]
pub use channel::VirtualChannel;
#[cfg(windows)]
pub use memory::{WtsArray, WtsMemory};
#[cfg(windows)]
pub use notify::{register_session_notification, SessionNotification};
#[cfg(windows)]
pub use server::ServerHandle;
#[cfg(windows)]
pub use service::{WtsService, WtsServiceState};
