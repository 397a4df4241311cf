//! Server handles: the local RD Session Host or a remote one opened by name.

use log::{debug, info};

use crate::abi::{self, RawHandle};
use crate::error::{WtsError, WtsResult};
use crate::wts_ffi;

/// An open server handle, closed with `WTSCloseServer` on drop.
///
/// [`ServerHandle::local`] wraps `WTS_CURRENT_SERVER_HANDLE`, which needs no
/// open or close.
#[derive(Debug)]
pub struct ServerHandle {
    raw: RawHandle,
    name: Option<String>,
}

// SAFETY: WTS server handles may be used and closed from any thread.
unsafe impl Send for ServerHandle {}
unsafe impl Sync for ServerHandle {}

impl ServerHandle {
    /// The server this process runs on.
    pub fn local() -> Self {
        Self {
            raw: abi::WTS_CURRENT_SERVER_HANDLE,
            name: None,
        }
    }

    /// Open `server_name` with `WTSOpenServerW`. An empty name, "." or
    /// "localhost" yields [`ServerHandle::local`].
    ///
    /// The host is not contacted here: an unreachable or unknown server
    /// usually still yields a handle, and the failure surfaces from the first
    /// call made through it (e.g. `WTSEnumerateSessionsW`). Only a null
    /// handle is reported as an error.
    pub fn open(server_name: &str) -> WtsResult<Self> {
        if is_local_name(server_name) {
            return Ok(Self::local());
        }
        let raw = wts_ffi::open_server(server_name)?;
        if raw.is_null() {
            return Err(WtsError::last("WTSOpenServerW"));
        }
        info!("Opened WTS server handle for '{}'", server_name);
        Ok(Self {
            raw,
            name: Some(server_name.to_string()),
        })
    }

    pub fn as_raw(&self) -> RawHandle {
        self.raw
    }

    /// The remote server name, `None` for the local server.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(local)")
    }

    pub fn is_local(&self) -> bool {
        self.raw == abi::WTS_CURRENT_SERVER_HANDLE
    }

    /// Close now instead of at end of scope.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.is_local() {
            return;
        }
        wts_ffi::close_server(self.raw);
        debug!("Closed WTS server handle for '{}'", self.display_name());
    }
}

fn is_local_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name == "." || name.eq_ignore_ascii_case("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_names() {
        assert!(is_local_name(""));
        assert!(is_local_name("."));
        assert!(is_local_name(" LocalHost "));
        assert!(!is_local_name("rdsh01"));
    }

    #[test]
    fn local_handle_is_current_server() {
        let h = ServerHandle::open("localhost").unwrap();
        assert!(h.is_local());
        assert!(h.as_raw().is_null());
        assert_eq!(h.display_name(), "(local)");
        h.close();
    }
}
