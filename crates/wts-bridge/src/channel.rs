//! Virtual channels between the server-side session and the RDP client.

use std::io;

use log::{debug, warn};

use crate::abi::{RawHandle, CHANNEL_CHUNK_LENGTH, CHANNEL_NAME_LEN};
use crate::error::{WtsError, WtsResult};
use crate::server::ServerHandle;
use crate::types::{ChannelOptions, VirtualClass};
use crate::wts_ffi;

/// Wait forever in [`VirtualChannel::receive`].
pub const INFINITE: u32 = u32::MAX;
/// Read timeout used by the [`io::Read`] impl until changed.
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 5_000;

/// Bytes read from the channel but not yet handed to the caller.
///
/// `WTSVirtualChannelRead` needs a buffer of at least
/// [`CHANNEL_CHUNK_LENGTH`] bytes, so reads land here first.
#[derive(Debug)]
struct ChunkBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

impl ChunkBuffer {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0; size.max(CHANNEL_CHUNK_LENGTH)],
            start: 0,
            end: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Refill from `fill` when drained. Returns the bytes now pending.
    fn fill_with<F>(&mut self, fill: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        if self.pending() == 0 {
            let n = fill(&mut self.data)?;
            self.start = 0;
            self.end = n.min(self.data.len());
        }
        Ok(self.pending())
    }

    /// Copy pending bytes into `out`.
    fn take(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.pending());
        out[..n].copy_from_slice(&self.data[self.start..self.start + n]);
        self.start += n;
        n
    }

    fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

/// An open channel, closed with `WTSVirtualChannelClose` on drop.
///
/// `Read` goes through an internal chunk buffer, so any caller buffer size
/// works. A timed-out wait maps to [`io::ErrorKind::TimedOut`] so that
/// `Ok(0)` keeps its end-of-stream meaning.
#[derive(Debug)]
pub struct VirtualChannel {
    raw: RawHandle,
    name: String,
    session_id: u32,
    read_timeout_ms: u32,
    chunk: ChunkBuffer,
}

// SAFETY: channel handles are not bound to the opening thread.
unsafe impl Send for VirtualChannel {}

fn check_static_name(call: &'static str, name: &str) -> WtsResult<()> {
    if name.is_empty() || name.len() > CHANNEL_NAME_LEN || !name.is_ascii() {
        return Err(WtsError::invalid_argument(call));
    }
    Ok(())
}

impl VirtualChannel {
    /// `WTSVirtualChannelOpenEx` in `session_id` (use
    /// [`crate::abi::WTS_CURRENT_SESSION`] from inside a session). Static
    /// channel names are at most 7 ASCII characters.
    pub fn open(session_id: u32, name: &str, options: ChannelOptions) -> WtsResult<Self> {
        if !options.dynamic {
            check_static_name("WTSVirtualChannelOpenEx", name)?;
        }
        let raw = wts_ffi::virtual_channel_open_ex(session_id, name, options.to_flags())?;
        Ok(Self::from_parts(raw, name, session_id))
    }

    /// `WTSVirtualChannelOpen`: a static channel on `server`.
    pub fn open_static(server: &ServerHandle, session_id: u32, name: &str) -> WtsResult<Self> {
        check_static_name("WTSVirtualChannelOpen", name)?;
        let raw = wts_ffi::virtual_channel_open(server.as_raw(), session_id, name)?;
        Ok(Self::from_parts(raw, name, session_id))
    }

    fn from_parts(raw: RawHandle, name: &str, session_id: u32) -> Self {
        Self {
            raw,
            name: name.to_string(),
            session_id,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            chunk: ChunkBuffer::new(CHANNEL_CHUNK_LENGTH),
        }
    }

    /// Size of the internal read buffer, at least [`CHANNEL_CHUNK_LENGTH`].
    /// Unread buffered bytes are dropped.
    pub fn with_read_buffer(mut self, size: usize) -> Self {
        self.chunk = ChunkBuffer::new(size);
        self
    }

    pub fn read_buffer_size(&self) -> usize {
        self.chunk.capacity()
    }

    pub fn with_read_timeout(mut self, timeout_ms: u32) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    pub fn set_read_timeout(&mut self, timeout_ms: u32) {
        self.read_timeout_ms = timeout_ms;
    }

    pub fn read_timeout(&self) -> u32 {
        self.read_timeout_ms
    }

    pub fn as_raw(&self) -> RawHandle {
        self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Write `data`, returning the bytes accepted.
    pub fn send(&self, data: &[u8]) -> WtsResult<u32> {
        wts_ffi::virtual_channel_write(self.raw, data)
    }

    /// Wait up to `timeout_ms` and read into `buf`, which must hold at least
    /// [`CHANNEL_CHUNK_LENGTH`] bytes. Returns 0 on timeout. Bypasses the
    /// buffer used by `Read`.
    pub fn receive(&self, buf: &mut [u8], timeout_ms: u32) -> WtsResult<u32> {
        wts_ffi::virtual_channel_read(self.raw, timeout_ms, buf)
    }

    /// `WTSVirtualClientData`: the client data block for the channel.
    pub fn query_client_data(&self) -> WtsResult<Vec<u8>> {
        let buf = wts_ffi::virtual_channel_query(self.raw, VirtualClass::ClientData)?;
        Ok(buf.as_bytes().to_vec())
    }

    /// `WTSVirtualFileHandle`: a file handle usable for overlapped I/O.
    /// Owned by the channel; do not close it.
    pub fn query_file_handle(&self) -> WtsResult<RawHandle> {
        let buf = wts_ffi::virtual_channel_query(self.raw, VirtualClass::FileHandle)?;
        buf.read_struct::<RawHandle>()
            .ok_or_else(|| WtsError::invalid_argument("WTSVirtualChannelQuery"))
    }

    /// Drop queued input, including bytes buffered for `Read`.
    pub fn purge_input(&mut self) -> WtsResult<()> {
        self.chunk.clear();
        wts_ffi::virtual_channel_purge_input(self.raw)
    }

    pub fn purge_output(&self) -> WtsResult<()> {
        wts_ffi::virtual_channel_purge_output(self.raw)
    }

    /// Close now, surfacing the close error that `Drop` would only log.
    pub fn close(mut self) -> WtsResult<()> {
        let raw = std::mem::replace(&mut self.raw, std::ptr::null_mut());
        wts_ffi::virtual_channel_close(raw)?;
        debug!("Closed channel '{}'", self.name);
        Ok(())
    }
}

impl Drop for VirtualChannel {
    fn drop(&mut self) {
        if self.raw.is_null() {
            return;
        }
        match wts_ffi::virtual_channel_close(self.raw) {
            Ok(()) => debug!("Closed channel '{}'", self.name),
            Err(e) => warn!("Closing channel '{}': {}", self.name, e),
        }
    }
}

impl io::Read for VirtualChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let (raw, timeout) = (self.raw, self.read_timeout_ms);
        let pending = self.chunk.fill_with(|chunk| {
            Ok(wts_ffi::virtual_channel_read(raw, timeout, chunk)? as usize)
        })?;
        if pending == 0 {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no data on channel '{}' within {} ms", self.name, timeout),
            ));
        }
        Ok(self.chunk.take(buf))
    }
}

impl io::Write for VirtualChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.send(buf)? as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::WTS_CURRENT_SESSION;
    use std::io::{Read, Write};

    #[test]
    fn static_names_are_validated() {
        assert!(check_static_name("x", "CLIPRDR").is_ok());
        assert!(check_static_name("x", "TOOLONGNAME").is_err());
        assert!(check_static_name("x", "").is_err());
        assert!(check_static_name("x", "näme").is_err());
    }

    #[test]
    fn open_rejects_long_static_name_without_native_call() {
        let err = VirtualChannel::open(WTS_CURRENT_SESSION, "WAYTOOLONG", ChannelOptions::default())
            .unwrap_err();
        assert_eq!(err.code, crate::error::ERROR_INVALID_PARAMETER);
        assert_eq!(err.call, "WTSVirtualChannelOpenEx");
    }

    #[test]
    fn chunk_buffer_has_native_minimum() {
        assert_eq!(ChunkBuffer::new(16).capacity(), CHANNEL_CHUNK_LENGTH);
        assert_eq!(ChunkBuffer::new(8192).capacity(), 8192);
    }

    #[test]
    fn chunk_buffer_serves_partial_reads() {
        let mut chunk = ChunkBuffer::new(0);
        let fills = std::cell::Cell::new(0);
        let fill = |buf: &mut [u8]| -> io::Result<usize> {
            fills.set(fills.get() + 1);
            assert!(buf.len() >= CHANNEL_CHUNK_LENGTH);
            buf[..5].copy_from_slice(b"hello");
            Ok(5)
        };
        assert_eq!(chunk.fill_with(fill).unwrap(), 5);
        let mut out = [0u8; 3];
        assert_eq!(chunk.take(&mut out), 3);
        assert_eq!(&out, b"hel");
        // Pending bytes are served without another native read.
        assert_eq!(chunk.fill_with(fill).unwrap(), 2);
        assert_eq!(chunk.take(&mut out), 2);
        assert_eq!(&out[..2], b"lo");
        assert_eq!(fills.get(), 1);
        assert_eq!(chunk.fill_with(fill).unwrap(), 5);
        assert_eq!(fills.get(), 2);
    }

    #[test]
    fn chunk_buffer_timeout_and_clear() {
        let mut chunk = ChunkBuffer::new(0);
        assert_eq!(chunk.fill_with(|_| Ok(0)).unwrap(), 0);
        chunk.fill_with(|buf| {
            buf[0] = 1;
            Ok(1)
        })
        .unwrap();
        chunk.clear();
        assert_eq!(chunk.pending(), 0);
        let err = chunk
            .fill_with(|_| Err(io::Error::from(io::ErrorKind::BrokenPipe)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    #[ignore = "needs an RDP session with a client-side peer echoing on ECHO"]
    fn round_trip_with_echo_peer() {
        let mut ch = VirtualChannel::open(WTS_CURRENT_SESSION, "ECHO", ChannelOptions::default())
            .unwrap()
            .with_read_timeout(2_000);
        let payload = b"wts-bridge round trip";
        ch.write_all(payload).unwrap();
        let mut back = vec![0u8; payload.len()];
        ch.read_exact(&mut back).unwrap();
        assert_eq!(&back, payload);
        ch.close().unwrap();
    }
}
