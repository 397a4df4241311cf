//! Safe wrappers around the Windows Terminal Services (WTS) API, one per
//! native entry point.
//!
//! These functions marshal Rust arguments into the exact native shapes,
//! invoke the export through [`crate::loader`], and translate a FALSE/null
//! return into [`WtsError`]. `GetLastError` is always read immediately after
//! the failing call, before any logging or other OS call. Nothing here
//! closes or frees on error paths; the scoped wrappers do that.

use std::ffi::{c_void, CString};
use std::os::windows::io::{FromRawHandle, OwnedHandle};

use log::{debug, warn};
use windows_sys::Win32::Foundation::LocalFree;
use windows_sys::Win32::Security::Authorization::ConvertSidToStringSidW;
use windows_sys::Win32::System::RemoteDesktop::{
    ProcessIdToSessionId, WTSGetActiveConsoleSessionId,
};
use windows_sys::Win32::System::Threading::GetCurrentProcessId;

use crate::abi::{
    self, Bool, RawHandle, WTS_PROCESS_INFOW, WTS_PROCESS_INFO_EXW, WTS_SESSION_INFOW,
};
use crate::error::{WtsError, WtsResult};
use crate::loader::wtsapi;
use crate::memory::{FreeWith, WtsArray, WtsMemory};
use crate::types::{
    InfoClass, MessageResponse, ProcessDescriptor, ProcessDescriptorEx, SessionDescriptor,
    VirtualClass,
};
use crate::wide::{from_wide_ptr, to_wide};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn a native BOOL into a result. Must run before any other OS call.
fn check(call: &'static str, ret: Bool) -> WtsResult<()> {
    if ret == 0 {
        Err(WtsError::last(call))
    } else {
        Ok(())
    }
}

fn to_bool(v: bool) -> Bool {
    v as Bool
}

fn ansi_name(call: &'static str, name: &str) -> WtsResult<CString> {
    CString::new(name).map_err(|_| WtsError::invalid_argument(call))
}

/// Convert a PSID to a string like "S-1-5-21-...". Empty for a null SID or
/// when the conversion fails.
///
/// # Safety
/// `psid` must be null or point to a valid SID.
pub unsafe fn sid_to_string(psid: *mut c_void) -> String {
    if psid.is_null() {
        return String::new();
    }
    let mut str_ptr: *mut u16 = std::ptr::null_mut();
    if ConvertSidToStringSidW(psid, &mut str_ptr) == 0 || str_ptr.is_null() {
        return String::new();
    }
    let s = from_wide_ptr(str_ptr);
    LocalFree(str_ptr.cast());
    s
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Server handles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `WTSOpenServerW`. Returns the handle as-is; a null handle means failure
/// and the caller should read the last error straight away.
pub fn open_server(server_name: &str) -> WtsResult<RawHandle> {
    let api = wtsapi()?;
    let wide = to_wide(server_name);
    // SAFETY: `wide` is NUL-terminated and outlives the call.
    Ok(unsafe { (api.open_server)(wide.as_ptr()) })
}

/// `WTSCloseServer`. Closing the current-server handle is a no-op.
pub fn close_server(handle: RawHandle) {
    if handle == abi::WTS_CURRENT_SERVER_HANDLE {
        return;
    }
    if let Ok(api) = wtsapi() {
        // SAFETY: the caller passes a handle from WTSOpenServerW.
        unsafe { (api.close_server)(handle) };
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Enumeration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `WTSEnumerateSessionsW` (reserved 0, version 1).
pub fn enumerate_sessions(server: RawHandle) -> WtsResult<Vec<SessionDescriptor>> {
    let api = wtsapi()?;
    let mut info_ptr: *mut WTS_SESSION_INFOW = std::ptr::null_mut();
    let mut count: u32 = 0;
    // SAFETY: out-pointers are valid locals.
    let ret = unsafe { (api.enumerate_sessions)(server, 0, 1, &mut info_ptr, &mut count) };
    check("WTSEnumerateSessionsW", ret)?;

    // SAFETY: on success the OS returned `count` entries at `info_ptr`.
    let array = unsafe { WtsArray::from_raw(info_ptr, count, FreeWith::Memory) };
    let sessions = array
        .as_slice()
        .iter()
        // SAFETY: station names live as long as `array`.
        .map(|raw| unsafe { SessionDescriptor::from_abi(raw) })
        .collect::<Vec<_>>();
    debug!("WTSEnumerateSessionsW returned {} sessions", sessions.len());
    Ok(sessions)
}

/// `WTS_TYPE_CLASS` of a process listing at `level`.
fn process_type_class(level: u32) -> i32 {
    match level {
        0 => abi::WTSTypeProcessInfoLevel0,
        _ => abi::WTSTypeProcessInfoLevel1,
    }
}

/// `pLevel` is in/out; anything but the requested level is refused.
fn ensure_level(requested: u32, returned: u32) -> WtsResult<()> {
    if requested != returned {
        return Err(WtsError::invalid_argument("WTSEnumerateProcessesExW"));
    }
    Ok(())
}

fn enumerate_processes_raw<T>(
    server: RawHandle,
    requested: u32,
    session_id: u32,
) -> WtsResult<WtsArray<T>> {
    let api = wtsapi()?;
    let mut level = requested;
    let mut info_ptr: *mut u16 = std::ptr::null_mut();
    let mut count: u32 = 0;
    // SAFETY: out-pointers are valid locals.
    let ret = unsafe {
        (api.enumerate_processes_ex)(server, &mut level, session_id, &mut info_ptr, &mut count)
    };
    check("WTSEnumerateProcessesExW", ret)?;

    let free = FreeWith::MemoryEx(process_type_class(level));
    if let Err(e) = ensure_level(requested, level) {
        // SAFETY: freed by the class of the level the OS actually returned;
        // the entries are never read.
        drop(unsafe { WtsArray::from_raw(info_ptr, count, free) });
        warn!("WTSEnumerateProcessesExW returned level {} for level {}", level, requested);
        return Err(e);
    }
    // SAFETY: `level` selects the entry type `T`; the buffer is freed with
    // WTSFreeMemoryExW for that level.
    Ok(unsafe { WtsArray::from_raw(info_ptr.cast::<T>(), count, free) })
}

/// `WTSEnumerateProcessesExW` at level 0. [`abi::WTS_ANY_SESSION`] lists
/// every session.
pub fn enumerate_processes(
    server: RawHandle,
    session_id: u32,
) -> WtsResult<Vec<ProcessDescriptor>> {
    let array = enumerate_processes_raw::<WTS_PROCESS_INFOW>(server, 0, session_id)?;
    let procs = array
        .as_slice()
        .iter()
        // SAFETY: name and SID pointers live as long as `array`.
        .map(|raw| unsafe { ProcessDescriptor::from_abi(raw, sid_to_string(raw.pUserSid)) })
        .collect::<Vec<_>>();
    debug!("WTSEnumerateProcessesExW(level 0) returned {} processes", procs.len());
    Ok(procs)
}

/// `WTSEnumerateProcessesExW` at level 1.
pub fn enumerate_processes_ex(
    server: RawHandle,
    session_id: u32,
) -> WtsResult<Vec<ProcessDescriptorEx>> {
    let array = enumerate_processes_raw::<WTS_PROCESS_INFO_EXW>(server, 1, session_id)?;
    let procs = array
        .as_slice()
        .iter()
        // SAFETY: name and SID pointers live as long as `array`.
        .map(|raw| unsafe { ProcessDescriptorEx::from_abi(raw, sid_to_string(raw.pUserSid)) })
        .collect::<Vec<_>>();
    debug!("WTSEnumerateProcessesExW(level 1) returned {} processes", procs.len());
    Ok(procs)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session queries and control
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `WTSQuerySessionInformationW`. The buffer length is whatever the OS
/// reports for the class.
pub fn query_session_information(
    server: RawHandle,
    session_id: u32,
    info_class: InfoClass,
) -> WtsResult<WtsMemory> {
    let api = wtsapi()?;
    let mut buf: *mut u16 = std::ptr::null_mut();
    let mut bytes: u32 = 0;
    // SAFETY: out-pointers are valid locals.
    let ret = unsafe {
        (api.query_session_information)(
            server,
            session_id,
            info_class.as_u32(),
            &mut buf,
            &mut bytes,
        )
    };
    check("WTSQuerySessionInformationW", ret)?;
    // SAFETY: on success `buf` holds `bytes` bytes owned by the caller.
    Ok(unsafe { WtsMemory::from_raw(buf.cast(), bytes) })
}

/// `WTSLogoffSession`.
pub fn logoff_session(server: RawHandle, session_id: u32, wait: bool) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: plain value arguments.
    let ret = unsafe { (api.logoff_session)(server, session_id, to_bool(wait)) };
    check("WTSLogoffSession", ret)?;
    debug!("Logged off session {}", session_id);
    Ok(())
}

/// `WTSDisconnectSession`.
pub fn disconnect_session(server: RawHandle, session_id: u32, wait: bool) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: plain value arguments.
    let ret = unsafe { (api.disconnect_session)(server, session_id, to_bool(wait)) };
    check("WTSDisconnectSession", ret)?;
    debug!("Disconnected session {}", session_id);
    Ok(())
}

/// `WTSTerminateProcess`.
pub fn terminate_process(server: RawHandle, process_id: u32, exit_code: u32) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: plain value arguments.
    let ret = unsafe { (api.terminate_process)(server, process_id, exit_code) };
    check("WTSTerminateProcess", ret)?;
    debug!("Terminated process {} (exit code {})", process_id, exit_code);
    Ok(())
}

/// `WTSSendMessageW`. Title and message lengths are passed in bytes,
/// excluding the terminator.
pub fn send_message(
    server: RawHandle,
    session_id: u32,
    title: &str,
    message: &str,
    style: u32,
    timeout_secs: u32,
    wait: bool,
) -> WtsResult<MessageResponse> {
    let api = wtsapi()?;
    let wide_title = to_wide(title);
    let wide_msg = to_wide(message);
    let title_bytes = u32::try_from((wide_title.len() - 1) * 2)
        .map_err(|_| WtsError::invalid_argument("WTSSendMessageW"))?;
    let msg_bytes = u32::try_from((wide_msg.len() - 1) * 2)
        .map_err(|_| WtsError::invalid_argument("WTSSendMessageW"))?;
    let mut response: u32 = 0;
    // SAFETY: both strings outlive the call; `response` is a valid local.
    let ret = unsafe {
        (api.send_message)(
            server,
            session_id,
            wide_title.as_ptr(),
            title_bytes,
            wide_msg.as_ptr(),
            msg_bytes,
            style,
            timeout_secs,
            &mut response,
            to_bool(wait),
        )
    };
    check("WTSSendMessageW", ret)?;
    let response = MessageResponse::from_u32(response);
    debug!("WTSSendMessageW(session {}) -> {:?}", session_id, response);
    Ok(response)
}

/// `WTSQueryUserToken`. Needs the SE_TCB privilege (LocalSystem).
pub fn query_user_token(session_id: u32) -> WtsResult<OwnedHandle> {
    let api = wtsapi()?;
    let mut token: RawHandle = std::ptr::null_mut();
    // SAFETY: `token` is a valid local.
    let ret = unsafe { (api.query_user_token)(session_id, &mut token) };
    check("WTSQueryUserToken", ret)?;
    // SAFETY: on success the OS handed us a new primary token handle.
    Ok(unsafe { OwnedHandle::from_raw_handle(token) })
}

/// `WTSGetActiveConsoleSessionId`. `0xFFFFFFFF` while the console is
/// attached to no session (e.g. during a session switch).
pub fn active_console_session_id() -> u32 {
    // SAFETY: no arguments.
    unsafe { WTSGetActiveConsoleSessionId() }
}

/// The session the current process runs in (`ProcessIdToSessionId`).
pub fn current_session_id() -> WtsResult<u32> {
    let mut session_id: u32 = 0;
    // SAFETY: `session_id` is a valid local.
    let ret = unsafe { ProcessIdToSessionId(GetCurrentProcessId(), &mut session_id) };
    check("ProcessIdToSessionId", ret)?;
    Ok(session_id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Virtual channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `WTSVirtualChannelOpen`: a static channel on `server`. The name is ANSI.
pub fn virtual_channel_open(
    server: RawHandle,
    session_id: u32,
    channel_name: &str,
) -> WtsResult<RawHandle> {
    let api = wtsapi()?;
    let name = ansi_name("WTSVirtualChannelOpen", channel_name)?;
    // SAFETY: `name` is NUL-terminated and outlives the call.
    let handle = unsafe { (api.virtual_channel_open)(server, session_id, name.as_ptr().cast()) };
    if handle.is_null() {
        return Err(WtsError::last("WTSVirtualChannelOpen"));
    }
    debug!("Opened static channel '{}' on session {}", channel_name, session_id);
    Ok(handle)
}

/// `WTSVirtualChannelOpenEx`. `flags` selects static (0) or dynamic
/// channels, see [`crate::types::ChannelOptions::to_flags`].
pub fn virtual_channel_open_ex(
    session_id: u32,
    channel_name: &str,
    flags: u32,
) -> WtsResult<RawHandle> {
    let api = wtsapi()?;
    let name = ansi_name("WTSVirtualChannelOpenEx", channel_name)?;
    // SAFETY: `name` is NUL-terminated and outlives the call.
    let handle = unsafe { (api.virtual_channel_open_ex)(session_id, name.as_ptr().cast(), flags) };
    if handle.is_null() {
        return Err(WtsError::last("WTSVirtualChannelOpenEx"));
    }
    debug!(
        "Opened channel '{}' on session {} (flags 0x{:X})",
        channel_name, session_id, flags
    );
    Ok(handle)
}

/// `WTSVirtualChannelWrite`. Returns the number of bytes written.
pub fn virtual_channel_write(handle: RawHandle, data: &[u8]) -> WtsResult<u32> {
    let api = wtsapi()?;
    let len = u32::try_from(data.len())
        .map_err(|_| WtsError::invalid_argument("WTSVirtualChannelWrite"))?;
    let mut written: u32 = 0;
    // SAFETY: `data` is valid for `len` bytes.
    let ret = unsafe { (api.virtual_channel_write)(handle, data.as_ptr(), len, &mut written) };
    check("WTSVirtualChannelWrite", ret)?;
    Ok(written)
}

/// `WTSVirtualChannelRead`. Waits up to `timeout_ms` for data and returns the
/// number of bytes placed in `buffer` (0 when the wait timed out).
pub fn virtual_channel_read(
    handle: RawHandle,
    timeout_ms: u32,
    buffer: &mut [u8],
) -> WtsResult<u32> {
    let api = wtsapi()?;
    let len = u32::try_from(buffer.len())
        .map_err(|_| WtsError::invalid_argument("WTSVirtualChannelRead"))?;
    let mut read: u32 = 0;
    // SAFETY: `buffer` is valid for `len` writable bytes.
    let ret = unsafe {
        (api.virtual_channel_read)(handle, timeout_ms, buffer.as_mut_ptr(), len, &mut read)
    };
    check("WTSVirtualChannelRead", ret)?;
    Ok(read)
}

/// `WTSVirtualChannelQuery`.
pub fn virtual_channel_query(handle: RawHandle, class: VirtualClass) -> WtsResult<WtsMemory> {
    let api = wtsapi()?;
    let mut buf: *mut c_void = std::ptr::null_mut();
    let mut bytes: u32 = 0;
    // SAFETY: out-pointers are valid locals.
    let ret = unsafe { (api.virtual_channel_query)(handle, class.as_u32(), &mut buf, &mut bytes) };
    check("WTSVirtualChannelQuery", ret)?;
    // SAFETY: on success the buffer is owned by the caller.
    Ok(unsafe { WtsMemory::from_raw(buf, bytes) })
}

/// `WTSVirtualChannelClose`.
pub fn virtual_channel_close(handle: RawHandle) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: the caller passes an open channel handle.
    let ret = unsafe { (api.virtual_channel_close)(handle) };
    check("WTSVirtualChannelClose", ret)
}

/// `WTSVirtualChannelPurgeInput`.
pub fn virtual_channel_purge_input(handle: RawHandle) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: the caller passes an open channel handle.
    let ret = unsafe { (api.virtual_channel_purge_input)(handle) };
    check("WTSVirtualChannelPurgeInput", ret)
}

/// `WTSVirtualChannelPurgeOutput`.
pub fn virtual_channel_purge_output(handle: RawHandle) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: the caller passes an open channel handle.
    let ret = unsafe { (api.virtual_channel_purge_output)(handle) };
    check("WTSVirtualChannelPurgeOutput", ret)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session notifications
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `WTSRegisterSessionNotification` for `hwnd`.
pub fn register_session_notification(hwnd: RawHandle, flags: u32) -> WtsResult<()> {
    let api = wtsapi()?;
    // SAFETY: the caller passes a window owned by the calling thread.
    let ret = unsafe { (api.register_session_notification)(hwnd, flags) };
    check("WTSRegisterSessionNotification", ret)
}

/// `WTSUnRegisterSessionNotification` for `hwnd`. Failures are logged.
pub fn unregister_session_notification(hwnd: RawHandle) {
    let Ok(api) = wtsapi() else { return };
    // SAFETY: the caller passes a previously registered window.
    let ret = unsafe { (api.unregister_session_notification)(hwnd) };
    if let Err(e) = check("WTSUnRegisterSessionNotification", ret) {
        warn!("{}", e);
    }
}
