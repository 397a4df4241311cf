//! Lazily-resolved `wtsapi32.dll` entry points.
//!
//! The DLL is loaded from System32 only, on first use, and every export is
//! resolved by exact name into a typed function pointer. The table lives for
//! the rest of the process and is never mutated after initialization.

use std::ffi::c_void;

use log::debug;
use once_cell::sync::OnceCell;
use windows_sys::Win32::System::LibraryLoader::{
    GetProcAddress, LoadLibraryExW, LOAD_LIBRARY_SEARCH_SYSTEM32,
};

use crate::abi::{Bool, RawHandle, WTS_SESSION_INFOW};
use crate::error::{WtsError, WtsResult};
use crate::wide::to_wide;

const WTSAPI32: &str = "wtsapi32.dll";

pub(crate) struct WtsApi {
    pub open_server: unsafe extern "system" fn(*const u16) -> RawHandle,
    pub close_server: unsafe extern "system" fn(RawHandle),
    pub enumerate_sessions: unsafe extern "system" fn(
        RawHandle,
        u32,
        u32,
        *mut *mut WTS_SESSION_INFOW,
        *mut u32,
    ) -> Bool,
    pub enumerate_processes_ex:
        unsafe extern "system" fn(RawHandle, *mut u32, u32, *mut *mut u16, *mut u32) -> Bool,
    pub free_memory: unsafe extern "system" fn(*mut c_void),
    pub free_memory_ex: unsafe extern "system" fn(i32, *mut c_void, u32) -> Bool,
    pub query_session_information:
        unsafe extern "system" fn(RawHandle, u32, u32, *mut *mut u16, *mut u32) -> Bool,
    pub logoff_session: unsafe extern "system" fn(RawHandle, u32, Bool) -> Bool,
    pub disconnect_session: unsafe extern "system" fn(RawHandle, u32, Bool) -> Bool,
    pub terminate_process: unsafe extern "system" fn(RawHandle, u32, u32) -> Bool,
    pub send_message: unsafe extern "system" fn(
        RawHandle,
        u32,
        *const u16,
        u32,
        *const u16,
        u32,
        u32,
        u32,
        *mut u32,
        Bool,
    ) -> Bool,
    pub query_user_token: unsafe extern "system" fn(u32, *mut RawHandle) -> Bool,
    pub virtual_channel_open: unsafe extern "system" fn(RawHandle, u32, *const u8) -> RawHandle,
    pub virtual_channel_open_ex: unsafe extern "system" fn(u32, *const u8, u32) -> RawHandle,
    pub virtual_channel_write:
        unsafe extern "system" fn(RawHandle, *const u8, u32, *mut u32) -> Bool,
    pub virtual_channel_read:
        unsafe extern "system" fn(RawHandle, u32, *mut u8, u32, *mut u32) -> Bool,
    pub virtual_channel_query:
        unsafe extern "system" fn(RawHandle, u32, *mut *mut c_void, *mut u32) -> Bool,
    pub virtual_channel_close: unsafe extern "system" fn(RawHandle) -> Bool,
    pub virtual_channel_purge_input: unsafe extern "system" fn(RawHandle) -> Bool,
    pub virtual_channel_purge_output: unsafe extern "system" fn(RawHandle) -> Bool,
    pub register_session_notification: unsafe extern "system" fn(RawHandle, u32) -> Bool,
    pub unregister_session_notification: unsafe extern "system" fn(RawHandle) -> Bool,
}

static WTSAPI: OnceCell<WtsApi> = OnceCell::new();

/// The process-wide binding table, loading it on first call.
pub(crate) fn wtsapi() -> WtsResult<&'static WtsApi> {
    WTSAPI.get_or_try_init(load)
}

macro_rules! resolve {
    ($module:expr, $name:literal) => {{
        // SAFETY: the module handle is live and the name is NUL-terminated.
        let proc = unsafe { GetProcAddress($module, concat!($name, "\0").as_ptr()) };
        match proc {
            // SAFETY: the export has the signature declared on the field this
            // value is assigned to, as documented in WtsApi32.h.
            Some(f) => unsafe { std::mem::transmute(f) },
            None => return Err(WtsError::last(concat!("GetProcAddress(", $name, ")"))),
        }
    }};
}

fn load() -> WtsResult<WtsApi> {
    let name = to_wide(WTSAPI32);
    // SAFETY: `name` is a NUL-terminated wide string; the module is kept
    // loaded for the lifetime of the process.
    let module = unsafe {
        LoadLibraryExW(name.as_ptr(), std::ptr::null_mut(), LOAD_LIBRARY_SEARCH_SYSTEM32)
    };
    if module.is_null() {
        return Err(WtsError::last("LoadLibraryExW(wtsapi32.dll)"));
    }

    let api = WtsApi {
        open_server: resolve!(module, "WTSOpenServerW"),
        close_server: resolve!(module, "WTSCloseServer"),
        enumerate_sessions: resolve!(module, "WTSEnumerateSessionsW"),
        enumerate_processes_ex: resolve!(module, "WTSEnumerateProcessesExW"),
        free_memory: resolve!(module, "WTSFreeMemory"),
        free_memory_ex: resolve!(module, "WTSFreeMemoryExW"),
        query_session_information: resolve!(module, "WTSQuerySessionInformationW"),
        logoff_session: resolve!(module, "WTSLogoffSession"),
        disconnect_session: resolve!(module, "WTSDisconnectSession"),
        terminate_process: resolve!(module, "WTSTerminateProcess"),
        send_message: resolve!(module, "WTSSendMessageW"),
        query_user_token: resolve!(module, "WTSQueryUserToken"),
        virtual_channel_open: resolve!(module, "WTSVirtualChannelOpen"),
        virtual_channel_open_ex: resolve!(module, "WTSVirtualChannelOpenEx"),
        virtual_channel_write: resolve!(module, "WTSVirtualChannelWrite"),
        virtual_channel_read: resolve!(module, "WTSVirtualChannelRead"),
        virtual_channel_query: resolve!(module, "WTSVirtualChannelQuery"),
        virtual_channel_close: resolve!(module, "WTSVirtualChannelClose"),
        virtual_channel_purge_input: resolve!(module, "WTSVirtualChannelPurgeInput"),
        virtual_channel_purge_output: resolve!(module, "WTSVirtualChannelPurgeOutput"),
        register_session_notification: resolve!(module, "WTSRegisterSessionNotification"),
        unregister_session_notification: resolve!(module, "WTSUnRegisterSessionNotification"),
    };
    debug!("Resolved {} exports", WTSAPI32);
    Ok(api)
}
