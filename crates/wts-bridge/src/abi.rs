//! `#[repr(C)]` mirrors of the WtsApi32.h structures and constants.
//!
//! Field names follow the C header so the layouts can be checked against the
//! SDK line by line. These definitions are platform-neutral; only the code
//! that calls into `wtsapi32.dll` is Windows-only.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::ffi::c_void;

/// Opaque OS handle (`HANDLE`).
pub type RawHandle = *mut c_void;
/// Win32 `BOOL`.
pub type Bool = i32;

/// Special handle meaning the local RD Session Host server.
pub const WTS_CURRENT_SERVER_HANDLE: RawHandle = std::ptr::null_mut();
/// Special session ID meaning the calling session.
pub const WTS_CURRENT_SESSION: u32 = 0xFFFF_FFFF;
/// Session ID accepted by `WTSEnumerateProcessesExW` to list every session.
pub const WTS_ANY_SESSION: u32 = 0xFFFF_FFFE;

pub const CLIENTNAME_LENGTH: usize = 20;
pub const DOMAIN_LENGTH: usize = 17;
pub const USERNAME_LENGTH: usize = 20;
pub const CLIENTADDRESS_LENGTH: usize = 30;
pub const WINSTATIONNAME_LENGTH: usize = 32;
pub const MAX_PATH: usize = 260;

// WTS_CONNECTSTATE_CLASS
pub const WTSActive: i32 = 0;
pub const WTSConnected: i32 = 1;
pub const WTSConnectQuery: i32 = 2;
pub const WTSShadow: i32 = 3;
pub const WTSDisconnected: i32 = 4;
pub const WTSIdle: i32 = 5;
pub const WTSListen: i32 = 6;
pub const WTSReset: i32 = 7;
pub const WTSDown: i32 = 8;
pub const WTSInit: i32 = 9;

// WTS_TYPE_CLASS, for WTSFreeMemoryExW
pub const WTSTypeProcessInfoLevel0: i32 = 0;
pub const WTSTypeProcessInfoLevel1: i32 = 1;
pub const WTSTypeSessionInfoLevel1: i32 = 2;

// WTSVirtualChannelOpenEx flags
pub const WTS_CHANNEL_OPTION_DYNAMIC: u32 = 0x0000_0001;
pub const WTS_CHANNEL_OPTION_DYNAMIC_PRI_LOW: u32 = 0x0000_0000;
pub const WTS_CHANNEL_OPTION_DYNAMIC_PRI_MED: u32 = 0x0000_0002;
pub const WTS_CHANNEL_OPTION_DYNAMIC_PRI_HIGH: u32 = 0x0000_0004;
pub const WTS_CHANNEL_OPTION_DYNAMIC_PRI_REAL: u32 = 0x0000_0006;
pub const WTS_CHANNEL_OPTION_DYNAMIC_NO_COMPRESS: u32 = 0x0000_0008;

/// Maximum payload of a single static virtual channel PDU.
pub const CHANNEL_CHUNK_LENGTH: usize = 1600;
/// Maximum length of a static virtual channel name, excluding the NUL.
pub const CHANNEL_NAME_LEN: usize = 7;

// WTSRegisterSessionNotification scope
pub const NOTIFY_FOR_THIS_SESSION: u32 = 0;
pub const NOTIFY_FOR_ALL_SESSIONS: u32 = 1;

/// Window message carrying session change notifications.
pub const WM_WTSSESSION_CHANGE: u32 = 0x02B1;

// wParam values of WM_WTSSESSION_CHANGE
pub const WTS_CONSOLE_CONNECT: u32 = 0x1;
pub const WTS_CONSOLE_DISCONNECT: u32 = 0x2;
pub const WTS_REMOTE_CONNECT: u32 = 0x3;
pub const WTS_REMOTE_DISCONNECT: u32 = 0x4;
pub const WTS_SESSION_LOGON: u32 = 0x5;
pub const WTS_SESSION_LOGOFF: u32 = 0x6;
pub const WTS_SESSION_LOCK: u32 = 0x7;
pub const WTS_SESSION_UNLOCK: u32 = 0x8;
pub const WTS_SESSION_REMOTE_CONTROL: u32 = 0x9;
pub const WTS_SESSION_CREATE: u32 = 0xA;
pub const WTS_SESSION_TERMINATE: u32 = 0xB;

// Message box styles / results used by WTSSendMessageW
pub const MB_OK: u32 = 0x0000_0000;
pub const MB_OKCANCEL: u32 = 0x0000_0001;
pub const MB_ABORTRETRYIGNORE: u32 = 0x0000_0002;
pub const MB_YESNOCANCEL: u32 = 0x0000_0003;
pub const MB_YESNO: u32 = 0x0000_0004;
pub const MB_RETRYCANCEL: u32 = 0x0000_0005;

pub const IDOK: u32 = 1;
pub const IDCANCEL: u32 = 2;
pub const IDABORT: u32 = 3;
pub const IDRETRY: u32 = 4;
pub const IDIGNORE: u32 = 5;
pub const IDYES: u32 = 6;
pub const IDNO: u32 = 7;
pub const IDTIMEOUT: u32 = 32000;
pub const IDASYNC: u32 = 32001;

// Address families reported in WTS_CLIENT_ADDRESS
pub const AF_UNSPEC: u32 = 0;
pub const AF_INET: u32 = 2;
pub const AF_IPX: u32 = 6;
pub const AF_NETBIOS: u32 = 17;
pub const AF_INET6: u32 = 23;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WTS_SESSION_INFOW {
    pub SessionId: u32,
    pub pWinStationName: *mut u16,
    pub State: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WTS_PROCESS_INFOW {
    pub SessionId: u32,
    pub ProcessId: u32,
    pub pProcessName: *mut u16,
    pub pUserSid: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WTS_PROCESS_INFO_EXW {
    pub SessionId: u32,
    pub ProcessId: u32,
    pub pProcessName: *mut u16,
    pub pUserSid: *mut c_void,
    pub NumberOfThreads: u32,
    pub HandleCount: u32,
    pub PagefileUsage: u32,
    pub PeakPagefileUsage: u32,
    pub WorkingSetSize: u32,
    pub PeakWorkingSetSize: u32,
    pub UserTime: i64,
    pub KernelTime: i64,
}

/// Returned for `WTSSessionInfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WTSINFOW {
    pub State: i32,
    pub SessionId: u32,
    pub IncomingBytes: u32,
    pub OutgoingBytes: u32,
    pub IncomingFrames: u32,
    pub OutgoingFrames: u32,
    pub IncomingCompressedBytes: u32,
    pub OutgoingCompressedBytes: u32,
    pub WinStationName: [u16; WINSTATIONNAME_LENGTH],
    pub Domain: [u16; DOMAIN_LENGTH],
    pub UserName: [u16; USERNAME_LENGTH + 1],
    pub ConnectTime: i64,
    pub DisconnectTime: i64,
    pub LastInputTime: i64,
    pub LogonTime: i64,
    pub CurrentTime: i64,
}

/// Returned for `WTSClientInfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WTSCLIENTW {
    pub ClientName: [u16; CLIENTNAME_LENGTH + 1],
    pub Domain: [u16; DOMAIN_LENGTH + 1],
    pub UserName: [u16; USERNAME_LENGTH + 1],
    pub WorkDirectory: [u16; MAX_PATH + 1],
    pub InitialProgram: [u16; MAX_PATH + 1],
    pub EncryptionLevel: u8,
    pub ClientAddressFamily: u32,
    pub ClientAddress: [u16; CLIENTADDRESS_LENGTH + 1],
    pub HRes: u16,
    pub VRes: u16,
    pub ColorDepth: u16,
    pub ClientDirectory: [u16; MAX_PATH + 1],
    pub ClientBuildNumber: u32,
    pub ClientHardwareId: u32,
    pub ClientProductId: u16,
    pub OutBufCountHost: u16,
    pub OutBufCountClient: u16,
    pub OutBufLength: u16,
    pub DeviceId: [u16; MAX_PATH + 1],
}

/// Returned for `WTSClientAddress`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WTS_CLIENT_ADDRESS {
    pub AddressFamily: u32,
    pub Address: [u8; 20],
}

/// Returned for `WTSClientDisplay`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct WTS_CLIENT_DISPLAY {
    pub HorizontalResolution: u32,
    pub VerticalResolution: u32,
    pub ColorDepth: u32,
}

macro_rules! zeroed_default {
    ($($ty:ty),* $(,)?) => {$(
        impl Default for $ty {
            fn default() -> Self {
                // SAFETY: plain C struct of integers, integer arrays and raw
                // pointers; the all-zero bit pattern is valid.
                unsafe { std::mem::zeroed() }
            }
        }
    )*};
}

zeroed_default!(
    WTS_SESSION_INFOW,
    WTS_PROCESS_INFOW,
    WTS_PROCESS_INFO_EXW,
    WTSINFOW,
    WTSCLIENTW,
);

// Hand-declared mirrors must stay identical to the SDK bindings.
#[cfg(windows)]
const _: () = {
    use std::mem::{align_of, size_of};
    use windows_sys::Win32::System::RemoteDesktop as rd;
    use windows_sys::Win32::UI::WindowsAndMessaging as wm;

    macro_rules! same_layout {
        ($($ty:ident),* $(,)?) => {$(
            assert!(size_of::<$ty>() == size_of::<rd::$ty>());
            assert!(align_of::<$ty>() == align_of::<rd::$ty>());
        )*};
    }
    same_layout!(
        WTS_SESSION_INFOW,
        WTS_PROCESS_INFOW,
        WTS_PROCESS_INFO_EXW,
        WTSINFOW,
        WTSCLIENTW,
        WTS_CLIENT_ADDRESS,
        WTS_CLIENT_DISPLAY,
    );

    macro_rules! same_value {
        ($($ours:expr => $theirs:expr),* $(,)?) => {$(
            assert!($ours as i64 == $theirs as i64);
        )*};
    }
    same_value!(
        WTSActive => rd::WTSActive,
        WTSConnected => rd::WTSConnected,
        WTSConnectQuery => rd::WTSConnectQuery,
        WTSShadow => rd::WTSShadow,
        WTSDisconnected => rd::WTSDisconnected,
        WTSIdle => rd::WTSIdle,
        WTSListen => rd::WTSListen,
        WTSReset => rd::WTSReset,
        WTSDown => rd::WTSDown,
        WTSInit => rd::WTSInit,
        WTSTypeProcessInfoLevel0 => rd::WTSTypeProcessInfoLevel0,
        WTSTypeProcessInfoLevel1 => rd::WTSTypeProcessInfoLevel1,
        WTSTypeSessionInfoLevel1 => rd::WTSTypeSessionInfoLevel1,
        NOTIFY_FOR_THIS_SESSION => rd::NOTIFY_FOR_THIS_SESSION,
        NOTIFY_FOR_ALL_SESSIONS => rd::NOTIFY_FOR_ALL_SESSIONS,
        CHANNEL_CHUNK_LENGTH => rd::CHANNEL_CHUNK_LENGTH,
        WTS_CHANNEL_OPTION_DYNAMIC => rd::WTS_CHANNEL_OPTION_DYNAMIC,
        WM_WTSSESSION_CHANGE => wm::WM_WTSSESSION_CHANGE,
    );
};
