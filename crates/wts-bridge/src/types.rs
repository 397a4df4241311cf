//! Domain types for the WTS bridge.
//!
//! Rust-native, serde-friendly descriptors built from the `#[repr(C)]`
//! structures in [`crate::abi`]. Every descriptor is produced by converting
//! the structure a native call returned; none of them are meant to be built
//! independently of that call. The types themselves are platform-neutral so
//! they can be inspected and tested anywhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::abi::{self, WTSCLIENTW, WTSINFOW, WTS_CLIENT_ADDRESS, WTS_CLIENT_DISPLAY};
use crate::abi::{WTS_PROCESS_INFOW, WTS_PROCESS_INFO_EXW, WTS_SESSION_INFOW};
use crate::wide::{from_wide_ptr, WideBuf};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// WTS_CONNECTSTATE_CLASS – maps to the 10 possible session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// User is logged on and actively connected.
    Active,
    /// Session is connected to the client.
    Connected,
    /// Session is in the process of connecting to the client.
    ConnectQuery,
    /// Session is shadowing another session.
    Shadow,
    /// Session is active but the client is disconnected.
    Disconnected,
    /// WinStation is waiting for a client to connect.
    Idle,
    /// WinStation is listening for a connection.
    Listen,
    /// WinStation is being reset.
    Reset,
    /// WinStation is down due to an error.
    Down,
    /// WinStation is initializing.
    Init,
    /// Value outside the documented range.
    #[default]
    Unknown,
}

impl SessionState {
    pub fn from_raw(v: i32) -> Self {
        match v {
            abi::WTSActive => Self::Active,
            abi::WTSConnected => Self::Connected,
            abi::WTSConnectQuery => Self::ConnectQuery,
            abi::WTSShadow => Self::Shadow,
            abi::WTSDisconnected => Self::Disconnected,
            abi::WTSIdle => Self::Idle,
            abi::WTSListen => Self::Listen,
            abi::WTSReset => Self::Reset,
            abi::WTSDown => Self::Down,
            abi::WTSInit => Self::Init,
            _ => Self::Unknown,
        }
    }

    /// The native value, or `None` for [`SessionState::Unknown`].
    pub fn as_raw(self) -> Option<i32> {
        Some(match self {
            Self::Active => abi::WTSActive,
            Self::Connected => abi::WTSConnected,
            Self::ConnectQuery => abi::WTSConnectQuery,
            Self::Shadow => abi::WTSShadow,
            Self::Disconnected => abi::WTSDisconnected,
            Self::Idle => abi::WTSIdle,
            Self::Listen => abi::WTSListen,
            Self::Reset => abi::WTSReset,
            Self::Down => abi::WTSDown,
            Self::Init => abi::WTSInit,
            Self::Unknown => return None,
        })
    }

    /// Sessions that belong to a logged-on user.
    pub fn is_user_session(self) -> bool {
        matches!(self, Self::Active | Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Connected => write!(f, "Connected"),
            Self::ConnectQuery => write!(f, "ConnectQuery"),
            Self::Shadow => write!(f, "Shadow"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Idle => write!(f, "Idle"),
            Self::Listen => write!(f, "Listen"),
            Self::Reset => write!(f, "Reset"),
            Self::Down => write!(f, "Down"),
            Self::Init => write!(f, "Init"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Query classes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// WTS_INFO_CLASS, the selector for `WTSQuerySessionInformationW`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InfoClass {
    InitialProgram = 0,
    ApplicationName = 1,
    WorkingDirectory = 2,
    OemId = 3,
    SessionId = 4,
    UserName = 5,
    WinStationName = 6,
    DomainName = 7,
    ConnectState = 8,
    ClientBuildNumber = 9,
    ClientName = 10,
    ClientDirectory = 11,
    ClientProductId = 12,
    ClientHardwareId = 13,
    ClientAddress = 14,
    ClientDisplay = 15,
    ClientProtocolType = 16,
    IdleTime = 17,
    LogonTime = 18,
    IncomingBytes = 19,
    OutgoingBytes = 20,
    IncomingFrames = 21,
    OutgoingFrames = 22,
    ClientInfo = 23,
    SessionInfo = 24,
    SessionInfoEx = 25,
    ConfigInfo = 26,
    ValidationInfo = 27,
    SessionAddressV4 = 28,
    IsRemoteSession = 29,
}

impl InfoClass {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// WTS_VIRTUAL_CLASS, the selector for `WTSVirtualChannelQuery`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VirtualClass {
    ClientData = 0,
    FileHandle = 1,
}

impl VirtualClass {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session notifications
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which sessions a notification registration covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotifyScope {
    #[default]
    ThisSession,
    AllSessions,
}

impl NotifyScope {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::ThisSession => abi::NOTIFY_FOR_THIS_SESSION,
            Self::AllSessions => abi::NOTIFY_FOR_ALL_SESSIONS,
        }
    }
}

/// The `wParam` of `WM_WTSSESSION_CHANGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEventKind {
    ConsoleConnect,
    ConsoleDisconnect,
    RemoteConnect,
    RemoteDisconnect,
    Logon,
    Logoff,
    Lock,
    Unlock,
    RemoteControl,
    Create,
    Terminate,
    Unknown(u32),
}

impl SessionEventKind {
    pub fn from_u32(v: u32) -> Self {
        match v {
            abi::WTS_CONSOLE_CONNECT => Self::ConsoleConnect,
            abi::WTS_CONSOLE_DISCONNECT => Self::ConsoleDisconnect,
            abi::WTS_REMOTE_CONNECT => Self::RemoteConnect,
            abi::WTS_REMOTE_DISCONNECT => Self::RemoteDisconnect,
            abi::WTS_SESSION_LOGON => Self::Logon,
            abi::WTS_SESSION_LOGOFF => Self::Logoff,
            abi::WTS_SESSION_LOCK => Self::Lock,
            abi::WTS_SESSION_UNLOCK => Self::Unlock,
            abi::WTS_SESSION_REMOTE_CONTROL => Self::RemoteControl,
            abi::WTS_SESSION_CREATE => Self::Create,
            abi::WTS_SESSION_TERMINATE => Self::Terminate,
            other => Self::Unknown(other),
        }
    }
}

/// One session state change delivered to a notification handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: u32,
}

impl SessionEvent {
    /// Decode the parameters of a `WM_WTSSESSION_CHANGE` message.
    pub fn from_message(wparam: usize, lparam: isize) -> Self {
        Self {
            kind: SessionEventKind::from_u32(wparam as u32),
            session_id: lparam as u32,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Messaging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timeout used by [`crate::messaging::send_message`].
pub const DEFAULT_MESSAGE_TIMEOUT_SECS: u32 = 10;

/// Style for the message box displayed on the client desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageStyle {
    /// OK button only.
    #[default]
    Ok,
    /// OK + Cancel.
    OkCancel,
    /// Yes + No.
    YesNo,
    /// Yes + No + Cancel.
    YesNoCancel,
    /// Abort + Retry + Ignore.
    AbortRetryIgnore,
    /// Retry + Cancel.
    RetryCancel,
}

impl MessageStyle {
    /// Convert to Win32 MB_xxx flags.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Ok => abi::MB_OK,
            Self::OkCancel => abi::MB_OKCANCEL,
            Self::YesNo => abi::MB_YESNO,
            Self::YesNoCancel => abi::MB_YESNOCANCEL,
            Self::AbortRetryIgnore => abi::MB_ABORTRETRYIGNORE,
            Self::RetryCancel => abi::MB_RETRYCANCEL,
        }
    }
}

/// Response ID from the message box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageResponse {
    Ok,
    Cancel,
    Yes,
    No,
    Abort,
    Retry,
    Ignore,
    /// The box was still open when the timeout elapsed.
    Timeout,
    /// Returned when `wait` was false.
    AsyncSent,
    Unknown,
}

impl MessageResponse {
    pub fn from_u32(v: u32) -> Self {
        match v {
            abi::IDOK => Self::Ok,
            abi::IDCANCEL => Self::Cancel,
            abi::IDABORT => Self::Abort,
            abi::IDRETRY => Self::Retry,
            abi::IDIGNORE => Self::Ignore,
            abi::IDYES => Self::Yes,
            abi::IDNO => Self::No,
            abi::IDTIMEOUT => Self::Timeout,
            abi::IDASYNC => Self::AsyncSent,
            _ => Self::Unknown,
        }
    }
}

/// Style, timeout and wait mode for `WTSSendMessageW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessageOptions {
    pub style: MessageStyle,
    /// Seconds before the box is dismissed (0 = wait forever).
    pub timeout_secs: u32,
    /// Block until the user responds or the timeout elapses.
    pub wait: bool,
}

impl Default for SendMessageOptions {
    fn default() -> Self {
        Self {
            style: MessageStyle::Ok,
            timeout_secs: DEFAULT_MESSAGE_TIMEOUT_SECS,
            wait: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Virtual channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Priority of a dynamic virtual channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelPriority {
    #[default]
    Low,
    Medium,
    High,
    Real,
}

/// Flags passed to `WTSVirtualChannelOpenEx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelOptions {
    /// Open a dynamic channel instead of a static one.
    pub dynamic: bool,
    pub priority: ChannelPriority,
    pub no_compress: bool,
}

impl ChannelOptions {
    pub fn dynamic() -> Self {
        Self { dynamic: true, ..Self::default() }
    }

    /// Priority and compression only apply to dynamic channels.
    pub fn to_flags(self) -> u32 {
        if !self.dynamic {
            return 0;
        }
        let priority = match self.priority {
            ChannelPriority::Low => abi::WTS_CHANNEL_OPTION_DYNAMIC_PRI_LOW,
            ChannelPriority::Medium => abi::WTS_CHANNEL_OPTION_DYNAMIC_PRI_MED,
            ChannelPriority::High => abi::WTS_CHANNEL_OPTION_DYNAMIC_PRI_HIGH,
            ChannelPriority::Real => abi::WTS_CHANNEL_OPTION_DYNAMIC_PRI_REAL,
        };
        let mut flags = abi::WTS_CHANNEL_OPTION_DYNAMIC | priority;
        if self.no_compress {
            flags |= abi::WTS_CHANNEL_OPTION_DYNAMIC_NO_COMPRESS;
        }
        flags
    }
}

/// Well-known RDP virtual channel names.
pub mod channel_names {
    /// Clipboard redirection.
    pub const CLIPRDR: &str = "CLIPRDR";
    /// Device redirection (drives, printers, serial ports).
    pub const RDPDR: &str = "RDPDR";
    /// Dynamic virtual channel transport.
    pub const DRDYNVC: &str = "DRDYNVC";
    /// Audio output redirection.
    pub const RDPSND: &str = "RDPSND";
    /// Display control (resize, monitors).
    pub const DISP: &str = "Microsoft::Windows::RDS::DisplayControl";
    /// Graphics pipeline (RDPGFX).
    pub const RDPGFX: &str = "Microsoft::Windows::RDS::Graphics";
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Enumeration descriptors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry of `WTSEnumerateSessionsW`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub session_id: u32,
    /// WinStation name (e.g. "console", "RDP-Tcp#0", "services").
    pub win_station_name: String,
    pub state: SessionState,
}

impl SessionDescriptor {
    /// # Safety
    /// `raw.pWinStationName` must be null or point to a live, null-terminated
    /// wide string.
    pub unsafe fn from_abi(raw: &WTS_SESSION_INFOW) -> Self {
        Self {
            session_id: raw.SessionId,
            win_station_name: from_wide_ptr(raw.pWinStationName),
            state: SessionState::from_raw(raw.State),
        }
    }
}

/// One entry of `WTSEnumerateProcessesExW` at level 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDescriptor {
    pub session_id: u32,
    pub process_id: u32,
    /// Executable name (e.g. "explorer.exe").
    pub process_name: String,
    /// Owning user SID in string form, empty when the OS withheld it.
    pub user_sid: String,
}

impl ProcessDescriptor {
    /// # Safety
    /// `raw.pProcessName` must be null or point to a live, null-terminated
    /// wide string.
    pub unsafe fn from_abi(raw: &WTS_PROCESS_INFOW, user_sid: String) -> Self {
        Self {
            session_id: raw.SessionId,
            process_id: raw.ProcessId,
            process_name: from_wide_ptr(raw.pProcessName),
            user_sid,
        }
    }
}

/// One entry of `WTSEnumerateProcessesExW` at level 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDescriptorEx {
    pub session_id: u32,
    pub process_id: u32,
    pub process_name: String,
    pub user_sid: String,
    pub number_of_threads: u32,
    pub handle_count: u32,
    pub pagefile_usage: u32,
    pub peak_pagefile_usage: u32,
    pub working_set_size: u32,
    pub peak_working_set_size: u32,
    /// User-mode time in 100ns units.
    pub user_time: i64,
    /// Kernel-mode time in 100ns units.
    pub kernel_time: i64,
}

impl ProcessDescriptorEx {
    /// # Safety
    /// `raw.pProcessName` must be null or point to a live, null-terminated
    /// wide string.
    pub unsafe fn from_abi(raw: &WTS_PROCESS_INFO_EXW, user_sid: String) -> Self {
        Self {
            session_id: raw.SessionId,
            process_id: raw.ProcessId,
            process_name: from_wide_ptr(raw.pProcessName),
            user_sid,
            number_of_threads: raw.NumberOfThreads,
            handle_count: raw.HandleCount,
            pagefile_usage: raw.PagefileUsage,
            peak_pagefile_usage: raw.PeakPagefileUsage,
            working_set_size: raw.WorkingSetSize,
            peak_working_set_size: raw.PeakWorkingSetSize,
            user_time: raw.UserTime,
            kernel_time: raw.KernelTime,
        }
    }

    /// Combined user and kernel CPU time.
    pub fn cpu_time(&self) -> std::time::Duration {
        let total = self.user_time.max(0) as u64 + self.kernel_time.max(0) as u64;
        std::time::Duration::from_nanos(total.saturating_mul(100))
    }

    pub fn to_basic(&self) -> ProcessDescriptor {
        ProcessDescriptor {
            session_id: self.session_id,
            process_id: self.process_id,
            process_name: self.process_name.clone(),
            user_sid: self.user_sid.clone(),
        }
    }
}

/// Number of processes per session id.
pub fn count_per_session(processes: &[ProcessDescriptor]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for p in processes {
        *counts.entry(p.session_id).or_insert(0) += 1;
    }
    counts
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session information blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a Windows FILETIME (100ns since 1601-01-01) to chrono DateTime.
/// Returns None if the value is zero (meaning "not set").
pub fn filetime_to_datetime(ft: i64) -> Option<DateTime<Utc>> {
    if ft <= 0 {
        return None;
    }
    // 11644473600 seconds between 1601-01-01 and 1970-01-01.
    const EPOCH_DIFF: i64 = 116_444_736_000_000_000;
    let unix_100ns = ft - EPOCH_DIFF;
    if unix_100ns < 0 {
        return None;
    }
    let secs = unix_100ns / 10_000_000;
    let nanos = ((unix_100ns % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// `WTSINFOW`, returned for [`InfoClass::SessionInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub state: SessionState,
    pub session_id: u32,
    pub incoming_bytes: u32,
    pub outgoing_bytes: u32,
    pub incoming_frames: u32,
    pub outgoing_frames: u32,
    pub incoming_compressed_bytes: u32,
    pub outgoing_compressed_bytes: u32,
    pub win_station_name: WideBuf<{ abi::WINSTATIONNAME_LENGTH }>,
    pub domain: WideBuf<{ abi::DOMAIN_LENGTH }>,
    pub user_name: WideBuf<{ abi::USERNAME_LENGTH + 1 }>,
    pub connect_time: Option<DateTime<Utc>>,
    pub disconnect_time: Option<DateTime<Utc>>,
    pub last_input_time: Option<DateTime<Utc>>,
    pub logon_time: Option<DateTime<Utc>>,
    pub current_time: Option<DateTime<Utc>>,
}

impl SessionInfo {
    pub fn from_abi(raw: &WTSINFOW) -> Self {
        Self {
            state: SessionState::from_raw(raw.State),
            session_id: raw.SessionId,
            incoming_bytes: raw.IncomingBytes,
            outgoing_bytes: raw.OutgoingBytes,
            incoming_frames: raw.IncomingFrames,
            outgoing_frames: raw.OutgoingFrames,
            incoming_compressed_bytes: raw.IncomingCompressedBytes,
            outgoing_compressed_bytes: raw.OutgoingCompressedBytes,
            win_station_name: WideBuf::from_units(&raw.WinStationName),
            domain: WideBuf::from_units(&raw.Domain),
            user_name: WideBuf::from_units(&raw.UserName),
            connect_time: filetime_to_datetime(raw.ConnectTime),
            disconnect_time: filetime_to_datetime(raw.DisconnectTime),
            last_input_time: filetime_to_datetime(raw.LastInputTime),
            logon_time: filetime_to_datetime(raw.LogonTime),
            current_time: filetime_to_datetime(raw.CurrentTime),
        }
    }

    /// Seconds between the last input and the server's current time.
    /// `None` while either timestamp is unset.
    pub fn idle_seconds(&self) -> Option<u64> {
        let last = self.last_input_time?;
        let now = self.current_time?;
        Some((now - last).num_seconds().max(0) as u64)
    }
}

/// `WTSCLIENTW`, returned for [`InfoClass::ClientInfo`]. Copied field by
/// field from the OS buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDescriptor {
    pub client_name: WideBuf<{ abi::CLIENTNAME_LENGTH + 1 }>,
    pub domain: WideBuf<{ abi::DOMAIN_LENGTH + 1 }>,
    pub user_name: WideBuf<{ abi::USERNAME_LENGTH + 1 }>,
    pub work_directory: WideBuf<{ abi::MAX_PATH + 1 }>,
    pub initial_program: WideBuf<{ abi::MAX_PATH + 1 }>,
    pub encryption_level: u8,
    pub client_address_family: u32,
    pub client_address: WideBuf<{ abi::CLIENTADDRESS_LENGTH + 1 }>,
    pub h_res: u16,
    pub v_res: u16,
    pub color_depth: u16,
    pub client_directory: WideBuf<{ abi::MAX_PATH + 1 }>,
    pub client_build_number: u32,
    pub client_hardware_id: u32,
    pub client_product_id: u16,
    pub out_buf_count_host: u16,
    pub out_buf_count_client: u16,
    pub out_buf_length: u16,
    pub device_id: WideBuf<{ abi::MAX_PATH + 1 }>,
}

impl ClientDescriptor {
    pub fn from_abi(raw: &WTSCLIENTW) -> Self {
        Self {
            client_name: WideBuf::from_units(&raw.ClientName),
            domain: WideBuf::from_units(&raw.Domain),
            user_name: WideBuf::from_units(&raw.UserName),
            work_directory: WideBuf::from_units(&raw.WorkDirectory),
            initial_program: WideBuf::from_units(&raw.InitialProgram),
            encryption_level: raw.EncryptionLevel,
            client_address_family: raw.ClientAddressFamily,
            client_address: WideBuf::from_units(&raw.ClientAddress),
            h_res: raw.HRes,
            v_res: raw.VRes,
            color_depth: raw.ColorDepth,
            client_directory: WideBuf::from_units(&raw.ClientDirectory),
            client_build_number: raw.ClientBuildNumber,
            client_hardware_id: raw.ClientHardwareId,
            client_product_id: raw.ClientProductId,
            out_buf_count_host: raw.OutBufCountHost,
            out_buf_count_client: raw.OutBufCountClient,
            out_buf_length: raw.OutBufLength,
            device_id: WideBuf::from_units(&raw.DeviceId),
        }
    }

    pub fn encryption(&self) -> EncryptionLevel {
        EncryptionLevel::from_u8(self.encryption_level)
    }
}

/// `WTS_CLIENT_ADDRESS`, returned for [`InfoClass::ClientAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAddress {
    pub address_family: u32,
    pub address: [u8; 20],
}

impl ClientAddress {
    pub fn from_abi(raw: &WTS_CLIENT_ADDRESS) -> Self {
        Self {
            address_family: raw.AddressFamily,
            address: raw.Address,
        }
    }

    /// IPv4 sits at bytes 2..6 of the address field; IPv6 at 0..16.
    pub fn ip(&self) -> Option<IpAddr> {
        match self.address_family {
            abi::AF_INET => {
                let a = &self.address;
                Some(IpAddr::V4(Ipv4Addr::new(a[2], a[3], a[4], a[5])))
            }
            abi::AF_INET6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&self.address[..16]);
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => None,
        }
    }

    pub fn family_name(&self) -> &'static str {
        match self.address_family {
            abi::AF_UNSPEC => "AF_UNSPEC",
            abi::AF_INET => "AF_INET",
            abi::AF_IPX => "AF_IPX",
            abi::AF_NETBIOS => "AF_NETBIOS",
            abi::AF_INET6 => "AF_INET6",
            _ => "Unknown",
        }
    }
}

/// `WTS_CLIENT_DISPLAY`, returned for [`InfoClass::ClientDisplay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDisplay {
    pub horizontal_resolution: u32,
    pub vertical_resolution: u32,
    /// Color depth code as reported by the OS (1 = 4bpp .. 24 = 32bpp).
    pub color_depth: u32,
}

impl ClientDisplay {
    pub fn from_abi(raw: &WTS_CLIENT_DISPLAY) -> Self {
        Self {
            horizontal_resolution: raw.HorizontalResolution,
            vertical_resolution: raw.VerticalResolution,
            color_depth: raw.ColorDepth,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Client protocol / encryption
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client protocol type (from WTSClientProtocolType).
/// 0 = Console, 1 = legacy (ICA, not used), 2 = RDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientProtocol {
    /// Physical console session.
    #[default]
    Console,
    /// Legacy protocol (ICA / Citrix).
    Legacy,
    /// Remote Desktop Protocol (RDP).
    Rdp,
    /// Unknown / unmapped value.
    Unknown,
}

impl ClientProtocol {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => Self::Console,
            1 => Self::Legacy,
            2 => Self::Rdp,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ClientProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => write!(f, "Console"),
            Self::Legacy => write!(f, "Legacy"),
            Self::Rdp => write!(f, "RDP"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// RDP encryption level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncryptionLevel {
    /// No encryption.
    None,
    /// 56-bit encryption.
    Low,
    /// Client compatible.
    ClientCompatible,
    /// 128-bit encryption.
    High,
    /// FIPS 140-1 compliant.
    FipsCompliant,
    /// Unknown level.
    Unknown,
}

impl EncryptionLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Low,
            2 => Self::ClientCompatible,
            3 => Self::High,
            4 => Self::FipsCompliant,
            _ => Self::Unknown,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Aggregates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Detailed session information aggregated from several
/// `WTSQuerySessionInformationW` calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    // ── Basic identification ─────────────────────────────────
    pub session_id: u32,
    pub win_station_name: String,
    pub state: SessionState,

    // ── User ─────────────────────────────────────────────────
    pub user_name: String,
    pub domain_name: String,

    // ── Client ───────────────────────────────────────────────
    pub client_name: String,
    pub client_address: Option<IpAddr>,
    pub client_address_family: String,
    pub client_build_number: u32,
    pub client_directory: String,
    pub client_product_id: u16,
    pub client_hardware_id: u32,
    pub client_protocol_type: ClientProtocol,
    pub client_display: ClientDisplay,

    // ── Timing & traffic ─────────────────────────────────────
    pub info: Option<SessionInfo>,

    // ── Misc ─────────────────────────────────────────────────
    pub initial_program: String,
    pub application_name: String,
    pub working_directory: String,
    pub is_remote_session: bool,
}

impl SessionDetail {
    pub fn idle_seconds(&self) -> Option<u64> {
        self.info.as_ref().and_then(SessionInfo::idle_seconds)
    }
}

/// Quick overview of the sessions on a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub server_name: String,
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub disconnected_sessions: usize,
    pub idle_sessions: usize,
    pub listen_sessions: usize,
    pub total_processes: usize,
}

impl ServerSummary {
    pub fn from_sessions(
        server_name: impl Into<String>,
        sessions: &[SessionDescriptor],
        total_processes: usize,
    ) -> Self {
        let count = |state: SessionState| sessions.iter().filter(|s| s.state == state).count();
        Self {
            server_name: server_name.into(),
            total_sessions: sessions.len(),
            active_sessions: count(SessionState::Active),
            disconnected_sessions: count(SessionState::Disconnected),
            idle_sessions: count(SessionState::Idle),
            listen_sessions: count(SessionState::Listen),
            total_processes,
        }
    }
}

/// A server handle registered with the service layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Unique identifier assigned by the service layer.
    pub handle_id: String,
    /// Server name or address that was opened.
    pub server_name: String,
    /// When the handle was opened.
    pub opened_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wide::to_wide;

    #[test]
    fn session_state_from_raw_covers_all_values() {
        let expected = [
            SessionState::Active,
            SessionState::Connected,
            SessionState::ConnectQuery,
            SessionState::Shadow,
            SessionState::Disconnected,
            SessionState::Idle,
            SessionState::Listen,
            SessionState::Reset,
            SessionState::Down,
            SessionState::Init,
        ];
        for (raw, state) in expected.iter().enumerate() {
            assert_eq!(SessionState::from_raw(raw as i32), *state);
            assert_eq!(state.as_raw(), Some(raw as i32));
        }
        assert_eq!(SessionState::from_raw(10), SessionState::Unknown);
        assert_eq!(SessionState::from_raw(-1), SessionState::Unknown);
        assert_eq!(SessionState::Unknown.as_raw(), None);
    }

    #[test]
    fn session_state_display_and_default() {
        assert_eq!(SessionState::Active.to_string(), "Active");
        assert_eq!(SessionState::ConnectQuery.to_string(), "ConnectQuery");
        assert_eq!(SessionState::default(), SessionState::Unknown);
        assert!(SessionState::Disconnected.is_user_session());
        assert!(!SessionState::Listen.is_user_session());
    }

    #[test]
    fn session_state_serde_camel_case() {
        let json = serde_json::to_string(&SessionState::ConnectQuery).unwrap();
        assert_eq!(json, "\"connectQuery\"");
    }

    #[test]
    fn info_class_values() {
        assert_eq!(InfoClass::InitialProgram.as_u32(), 0);
        assert_eq!(InfoClass::UserName.as_u32(), 5);
        assert_eq!(InfoClass::ClientAddress.as_u32(), 14);
        assert_eq!(InfoClass::ClientInfo.as_u32(), 23);
        assert_eq!(InfoClass::SessionInfo.as_u32(), 24);
        assert_eq!(InfoClass::IsRemoteSession.as_u32(), 29);
        assert_eq!(VirtualClass::ClientData.as_u32(), 0);
        assert_eq!(VirtualClass::FileHandle.as_u32(), 1);
    }

    #[test]
    fn session_event_from_message() {
        let ev = SessionEvent::from_message(0x7, 3);
        assert_eq!(ev.kind, SessionEventKind::Lock);
        assert_eq!(ev.session_id, 3);
        assert_eq!(
            SessionEvent::from_message(0xB, 12).kind,
            SessionEventKind::Terminate
        );
        assert_eq!(
            SessionEventKind::from_u32(0x42),
            SessionEventKind::Unknown(0x42)
        );
    }

    #[test]
    fn notify_scope_values() {
        assert_eq!(NotifyScope::ThisSession.to_u32(), 0);
        assert_eq!(NotifyScope::AllSessions.to_u32(), 1);
        assert_eq!(NotifyScope::default(), NotifyScope::ThisSession);
    }

    #[test]
    fn message_style_to_u32() {
        assert_eq!(MessageStyle::Ok.to_u32(), 0);
        assert_eq!(MessageStyle::OkCancel.to_u32(), 1);
        assert_eq!(MessageStyle::AbortRetryIgnore.to_u32(), 2);
        assert_eq!(MessageStyle::YesNoCancel.to_u32(), 3);
        assert_eq!(MessageStyle::YesNo.to_u32(), 4);
        assert_eq!(MessageStyle::RetryCancel.to_u32(), 5);
    }

    #[test]
    fn message_response_from_u32() {
        assert_eq!(MessageResponse::from_u32(1), MessageResponse::Ok);
        assert_eq!(MessageResponse::from_u32(6), MessageResponse::Yes);
        assert_eq!(MessageResponse::from_u32(7), MessageResponse::No);
        assert_eq!(MessageResponse::from_u32(32000), MessageResponse::Timeout);
        assert_eq!(MessageResponse::from_u32(32001), MessageResponse::AsyncSent);
        assert_eq!(MessageResponse::from_u32(0), MessageResponse::Unknown);
    }

    #[test]
    fn send_message_options_default() {
        let opts = SendMessageOptions::default();
        assert_eq!(opts.style, MessageStyle::Ok);
        assert_eq!(opts.timeout_secs, DEFAULT_MESSAGE_TIMEOUT_SECS);
        assert!(opts.wait);

        let partial: SendMessageOptions =
            serde_json::from_str(r#"{"style":"yesNo"}"#).unwrap();
        assert_eq!(partial.style, MessageStyle::YesNo);
        assert_eq!(partial.timeout_secs, 10);
    }

    #[test]
    fn channel_flags() {
        assert_eq!(ChannelOptions::default().to_flags(), 0);
        assert_eq!(ChannelOptions::dynamic().to_flags(), 0x1);
        let opts = ChannelOptions {
            dynamic: true,
            priority: ChannelPriority::Real,
            no_compress: true,
        };
        assert_eq!(opts.to_flags(), 0x1 | 0x6 | 0x8);
        let static_opts = ChannelOptions {
            dynamic: false,
            priority: ChannelPriority::High,
            no_compress: true,
        };
        assert_eq!(static_opts.to_flags(), 0);
    }

    #[test]
    fn session_descriptor_from_abi() {
        let name = to_wide("RDP-Tcp#0");
        let raw = WTS_SESSION_INFOW {
            SessionId: 2,
            pWinStationName: name.as_ptr() as *mut u16,
            State: abi::WTSDisconnected,
        };
        let d = unsafe { SessionDescriptor::from_abi(&raw) };
        assert_eq!(d.session_id, 2);
        assert_eq!(d.win_station_name, "RDP-Tcp#0");
        assert_eq!(d.state, SessionState::Disconnected);

        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["winStationName"], "RDP-Tcp#0");
        assert_eq!(json["state"], "disconnected");
    }

    #[test]
    fn process_descriptor_ex_from_abi() {
        let name = to_wide("explorer.exe");
        let raw = WTS_PROCESS_INFO_EXW {
            SessionId: 1,
            ProcessId: 4242,
            pProcessName: name.as_ptr() as *mut u16,
            NumberOfThreads: 30,
            HandleCount: 900,
            UserTime: 10_000_000,
            KernelTime: 5_000_000,
            ..Default::default()
        };
        let p = unsafe { ProcessDescriptorEx::from_abi(&raw, "S-1-5-18".into()) };
        assert_eq!(p.process_name, "explorer.exe");
        assert_eq!(p.user_sid, "S-1-5-18");
        assert_eq!(p.number_of_threads, 30);
        assert_eq!(p.cpu_time(), std::time::Duration::from_millis(1500));
        assert_eq!(p.to_basic().process_id, 4242);
    }

    #[test]
    fn count_processes_per_session() {
        let mk = |session_id, process_id| ProcessDescriptor {
            session_id,
            process_id,
            process_name: String::new(),
            user_sid: String::new(),
        };
        let counts = count_per_session(&[mk(0, 4), mk(1, 10), mk(1, 11), mk(2, 20)]);
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn filetime_conversion() {
        assert!(filetime_to_datetime(0).is_none());
        assert!(filetime_to_datetime(-5).is_none());
        assert!(filetime_to_datetime(1).is_none());
        let epoch = filetime_to_datetime(116_444_736_000_000_000).unwrap();
        assert_eq!(epoch.timestamp(), 0);
        // 2024-01-01T00:00:00Z plus 0.5s
        let ft = 116_444_736_000_000_000 + 1_704_067_200 * 10_000_000 + 5_000_000;
        let dt = filetime_to_datetime(ft).unwrap();
        assert_eq!(dt.timestamp(), 1_704_067_200);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn session_info_from_abi() {
        let mut raw = WTSINFOW::default();
        raw.State = abi::WTSActive;
        raw.SessionId = 3;
        raw.IncomingBytes = 1024;
        raw.UserName[..5].copy_from_slice(&to_wide("alice")[..5]);
        raw.Domain[..4].copy_from_slice(&to_wide("CORP")[..4]);
        raw.LastInputTime = 116_444_736_000_000_000 + 100 * 10_000_000;
        raw.CurrentTime = 116_444_736_000_000_000 + 160 * 10_000_000;

        let info = SessionInfo::from_abi(&raw);
        assert_eq!(info.state, SessionState::Active);
        assert_eq!(info.user_name.to_string(), "alice");
        assert_eq!(info.domain.to_string(), "CORP");
        assert!(info.connect_time.is_none());
        assert_eq!(info.idle_seconds(), Some(60));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["userName"], "alice");
        assert_eq!(json["incomingBytes"], 1024);
    }

    #[test]
    fn client_descriptor_from_abi() {
        let mut raw = WTSCLIENTW::default();
        raw.ClientName[..6].copy_from_slice(&to_wide("LAPTOP")[..6]);
        raw.EncryptionLevel = 3;
        raw.ClientAddressFamily = abi::AF_INET;
        raw.HRes = 1920;
        raw.VRes = 1080;
        raw.ClientBuildNumber = 22621;
        raw.DeviceId[0] = b'X' as u16;

        let c = ClientDescriptor::from_abi(&raw);
        assert_eq!(c.client_name.to_string(), "LAPTOP");
        assert!(c.user_name.is_empty());
        assert_eq!(c.encryption(), EncryptionLevel::High);
        assert_eq!((c.h_res, c.v_res), (1920, 1080));
        assert_eq!(c.device_id.to_string(), "X");
    }

    #[test]
    fn client_address_ipv4_and_ipv6() {
        let mut v4 = ClientAddress {
            address_family: abi::AF_INET,
            address: [0; 20],
        };
        v4.address[2..6].copy_from_slice(&[192, 168, 1, 20]);
        assert_eq!(v4.ip(), Some("192.168.1.20".parse().unwrap()));
        assert_eq!(v4.family_name(), "AF_INET");

        let mut v6 = ClientAddress {
            address_family: abi::AF_INET6,
            address: [0; 20],
        };
        v6.address[0] = 0xfe;
        v6.address[1] = 0x80;
        v6.address[15] = 1;
        assert_eq!(v6.ip(), Some("fe80::1".parse().unwrap()));

        let unspec = ClientAddress::default();
        assert_eq!(unspec.ip(), None);
        assert_eq!(unspec.family_name(), "AF_UNSPEC");
    }

    #[test]
    fn client_protocol_from_u16() {
        assert_eq!(ClientProtocol::from_u16(0), ClientProtocol::Console);
        assert_eq!(ClientProtocol::from_u16(2), ClientProtocol::Rdp);
        assert_eq!(ClientProtocol::from_u16(99), ClientProtocol::Unknown);
        assert_eq!(ClientProtocol::Rdp.to_string(), "RDP");
    }

    #[test]
    fn encryption_level_from_u8() {
        assert_eq!(EncryptionLevel::from_u8(0), EncryptionLevel::None);
        assert_eq!(EncryptionLevel::from_u8(4), EncryptionLevel::FipsCompliant);
        assert_eq!(EncryptionLevel::from_u8(9), EncryptionLevel::Unknown);
    }

    #[test]
    fn server_summary_counts_states() {
        let mk = |id, state| SessionDescriptor {
            session_id: id,
            win_station_name: String::new(),
            state,
        };
        let sessions = [
            mk(0, SessionState::Disconnected),
            mk(1, SessionState::Active),
            mk(2, SessionState::Active),
            mk(65536, SessionState::Listen),
        ];
        let summary = ServerSummary::from_sessions("localhost", &sessions, 80);
        assert_eq!(summary.total_sessions, 4);
        assert_eq!(summary.active_sessions, 2);
        assert_eq!(summary.disconnected_sessions, 1);
        assert_eq!(summary.listen_sessions, 1);
        assert_eq!(summary.idle_sessions, 0);
        assert_eq!(summary.total_processes, 80);
    }

    #[test]
    fn session_detail_default_serializes() {
        let detail = SessionDetail::default();
        assert_eq!(detail.state, SessionState::Unknown);
        assert!(detail.idle_seconds().is_none());
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["clientProtocolType"], "console");
        assert!(json["clientAddress"].is_null());
    }

    #[test]
    fn server_info_serde() {
        let info = ServerInfo {
            handle_id: "abc-123".to_string(),
            server_name: "RDSH-01".to_string(),
            opened_at: Utc::now(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["handleId"], "abc-123");
        let back: ServerInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }
}
