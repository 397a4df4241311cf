//! Session management: enumerate, query, disconnect, logoff.
//!
//! Typed decoders over `WTSQuerySessionInformationW` plus filtering and
//! aggregation helpers built on the raw layer in [`crate::wts_ffi`].

use log::{info, warn};

use crate::abi::{WTSCLIENTW, WTSINFOW, WTS_CLIENT_ADDRESS, WTS_CLIENT_DISPLAY};
use crate::error::{WtsError, WtsResult};
use crate::server::ServerHandle;
use crate::types::*;
use crate::wts_ffi;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Enumeration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All sessions on the server. Zero sessions yields an empty list.
pub fn list_sessions(server: &ServerHandle) -> WtsResult<Vec<SessionDescriptor>> {
    wts_ffi::enumerate_sessions(server.as_raw())
}

/// Sessions in the given state.
pub fn list_sessions_in_state(
    server: &ServerHandle,
    state: SessionState,
) -> WtsResult<Vec<SessionDescriptor>> {
    Ok(filter_by_state(list_sessions(server)?, state))
}

/// Sessions with a logged-on user (Active or Disconnected).
pub fn list_user_sessions(server: &ServerHandle) -> WtsResult<Vec<SessionDescriptor>> {
    Ok(user_sessions(list_sessions(server)?))
}

pub fn filter_by_state(
    sessions: Vec<SessionDescriptor>,
    state: SessionState,
) -> Vec<SessionDescriptor> {
    sessions.into_iter().filter(|s| s.state == state).collect()
}

pub fn user_sessions(sessions: Vec<SessionDescriptor>) -> Vec<SessionDescriptor> {
    sessions
        .into_iter()
        .filter(|s| s.state.is_user_session())
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Typed queries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const QUERY: &str = "WTSQuerySessionInformationW";

/// A string-valued class (user name, domain, client name, ...).
pub fn query_string(server: &ServerHandle, session_id: u32, class: InfoClass) -> WtsResult<String> {
    let buf = wts_ffi::query_session_information(server.as_raw(), session_id, class)?;
    Ok(buf.to_string_lossy())
}

pub fn query_u32(server: &ServerHandle, session_id: u32, class: InfoClass) -> WtsResult<u32> {
    let buf = wts_ffi::query_session_information(server.as_raw(), session_id, class)?;
    buf.read_u32().ok_or_else(|| WtsError::invalid_argument(QUERY))
}

pub fn query_u16(server: &ServerHandle, session_id: u32, class: InfoClass) -> WtsResult<u16> {
    let buf = wts_ffi::query_session_information(server.as_raw(), session_id, class)?;
    buf.read_u16().ok_or_else(|| WtsError::invalid_argument(QUERY))
}

fn query_struct<T: Copy>(server: &ServerHandle, session_id: u32, class: InfoClass) -> WtsResult<T> {
    let buf = wts_ffi::query_session_information(server.as_raw(), session_id, class)?;
    buf.read_struct::<T>()
        .ok_or_else(|| WtsError::invalid_argument(QUERY))
}

/// `WTSINFOW` for the session: state, traffic counters and timestamps.
pub fn query_session_info(server: &ServerHandle, session_id: u32) -> WtsResult<SessionInfo> {
    let raw: WTSINFOW = query_struct(server, session_id, InfoClass::SessionInfo)?;
    Ok(SessionInfo::from_abi(&raw))
}

/// `WTSCLIENTW` for the session.
pub fn query_client_info(server: &ServerHandle, session_id: u32) -> WtsResult<ClientDescriptor> {
    let raw: WTSCLIENTW = query_struct(server, session_id, InfoClass::ClientInfo)?;
    Ok(ClientDescriptor::from_abi(&raw))
}

pub fn query_client_address(server: &ServerHandle, session_id: u32) -> WtsResult<ClientAddress> {
    let raw: WTS_CLIENT_ADDRESS = query_struct(server, session_id, InfoClass::ClientAddress)?;
    Ok(ClientAddress::from_abi(&raw))
}

pub fn query_client_display(server: &ServerHandle, session_id: u32) -> WtsResult<ClientDisplay> {
    let raw: WTS_CLIENT_DISPLAY = query_struct(server, session_id, InfoClass::ClientDisplay)?;
    Ok(ClientDisplay::from_abi(&raw))
}

/// Whether the session is remote. The OS writes a one-byte BOOLEAN.
pub fn is_remote_session(server: &ServerHandle, session_id: u32) -> WtsResult<bool> {
    let buf =
        wts_ffi::query_session_information(server.as_raw(), session_id, InfoClass::IsRemoteSession)?;
    Ok(buf.as_bytes().first().is_some_and(|&b| b != 0))
}

/// Seconds since the last input, `None` when the OS has no input time.
pub fn idle_seconds(server: &ServerHandle, session_id: u32) -> WtsResult<Option<u64>> {
    Ok(query_session_info(server, session_id)?.idle_seconds())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Aggregated detail
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn or_default<T: Default>(session_id: u32, what: &str, r: WtsResult<T>) -> T {
    r.unwrap_or_else(|e| {
        warn!("Session {}: {} unavailable: {}", session_id, what, e);
        T::default()
    })
}

/// Full detail for one session. The `WTSSessionInfo` query must succeed (an
/// unknown session id fails here); the remaining classes are best effort.
pub fn session_detail(server: &ServerHandle, session_id: u32) -> WtsResult<SessionDetail> {
    let info = query_session_info(server, session_id)?;

    let string = |class| or_default(session_id, "string", query_string(server, session_id, class));
    let address = or_default(session_id, "client address", query_client_address(server, session_id));

    Ok(SessionDetail {
        session_id,
        win_station_name: info.win_station_name.to_string_lossy(),
        state: info.state,
        user_name: info.user_name.to_string_lossy(),
        domain_name: info.domain.to_string_lossy(),
        client_name: string(InfoClass::ClientName),
        client_address: address.ip(),
        client_address_family: address.family_name().to_string(),
        client_build_number: or_default(
            session_id,
            "client build",
            query_u32(server, session_id, InfoClass::ClientBuildNumber),
        ),
        client_directory: string(InfoClass::ClientDirectory),
        client_product_id: or_default(
            session_id,
            "client product id",
            query_u16(server, session_id, InfoClass::ClientProductId),
        ),
        client_hardware_id: or_default(
            session_id,
            "client hardware id",
            query_u32(server, session_id, InfoClass::ClientHardwareId),
        ),
        client_protocol_type: ClientProtocol::from_u16(or_default(
            session_id,
            "protocol",
            query_u16(server, session_id, InfoClass::ClientProtocolType),
        )),
        client_display: or_default(
            session_id,
            "client display",
            query_client_display(server, session_id),
        ),
        initial_program: string(InfoClass::InitialProgram),
        application_name: string(InfoClass::ApplicationName),
        working_directory: string(InfoClass::WorkingDirectory),
        is_remote_session: or_default(
            session_id,
            "remote flag",
            is_remote_session(server, session_id),
        ),
        info: Some(info),
    })
}

/// Detail for every session; sessions that vanish mid-walk are skipped.
pub fn all_session_details(server: &ServerHandle) -> WtsResult<Vec<SessionDetail>> {
    let entries = list_sessions(server)?;
    let mut details = Vec::with_capacity(entries.len());
    for entry in &entries {
        match session_detail(server, entry.session_id) {
            Ok(d) => details.push(d),
            Err(e) => warn!("Failed to query session {}: {}", entry.session_id, e),
        }
    }
    Ok(details)
}

/// Sessions whose user name contains `user_pattern` (case-insensitive).
pub fn find_sessions_by_user(
    server: &ServerHandle,
    user_pattern: &str,
) -> WtsResult<Vec<SessionDetail>> {
    let pattern = user_pattern.to_lowercase();
    Ok(all_session_details(server)?
        .into_iter()
        .filter(|d| d.user_name.to_lowercase().contains(&pattern))
        .collect())
}

/// Session counts by state plus the total process count.
pub fn server_summary(server: &ServerHandle) -> WtsResult<ServerSummary> {
    let sessions = list_sessions(server)?;
    let total_processes =
        match wts_ffi::enumerate_processes(server.as_raw(), crate::abi::WTS_ANY_SESSION) {
            Ok(p) => p.len(),
            Err(e) => {
                warn!("Process count unavailable for summary: {}", e);
                0
            }
        };
    Ok(ServerSummary::from_sessions(
        server.display_name(),
        &sessions,
        total_processes,
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Control
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Disconnect a session (the user stays logged on; session moves to Disconnected).
pub fn disconnect(server: &ServerHandle, session_id: u32, wait: bool) -> WtsResult<()> {
    info!("Disconnecting session {}", session_id);
    wts_ffi::disconnect_session(server.as_raw(), session_id, wait)
}

/// Log off a session (terminates user processes, closes session).
pub fn logoff(server: &ServerHandle, session_id: u32, wait: bool) -> WtsResult<()> {
    info!("Logging off session {}", session_id);
    wts_ffi::logoff_session(server.as_raw(), session_id, wait)
}

/// Session id of the physical console, `None` while no session is attached.
pub fn console_session_id() -> Option<u32> {
    match wts_ffi::active_console_session_id() {
        u32::MAX => None,
        id => Some(id),
    }
}

pub fn current_session_id() -> WtsResult<u32> {
    wts_ffi::current_session_id()
}
