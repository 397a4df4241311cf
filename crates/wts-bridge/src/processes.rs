//! Process management: enumerate, filter, terminate processes across sessions.

use std::collections::BTreeMap;

use log::info;

use crate::abi::WTS_ANY_SESSION;
use crate::error::WtsResult;
use crate::server::ServerHandle;
use crate::types::{count_per_session, ProcessDescriptor, ProcessDescriptorEx};
use crate::wts_ffi;

/// All processes on the server.
pub fn list_processes(server: &ServerHandle) -> WtsResult<Vec<ProcessDescriptor>> {
    wts_ffi::enumerate_processes(server.as_raw(), WTS_ANY_SESSION)
}

/// Processes of one session, filtered by the OS.
pub fn list_session_processes(
    server: &ServerHandle,
    session_id: u32,
) -> WtsResult<Vec<ProcessDescriptor>> {
    wts_ffi::enumerate_processes(server.as_raw(), session_id)
}

/// Level 1 listing with thread/handle counts, memory and CPU times.
pub fn list_processes_detailed(
    server: &ServerHandle,
    session_id: u32,
) -> WtsResult<Vec<ProcessDescriptorEx>> {
    wts_ffi::enumerate_processes_ex(server.as_raw(), session_id)
}

/// Search processes by name (case-insensitive partial match).
pub fn find_processes_by_name(
    server: &ServerHandle,
    name_pattern: &str,
) -> WtsResult<Vec<ProcessDescriptor>> {
    Ok(filter_by_name(list_processes(server)?, name_pattern))
}

pub fn filter_by_name(processes: Vec<ProcessDescriptor>, name_pattern: &str) -> Vec<ProcessDescriptor> {
    let pattern = name_pattern.to_lowercase();
    processes
        .into_iter()
        .filter(|p| p.process_name.to_lowercase().contains(&pattern))
        .collect()
}

/// Number of processes per session id.
pub fn process_count_per_session(server: &ServerHandle) -> WtsResult<BTreeMap<u32, usize>> {
    Ok(count_per_session(&list_processes(server)?))
}

/// Terminate a specific process by PID.
pub fn terminate(server: &ServerHandle, process_id: u32, exit_code: u32) -> WtsResult<()> {
    info!("Terminating process {} with exit code {}", process_id, exit_code);
    wts_ffi::terminate_process(server.as_raw(), process_id, exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(session_id: u32, name: &str) -> ProcessDescriptor {
        ProcessDescriptor {
            session_id,
            process_id: 100 + session_id,
            process_name: name.to_string(),
            user_sid: String::new(),
        }
    }

    #[test]
    fn filter_by_name_is_case_insensitive() {
        let all = vec![proc(1, "Explorer.EXE"), proc(1, "svchost.exe"), proc(2, "explorer.exe")];
        let found = filter_by_name(all, "explorer");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn local_processes_include_current() {
        let server = ServerHandle::local();
        let pid = std::process::id();
        let procs = list_processes(&server).unwrap();
        assert!(procs.iter().any(|p| p.process_id == pid));
    }

    #[test]
    fn detailed_listing_for_current_session() {
        let server = ServerHandle::local();
        let session = crate::sessions::current_session_id().unwrap();
        let procs = list_processes_detailed(&server, session).unwrap();
        let me = procs
            .iter()
            .find(|p| p.process_id == std::process::id())
            .unwrap();
        assert!(me.number_of_threads >= 1);
    }
}
