//! Error type for every native call made by this crate.
//!
//! There is exactly one failure shape: a native entry point reported failure
//! and the OS last-error code was captured right after it returned. The
//! bridge adds no retry or recovery policy on top.

use serde::{Deserialize, Serialize};
use std::io;

/// `ERROR_SUCCESS`.
pub const ERROR_SUCCESS: u32 = 0;
/// `ERROR_INVALID_HANDLE`.
pub const ERROR_INVALID_HANDLE: u32 = 6;
/// `ERROR_TOO_MANY_OPEN_FILES`.
pub const ERROR_TOO_MANY_OPEN_FILES: u32 = 4;
/// `ERROR_INVALID_PARAMETER`, substituted when the OS reports no error
/// alongside a failure return.
pub const ERROR_INVALID_PARAMETER: u32 = 87;
/// `ERROR_OPERATION_ABORTED`.
pub const ERROR_OPERATION_ABORTED: u32 = 995;

/// A native call returned failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{call} failed: Win32 error {code}{}", code_suffix(.code))]
pub struct WtsError {
    /// Name of the failing native call (e.g. `WTSEnumerateSessionsW`).
    pub call: String,
    /// The OS error code captured after the call.
    pub code: u32,
}

pub type WtsResult<T> = Result<T, WtsError>;

impl WtsError {
    pub fn new(call: impl Into<String>, code: u32) -> Self {
        Self { call: call.into(), code }
    }

    /// Build the error from a captured last-error value.
    ///
    /// Some entry points return FALSE without setting a last-error value, in
    /// which case `ERROR_INVALID_PARAMETER` is reported instead of a
    /// misleading "success" code.
    pub fn from_last_error(call: impl Into<String>, code: u32) -> Self {
        let code = if code == ERROR_SUCCESS {
            ERROR_INVALID_PARAMETER
        } else {
            code
        };
        Self::new(call, code)
    }

    /// Argument could not be encoded for the native call.
    pub fn invalid_argument(call: impl Into<String>) -> Self {
        Self::new(call, ERROR_INVALID_PARAMETER)
    }

    /// Read `GetLastError` and wrap it. Must be the first OS call after the
    /// failing native call.
    #[cfg(windows)]
    pub fn last(call: impl Into<String>) -> Self {
        // SAFETY: GetLastError has no preconditions.
        let code = unsafe { windows_sys::Win32::Foundation::GetLastError() };
        Self::from_last_error(call, code)
    }

    /// Symbolic name of the code, for the handful of codes WTS calls commonly
    /// produce.
    pub fn code_name(&self) -> Option<&'static str> {
        code_name(self.code)
    }

    pub fn is_access_denied(&self) -> bool {
        self.code == 5
    }
}

impl From<WtsError> for io::Error {
    fn from(e: WtsError) -> Self {
        let kind = io::Error::from_raw_os_error(e.code as i32).kind();
        io::Error::new(kind, e)
    }
}

fn code_name(code: u32) -> Option<&'static str> {
    Some(match code {
        0 => "ERROR_SUCCESS",
        2 => "ERROR_FILE_NOT_FOUND",
        4 => "ERROR_TOO_MANY_OPEN_FILES",
        5 => "ERROR_ACCESS_DENIED",
        6 => "ERROR_INVALID_HANDLE",
        50 => "ERROR_NOT_SUPPORTED",
        87 => "ERROR_INVALID_PARAMETER",
        120 => "ERROR_CALL_NOT_IMPLEMENTED",
        121 => "ERROR_SEM_TIMEOUT",
        126 => "ERROR_MOD_NOT_FOUND",
        127 => "ERROR_PROC_NOT_FOUND",
        995 => "ERROR_OPERATION_ABORTED",
        1008 => "ERROR_NO_TOKEN",
        1314 => "ERROR_PRIVILEGE_NOT_HELD",
        1410 => "ERROR_CLASS_ALREADY_EXISTS",
        1722 => "RPC_S_SERVER_UNAVAILABLE",
        7022 => "ERROR_CTX_WINSTATION_NOT_FOUND",
        _ => return None,
    })
}

fn code_suffix(code: &u32) -> String {
    match code_name(*code) {
        Some(name) => format!(" ({})", name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_code_becomes_invalid_parameter() {
        let e = WtsError::from_last_error("WTSEnumerateSessionsW", ERROR_SUCCESS);
        assert_eq!(e.code, ERROR_INVALID_PARAMETER);
        assert_eq!(e.call, "WTSEnumerateSessionsW");
    }

    #[test]
    fn real_code_is_kept() {
        let e = WtsError::from_last_error("WTSLogoffSession", 5);
        assert_eq!(e.code, 5);
        assert!(e.is_access_denied());
    }

    #[test]
    fn display_includes_call_and_symbolic_name() {
        let e = WtsError::new("WTSQuerySessionInformationW", 7022);
        assert_eq!(
            e.to_string(),
            "WTSQuerySessionInformationW failed: Win32 error 7022 (ERROR_CTX_WINSTATION_NOT_FOUND)"
        );
    }

    #[test]
    fn display_without_known_name() {
        let e = WtsError::new("WTSSendMessageW", 31337);
        assert_eq!(e.to_string(), "WTSSendMessageW failed: Win32 error 31337");
        assert!(e.code_name().is_none());
    }

    #[test]
    fn invalid_argument_uses_87() {
        let e = WtsError::invalid_argument("WTSVirtualChannelOpenEx");
        assert_eq!(e.code_name(), Some("ERROR_INVALID_PARAMETER"));
    }

    #[test]
    fn serializes_camel_case() {
        let e = WtsError::new("WTSCloseServer", 6);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["call"], "WTSCloseServer");
        assert_eq!(json["code"], 6);
        let back: WtsError = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn converts_into_io_error_keeping_source() {
        let e = WtsError::new("WTSVirtualChannelRead", 121);
        let io_err: io::Error = e.clone().into();
        let inner = io_err
            .get_ref()
            .and_then(|s| s.downcast_ref::<WtsError>())
            .unwrap();
        assert_eq!(inner, &e);
    }
}
