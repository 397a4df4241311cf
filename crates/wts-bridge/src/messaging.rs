//! Messaging: message boxes on session desktops via `WTSSendMessageW`.
//!
//! The equivalent of `msg.exe`. A synchronous send blocks the calling thread
//! until the user responds or the timeout elapses; an asynchronous one
//! returns [`MessageResponse::AsyncSent`] at once.

use log::{info, warn};

use crate::error::WtsResult;
use crate::server::ServerHandle;
use crate::types::*;
use crate::wts_ffi;

/// Show an OK box and wait up to [`DEFAULT_MESSAGE_TIMEOUT_SECS`] for it to
/// be dismissed. Returns [`MessageResponse::Timeout`] if nobody clicks.
pub fn send_message(
    server: &ServerHandle,
    session_id: u32,
    title: &str,
    content: &str,
) -> WtsResult<MessageResponse> {
    send_message_with(server, session_id, title, content, SendMessageOptions::default())
}

/// Send with an explicit style, timeout and wait mode.
pub fn send_message_with(
    server: &ServerHandle,
    session_id: u32,
    title: &str,
    content: &str,
    options: SendMessageOptions,
) -> WtsResult<MessageResponse> {
    info!(
        "Sending message to session {}: title='{}', wait={}",
        session_id, title, options.wait
    );
    wts_ffi::send_message(
        server.as_raw(),
        session_id,
        title,
        content,
        options.style.to_u32(),
        options.timeout_secs,
        options.wait,
    )
}

/// Quick informational message (OK button, no wait).
pub fn send_info(
    server: &ServerHandle,
    session_id: u32,
    title: &str,
    content: &str,
) -> WtsResult<MessageResponse> {
    let options = SendMessageOptions {
        style: MessageStyle::Ok,
        timeout_secs: 0,
        wait: false,
    };
    send_message_with(server, session_id, title, content, options)
}

/// Yes/No confirmation; blocks until answered or `timeout_secs` elapses.
pub fn send_confirmation(
    server: &ServerHandle,
    session_id: u32,
    title: &str,
    content: &str,
    timeout_secs: u32,
) -> WtsResult<MessageResponse> {
    let options = SendMessageOptions {
        style: MessageStyle::YesNo,
        timeout_secs,
        wait: true,
    };
    send_message_with(server, session_id, title, content, options)
}

/// Informational message to every Active session, without waiting.
/// Returns how many sessions accepted it.
pub fn broadcast_message(
    server: &ServerHandle,
    title: &str,
    content: &str,
    timeout_secs: u32,
) -> WtsResult<u32> {
    let sessions = wts_ffi::enumerate_sessions(server.as_raw())?;
    let options = SendMessageOptions {
        style: MessageStyle::Ok,
        timeout_secs,
        wait: false,
    };
    let mut sent = 0u32;
    for s in sessions.iter().filter(|s| s.state == SessionState::Active) {
        match send_message_with(server, s.session_id, title, content, options) {
            Ok(_) => sent += 1,
            Err(e) => warn!("Message to session {} failed: {}", s.session_id, e),
        }
    }
    info!("Broadcast message to {} sessions", sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_to_unknown_session_fails() {
        let server = ServerHandle::local();
        let err = send_info(&server, 0x7FFF_FFF0, "t", "m").unwrap_err();
        assert_eq!(err.call, "WTSSendMessageW");
        assert_ne!(err.code, 0);
    }

    #[test]
    #[ignore = "needs an interactive session that leaves the box open"]
    fn unanswered_message_times_out() {
        let server = ServerHandle::local();
        let session = crate::sessions::current_session_id().unwrap();
        let options = SendMessageOptions {
            timeout_secs: 1,
            ..Default::default()
        };
        let resp = send_message_with(&server, session, "wts-bridge", "timeout test", options).unwrap();
        assert_eq!(resp, MessageResponse::Timeout);
    }
}
