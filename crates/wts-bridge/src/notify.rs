//! Session change notifications.
//!
//! `WTSRegisterSessionNotification` delivers `WM_WTSSESSION_CHANGE` to a
//! window, so registration spins up a dedicated thread that owns a
//! message-only window and pumps its queue. The handler runs on that thread.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    PostMessageW, PostQuitMessage, RegisterClassExW, TranslateMessage, HWND_MESSAGE, MSG,
    WM_CLOSE, WM_DESTROY, WNDCLASSEXW,
};

use crate::abi::WM_WTSSESSION_CHANGE;
use crate::error::{WtsError, WtsResult, ERROR_OPERATION_ABORTED};
use crate::types::{NotifyScope, SessionEvent};
use crate::wide::to_wide;
use crate::wts_ffi;

const CLASS_NAME: &str = "WtsBridgeSessionNotify";
const THREAD_NAME: &str = "wts-session-notify";
const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;

type Handler = Arc<dyn Fn(SessionEvent) + Send + Sync + 'static>;

thread_local! {
    static HANDLER: RefCell<Option<Handler>> = const { RefCell::new(None) };
}

/// A live registration. Dropping it (or calling
/// [`SessionNotification::unregister`]) unregisters, destroys the window and
/// joins the thread.
#[derive(Debug)]
pub struct SessionNotification {
    hwnd: usize,
    scope: NotifyScope,
    thread: Option<JoinHandle<()>>,
}

impl SessionNotification {
    pub fn scope(&self) -> NotifyScope {
        self.scope
    }

    pub fn unregister(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else { return };
        // SAFETY: posting to a window owned by the notification thread.
        let posted = unsafe { PostMessageW(self.hwnd as HWND, WM_CLOSE, 0, 0) };
        if posted == 0 {
            let e = WtsError::last("PostMessageW(WM_CLOSE)");
            if thread.is_finished() {
                // The window is already gone; only the join is left.
                let _ = thread.join();
                return;
            }
            wts_ffi::unregister_session_notification(self.hwnd as HWND);
            warn!("{}; detaching {} thread", e, THREAD_NAME);
            drop(thread);
            return;
        }
        // Dropped from inside the handler: the loop exits on its own.
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("{} thread panicked", THREAD_NAME);
        }
        debug!("Session notifications unregistered");
    }
}

impl Drop for SessionNotification {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Call `handler` for every session change in `scope` until the returned
/// guard is dropped. The handler must not block; panics are caught and
/// logged.
pub fn register_session_notification<F>(
    scope: NotifyScope,
    handler: F,
) -> WtsResult<SessionNotification>
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    let handler: Handler = Arc::new(handler);
    let (tx, rx) = mpsc::channel::<WtsResult<usize>>();
    let thread = thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || run(scope, handler, tx))
        .map_err(|e| {
            WtsError::from_last_error("CreateThread", e.raw_os_error().map_or(0, |c| c as u32))
        })?;

    match rx.recv() {
        Ok(Ok(hwnd)) => {
            debug!("Session notifications registered ({:?})", scope);
            Ok(SessionNotification {
                hwnd,
                scope,
                thread: Some(thread),
            })
        }
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(WtsError::new(
                "WTSRegisterSessionNotification",
                ERROR_OPERATION_ABORTED,
            ))
        }
    }
}

fn run(scope: NotifyScope, handler: Handler, ready: mpsc::Sender<WtsResult<usize>>) {
    let hwnd = match create_window() {
        Ok(hwnd) => hwnd,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    HANDLER.with(|h| *h.borrow_mut() = Some(handler));

    if let Err(e) = wts_ffi::register_session_notification(hwnd, scope.to_u32()) {
        // SAFETY: the window belongs to this thread.
        unsafe { DestroyWindow(hwnd) };
        HANDLER.with(|h| h.borrow_mut().take());
        let _ = ready.send(Err(e));
        return;
    }
    let _ = ready.send(Ok(hwnd as usize));

    // SAFETY: MSG is plain data.
    let mut msg: MSG = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: `msg` is a valid out-pointer.
        let ret = unsafe { GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) };
        if ret == 0 || ret == -1 {
            break;
        }
        // SAFETY: `msg` was filled by GetMessageW.
        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    HANDLER.with(|h| h.borrow_mut().take());
}

fn create_window() -> WtsResult<HWND> {
    let class_name = to_wide(CLASS_NAME);
    // SAFETY: null asks for the handle of the current executable.
    let instance = unsafe { GetModuleHandleW(std::ptr::null()) };

    // SAFETY: WNDCLASSEXW is plain data; the fields that matter are set below.
    let mut class: WNDCLASSEXW = unsafe { std::mem::zeroed() };
    class.cbSize = std::mem::size_of::<WNDCLASSEXW>() as u32;
    class.lpfnWndProc = Some(wnd_proc);
    class.hInstance = instance;
    class.lpszClassName = class_name.as_ptr();

    // SAFETY: `class` and the class name outlive the call.
    if unsafe { RegisterClassExW(&class) } == 0 {
        let e = WtsError::last("RegisterClassExW");
        if e.code != ERROR_CLASS_ALREADY_EXISTS {
            return Err(e);
        }
    }

    // SAFETY: class registered above; HWND_MESSAGE makes a message-only window.
    let hwnd = unsafe {
        CreateWindowExW(
            0,
            class_name.as_ptr(),
            class_name.as_ptr(),
            0,
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            std::ptr::null_mut(),
            instance,
            std::ptr::null(),
        )
    };
    if hwnd.is_null() {
        return Err(WtsError::last("CreateWindowExW"));
    }
    Ok(hwnd)
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_WTSSESSION_CHANGE => {
            let event = SessionEvent::from_message(wparam, lparam);
            let handler = HANDLER.with(|h| h.borrow().clone());
            if let Some(handler) = handler {
                if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                    error!("Session notification handler panicked on {:?}", event);
                }
            }
            0
        }
        WM_CLOSE => {
            wts_ffi::unregister_session_notification(hwnd);
            DestroyWindow(hwnd);
            0
        }
        WM_DESTROY => {
            PostQuitMessage(0);
            0
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_and_unregister() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let guard = register_session_notification(NotifyScope::ThisSession, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(guard.scope(), NotifyScope::ThisSession);
        guard.unregister();
    }

    #[test]
    fn drop_after_window_closed_does_not_hang() {
        let guard = register_session_notification(NotifyScope::ThisSession, |_| {}).unwrap();
        // SAFETY: posting to the window owned by the notification thread.
        assert_ne!(unsafe { PostMessageW(guard.hwnd as HWND, WM_CLOSE, 0, 0) }, 0);
        while !guard.thread.as_ref().unwrap().is_finished() {
            thread::sleep(std::time::Duration::from_millis(10));
        }
        drop(guard);
    }

    #[test]
    fn drop_unregisters() {
        let guard = register_session_notification(NotifyScope::AllSessions, |_| {});
        // Registering for all sessions can be refused without the right
        // privileges; either way nothing may leak or hang.
        drop(guard);
    }
}
