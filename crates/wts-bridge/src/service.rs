//! Async service facade over the blocking bridge.
//!
//! Keeps a registry of open server handles keyed by a generated id and runs
//! every native call on tokio's blocking pool, so callers on an async runtime
//! never stall a worker on `WTSSendMessageW` or a slow remote server.

use std::collections::{BTreeMap, HashMap};
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use tokio::sync::{Mutex, RwLock};

use crate::channel::VirtualChannel;
use crate::config::BridgeConfig;
use crate::error::{WtsError, WtsResult};
use crate::error::{ERROR_INVALID_HANDLE, ERROR_OPERATION_ABORTED, ERROR_TOO_MANY_OPEN_FILES};
use crate::notify::{self, SessionNotification};
use crate::server::ServerHandle;
use crate::types::*;
use crate::{messaging, processes, sessions};

/// Shared state for applications that keep one service behind a lock.
pub type WtsServiceState = Arc<Mutex<WtsService>>;

struct OpenServer {
    handle: Arc<ServerHandle>,
    info: ServerInfo,
}

/// Central service managing WTS interactions.
///
/// Calls taking `handle_id: Option<&str>` target the registered server with
/// that id, or the local server for `None`.
pub struct WtsService {
    handles: Mutex<HashMap<String, OpenServer>>,
    /// Opens in flight; they count against `max_open_servers`.
    opening: AtomicUsize,
    config: RwLock<BridgeConfig>,
}

/// A reserved registry slot, released when the open finishes or is dropped.
struct OpenSlot<'a>(&'a AtomicUsize);

impl Drop for OpenSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run a blocking bridge call on the blocking pool. A panic in `f` is
/// resumed on the caller.
async fn blocking<T, F>(f: F) -> WtsResult<T>
where
    F: FnOnce() -> WtsResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
        Err(_) => Err(WtsError::new("spawn_blocking", ERROR_OPERATION_ABORTED)),
    }
}

impl WtsService {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            opening: AtomicUsize::new(0),
            config: RwLock::new(config),
        }
    }

    pub fn new_state() -> WtsServiceState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub async fn config(&self) -> BridgeConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: BridgeConfig) {
        *self.config.write().await = config;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Server handles
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Open a connection to an RD Session Host and register it. The registry
    /// is not locked while the open runs.
    pub async fn open_server(&self, server_name: &str) -> WtsResult<ServerInfo> {
        let max = self.config.read().await.max_open_servers;
        let _slot = {
            let handles = self.handles.lock().await;
            if handles.len() + self.opening.load(Ordering::SeqCst) >= max {
                return Err(WtsError::new("WTSOpenServerW", ERROR_TOO_MANY_OPEN_FILES));
            }
            self.opening.fetch_add(1, Ordering::SeqCst);
            OpenSlot(&self.opening)
        };

        let name = server_name.to_string();
        let handle = blocking(move || ServerHandle::open(&name)).await?;
        let info = ServerInfo {
            handle_id: uuid::Uuid::new_v4().to_string(),
            server_name: handle.display_name().to_string(),
            opened_at: Utc::now(),
        };
        info!("Registered server '{}' as {}", info.server_name, info.handle_id);
        self.handles.lock().await.insert(
            info.handle_id.clone(),
            OpenServer {
                handle: Arc::new(handle),
                info: info.clone(),
            },
        );
        Ok(info)
    }

    /// Close a registered server. The native handle is released once no
    /// in-flight call still holds it.
    pub async fn close_server(&self, handle_id: &str) -> WtsResult<()> {
        match self.handles.lock().await.remove(handle_id) {
            Some(open) => {
                info!("Closed server '{}' ({})", open.info.server_name, handle_id);
                Ok(())
            }
            None => Err(WtsError::new("WTSCloseServer", ERROR_INVALID_HANDLE)),
        }
    }

    /// Close every registered server, returning how many were closed.
    pub async fn close_all_servers(&self) -> usize {
        let mut handles = self.handles.lock().await;
        let count = handles.len();
        handles.clear();
        if count > 0 {
            info!("Closed {} server handles", count);
        }
        count
    }

    pub async fn list_open_servers(&self) -> Vec<ServerInfo> {
        let mut servers: Vec<ServerInfo> = self
            .handles
            .lock()
            .await
            .values()
            .map(|o| o.info.clone())
            .collect();
        servers.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        servers
    }

    /// The registered server for `handle_id`, or the local server.
    pub async fn resolve(&self, handle_id: Option<&str>) -> WtsResult<Arc<ServerHandle>> {
        let Some(id) = handle_id else {
            return Ok(Arc::new(ServerHandle::local()));
        };
        self.handles
            .lock()
            .await
            .get(id)
            .map(|o| Arc::clone(&o.handle))
            .ok_or_else(|| WtsError::new("WTSOpenServerW", ERROR_INVALID_HANDLE))
    }

    async fn with_server<T, F>(&self, handle_id: Option<&str>, f: F) -> WtsResult<T>
    where
        F: FnOnce(&ServerHandle) -> WtsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let server = self.resolve(handle_id).await?;
        blocking(move || f(&server)).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Sessions
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn list_sessions(
        &self,
        handle_id: Option<&str>,
        state: Option<SessionState>,
    ) -> WtsResult<Vec<SessionDescriptor>> {
        self.with_server(handle_id, move |s| match state {
            Some(state) => sessions::list_sessions_in_state(s, state),
            None => sessions::list_sessions(s),
        })
        .await
    }

    pub async fn list_user_sessions(&self, handle_id: Option<&str>) -> WtsResult<Vec<SessionDescriptor>> {
        self.with_server(handle_id, sessions::list_user_sessions).await
    }

    pub async fn session_detail(&self, handle_id: Option<&str>, session_id: u32) -> WtsResult<SessionDetail> {
        self.with_server(handle_id, move |s| sessions::session_detail(s, session_id))
            .await
    }

    pub async fn all_session_details(&self, handle_id: Option<&str>) -> WtsResult<Vec<SessionDetail>> {
        self.with_server(handle_id, sessions::all_session_details).await
    }

    pub async fn find_sessions_by_user(
        &self,
        handle_id: Option<&str>,
        user_pattern: &str,
    ) -> WtsResult<Vec<SessionDetail>> {
        let pattern = user_pattern.to_string();
        self.with_server(handle_id, move |s| sessions::find_sessions_by_user(s, &pattern))
            .await
    }

    pub async fn server_summary(&self, handle_id: Option<&str>) -> WtsResult<ServerSummary> {
        self.with_server(handle_id, sessions::server_summary).await
    }

    pub async fn idle_seconds(&self, handle_id: Option<&str>, session_id: u32) -> WtsResult<Option<u64>> {
        self.with_server(handle_id, move |s| sessions::idle_seconds(s, session_id))
            .await
    }

    pub async fn is_remote_session(&self, handle_id: Option<&str>, session_id: u32) -> WtsResult<bool> {
        self.with_server(handle_id, move |s| sessions::is_remote_session(s, session_id))
            .await
    }

    pub async fn disconnect_session(&self, handle_id: Option<&str>, session_id: u32) -> WtsResult<()> {
        let wait = self.config.read().await.wait_for_operations;
        self.with_server(handle_id, move |s| sessions::disconnect(s, session_id, wait))
            .await
    }

    pub async fn logoff_session(&self, handle_id: Option<&str>, session_id: u32) -> WtsResult<()> {
        let wait = self.config.read().await.wait_for_operations;
        self.with_server(handle_id, move |s| sessions::logoff(s, session_id, wait))
            .await
    }

    pub fn console_session_id(&self) -> Option<u32> {
        sessions::console_session_id()
    }

    pub fn current_session_id(&self) -> WtsResult<u32> {
        sessions::current_session_id()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Processes
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Processes on the server, or only those of `session_id`.
    pub async fn list_processes(
        &self,
        handle_id: Option<&str>,
        session_id: Option<u32>,
    ) -> WtsResult<Vec<ProcessDescriptor>> {
        self.with_server(handle_id, move |s| match session_id {
            Some(id) => processes::list_session_processes(s, id),
            None => processes::list_processes(s),
        })
        .await
    }

    pub async fn list_processes_detailed(
        &self,
        handle_id: Option<&str>,
        session_id: u32,
    ) -> WtsResult<Vec<ProcessDescriptorEx>> {
        self.with_server(handle_id, move |s| processes::list_processes_detailed(s, session_id))
            .await
    }

    pub async fn find_processes_by_name(
        &self,
        handle_id: Option<&str>,
        name_pattern: &str,
    ) -> WtsResult<Vec<ProcessDescriptor>> {
        let pattern = name_pattern.to_string();
        self.with_server(handle_id, move |s| processes::find_processes_by_name(s, &pattern))
            .await
    }

    pub async fn process_count_per_session(&self, handle_id: Option<&str>) -> WtsResult<BTreeMap<u32, usize>> {
        self.with_server(handle_id, processes::process_count_per_session)
            .await
    }

    pub async fn terminate_process(
        &self,
        handle_id: Option<&str>,
        process_id: u32,
        exit_code: u32,
    ) -> WtsResult<()> {
        self.with_server(handle_id, move |s| processes::terminate(s, process_id, exit_code))
            .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Messaging
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// OK box with the configured timeout, waiting for the response.
    pub async fn send_message(
        &self,
        handle_id: Option<&str>,
        session_id: u32,
        title: &str,
        content: &str,
    ) -> WtsResult<MessageResponse> {
        let options = self.config.read().await.message_options();
        self.send_message_with(handle_id, session_id, title, content, options)
            .await
    }

    pub async fn send_message_with(
        &self,
        handle_id: Option<&str>,
        session_id: u32,
        title: &str,
        content: &str,
        options: SendMessageOptions,
    ) -> WtsResult<MessageResponse> {
        let (title, content) = (title.to_string(), content.to_string());
        self.with_server(handle_id, move |s| {
            messaging::send_message_with(s, session_id, &title, &content, options)
        })
        .await
    }

    pub async fn broadcast_message(
        &self,
        handle_id: Option<&str>,
        title: &str,
        content: &str,
    ) -> WtsResult<u32> {
        let timeout = self.config.read().await.message_timeout_secs;
        let (title, content) = (title.to_string(), content.to_string());
        self.with_server(handle_id, move |s| {
            messaging::broadcast_message(s, &title, &content, timeout)
        })
        .await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Channels & notifications
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Open a channel with the configured read timeout and buffer size. The
    /// returned channel does blocking I/O; drive it from a blocking task.
    pub async fn open_channel(
        &self,
        session_id: u32,
        name: &str,
        options: ChannelOptions,
    ) -> WtsResult<VirtualChannel> {
        let (timeout, buffer) = {
            let config = self.config.read().await;
            (config.channel_read_timeout_ms, config.channel_read_buffer)
        };
        let name = name.to_string();
        blocking(move || {
            VirtualChannel::open(session_id, &name, options)
                .map(|c| c.with_read_timeout(timeout).with_read_buffer(buffer))
        })
        .await
    }

    /// Register `handler` for session changes in the configured scope.
    pub async fn watch_sessions<F>(&self, handler: F) -> WtsResult<SessionNotification>
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let scope = self.config.read().await.notify_scope;
        debug!("Watching session changes ({:?})", scope);
        blocking(move || notify::register_session_notification(scope, handler)).await
    }
}

impl Default for WtsService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WtsService {
    fn drop(&mut self) {
        let handles = self.handles.get_mut();
        if !handles.is_empty() {
            info!("Closing {} server handles", handles.len());
            handles.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::WTS_CURRENT_SESSION;

    #[test]
    fn service_state_is_sendable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WtsService>();
        assert_send_sync::<WtsServiceState>();
    }

    #[test]
    fn service_with_config() {
        let cfg = BridgeConfig {
            message_timeout_secs: 60,
            wait_for_operations: false,
            ..BridgeConfig::default()
        };
        let svc = WtsService::with_config(cfg);
        let c = tokio_test::block_on(svc.config());
        assert_eq!(c.message_timeout_secs, 60);
        assert!(!c.wait_for_operations);
    }

    #[tokio::test]
    async fn service_set_config() {
        let svc = WtsService::default();
        let mut cfg = svc.config().await;
        cfg.max_open_servers = 3;
        svc.set_config(cfg).await;
        assert_eq!(svc.config().await.max_open_servers, 3);
    }

    #[tokio::test]
    async fn list_open_servers_initially_empty() {
        let svc = WtsService::new();
        assert!(svc.list_open_servers().await.is_empty());
        assert_eq!(svc.close_all_servers().await, 0);
    }

    #[tokio::test]
    async fn unknown_handle_id_is_invalid_handle() {
        let svc = WtsService::new();
        let err = svc.close_server("missing").await.unwrap_err();
        assert_eq!(err.code, ERROR_INVALID_HANDLE);
        let err = svc.list_sessions(Some("missing"), None).await.unwrap_err();
        assert_eq!(err.code, ERROR_INVALID_HANDLE);
    }

    #[tokio::test]
    async fn open_server_respects_limit() {
        let svc = WtsService::with_config(BridgeConfig {
            max_open_servers: 1,
            ..BridgeConfig::default()
        });
        let first = svc.open_server("localhost").await.unwrap();
        assert_eq!(first.server_name, "(local)");
        let err = svc.open_server(".").await.unwrap_err();
        assert_eq!(err.code, ERROR_TOO_MANY_OPEN_FILES);

        svc.close_server(&first.handle_id).await.unwrap();
        assert!(svc.list_open_servers().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_opens_share_the_limit() {
        let svc = WtsService::with_config(BridgeConfig {
            max_open_servers: 1,
            ..BridgeConfig::default()
        });
        let (a, b) = tokio::join!(svc.open_server("localhost"), svc.open_server("."));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let err = a.err().or(b.err()).unwrap();
        assert_eq!(err.code, ERROR_TOO_MANY_OPEN_FILES);
        assert_eq!(svc.list_open_servers().await.len(), 1);
        assert_eq!(svc.opening.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registry_stays_usable_while_opening() {
        let svc = WtsService::new();
        let open = svc.open_server(".");
        tokio::pin!(open);
        // One poll reserves the slot and starts the blocking open.
        let _ = tokio::time::timeout(std::time::Duration::ZERO, &mut open).await;
        assert!(svc.handles.try_lock().is_ok());
        let info = open.await.unwrap();
        assert_eq!(svc.list_open_servers().await, vec![info]);
        assert_eq!(svc.opening.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn local_sessions_through_registered_handle() {
        let svc = WtsService::new();
        let info = svc.open_server("").await.unwrap();
        let listed = svc.list_sessions(Some(&info.handle_id), None).await.unwrap();
        let direct = svc.list_sessions(None, None).await.unwrap();
        assert_eq!(listed.len(), direct.len());
        assert_eq!(svc.close_all_servers().await, 1);
    }

    #[tokio::test]
    async fn current_session_detail() {
        let svc = WtsService::new();
        let id = svc.current_session_id().unwrap();
        let detail = svc.session_detail(None, id).await.unwrap();
        assert_eq!(detail.session_id, id);
        assert!(svc.console_session_id().map_or(true, |c| c <= 65_535));
    }

    #[tokio::test]
    async fn processes_include_current() {
        let svc = WtsService::new();
        let pid = std::process::id();
        let procs = svc.list_processes(None, None).await.unwrap();
        assert!(procs.iter().any(|p| p.process_id == pid));
        let session = svc.current_session_id().unwrap();
        let counts = svc.process_count_per_session(None).await.unwrap();
        assert!(counts.get(&session).copied().unwrap_or(0) >= 1);
    }

    #[tokio::test]
    async fn open_channel_rejects_bad_static_name() {
        let svc = WtsService::new();
        let err = svc
            .open_channel(WTS_CURRENT_SESSION, "WAYTOOLONG", ChannelOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.call, "WTSVirtualChannelOpenEx");
    }
}
