//! Control channel server over a Unix domain socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::protocol::{codec, decode_request, ControlRequest, ControlResponse};
use crate::error::ControlError;
use crate::observability::spans;
use crate::Result;

/// Invoked for every `reload_config` request; resolves to the success message.
pub type ReloadHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Control server timing.
#[derive(Debug, Clone)]
pub struct ControlServerSettings {
    pub socket_path: PathBuf,
    /// Bound on reading a request and on writing its response.
    pub exchange_timeout: Duration,
    /// Delay before retrying a bind on a busy endpoint.
    pub busy_retry: Duration,
    /// Delay after a failed accept.
    pub accept_retry: Duration,
    /// Consecutive accept failures tolerated before the listener is rebuilt.
    pub max_consecutive_errors: u32,
}

impl ControlServerSettings {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            exchange_timeout: Duration::from_secs(5),
            busy_retry: Duration::from_secs(5),
            accept_retry: Duration::from_millis(100),
            max_consecutive_errors: 5,
        }
    }
}

enum BindError {
    /// Another live server answers on the socket.
    Busy,
    Failed(crate::Error),
}

enum ServeExit {
    Stopped,
    Rebuild,
}

/// Serves one connection at a time until cancelled.
pub struct ControlServer {
    settings: ControlServerSettings,
    reload: ReloadHandler,
}

impl ControlServer {
    pub fn new(settings: ControlServerSettings, reload: ReloadHandler) -> Self {
        Self { settings, reload }
    }

    /// Run the server on its own task.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> ControlServerHandle {
        let socket_path = self.settings.socket_path.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(task_cancel).await });

        ControlServerHandle {
            socket_path,
            cancel,
            task,
        }
    }

    /// Serve until `cancel` fires, then remove the socket file.
    pub async fn run(self, cancel: CancellationToken) {
        let path = self.settings.socket_path.clone();

        while let Some(listener) = self.bind(&cancel).await {
            tracing::info!(path = %path.display(), "Control channel listening");

            let exit = self.serve(&listener, &cancel).await;
            drop(listener);
            remove_socket(&path);

            match exit {
                ServeExit::Stopped => break,
                ServeExit::Rebuild => {
                    tracing::warn!(path = %path.display(), "Rebuilding control channel listener");
                }
            }
        }

        tracing::info!("Control channel stopped");
    }

    /// Bind, retrying while the endpoint is busy. `None` once cancelled.
    async fn bind(&self, cancel: &CancellationToken) -> Option<UnixListener> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            match try_bind(&self.settings.socket_path).await {
                Ok(listener) => return Some(listener),
                Err(BindError::Busy) => {
                    tracing::warn!(
                        path = %self.settings.socket_path.display(),
                        "Control endpoint busy, retrying"
                    );
                }
                Err(BindError::Failed(e)) => {
                    tracing::error!(error = %e, "Failed to bind control channel");
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.settings.busy_retry) => {}
            }
        }
    }

    async fn serve(&self, listener: &UnixListener, cancel: &CancellationToken) -> ServeExit {
        let mut consecutive_errors = 0u32;

        loop {
            let accepted = tokio::select! {
                () = cancel.cancelled() => return ServeExit::Stopped,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _addr)) => {
                    consecutive_errors = 0;
                    tokio::select! {
                        () = cancel.cancelled() => return ServeExit::Stopped,
                        () = self.handle_connection(stream) => {}
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(error = %e, consecutive_errors, "Control accept failed");
                    if consecutive_errors > self.settings.max_consecutive_errors {
                        return ServeExit::Rebuild;
                    }
                    tokio::time::sleep(self.settings.accept_retry).await;
                }
            }
        }
    }

    /// One request, one response, then close.
    async fn handle_connection(&self, stream: UnixStream) {
        let mut framed = Framed::new(stream, codec());
        let timeout = self.settings.exchange_timeout;

        let frame = match tokio::time::timeout(timeout, framed.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                let error = ControlError::Protocol(format!("invalid frame: {e}"));
                tracing::warn!(%error, "Malformed control frame");
                self.respond(&mut framed, "invalid", &ControlResponse::error(error.to_string()))
                    .await;
                return;
            }
            Ok(None) => {
                tracing::debug!("Control client disconnected before sending");
                return;
            }
            Err(_) => {
                tracing::warn!("Control client sent nothing before timeout");
                return;
            }
        };

        let (kind, response) = match decode_request(&frame) {
            Ok(request) => {
                let response = self
                    .dispatch(request)
                    .instrument(spans::control_span(request.kind()))
                    .await;
                (request.kind(), response)
            }
            Err(message) => {
                tracing::warn!(%message, "Rejected control request");
                ("invalid", ControlResponse::error(message))
            }
        };

        self.respond(&mut framed, kind, &response).await;
    }

    async fn respond(
        &self,
        framed: &mut Framed<UnixStream, LengthDelimitedCodec>,
        kind: &str,
        response: &ControlResponse,
    ) {
        let payload = match serde_json::to_vec(response) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode control response");
                return;
            }
        };

        match tokio::time::timeout(self.settings.exchange_timeout, framed.send(payload)).await {
            Ok(Ok(())) => tracing::debug!(command = kind, "Control response sent"),
            Ok(Err(e)) => {
                tracing::warn!(command = kind, error = %e, "Control client disconnected mid-exchange");
            }
            Err(_) => tracing::warn!(command = kind, "Timed out writing control response"),
        }
    }

    async fn dispatch(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Ping => ControlResponse::success("pong"),
            ControlRequest::ReloadConfig => {
                tracing::info!("Reload requested over control channel");
                match (self.reload)().await {
                    Ok(message) => ControlResponse::success(message),
                    Err(e) => {
                        tracing::error!(error = %e, "Reload failed");
                        ControlResponse::error(e.to_string())
                    }
                }
            }
        }
    }
}

/// Handle to a spawned [`ControlServer`].
#[derive(Debug)]
pub struct ControlServerHandle {
    socket_path: PathBuf,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ControlServerHandle {
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Cancel the server and wait up to `timeout` for it to exit.
    pub async fn stop(self, timeout: Duration) {
        self.cancel.cancel();
        let abort = self.task.abort_handle();

        if tokio::time::timeout(timeout, self.task).await.is_err() {
            tracing::warn!("Control channel did not stop in time, abandoning");
            abort.abort();
        }
    }
}

/// Bind the socket, clearing a stale file left by a dead process.
async fn try_bind(path: &Path) -> std::result::Result<UnixListener, BindError> {
    if path.exists() {
        let probe = tokio::time::timeout(Duration::from_millis(500), UnixStream::connect(path)).await;
        match probe {
            // A peer that connects, or hangs on connect, is alive.
            Ok(Ok(_)) | Err(_) => return Err(BindError::Busy),
            Ok(Err(_)) => {
                tracing::debug!(path = %path.display(), "Removing stale control socket");
                std::fs::remove_file(path).map_err(|e| bind_failed(path, &e))?;
            }
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| bind_failed(path, &e))?;
        }
    }

    UnixListener::bind(path).map_err(|e| bind_failed(path, &e))
}

fn remove_socket(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove control socket");
        }
    }
}

fn bind_failed(path: &Path, e: &std::io::Error) -> BindError {
    BindError::Failed(
        ControlError::Bind {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tempfile::TempDir;

    fn ok_handler() -> ReloadHandler {
        Arc::new(|| async { Ok("reloaded".to_string()) }.boxed())
    }

    #[tokio::test]
    async fn test_stale_socket_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ctl.sock");

        // A bound-then-dropped listener leaves a dead socket file behind.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = try_bind(&path).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn test_live_socket_is_busy() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ctl.sock");
        let _live = UnixListener::bind(&path).unwrap();

        assert!(matches!(try_bind(&path).await, Err(BindError::Busy)));
    }

    async fn wait_for_socket(path: &Path) {
        for _ in 0..50 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("control socket never appeared");
    }

    #[tokio::test]
    async fn test_oversized_frame_gets_error_response() {
        use crate::control::{ResponseStatus, MAX_FRAME_LENGTH};
        use tokio::io::AsyncWriteExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ctl.sock");
        let handle = ControlServer::new(ControlServerSettings::new(&path), ok_handler())
            .spawn(CancellationToken::new());
        wait_for_socket(&path).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let len = MAX_FRAME_LENGTH + 6 * 1024;
        let mut raw = u32::try_from(len).unwrap().to_be_bytes().to_vec();
        raw.resize(4 + len, b' ');
        // The server may close before the whole body is written.
        let _ = stream.write_all(&raw).await;

        let mut framed = Framed::new(stream, codec());
        let frame = tokio::time::timeout(Duration::from_secs(2), framed.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let response: ControlResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.contains("invalid frame"));

        handle.stop(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_stop_removes_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("ctl.sock");

        let server = ControlServer::new(ControlServerSettings::new(&path), ok_handler());
        let handle = server.spawn(CancellationToken::new());

        for _ in 0..50 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(path.exists());
        assert_eq!(handle.socket_path(), path.as_path());

        handle.stop(Duration::from_secs(2)).await;
        assert!(!path.exists());
    }
}
