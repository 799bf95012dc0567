//! Control channel client: connect, one request, one response, close.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use super::protocol::{codec, ControlRequest, ControlResponse};
use crate::error::ControlError;
use crate::Result;

/// Response timeout for `reload_config`.
pub const RELOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Response timeout for `ping`.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ControlClient {
    socket_path: PathBuf,
    connect_timeout: Duration,
}

impl ControlClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Override how long a connect may take before the service counts as busy.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Liveness probe.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotRunning`], [`ControlError::Busy`] or
    /// [`ControlError::NoResponse`].
    pub async fn ping(&self) -> Result<ControlResponse> {
        self.send(ControlRequest::Ping, PING_TIMEOUT).await
    }

    /// Ask the running service to reload its configuration.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::ping`].
    pub async fn reload(&self) -> Result<ControlResponse> {
        self.send(ControlRequest::ReloadConfig, RELOAD_TIMEOUT)
            .await
    }

    /// Send a typed request.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::ping`].
    pub async fn send(&self, request: ControlRequest, timeout: Duration) -> Result<ControlResponse> {
        let value = serde_json::to_value(request)?;
        self.send_value(&value, timeout).await
    }

    /// Send an arbitrary JSON payload as one request frame.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::ping`].
    pub async fn send_value(&self, value: &Value, timeout: Duration) -> Result<ControlResponse> {
        let stream = self.connect().await?;
        let mut framed = Framed::new(stream, codec());

        let payload = Bytes::from(serde_json::to_vec(value)?);
        match tokio::time::timeout(timeout, framed.send(payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(no_response(format!("failed to send request: {e}"))),
            Err(_) => return Err(no_response("timed out sending request")),
        }

        let frame = match tokio::time::timeout(timeout, framed.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return Err(no_response(format!("failed to read response: {e}"))),
            Ok(None) => return Err(no_response("connection closed without a response")),
            Err(_) => return Err(no_response(format!("no reply within {timeout:?}"))),
        };

        serde_json::from_slice(&frame)
            .map_err(|e| no_response(format!("undecodable response: {e}")))
    }

    async fn connect(&self) -> Result<UnixStream> {
        let path = self.socket_path.display().to_string();

        match tokio::time::timeout(self.connect_timeout, UnixStream::connect(&self.socket_path)).await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) if e.kind() == ErrorKind::WouldBlock => Err(ControlError::Busy {
                reason: format!("backlog full: {e}"),
            }
            .into()),
            Ok(Err(e)) => Err(ControlError::NotRunning {
                path,
                reason: e.to_string(),
            }
            .into()),
            Err(_) => Err(ControlError::Busy {
                reason: format!("connect timed out after {:?}", self.connect_timeout),
            }
            .into()),
        }
    }
}

fn no_response(reason: impl Into<String>) -> crate::Error {
    ControlError::NoResponse {
        reason: reason.into(),
    }
    .into()
}
