//! Control channel wire format.
//!
//! One length-prefixed JSON frame per request and per response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::LengthDelimitedCodec;

/// Largest frame either side accepts.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Re-read the folder list and restart affected watches.
    ReloadConfig,
    /// Liveness probe.
    Ping,
}

impl ControlRequest {
    /// Wire name of the command.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ReloadConfig => "reload_config",
            Self::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply to exactly one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl ControlResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Frame codec shared by server and client: 4-byte big-endian length.
#[must_use]
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Decode a request frame.
///
/// # Errors
///
/// Returns the message to send back: the JSON error for malformed input,
/// `unknown command: <type>` for anything that is not a known command.
pub fn decode_request(frame: &[u8]) -> std::result::Result<ControlRequest, String> {
    let value: Value =
        serde_json::from_slice(frame).map_err(|e| format!("invalid request: {e}"))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string();

    serde_json::from_value(value).map_err(|_| format!("unknown command: {kind}"))
}
