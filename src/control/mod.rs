//! Control channel: local request/response link to a running engine.
//!
//! A front-end process uses it to trigger a configuration reload or to
//! probe liveness. Transport is a Unix domain socket carrying one
//! length-prefixed JSON frame each way per connection.

mod client;
mod protocol;
mod server;

pub use client::{ControlClient, PING_TIMEOUT, RELOAD_TIMEOUT};
pub use protocol::{
    codec, decode_request, ControlRequest, ControlResponse, ResponseStatus, MAX_FRAME_LENGTH,
};
pub use server::{ControlServer, ControlServerHandle, ControlServerSettings, ReloadHandler};
