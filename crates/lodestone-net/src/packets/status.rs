//! Status phase: server list ping.

use serde::{Deserialize, Serialize};

/// Serverbound status packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerboundStatus {
    /// Ask for the status document.
    StatusRequest,
    /// Latency probe, echoed back.
    PingRequest {
        /// Client timestamp.
        time: i64,
    },
}

/// Clientbound status packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientboundStatus {
    /// JSON status document.
    StatusResponse {
        /// Serialized status.
        json: String,
    },
    /// Echo of [`ServerboundStatus::PingRequest`].
    PongResponse {
        /// Client timestamp from the request.
        time: i64,
    },
}
