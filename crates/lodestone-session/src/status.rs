//! Status phase: one status response, one ping, then close.

use lodestone_net::packets::{ClientboundStatus, ServerboundStatus};
use lodestone_net::{ProtocolPhase, ServerboundPacket};

use crate::error::{DisconnectReason, SessionError};
use crate::listener::{ListenerContext, PacketListener};

/// Answers server list queries.
#[derive(Debug, Default)]
pub struct StatusListener {
    answered: bool,
}

impl StatusListener {
    /// New status listener.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketListener for StatusListener {
    fn phase(&self) -> ProtocolPhase {
        ProtocolPhase::Status
    }

    fn handle_packet(
        &mut self,
        packet: ServerboundPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let ServerboundPacket::Status(packet) = packet else {
            return Err(SessionError::violation("expected status packet"));
        };
        match packet {
            ServerboundStatus::StatusRequest => {
                if self.answered {
                    return Err(SessionError::violation("status requested twice"));
                }
                self.answered = true;
                let json = ctx
                    .server
                    .status()
                    .to_json()
                    .map_err(|e| SessionError::violation(format!("status unavailable: {e}")))?;
                ctx.connection
                    .send(ClientboundStatus::StatusResponse { json });
            }
            ServerboundStatus::PingRequest { time } => {
                ctx.connection.send(ClientboundStatus::PongResponse { time });
                ctx.connection
                    .disconnect(DisconnectReason::Custom("status finished".to_string()));
            }
        }
        Ok(())
    }
}
