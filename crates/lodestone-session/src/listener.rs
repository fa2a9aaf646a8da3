//! The capability every phase listener implements.

use std::time::Instant;

use lodestone_net::{ProtocolPhase, ServerboundPacket};

use crate::connection::ConnectionHandle;
use crate::error::{DisconnectReason, SessionError};
use crate::server::ServerContext;

/// What a listener sees while handling a packet or ticking.
pub struct ListenerContext<'a> {
    /// The connection this listener is attached to.
    pub connection: &'a ConnectionHandle,
    /// Server-wide state.
    pub server: &'a mut ServerContext,
    /// Tick time.
    pub now: Instant,
    handoff: Option<Box<dyn PacketListener>>,
}

impl<'a> ListenerContext<'a> {
    pub(crate) fn new(
        connection: &'a ConnectionHandle,
        server: &'a mut ServerContext,
        now: Instant,
    ) -> Self {
        Self {
            connection,
            server,
            now,
            handoff: None,
        }
    }

    /// Replace the connection's listener once the current call returns.
    ///
    /// The current listener receives nothing after that point.
    pub fn hand_off(&mut self, next: Box<dyn PacketListener>) {
        self.handoff = Some(next);
    }

    pub(crate) fn take_handoff(&mut self) -> Option<Box<dyn PacketListener>> {
        self.handoff.take()
    }
}

/// A packet sink for one protocol phase.
///
/// A connection holds exactly one listener. Transitions swap it for a
/// listener of the next phase.
pub trait PacketListener: Send {
    /// Phase whose packets this listener accepts.
    fn phase(&self) -> ProtocolPhase;

    /// Called once, right after this listener became the active one.
    fn on_attach(&mut self, _ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        Ok(())
    }

    /// Handle one decoded packet of [`PacketListener::phase`].
    fn handle_packet(
        &mut self,
        packet: ServerboundPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError>;

    /// Called once per server tick.
    fn tick(&mut self, _ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        Ok(())
    }

    /// Called exactly once when the connection is gone.
    fn on_disconnect(
        &mut self,
        _reason: &DisconnectReason,
        _connection: &ConnectionHandle,
        _server: &mut ServerContext,
    ) {
    }

    /// Whether packets and deferred completions should still take effect.
    fn is_accepting_messages(&self) -> bool {
        true
    }
}
