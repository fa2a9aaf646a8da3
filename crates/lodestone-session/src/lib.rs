//! Connection sessions for the Lodestone server.
//!
//! Every connection is driven by one [`PacketListener`] at a time. Listeners
//! hand off to their successor as the connection moves through handshake,
//! status, login, configuration and play. All listener work happens on the
//! server tick; socket I/O stays on the transport tasks in `lodestone-net`.

pub mod chat;
pub mod chunks;
pub mod configuration;
pub mod connection;
pub mod cookie;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod keepalive;
pub mod listener;
pub mod login;
pub mod play;
pub mod players;
pub mod server;
pub mod status;
pub mod world;

#[cfg(test)]
mod testing;

pub use chat::filter::{BlockListFilter, FilteredText, PassthroughFilter, TextFilter};
pub use configuration::ConfigurationListener;
pub use connection::{Connection, ConnectionHandle};
pub use cookie::SessionCookie;
pub use error::{DisconnectReason, SessionError};
pub use handshake::HandshakeListener;
pub use identity::{IdentityError, IdentityService, OfflineIdentityService, StaticIdentityService};
pub use listener::{ListenerContext, PacketListener};
pub use login::LoginListener;
pub use play::PlayListener;
pub use players::{PlayerList, ServerPlayer, SessionRegistry};
pub use server::{Server, ServerContext};
pub use status::StatusListener;
pub use world::{FlatWorld, World, WorldError};
