//! Login phase: identity, key exchange and duplicate-session resolution.
//!
//! ```text
//! Hello -> [Key] -> Authenticating -> Verifying -> [WaitingForDupe]
//!       -> ProtocolSwitching -> Accepted
//! ```
//!
//! The identity service is called on a dedicated thread per login. The
//! tick loop polls its result; the thread never touches connection state.

pub mod crypto;

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use lodestone_net::packets::{ClientboundLogin, ServerboundLogin};
use lodestone_net::{GameProfile, ProtocolPhase, ServerboundPacket};

use crate::configuration::ConfigurationListener;
use crate::cookie::SessionCookie;
use crate::error::{DisconnectReason, SessionError};
use crate::identity::{IdentityError, offline_profile};
use crate::listener::{ListenerContext, PacketListener};

use crypto::server_digest;

/// Longest accepted player name.
pub const MAX_NAME_LENGTH: usize = 16;

/// Whether `name` is an acceptable player name.
pub fn is_valid_player_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_NAME_LENGTH
        && name.chars().all(|c| c > ' ' && c < '\u{7f}')
}

enum LoginState {
    Hello,
    Key {
        name: String,
        challenge: [u8; 4],
    },
    Authenticating {
        name: String,
        result: Receiver<Result<GameProfile, IdentityError>>,
    },
    Verifying {
        profile: GameProfile,
    },
    WaitingForDupe {
        profile: GameProfile,
    },
    ProtocolSwitching {
        profile: GameProfile,
    },
    Accepted,
}

impl LoginState {
    fn name(&self) -> &'static str {
        match self {
            LoginState::Hello => "hello",
            LoginState::Key { .. } => "key",
            LoginState::Authenticating { .. } => "authenticating",
            LoginState::Verifying { .. } => "verifying",
            LoginState::WaitingForDupe { .. } => "waiting for duplicate disconnect",
            LoginState::ProtocolSwitching { .. } => "protocol switching",
            LoginState::Accepted => "accepted",
        }
    }
}

/// Drives one login to acceptance.
pub struct LoginListener {
    state: LoginState,
    ticks: u32,
    transferred: bool,
    server_id: String,
}

impl LoginListener {
    /// Login that arrived directly (`false`) or through a transfer (`true`).
    pub fn new(transferred: bool) -> Self {
        Self {
            state: LoginState::Hello,
            ticks: 0,
            transferred,
            server_id: String::new(),
        }
    }

    fn handle_hello(
        &mut self,
        name: String,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        if !matches!(self.state, LoginState::Hello) {
            return Err(SessionError::violation("unexpected hello"));
        }
        if !is_valid_player_name(&name) {
            return Err(DisconnectReason::InvalidPlayerName.into());
        }

        let config = &ctx.server.config.server;
        if config.single_player_owner.as_deref() == Some(name.as_str()) {
            tracing::debug!(player = %name, "Single-player owner, skipping authentication");
            self.state = LoginState::Verifying {
                profile: offline_profile(&name),
            };
        } else if config.online_mode {
            let challenge = rand::random::<[u8; 4]>();
            ctx.connection.send(ClientboundLogin::Hello {
                server_id: self.server_id.clone(),
                public_key: ctx.server.key_pair.public_bytes(),
                challenge,
                should_authenticate: true,
            });
            self.state = LoginState::Key { name, challenge };
        } else {
            self.state = LoginState::Verifying {
                profile: offline_profile(&name),
            };
        }
        Ok(())
    }

    fn handle_key(
        &mut self,
        public_key: [u8; 32],
        encrypted_challenge: Vec<u8>,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let LoginState::Key { name, challenge } = &self.state else {
            return Err(SessionError::violation("unexpected key"));
        };
        let keys = ctx
            .server
            .key_pair
            .derive(&public_key)
            .ok_or_else(|| SessionError::violation("invalid client key"))?;
        if !keys.verify_challenge(&encrypted_challenge, challenge) {
            return Err(SessionError::violation("challenge mismatch"));
        }
        ctx.connection.enable_encryption(&keys.session_key);

        let digest = server_digest(
            &self.server_id,
            &keys.shared,
            &ctx.server.key_pair.public_bytes(),
        );
        let name = name.clone();
        let identity = ctx.server.identity.clone();
        let address = Some(ctx.connection.remote_addr().ip());
        let (tx, rx) = bounded(1);
        let thread_name = format!("User Authenticator #{}", ctx.server.next_authenticator_id());

        let lookup_name = name.clone();
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let _ = tx.send(identity.has_joined(&lookup_name, &digest, address));
            })
            .map_err(|e| {
                tracing::error!("Failed to spawn authenticator thread: {e}");
                SessionError::from(DisconnectReason::AuthServersDown)
            })?;

        self.state = LoginState::Authenticating { name, result: rx };
        Ok(())
    }

    fn poll_authentication(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        let LoginState::Authenticating { name, result } = &self.state else {
            return Ok(());
        };
        let outcome = match result.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return Ok(()),
            Err(TryRecvError::Disconnected) => {
                Err(IdentityError::Unavailable("authenticator exited".to_string()))
            }
        };

        let profile = match outcome {
            Ok(profile) => {
                tracing::info!(player = %profile.name, uuid = %profile.id, "Authenticated");
                profile
            }
            Err(IdentityError::Unavailable(detail)) => {
                if ctx.server.config.server.single_player_owner.is_some() {
                    tracing::warn!(player = %name, "Identity service unavailable ({detail}), using offline profile");
                    offline_profile(name)
                } else {
                    tracing::error!(player = %name, "Identity service unavailable: {detail}");
                    return Err(DisconnectReason::AuthServersDown.into());
                }
            }
            Err(IdentityError::Invalid) => {
                tracing::warn!(player = %name, "Identity service rejected login");
                return Err(DisconnectReason::UnverifiedUsername.into());
            }
        };
        self.state = LoginState::Verifying { profile };
        Ok(())
    }

    fn verify(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        let LoginState::Verifying { profile } = &self.state else {
            return Ok(());
        };
        let profile = profile.clone();
        let server = &ctx.server.config.server;
        let full = ctx.server.sessions.len() >= server.max_players as usize
            && server.single_player_owner.as_deref() != Some(profile.name.as_str())
            && !ctx.server.sessions.contains(profile.id);
        if full {
            return Err(DisconnectReason::ServerFull.into());
        }

        let threshold = ctx.server.config.network.compression_threshold;
        if let Some(compression) = ctx.server.config.network.compression() {
            ctx.connection
                .send(ClientboundLogin::LoginCompression { threshold });
            ctx.connection.set_compression(Some(compression));
        }

        if ctx
            .server
            .sessions
            .disconnect_profile(profile.id, DisconnectReason::DuplicateLogin)
        {
            tracing::info!(player = %profile.name, "Disconnecting previous session");
            self.state = LoginState::WaitingForDupe { profile };
        } else {
            self.finish(profile, ctx);
        }
        Ok(())
    }

    fn finish(&mut self, profile: GameProfile, ctx: &mut ListenerContext<'_>) {
        ctx.connection.send(ClientboundLogin::LoginFinished {
            profile: profile.clone(),
        });
        self.state = LoginState::ProtocolSwitching { profile };
    }
}

impl PacketListener for LoginListener {
    fn phase(&self) -> ProtocolPhase {
        ProtocolPhase::Login
    }

    fn handle_packet(
        &mut self,
        packet: ServerboundPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let ServerboundPacket::Login(packet) = packet else {
            return Err(SessionError::violation("expected login packet"));
        };
        match packet {
            ServerboundLogin::Hello { name, .. } => self.handle_hello(name, ctx),
            ServerboundLogin::Key {
                public_key,
                encrypted_challenge,
            } => self.handle_key(public_key, encrypted_challenge, ctx),
            ServerboundLogin::LoginAcknowledged => {
                let state = std::mem::replace(&mut self.state, LoginState::Accepted);
                let LoginState::ProtocolSwitching { profile } = state else {
                    let detail = format!("login acknowledged while {}", state.name());
                    self.state = state;
                    return Err(SessionError::violation(detail));
                };
                ctx.server
                    .sessions
                    .register(profile.id, ctx.connection.clone());
                let cookie = SessionCookie::initial(profile, self.transferred);
                let next = ConfigurationListener::new(cookie, ctx.now, &ctx.server.config);
                ctx.hand_off(Box::new(next));
                Ok(())
            }
        }
    }

    fn tick(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        self.ticks += 1;
        if self.ticks >= ctx.server.config.network.login_timeout_ticks {
            tracing::info!(
                connection = %ctx.connection.id(),
                "Login timed out while {}",
                self.state.name()
            );
            return Err(DisconnectReason::SlowLogin.into());
        }

        self.poll_authentication(ctx)?;
        self.verify(ctx)?;
        if let LoginState::WaitingForDupe { profile } = &self.state
            && !ctx.server.sessions.contains(profile.id)
        {
            let profile = profile.clone();
            self.finish(profile, ctx);
        }
        Ok(())
    }

    fn is_accepting_messages(&self) -> bool {
        !matches!(self.state, LoginState::Accepted)
    }
}
