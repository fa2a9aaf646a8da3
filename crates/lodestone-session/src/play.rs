//! Play phase: movement, chunk streaming, chat and commands.
//!
//! Chat work from one player is queued on a [`ChatChain`] in arrival
//! order. Messages wait there for the content filter; commands and chat
//! session installs only hold their place. Work is applied strictly in
//! the order it was received.

use std::time::{Duration, Instant};

use lodestone_config::Config;
use lodestone_net::packets::types::{ChatVisibility, FilterMask, RemoteChatSession};
use lodestone_net::packets::{
    ChatPacket, ClientboundPlay, PlayerChatPacket, ServerboundPlay, SignedCommandPacket,
};
use lodestone_net::{ChunkPos, GameProfile, ProtocolPhase, ServerboundPacket};

use crate::chat::chain::{ChainError, SessionKey, SignedMessageChain, VerifiedMessage};
use crate::chat::commands::{CommandAction, CommandError, ParsedCommand};
use crate::chat::filter::{FilterSession, FilteredText};
use crate::chat::ordering::{ChatChain, Released};
use crate::chat::signature::SignedMessageBody;
use crate::chat::throttle::TickThrottler;
use crate::chat::{SharedChatState, is_allowed_chat_character};
use crate::chunks::PlayerChunkSender;
use crate::configuration::ConfigurationListener;
use crate::connection::ConnectionHandle;
use crate::cookie::SessionCookie;
use crate::error::{DisconnectReason, SessionError};
use crate::keepalive::{KeepAlive, KeepAliveAction};
use crate::listener::{ListenerContext, PacketListener};
use crate::players::ServerPlayer;
use crate::server::ServerContext;

/// Chat work waiting for its turn.
#[derive(Debug)]
enum ChatWork {
    Message {
        message: VerifiedMessage,
        decorated: Option<String>,
    },
    Command {
        parsed: ParsedCommand,
        arguments: Vec<(String, VerifiedMessage)>,
    },
    WorldCommand(String),
    InstallSession {
        session: RemoteChatSession,
        key: SessionKey,
    },
}

/// One chat delivery, rendered per recipient.
struct OutgoingChat<'a> {
    sender: &'a GameProfile,
    message: &'a VerifiedMessage,
    filtered: &'a FilteredText,
    decorated: Option<&'a str>,
    chat_type: &'static str,
    target_name: Option<&'a str>,
}

/// Drives a player in the world.
pub struct PlayListener {
    cookie: SessionCookie,
    keep_alive: KeepAlive,
    chat: SharedChatState,
    chain: SignedMessageChain,
    pending: ChatChain<ChatWork>,
    filter: Option<FilterSession>,
    chunks: PlayerChunkSender,
    chat_throttle: TickThrottler,
    drop_throttle: TickThrottler,
    entity_id: i32,
    awaiting_configuration: bool,
    handed_off: bool,
}

impl PlayListener {
    /// Listener for a player who just finished configuration.
    pub fn new(cookie: SessionCookie, now: Instant, config: &Config) -> Self {
        let keep_alive = KeepAlive::new(
            Duration::from_millis(config.network.keep_alive_interval_ms),
            Duration::from_millis(config.network.keep_alive_timeout_ms),
            now,
            cookie.latency_millis,
        );
        let chain = SignedMessageChain::unsigned(cookie.profile.id, config.server.enforce_secure_chat);
        Self {
            keep_alive,
            chat: SharedChatState::new(config.chat.signature_cache_capacity),
            chain,
            pending: ChatChain::default(),
            filter: None,
            chunks: PlayerChunkSender::new(ChunkPos::new(0, 0), config.server.view_distance),
            chat_throttle: TickThrottler::new(config.chat.spam_increment, config.chat.spam_threshold),
            drop_throttle: TickThrottler::new(
                config.chat.spam_increment,
                config.chat.drop_spam_threshold,
            ),
            entity_id: 0,
            awaiting_configuration: false,
            handed_off: false,
            cookie,
        }
    }

    fn view_distance(&self, config: &Config) -> u32 {
        u32::from(self.cookie.client_info.view_distance)
            .min(config.server.view_distance)
            .max(2)
    }

    fn update_view(&mut self, center: ChunkPos, ctx: &mut ListenerContext<'_>) {
        let view_distance = self.view_distance(&ctx.server.config);
        let connection = ctx.connection;
        if self
            .chunks
            .update_view(center, view_distance, |packet| connection.send(packet))
        {
            connection.send(ClientboundPlay::SetChunkCacheCenter { pos: center });
        }
    }

    fn is_exempt(&self, ctx: &ListenerContext<'_>) -> bool {
        ctx.server
            .config
            .server
            .is_exempt_from_throttling(&self.cookie.profile.name)
    }

    fn detect_spam(&mut self, ctx: &ListenerContext<'_>) -> Result<(), SessionError> {
        self.chat_throttle.increment();
        if !self.chat_throttle.is_under_threshold() && !self.is_exempt(ctx) {
            tracing::warn!(player = %self.cookie.profile.name, "Kicking for chat spam");
            return Err(DisconnectReason::Spam.into());
        }
        Ok(())
    }

    fn start_reconfiguration(&mut self, ctx: &mut ListenerContext<'_>) {
        let id = self.cookie.profile.id;
        tracing::info!(player = %self.cookie.profile.name, "Returning to configuration");
        self.awaiting_configuration = true;
        self.pending.clear();
        if let Some(filter) = self.filter.take() {
            filter.cancel();
        }
        ctx.server.players.remove_if_connection(id, ctx.connection.id());
        ctx.server.world.remove_player(id);
        ctx.connection.send(ClientboundPlay::StartConfiguration);
    }

    // --- Movement and chunks ---

    fn handle_move(
        &mut self,
        position: [f64; 3],
        on_ground: bool,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        if !position.iter().all(|v| v.is_finite()) {
            return Err(SessionError::violation("invalid move player packet"));
        }
        let id = self.cookie.profile.id;
        if !ctx.server.world.apply_movement(id, position, on_ground) {
            if let Some([x, y, z]) = ctx.server.world.position(id) {
                ctx.connection
                    .send(ClientboundPlay::PlayerPosition { x, y, z });
            }
            return Ok(());
        }
        self.update_view(ChunkPos::containing(position[0], position[2]), ctx);
        Ok(())
    }

    fn handle_drop(&mut self, full_stack: bool, ctx: &ListenerContext<'_>) {
        self.drop_throttle.increment();
        if !self.drop_throttle.is_under_threshold() && !self.is_exempt(ctx) {
            tracing::debug!(player = %self.cookie.profile.name, "Ignoring item drop spam");
            return;
        }
        tracing::trace!(player = %self.cookie.profile.name, full_stack, "Dropped item");
    }

    // --- Incoming chat ---

    fn handle_chat(
        &mut self,
        chat: ChatPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        validate_message(&chat.message, &ctx.server.config)?;
        if self.cookie.client_info.chat_visibility == ChatVisibility::Hidden {
            system_message(ctx.connection, "chat.disabled.options");
            return Ok(());
        }

        let last_seen = self.chat.apply_update(&chat.last_seen)?;
        let body = SignedMessageBody {
            content: chat.message,
            timestamp: chat.timestamp,
            salt: chat.salt,
            last_seen,
        };
        let message = match self
            .chain
            .unpack(chat.signature.as_ref(), body, ctx.server.now_millis())
        {
            Ok(message) => message,
            Err(e) => {
                self.reject_chat(e, ctx);
                return Ok(());
            }
        };

        let decorated = ctx
            .server
            .world
            .decorate_chat(&self.cookie.profile, &message.body.content);
        let content = message.body.content.clone();
        let work = ChatWork::Message { message, decorated };
        match self.filter.as_mut() {
            Some(filter) => {
                let ticket = filter.submit(content);
                self.pending.push_filtered(ticket, work);
            }
            None => self.pending.push_immediate(work),
        }
        self.drain_chat(ctx)
    }

    fn handle_command(
        &mut self,
        command: String,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        validate_message(&command, &ctx.server.config)?;
        match ctx.server.commands.parse(&command) {
            Ok(parsed) => {
                if parsed.has_signable_arguments() {
                    return Err(DisconnectReason::InvalidCommandSignature.into());
                }
                self.pending.push_immediate(ChatWork::Command {
                    parsed,
                    arguments: Vec::new(),
                });
            }
            Err(CommandError::Unknown(_)) => {
                self.pending.push_immediate(ChatWork::WorldCommand(command));
            }
            Err(e) => {
                system_message(ctx.connection, &e.to_string());
                return Ok(());
            }
        }
        self.drain_chat(ctx)
    }

    fn handle_signed_command(
        &mut self,
        packet: SignedCommandPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        validate_message(&packet.command, &ctx.server.config)?;
        let last_seen = self.chat.apply_update(&packet.last_seen)?;

        let parsed = match ctx.server.commands.parse(&packet.command) {
            Ok(parsed) => parsed,
            Err(CommandError::Unknown(_)) if packet.argument_signatures.is_empty() => {
                self.pending
                    .push_immediate(ChatWork::WorldCommand(packet.command));
                return self.drain_chat(ctx);
            }
            Err(CommandError::Unknown(_)) => {
                self.chain.set_broken();
                self.reject_chat(ChainError::InvalidSignature, ctx);
                return Ok(());
            }
            Err(e) => {
                system_message(ctx.connection, &e.to_string());
                return Ok(());
            }
        };

        let expected: Vec<&str> = parsed.signable_arguments().map(|(name, _)| name).collect();
        let provided: Vec<&str> = packet
            .argument_signatures
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        let signed_chain = matches!(self.chain, SignedMessageChain::Signed { .. });
        if (signed_chain || !provided.is_empty()) && !signatures_match(&expected, &provided) {
            tracing::warn!(
                player = %self.cookie.profile.name,
                "Signed command arguments {provided:?} do not match {expected:?}"
            );
            self.chain.set_broken();
            self.reject_chat(ChainError::InvalidSignature, ctx);
            return Ok(());
        }

        let now_millis = ctx.server.now_millis();
        let mut arguments = Vec::with_capacity(expected.len());
        for (name, value) in parsed.signable_arguments() {
            let signature = packet
                .argument_signatures
                .iter()
                .find(|a| a.name == name)
                .map(|a| &a.signature);
            let body = SignedMessageBody {
                content: value.to_string(),
                timestamp: packet.timestamp,
                salt: packet.salt,
                last_seen: last_seen.clone(),
            };
            match self.chain.unpack(signature, body, now_millis) {
                Ok(message) => arguments.push((name.to_string(), message)),
                Err(e) => {
                    self.reject_chat(e, ctx);
                    return Ok(());
                }
            }
        }

        self.pending
            .push_immediate(ChatWork::Command { parsed, arguments });
        self.drain_chat(ctx)
    }

    fn handle_session_update(
        &mut self,
        session: RemoteChatSession,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let key = match SessionKey::from_remote(&session) {
            Ok(key) => key,
            Err(e) => {
                self.reject_chat(e, ctx);
                return Ok(());
            }
        };
        if key.is_expired(ctx.server.now_millis()) {
            self.reject_chat(ChainError::ExpiredProfileKey, ctx);
            return Ok(());
        }
        self.pending
            .push_immediate(ChatWork::InstallSession { session, key });
        self.drain_chat(ctx)
    }

    fn reject_chat(&self, error: ChainError, ctx: &ListenerContext<'_>) {
        tracing::warn!(player = %self.cookie.profile.name, "Rejected chat: {error}");
        system_message(ctx.connection, error.translation_key());
    }

    // --- Deferred chat work ---

    fn drain_chat(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        let outcomes = self
            .filter
            .as_ref()
            .map(FilterSession::poll)
            .unwrap_or_default();
        for outcome in outcomes {
            self.pending.complete(outcome.ticket, outcome.text);
        }
        for released in self.pending.release() {
            self.apply_chat_work(released, ctx)?;
        }
        Ok(())
    }

    fn apply_chat_work(
        &mut self,
        released: Released<ChatWork>,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        match released.payload {
            ChatWork::Message { message, decorated } => {
                self.detect_spam(ctx)?;
                let filtered = released
                    .filtered
                    .unwrap_or_else(|| FilteredText::passthrough(message.body.content.as_str()));
                tracing::info!(player = %self.cookie.profile.name, "<{}> {}", self.cookie.profile.name, message.body.content);
                broadcast(
                    ctx,
                    &OutgoingChat {
                        sender: &self.cookie.profile,
                        message: &message,
                        filtered: &filtered,
                        decorated: decorated.as_deref(),
                        chat_type: "chat",
                        target_name: None,
                    },
                );
            }
            ChatWork::Command { parsed, arguments } => {
                self.detect_spam(ctx)?;
                self.run_command(&parsed, arguments, ctx);
            }
            ChatWork::WorldCommand(command) => {
                self.detect_spam(ctx)?;
                let profile = self.cookie.profile.clone();
                let reply = ctx.server.world.perform_command(&profile, &command);
                system_message(
                    ctx.connection,
                    reply.as_deref().unwrap_or("command.unknown.command"),
                );
            }
            ChatWork::InstallSession { session, key } => {
                let id = self.cookie.profile.id;
                if let Err(e) = self.chain.install(key) {
                    self.reject_chat(e, ctx);
                    return Ok(());
                }
                tracing::debug!(player = %self.cookie.profile.name, session = %session.session_id, "Installed chat session");
                if let Some(player) = ctx.server.players.get_mut(id) {
                    player.chat_session = Some(session);
                }
                for player in ctx.server.players.iter() {
                    player.connection.send(ClientboundPlay::PlayerInfoChatSession {
                        profile_id: id,
                        session: Some(session),
                    });
                }
            }
        }
        Ok(())
    }

    fn run_command(
        &mut self,
        parsed: &ParsedCommand,
        mut arguments: Vec<(String, VerifiedMessage)>,
        ctx: &mut ListenerContext<'_>,
    ) {
        let mut take = |name: &str| {
            arguments
                .iter()
                .position(|(n, _)| n == name)
                .map(|i| arguments.swap_remove(i).1)
        };
        let Some(action) = ctx.server.commands.action(parsed) else {
            system_message(ctx.connection, "command.unknown.command");
            return;
        };
        match action {
            CommandAction::Whisper { target, .. } => {
                let Some(message) = take("message") else {
                    return;
                };
                let Some(recipient) = ctx.server.players.by_name(&target) else {
                    system_message(ctx.connection, "argument.entity.notfound.player");
                    return;
                };
                let target_name = recipient.profile.name.clone();
                let filtered = FilteredText::passthrough(message.body.content.as_str());
                let max_pending = ctx.server.config.chat.max_pending_acknowledgements;
                let mut chat = OutgoingChat {
                    sender: &self.cookie.profile,
                    message: &message,
                    filtered: &filtered,
                    decorated: None,
                    chat_type: "msg_command_incoming",
                    target_name: Some(&target_name),
                };
                deliver(recipient, &chat, max_pending);
                if let Some(own) = ctx.server.players.get(self.cookie.profile.id) {
                    chat.chat_type = "msg_command_outgoing";
                    deliver(own, &chat, max_pending);
                }
            }
            CommandAction::Say { .. } => {
                if let Some(message) = take("message") {
                    self.broadcast_command(ctx, &message, "say_command");
                }
            }
            CommandAction::Emote { .. } => {
                if let Some(message) = take("action") {
                    self.broadcast_command(ctx, &message, "emote_command");
                }
            }
            CommandAction::Help => {
                let help = ctx
                    .server
                    .commands
                    .list()
                    .iter()
                    .map(|spec| format!("/{} - {}", spec.name, spec.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                system_message(ctx.connection, &help);
            }
        }
    }

    fn broadcast_command(
        &self,
        ctx: &ListenerContext<'_>,
        message: &VerifiedMessage,
        chat_type: &'static str,
    ) {
        let filtered = FilteredText::passthrough(message.body.content.as_str());
        broadcast(
            ctx,
            &OutgoingChat {
                sender: &self.cookie.profile,
                message,
                filtered: &filtered,
                decorated: None,
                chat_type,
                target_name: None,
            },
        );
    }
}

impl PacketListener for PlayListener {
    fn phase(&self) -> ProtocolPhase {
        ProtocolPhase::Play
    }

    fn on_attach(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        let profile = self.cookie.profile.clone();
        self.entity_id = ctx.server.world.add_player(&profile);
        let [x, y, z] = ctx.server.world.spawn_position(profile.id);

        let enforces_secure_chat = ctx.server.config.server.enforce_secure_chat;
        let view_distance = self.view_distance(&ctx.server.config);
        ctx.connection.send(ClientboundPlay::Login {
            entity_id: self.entity_id,
            view_distance,
            enforces_secure_chat,
        });
        ctx.connection
            .send(ClientboundPlay::PlayerPosition { x, y, z });

        for other in ctx.server.players.iter() {
            if let Some(session) = other.chat_session {
                ctx.connection.send(ClientboundPlay::PlayerInfoChatSession {
                    profile_id: other.profile.id,
                    session: Some(session),
                });
            }
        }
        ctx.server.players.add(ServerPlayer {
            profile: profile.clone(),
            connection: ctx.connection.clone(),
            chat: self.chat.clone(),
            client_info: self.cookie.client_info.clone(),
            chat_session: None,
            entity_id: self.entity_id,
            reconfigure_requested: false,
        });
        self.filter = Some(ctx.server.filter_pool.session(profile));

        let center = ChunkPos::containing(x, z);
        self.chunks = PlayerChunkSender::new(center, view_distance);
        let connection = ctx.connection;
        self.chunks
            .update_view(center, view_distance, |packet| connection.send(packet));
        connection.send(ClientboundPlay::SetChunkCacheCenter { pos: center });
        Ok(())
    }

    fn handle_packet(
        &mut self,
        packet: ServerboundPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let ServerboundPacket::Play(packet) = packet else {
            return Err(SessionError::violation("expected play packet"));
        };
        if self.awaiting_configuration
            && !matches!(
                packet,
                ServerboundPlay::KeepAlive { .. } | ServerboundPlay::ConfigurationAcknowledged
            )
        {
            tracing::trace!(player = %self.cookie.profile.name, "Ignoring packet while reconfiguring");
            return Ok(());
        }

        match packet {
            ServerboundPlay::KeepAlive { id } => {
                self.keep_alive.respond(id, ctx.now)?;
                self.cookie = self.cookie.with_latency(self.keep_alive.latency_millis());
            }
            ServerboundPlay::ClientInformation(info) => {
                self.cookie = self.cookie.with_client_info(info.clone());
                if let Some(player) = ctx.server.players.get_mut(self.cookie.profile.id) {
                    player.client_info = info;
                }
                let center = self.chunks.center();
                self.update_view(center, ctx);
            }
            ServerboundPlay::ConfigurationAcknowledged => {
                if !self.awaiting_configuration {
                    return Err(SessionError::violation("unrequested configuration acknowledgement"));
                }
                self.handed_off = true;
                let next = ConfigurationListener::new(self.cookie.clone(), ctx.now, &ctx.server.config);
                ctx.hand_off(Box::new(next));
            }
            ServerboundPlay::MovePlayer { x, y, z, on_ground } => {
                self.handle_move([x, y, z], on_ground, ctx)?;
            }
            ServerboundPlay::ChunkBatchReceived {
                desired_chunks_per_tick,
            } => {
                self.chunks.on_batch_received(desired_chunks_per_tick);
            }
            ServerboundPlay::DropItem { full_stack } => self.handle_drop(full_stack, ctx),
            ServerboundPlay::Chat(chat) => self.handle_chat(chat, ctx)?,
            ServerboundPlay::ChatCommand { command } => self.handle_command(command, ctx)?,
            ServerboundPlay::ChatCommandSigned(packet) => {
                self.handle_signed_command(packet, ctx)?;
            }
            ServerboundPlay::ChatAck { offset } => self.chat.apply_offset(offset)?,
            ServerboundPlay::ChatSessionUpdate(session) => {
                self.handle_session_update(session, ctx)?;
            }
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        if let KeepAliveAction::Challenge(id) = self.keep_alive.tick(ctx.now)? {
            ctx.connection.send(ClientboundPlay::KeepAlive { id });
        }
        if self.awaiting_configuration {
            return Ok(());
        }

        self.chat_throttle.tick();
        self.drop_throttle.tick();

        let id = self.cookie.profile.id;
        let requested = ctx
            .server
            .players
            .get(id)
            .is_some_and(|p| p.reconfigure_requested && p.connection.id() == ctx.connection.id());
        if requested {
            self.start_reconfiguration(ctx);
            return Ok(());
        }

        self.drain_chat(ctx)?;

        let connection = ctx.connection;
        self.chunks
            .send_next_chunks(ctx.server.world.as_ref(), |packet| connection.send(packet));
        Ok(())
    }

    fn on_disconnect(
        &mut self,
        reason: &DisconnectReason,
        connection: &ConnectionHandle,
        server: &mut ServerContext,
    ) {
        tracing::info!(player = %self.cookie.profile.name, "Lost connection: {reason}");
        if let Some(filter) = self.filter.take() {
            filter.cancel();
        }
        self.pending.clear();
        let id = self.cookie.profile.id;
        server.players.remove_if_connection(id, connection.id());
        if server.sessions.unregister(id, connection.id()) {
            server.world.remove_player(id);
        }
    }

    fn is_accepting_messages(&self) -> bool {
        !self.handed_off
    }
}

fn system_message(connection: &ConnectionHandle, content: &str) {
    connection.send(ClientboundPlay::SystemChat {
        content: content.to_string(),
        overlay: false,
    });
}

fn validate_message(text: &str, config: &Config) -> Result<(), SessionError> {
    if !text.chars().all(is_allowed_chat_character) {
        return Err(DisconnectReason::IllegalCharacters.into());
    }
    if text.chars().count() > config.chat.max_message_length {
        return Err(SessionError::violation("chat message too long"));
    }
    Ok(())
}

/// Whether the signed argument names are exactly the expected ones.
fn signatures_match(expected: &[&str], provided: &[&str]) -> bool {
    let mut expected = expected.to_vec();
    let mut provided = provided.to_vec();
    expected.sort_unstable();
    provided.sort_unstable();
    expected == provided
}

fn broadcast(ctx: &ListenerContext<'_>, chat: &OutgoingChat<'_>) {
    let max_pending = ctx.server.config.chat.max_pending_acknowledgements;
    for recipient in ctx.server.players.iter() {
        deliver(recipient, chat, max_pending);
    }
}

/// Send `chat` to one recipient, tracking its signature for acknowledgement.
fn deliver(recipient: &ServerPlayer, chat: &OutgoingChat<'_>, max_pending: usize) {
    if recipient.client_info.chat_visibility != ChatVisibility::Full {
        return;
    }
    let message = chat.message;
    let filter_mask = if recipient.client_info.text_filtering_enabled {
        chat.filtered.mask.clone()
    } else {
        FilterMask::PassThrough
    };

    let mut state = recipient.chat.lock();
    let last_seen = state.cache.pack_all(&message.body.last_seen);
    if let Some(signature) = message.signature {
        state.cache.push(&message.body.last_seen, Some(signature));
        state.validator.add_pending(signature);
    }
    let pending = state.validator.pending_count();
    drop(state);

    recipient
        .connection
        .send(ClientboundPlay::PlayerChat(Box::new(PlayerChatPacket {
            sender: chat.sender.id,
            sender_name: chat.sender.name.clone(),
            index: message.link.map_or(0, |link| link.index),
            signature: message.signature,
            content: message.body.content.clone(),
            timestamp: message.body.timestamp,
            salt: message.body.salt,
            last_seen,
            unsigned_content: chat.decorated.map(str::to_string),
            filter_mask,
            chat_type: chat.chat_type.to_string(),
            target_name: chat.target_name.map(str::to_string),
        })));

    if pending > max_pending {
        tracing::warn!(
            player = %recipient.profile.name,
            pending,
            "Too many unacknowledged chat messages"
        );
        recipient
            .connection
            .disconnect(DisconnectReason::TooManyPendingChats);
    }
}
