//! Configuration phase: a FIFO of setup tasks with one active at a time.

pub mod tasks;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use lodestone_config::Config;
use lodestone_net::packets::{ClientboundConfiguration, ServerboundConfiguration};
use lodestone_net::{ProtocolPhase, ServerboundPacket};
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::cookie::SessionCookie;
use crate::error::{DisconnectReason, SessionError};
use crate::keepalive::{KeepAlive, KeepAliveAction};
use crate::listener::{ListenerContext, PacketListener};
use crate::play::PlayListener;
use crate::server::ServerContext;

use tasks::{
    CodeOfConductTask, ConfigurationTask, JoinWorldTask, PrepareSpawnTask, ResourcePackTask,
    SynchronizeRegistriesTask, TaskType, send_registry_data,
};

/// Runs the configuration tasks, then hands the connection to Play.
pub struct ConfigurationListener {
    cookie: SessionCookie,
    keep_alive: KeepAlive,
    queue: VecDeque<Box<dyn ConfigurationTask>>,
    current: Option<Box<dyn ConfigurationTask>>,
    /// Id and required flag of the pushed resource pack.
    resource_pack: Option<(Uuid, bool)>,
    finished: bool,
}

impl ConfigurationListener {
    /// Listener with the standard task queue for `config`.
    pub fn new(cookie: SessionCookie, now: Instant, config: &Config) -> Self {
        let mut queue: VecDeque<Box<dyn ConfigurationTask>> = VecDeque::new();
        queue.push_back(Box::new(SynchronizeRegistriesTask));
        if let Some(text) = &config.server.code_of_conduct {
            queue.push_back(Box::new(CodeOfConductTask::new(text.clone())));
        }
        let mut resource_pack = None;
        if let Some(pack) = &config.server.resource_pack {
            let task = ResourcePackTask::new(pack.clone());
            resource_pack = Some((task.id(), pack.required));
            queue.push_back(Box::new(task));
        }
        queue.push_back(Box::new(PrepareSpawnTask));
        queue.push_back(Box::new(JoinWorldTask));

        let keep_alive = KeepAlive::new(
            Duration::from_millis(config.network.keep_alive_interval_ms),
            Duration::from_millis(config.network.keep_alive_timeout_ms),
            now,
            cookie.latency_millis,
        );
        Self {
            cookie,
            keep_alive,
            queue,
            current: None,
            resource_pack,
            finished: false,
        }
    }

    /// Type of the active task.
    pub fn current_task(&self) -> Option<TaskType> {
        self.current.as_ref().map(|t| t.task_type())
    }

    fn start_next_task(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        if self.current.is_some() {
            return Ok(());
        }
        let Some(mut task) = self.queue.pop_front() else {
            return Ok(());
        };
        tracing::debug!(
            player = %self.cookie.profile.name,
            "Starting configuration task {:?}",
            task.task_type()
        );
        task.start(ctx, &self.cookie).map_err(|e| {
            tracing::error!(
                player = %self.cookie.profile.name,
                "Configuration task {:?} failed to start: {e}",
                task.task_type()
            );
            SessionError::from(e)
        })?;
        self.current = Some(task);
        Ok(())
    }

    fn finish_current_task(
        &mut self,
        expected: TaskType,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let active = self.current_task();
        if active != Some(expected) {
            return Err(SessionError::violation(format!(
                "unexpected completion of {expected:?}, active task is {active:?}"
            )));
        }
        self.current = None;
        self.start_next_task(ctx)
    }

    fn tick_current_task(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        let Some(task) = self.current.as_mut() else {
            return Ok(());
        };
        let task_type = task.task_type();
        let done = task.tick(ctx, &self.cookie).map_err(|e| {
            tracing::error!(
                player = %self.cookie.profile.name,
                "Configuration task {task_type:?} failed: {e}"
            );
            SessionError::from(e)
        })?;
        if done {
            self.finish_current_task(task_type, ctx)?;
        }
        Ok(())
    }
}

impl PacketListener for ConfigurationListener {
    fn phase(&self) -> ProtocolPhase {
        ProtocolPhase::Configuration
    }

    fn on_attach(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        self.start_next_task(ctx)
    }

    fn handle_packet(
        &mut self,
        packet: ServerboundPacket,
        ctx: &mut ListenerContext<'_>,
    ) -> Result<(), SessionError> {
        let ServerboundPacket::Configuration(packet) = packet else {
            return Err(SessionError::violation("expected configuration packet"));
        };
        match packet {
            ServerboundConfiguration::ClientInformation(info) => {
                self.cookie = self.cookie.with_client_info(info);
            }
            ServerboundConfiguration::KeepAlive { id } => {
                self.keep_alive.respond(id, ctx.now)?;
                self.cookie = self.cookie.with_latency(self.keep_alive.latency_millis());
            }
            ServerboundConfiguration::SelectKnownPacks { packs } => {
                if self.current_task() != Some(TaskType::SynchronizeRegistries) {
                    return Err(SessionError::violation("unexpected known packs"));
                }
                send_registry_data(ctx, &packs);
                self.finish_current_task(TaskType::SynchronizeRegistries, ctx)?;
            }
            ServerboundConfiguration::ResourcePack { id, action } => {
                tracing::debug!(player = %self.cookie.profile.name, %id, "Resource pack {action:?}");
                let Some((pack_id, required)) = self.resource_pack else {
                    return Ok(());
                };
                if id != pack_id || !action.is_terminal() {
                    return Ok(());
                }
                if !action.is_success() && required {
                    return Err(DisconnectReason::RequiredResourcePack.into());
                }
                self.finish_current_task(TaskType::ResourcePack, ctx)?;
            }
            ServerboundConfiguration::AcceptCodeOfConduct => {
                self.finish_current_task(TaskType::CodeOfConduct, ctx)?;
            }
            ServerboundConfiguration::FinishConfiguration => {
                self.finish_current_task(TaskType::JoinWorld, ctx)?;
                self.finished = true;
                tracing::debug!(player = %self.cookie.profile.name, "Configuration finished");
                let next = PlayListener::new(self.cookie.clone(), ctx.now, &ctx.server.config);
                ctx.hand_off(Box::new(next));
            }
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut ListenerContext<'_>) -> Result<(), SessionError> {
        if let KeepAliveAction::Challenge(id) = self.keep_alive.tick(ctx.now)? {
            ctx.connection
                .send(ClientboundConfiguration::KeepAlive { id });
        }
        self.tick_current_task(ctx)
    }

    fn on_disconnect(
        &mut self,
        reason: &DisconnectReason,
        connection: &ConnectionHandle,
        server: &mut ServerContext,
    ) {
        tracing::info!(
            player = %self.cookie.profile.name,
            "Lost connection during configuration: {reason}"
        );
        self.current = None;
        self.queue.clear();
        if server
            .sessions
            .unregister(self.cookie.profile.id, connection.id())
        {
            server.world.remove_player(self.cookie.profile.id);
        }
    }

    fn is_accepting_messages(&self) -> bool {
        !self.finished
    }
}
