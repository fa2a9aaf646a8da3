//! Configuration tasks, run one at a time in queue order.

use lodestone_config::ResourcePackConfig;
use lodestone_net::packets::ClientboundConfiguration;
use lodestone_net::packets::types::{KnownPack, RegistryEntry};
use uuid::Uuid;

use crate::cookie::SessionCookie;
use crate::listener::ListenerContext;
use crate::world::WorldError;

/// Identity of a task, used to finish the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Known-pack negotiation and registry data.
    SynchronizeRegistries,
    /// Code of conduct acceptance.
    CodeOfConduct,
    /// Server resource pack.
    ResourcePack,
    /// Loading the spawn area.
    PrepareSpawn,
    /// Final signal to enter Play.
    JoinWorld,
}

/// A task failed to start or tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Generic failure.
    #[error("{0}")]
    Failed(String),
    /// The world refused an operation.
    #[error(transparent)]
    World(#[from] WorldError),
}

/// One unit of configuration work.
pub trait ConfigurationTask: Send {
    /// Which task this is.
    fn task_type(&self) -> TaskType;

    /// Called once when the task becomes active.
    fn start(
        &mut self,
        ctx: &mut ListenerContext<'_>,
        cookie: &SessionCookie,
    ) -> Result<(), TaskError>;

    /// Polled every tick while active. `true` finishes the task.
    fn tick(
        &mut self,
        _ctx: &mut ListenerContext<'_>,
        _cookie: &SessionCookie,
    ) -> Result<bool, TaskError> {
        Ok(false)
    }
}

/// Offers the server's known packs; finished when the client answers.
#[derive(Debug, Default)]
pub struct SynchronizeRegistriesTask;

impl ConfigurationTask for SynchronizeRegistriesTask {
    fn task_type(&self) -> TaskType {
        TaskType::SynchronizeRegistries
    }

    fn start(&mut self, ctx: &mut ListenerContext<'_>, _: &SessionCookie) -> Result<(), TaskError> {
        let packs = ctx.server.world.known_packs();
        ctx.connection
            .send(ClientboundConfiguration::SelectKnownPacks { packs });
        Ok(())
    }
}

/// Send every registry, omitting entry data the client already has from a shared pack.
pub fn send_registry_data(ctx: &mut ListenerContext<'_>, client_packs: &[KnownPack]) {
    let server_packs = ctx.server.world.known_packs();
    let client_has_all = server_packs.iter().all(|pack| client_packs.contains(pack));
    for registry in ctx.server.world.registries() {
        let entries = registry
            .entries
            .into_iter()
            .map(|entry| RegistryEntry {
                data: if client_has_all { None } else { entry.data },
                ..entry
            })
            .collect();
        ctx.connection.send(ClientboundConfiguration::RegistryData {
            registry: registry.id,
            entries,
        });
    }
}

/// Shows the code of conduct; finished when the client accepts.
#[derive(Debug)]
pub struct CodeOfConductTask {
    text: String,
}

impl CodeOfConductTask {
    /// Task presenting `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ConfigurationTask for CodeOfConductTask {
    fn task_type(&self) -> TaskType {
        TaskType::CodeOfConduct
    }

    fn start(&mut self, ctx: &mut ListenerContext<'_>, _: &SessionCookie) -> Result<(), TaskError> {
        if self.text.trim().is_empty() {
            return Err(TaskError::Failed("empty code of conduct".to_string()));
        }
        ctx.connection.send(ClientboundConfiguration::CodeOfConduct {
            text: self.text.clone(),
        });
        Ok(())
    }
}

/// Pushes the server resource pack; finished on a terminal client report.
#[derive(Debug)]
pub struct ResourcePackTask {
    id: Uuid,
    pack: ResourcePackConfig,
}

impl ResourcePackTask {
    /// Task pushing `pack`. Its id is derived from the URL.
    pub fn new(pack: ResourcePackConfig) -> Self {
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, pack.url.as_bytes()),
            pack,
        }
    }

    /// Pack id the client reports against.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl ConfigurationTask for ResourcePackTask {
    fn task_type(&self) -> TaskType {
        TaskType::ResourcePack
    }

    fn start(&mut self, ctx: &mut ListenerContext<'_>, _: &SessionCookie) -> Result<(), TaskError> {
        ctx.connection
            .send(ClientboundConfiguration::ResourcePackPush {
                id: self.id,
                url: self.pack.url.clone(),
                hash: self.pack.hash.clone(),
                required: self.pack.required,
                prompt: self.pack.prompt.clone(),
            });
        Ok(())
    }
}

/// Waits for the world to load the spawn area.
#[derive(Debug, Default)]
pub struct PrepareSpawnTask;

impl ConfigurationTask for PrepareSpawnTask {
    fn task_type(&self) -> TaskType {
        TaskType::PrepareSpawn
    }

    fn start(
        &mut self,
        ctx: &mut ListenerContext<'_>,
        cookie: &SessionCookie,
    ) -> Result<(), TaskError> {
        ctx.server.world.prepare_spawn(&cookie.profile)?;
        Ok(())
    }

    fn tick(
        &mut self,
        ctx: &mut ListenerContext<'_>,
        cookie: &SessionCookie,
    ) -> Result<bool, TaskError> {
        Ok(ctx.server.world.is_spawn_ready(cookie.profile.id))
    }
}

/// Tells the client configuration is done; finished by its acknowledgement.
#[derive(Debug, Default)]
pub struct JoinWorldTask;

impl ConfigurationTask for JoinWorldTask {
    fn task_type(&self) -> TaskType {
        TaskType::JoinWorld
    }

    fn start(&mut self, ctx: &mut ListenerContext<'_>, _: &SessionCookie) -> Result<(), TaskError> {
        ctx.connection
            .send(ClientboundConfiguration::FinishConfiguration);
        Ok(())
    }
}
