//! The world driver: one tokio task that owns the [`World`].
//!
//! All engine mutation happens on this task. Sessions and command handlers
//! talk to it through a cloneable [`DriverHandle`]; player-facing messages
//! come back on an unbounded channel; readers that only need to look (a
//! `who` list, a web status page) read the [`SnapshotBoard`] without
//! touching the task.
//!
//! The driver pulses the world on a fixed interval, measuring the real
//! elapsed time between ticks with tokio's clock, and autosaves on a second
//! interval when a store is attached. A final save runs on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hexis_core::{
    ActionCategory, Effect, EffectRef, EffectStore, HexisError, Message, OwnerId, OwnerKind,
    OwnerSnapshot, PulseBudgetMonitor, World,
};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::WorldConfig;
use crate::events::GameEvent;
use crate::gate::{CommandGate, Refusal};
use crate::systems;

/// Capacity of the command channel.
const COMMAND_CAPACITY: usize = 1024;

/// Latest published snapshot of every owner, keyed by owner.
pub type SnapshotBoard = Arc<RwLock<HashMap<OwnerId, OwnerSnapshot>>>;

type WorldFn = Box<dyn FnOnce(&mut World) + Send>;

// ---------------------------------------------------------------------------
// Commands & errors
// ---------------------------------------------------------------------------

/// Requests the driver task handles between pulses.
pub enum WorldCommand {
    /// Register a new owner.
    AddOwner {
        /// Owner ID.
        id: OwnerId,
        /// Owner kind.
        kind: OwnerKind,
        /// Display name.
        name: String,
        /// Outcome.
        reply: oneshot::Sender<hexis_core::Result<()>>,
    },
    /// Attach an effect.
    AddEffect {
        /// Target owner.
        owner: OwnerId,
        /// The effect.
        effect: Box<dyn Effect>,
        /// Optional lifetime.
        duration: Option<Duration>,
        /// The new effect's handle.
        reply: oneshot::Sender<hexis_core::Result<EffectRef>>,
    },
    /// An owner's session reconnected.
    Login {
        /// Who logged in.
        owner: OwnerId,
        /// Outcome.
        reply: oneshot::Sender<hexis_core::Result<()>>,
    },
    /// Something happened in the game.
    Event(GameEvent),
    /// Ask whether an action is allowed.
    Check {
        /// Who wants to act.
        actor: OwnerId,
        /// What kind of action.
        category: ActionCategory,
        /// Allowed, or the refusal.
        reply: oneshot::Sender<Result<(), Refusal>>,
    },
    /// Describe an owner from a perceiver's point of view.
    Snapshot {
        /// Owner to describe.
        owner: OwnerId,
        /// Perceiver.
        voyeur: Option<OwnerId>,
        /// The snapshot, if the owner exists.
        reply: oneshot::Sender<Option<OwnerSnapshot>>,
    },
    /// Run arbitrary game logic against the world.
    Run(WorldFn),
    /// Save and stop.
    Shutdown,
}

impl std::fmt::Debug for WorldCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddOwner { id, kind, .. } => write!(f, "AddOwner({id}, {kind})"),
            Self::AddEffect { owner, effect, .. } => {
                write!(f, "AddEffect({owner}, {})", effect.effect_type())
            }
            Self::Login { owner, .. } => write!(f, "Login({owner})"),
            Self::Event(event) => write!(f, "Event({})", event.label()),
            Self::Check { actor, category, .. } => write!(f, "Check({actor}, {category})"),
            Self::Snapshot { owner, .. } => write!(f, "Snapshot({owner})"),
            Self::Run(_) => f.write_str("Run"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Failures talking to the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver task has stopped.
    #[error("world driver has stopped")]
    Closed,

    /// The driver dropped a request without answering.
    #[error("world driver dropped the reply")]
    ReplyDropped(#[source] oneshot::error::RecvError),

    /// The engine rejected the request.
    #[error(transparent)]
    Engine(#[from] HexisError),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable client for the driver task.
#[derive(Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<WorldCommand>,
    board: SnapshotBoard,
}

impl DriverHandle {
    async fn send(&self, command: WorldCommand) -> Result<(), DriverError> {
        self.commands.send(command).await.map_err(|_| DriverError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WorldCommand,
    ) -> Result<T, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(DriverError::ReplyDropped)
    }

    /// Register an owner.
    ///
    /// # Errors
    /// Returns [`DriverError::Engine`] if the ID is taken.
    pub async fn add_owner(
        &self,
        id: OwnerId,
        kind: OwnerKind,
        name: impl Into<String>,
    ) -> Result<(), DriverError> {
        let name = name.into();
        self.request(|reply| WorldCommand::AddOwner {
            id,
            kind,
            name,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Attach an effect.
    ///
    /// # Errors
    /// Returns [`DriverError::Engine`] if the owner does not exist.
    pub async fn add_effect(
        &self,
        owner: OwnerId,
        effect: impl Effect,
        duration: Option<Duration>,
    ) -> Result<EffectRef, DriverError> {
        let effect: Box<dyn Effect> = Box::new(effect);
        Ok(self
            .request(|reply| WorldCommand::AddEffect {
                owner,
                effect,
                duration,
                reply,
            })
            .await??)
    }

    /// Tell the engine an owner reconnected.
    ///
    /// # Errors
    /// Returns [`DriverError::Engine`] if the owner does not exist.
    pub async fn login(&self, owner: OwnerId) -> Result<(), DriverError> {
        self.request(|reply| WorldCommand::Login { owner, reply }).await??;
        Ok(())
    }

    /// Report a game event. Does not wait for it to be processed.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] if the driver has stopped.
    pub async fn observe(&self, event: GameEvent) -> Result<(), DriverError> {
        self.send(WorldCommand::Event(event)).await
    }

    /// Ask whether `actor` may perform an action of `category`.
    ///
    /// # Errors
    /// Returns a [`DriverError`] if the driver is gone; a refusal is the
    /// inner `Err`.
    pub async fn check(
        &self,
        actor: OwnerId,
        category: ActionCategory,
    ) -> Result<Result<(), Refusal>, DriverError> {
        self.request(|reply| WorldCommand::Check {
            actor,
            category,
            reply,
        })
        .await
    }

    /// A fresh snapshot of `owner` as `voyeur` perceives it.
    ///
    /// # Errors
    /// Returns a [`DriverError`] if the driver is gone.
    pub async fn snapshot(
        &self,
        owner: OwnerId,
        voyeur: Option<OwnerId>,
    ) -> Result<Option<OwnerSnapshot>, DriverError> {
        self.request(|reply| WorldCommand::Snapshot {
            owner,
            voyeur,
            reply,
        })
        .await
    }

    /// Run `f` on the driver task and return its result.
    ///
    /// # Errors
    /// Returns a [`DriverError`] if the driver is gone.
    pub async fn with_world<R, F>(&self, f: F) -> Result<R, DriverError>
    where
        R: Send + 'static,
        F: FnOnce(&mut World) -> R + Send + 'static,
    {
        self.request(|reply| {
            WorldCommand::Run(Box::new(move |world| {
                let _ = reply.send(f(world));
            }))
        })
        .await
    }

    /// Ask the driver to save and stop.
    ///
    /// # Errors
    /// Returns [`DriverError::Closed`] if it already stopped.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.send(WorldCommand::Shutdown).await
    }

    /// The snapshot board published after each pulse.
    #[must_use]
    pub fn board(&self) -> &SnapshotBoard {
        &self.board
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// What the driver hands back when it stops.
pub struct Stopped {
    /// The world, as it was after the final save.
    pub world: World,
    /// The store, if one was attached.
    pub store: Option<EffectStore>,
}

/// The task that owns the world.
pub struct HeartbeatDriver {
    world: World,
    config: WorldConfig,
    store: Option<EffectStore>,
    monitor: PulseBudgetMonitor,
    commands: mpsc::Receiver<WorldCommand>,
    messages: mpsc::UnboundedSender<Message>,
    board: SnapshotBoard,
}

impl HeartbeatDriver {
    /// Spawn the driver on the current tokio runtime.
    ///
    /// Returns the client handle, the message stream for delivery to
    /// sessions, and the task, which yields the world back on shutdown.
    #[must_use]
    pub fn spawn(
        world: World,
        config: WorldConfig,
        store: Option<EffectStore>,
    ) -> (DriverHandle, mpsc::UnboundedReceiver<Message>, JoinHandle<Stopped>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let board = SnapshotBoard::default();

        let driver = Self {
            world,
            monitor: PulseBudgetMonitor::new(config.pulse_budget_ms),
            config,
            store,
            commands: command_rx,
            messages: message_tx,
            board: Arc::clone(&board),
        };
        let handle = DriverHandle {
            commands: command_tx,
            board,
        };
        (handle, message_rx, tokio::spawn(driver.run()))
    }

    async fn run(mut self) -> Stopped {
        info!(
            profile = ?self.config.profile,
            pulse_ms = self.config.pulse_interval_ms,
            autosave = self.store.is_some(),
            "world driver started"
        );
        let mut pulse = time::interval(self.config.pulse_interval());
        pulse.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut autosave = self
            .config
            .autosave_interval()
            .filter(|_| self.store.is_some())
            .map(|period| {
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = pulse.tick() => {
                    let now = Instant::now();
                    self.pulse(now - last);
                    last = now;
                }
                () = next_tick(&mut autosave) => self.save(),
                command = self.commands.recv() => match command {
                    Some(WorldCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
            }
        }

        self.save();
        self.forward_messages();
        info!(pulses = self.monitor.pulse_count(), "world driver stopped");
        Stopped {
            world: self.world,
            store: self.store,
        }
    }

    fn pulse(&mut self, elapsed: Duration) {
        let report = systems::run_pulse(&mut self.world, elapsed, &self.monitor);
        for message in report.messages {
            self.deliver(message);
        }
        if self.config.snapshot_enabled {
            self.publish();
        }
    }

    fn handle(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::AddOwner { id, kind, name, reply } => {
                let _ = reply.send(self.world.create_owner(id, kind, name));
            }
            WorldCommand::AddEffect {
                owner,
                effect,
                duration,
                reply,
            } => {
                let _ = reply.send(self.world.add_boxed_effect(owner, effect, duration));
            }
            WorldCommand::Login { owner, reply } => {
                let _ = reply.send(self.world.login(owner));
            }
            WorldCommand::Event(event) => {
                systems::observe_event(&mut self.world, &event);
            }
            WorldCommand::Check { actor, category, reply } => {
                let _ = reply.send(CommandGate::check(&self.world, actor, category));
            }
            WorldCommand::Snapshot { owner, voyeur, reply } => {
                let _ = reply.send(self.world.snapshot(owner, voyeur));
            }
            WorldCommand::Run(f) => f(&mut self.world),
            WorldCommand::Shutdown => {}
        }
        self.forward_messages();
    }

    fn save(&mut self) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(e) = systems::autosave(&mut self.world, store) {
            error!(error = %e, "autosave failed; dirty owners will be retried");
        }
    }

    fn publish(&self) {
        let snapshots: HashMap<_, _> = self
            .world
            .owners()
            .iter()
            .filter_map(|owner| self.world.snapshot(owner.id(), None))
            .map(|snapshot| (snapshot.owner, snapshot))
            .collect();
        *self.board.write() = snapshots;
    }

    fn forward_messages(&mut self) {
        for message in self.world.drain_messages() {
            self.deliver(message);
        }
    }

    fn deliver(&self, message: Message) {
        if self.messages.send(message).is_err() {
            debug!("message receiver dropped");
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hexis_core::config::PersistenceConfig;
    use hexis_core::{EngineConfig, OwnerKind};

    use super::*;
    use crate::effects::{Bleeding, Hidden, bleed};
    use crate::hooks::on_died;
    use crate::registry::standard_registry;

    const ALDRIC: OwnerId = OwnerId(1);

    fn world() -> World {
        World::new(Arc::new(standard_registry().expect("registry")), EngineConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(message) = rx.try_recv() {
            texts.push(message.text);
        }
        texts
    }

    #[tokio::test(start_paused = true)]
    async fn pulses_advance_world_time() {
        let (handle, mut rx, task) = HeartbeatDriver::spawn(world(), WorldConfig::default(), None);
        handle
            .add_owner(ALDRIC, OwnerKind::Character, "Aldric")
            .await
            .expect("owner");
        handle
            .with_world(|world| bleed(world, ALDRIC, 2).map(|_| ()))
            .await
            .expect("driver")
            .expect("bleed");

        time::sleep(Duration::from_millis(10_250)).await;

        assert_eq!(drain(&mut rx), vec!["You start to bleed.", "You lose some blood."]);
        let snapshot = handle.board().read().get(&ALDRIC).cloned().expect("published");
        assert_eq!(snapshot.effects.len(), 1);

        handle.shutdown().await.expect("shutdown");
        let stopped = task.await.expect("join");
        assert!(stopped.world.first_of_type::<Bleeding>(ALDRIC).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn check_and_events_round_trip() {
        let (handle, _rx, task) = HeartbeatDriver::spawn(world(), WorldConfig::default(), None);
        handle
            .add_owner(ALDRIC, OwnerKind::Character, "Aldric")
            .await
            .expect("owner");
        let hidden = handle
            .add_effect(ALDRIC, Hidden::default(), None)
            .await
            .expect("hide");

        assert!(handle.check(ALDRIC, ActionCategory::Movement).await.expect("driver").is_ok());
        handle.observe(on_died(ALDRIC, None)).await.expect("observe");
        let attached = handle
            .with_world(move |world| world.is_attached(hidden))
            .await
            .expect("driver");
        assert!(!attached);

        let duplicate = handle.add_owner(ALDRIC, OwnerKind::Character, "Aldric").await;
        assert!(matches!(duplicate, Err(DriverError::Engine(HexisError::DuplicateOwner(_)))));

        handle.shutdown().await.expect("shutdown");
        task.await.expect("join");
        assert!(matches!(handle.login(ALDRIC).await, Err(DriverError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_saves_dirty_owners() {
        let store = EffectStore::open_in_memory(&PersistenceConfig::default()).expect("store");
        let (handle, _rx, task) =
            HeartbeatDriver::spawn(world(), WorldConfig::default(), Some(store));
        handle
            .add_owner(ALDRIC, OwnerKind::Character, "Aldric")
            .await
            .expect("owner");
        handle
            .add_effect(ALDRIC, Hidden::default(), None)
            .await
            .expect("hide");

        handle.shutdown().await.expect("shutdown");
        let stopped = task.await.expect("join");

        let store = stopped.store.expect("store returned");
        let record = store.load_owner(ALDRIC).expect("load").expect("saved");
        assert_eq!(record.effects[0].tag, Hidden::TAG);
        assert!(stopped.world.dirty_owners().is_empty());
    }
}
