//! TCP Game Server
//!
//! Async TCP server for the arena. Each connection gets a reader task that
//! drives its [`Connection`] state machine and a writer task that drains a
//! bounded outbound queue. A single tick task runs the simulation at the
//! configured frame rate and broadcasts each frame.
//!
//! Shared state lives in four independently locked context objects (world,
//! command intake, connection registry, pending removals). No code path
//! holds two of these locks at once.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::GameSettings;
use crate::game::input::CommandIntake;
use crate::game::state::{EntityId, World};
use crate::game::tick::tick;
use crate::network::protocol::{encode_departures, encode_frame, handshake_reply};
use crate::network::session::{Connection, SessionAction};

/// Read buffer size per connection.
const READ_BUFFER_SIZE: usize = 4096;

/// How long a closing connection may spend flushing its queue.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Frames a connection may fall behind before it is dropped.
    pub outbound_queue_frames: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], crate::DEFAULT_PORT)),
            outbound_queue_frames: 256,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Settings rejected at startup.
    #[error("Invalid settings: {0}")]
    Settings(#[from] crate::config::SettingsError),
}

/// Registry side of one joined connection.
#[derive(Debug)]
struct Outbound {
    sender: mpsc::Sender<Arc<str>>,
    evict: oneshot::Sender<()>,
}

/// Outbound queues of every joined connection.
///
/// Each entry also holds an eviction handle. Removing the entry fires it,
/// which stops the connection's reader and closes its socket.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    senders: BTreeMap<EntityId, Outbound>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a joined connection.
    pub fn insert(&mut self, id: EntityId, sender: mpsc::Sender<Arc<str>>, evict: oneshot::Sender<()>) {
        self.senders.insert(id, Outbound { sender, evict });
    }

    /// Unregister a connection and tell its reader to stop.
    pub fn remove(&mut self, id: EntityId) -> bool {
        match self.senders.remove(&id) {
            Some(outbound) => {
                // The reader may already be gone
                let _ = outbound.evict.send(());
                true
            }
            None => false,
        }
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Queue `text` for every connection without waiting. Returns the ids
    /// whose queue was full or closed.
    pub fn broadcast(&self, text: &Arc<str>) -> Vec<EntityId> {
        let mut failed = Vec::new();
        for (&id, outbound) in &self.senders {
            match outbound.sender.try_send(Arc::clone(text)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Connection {} is not keeping up, dropping it", id);
                    failed.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Connection {} writer is gone", id);
                    failed.push(id);
                }
            }
        }
        failed
    }
}

/// The game server.
#[derive(Clone)]
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Game tunables.
    settings: Arc<GameSettings>,
    /// Authoritative world.
    world: Arc<RwLock<World>>,
    /// Latest command per tank.
    intake: Arc<Mutex<CommandIntake>>,
    /// Joined connections.
    registry: Arc<RwLock<ConnectionRegistry>>,
    /// Connections to drop at the end of the next tick.
    pending_removals: Arc<Mutex<BTreeSet<EntityId>>>,
    /// Next connection id.
    next_id: Arc<AtomicU32>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server. Settings are validated here.
    pub fn new(config: ServerConfig, settings: GameSettings, seed: u64) -> Result<Self, GameServerError> {
        settings.validate()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let world = World::new(&settings, seed);

        Ok(Self {
            config,
            settings: Arc::new(settings),
            world: Arc::new(RwLock::new(world)),
            intake: Arc::new(Mutex::new(CommandIntake::new())),
            registry: Arc::new(RwLock::new(ConnectionRegistry::new())),
            pending_removals: Arc::new(Mutex::new(BTreeSet::new())),
            next_id: Arc::new(AtomicU32::new(0)),
            shutdown_tx,
        })
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared world handle.
    pub fn world(&self) -> Arc<RwLock<World>> {
        Arc::clone(&self.world)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        Ok(listener)
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let local_addr = listener.local_addr()?;
        info!(
            "Tank Wars server {} listening on {} ({} walls, {} ms/frame)",
            self.config.version,
            local_addr,
            self.settings.walls.len(),
            self.settings.ms_per_frame
        );

        let tick_handle = tokio::spawn(Self::run_tick_loop(
            Arc::clone(&self.settings),
            Arc::clone(&self.world),
            Arc::clone(&self.intake),
            Arc::clone(&self.registry),
            Arc::clone(&self.pending_removals),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.handle_connection(stream, addr),
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        tick_handle.abort();
        Ok(())
    }

    /// Spawn reader and writer tasks for a new connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!("New connection {} from {}", id, addr);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let settings = Arc::clone(&self.settings);
        let world = Arc::clone(&self.world);
        let intake = Arc::clone(&self.intake);
        let registry = Arc::clone(&self.registry);
        let pending_removals = Arc::clone(&self.pending_removals);
        let queue_frames = self.config.outbound_queue_frames.max(1);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let (mut read_half, mut write_half) = stream.into_split();
            let (tx, mut rx) = mpsc::channel::<Arc<str>>(queue_frames);
            let (evict_tx, mut evict_rx) = oneshot::channel::<()>();
            let mut evict_tx = Some(evict_tx);

            // Writer task
            let mut writer_task = tokio::spawn(async move {
                while let Some(text) = rx.recv().await {
                    if let Err(e) = write_half.write_all(text.as_bytes()).await {
                        debug!("Write to connection {} failed: {}", id, e);
                        break;
                    }
                }
            });

            let mut connection = Connection::new(id);
            connection.accept();
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let mut evicted = false;

            // Exactly one read outstanding at a time
            'reader: loop {
                let read = tokio::select! {
                    read = read_half.read(&mut buf) => read,
                    _ = &mut evict_rx => {
                        debug!("Connection {} evicted", id);
                        evicted = true;
                        break;
                    }
                    _ = shutdown_rx.recv() => break,
                };

                let n = match read {
                    Ok(0) => {
                        debug!("Connection {} closed by peer", id);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        debug!("Read from connection {} failed: {}", id, e);
                        connection.fail();
                        break;
                    }
                };

                for action in connection.feed(&buf[..n]) {
                    match action {
                        SessionAction::Join { name } => {
                            if !Self::handle_join(id, name, &settings, &world, &registry, &tx, &mut evict_tx).await {
                                break 'reader;
                            }
                        }
                        SessionAction::Command(command) => {
                            intake.lock().await.submit(id, command);
                        }
                        SessionAction::Close(e) => {
                            warn!("Dropping connection {}: {}", id, e);
                            break 'reader;
                        }
                    }
                }
            }

            connection.fail();
            intake.lock().await.forget(id);
            pending_removals.lock().await.insert(id);
            drop(tx);

            // A connection that fell behind loses whatever is still queued.
            // Otherwise the writer drains until the tick loop unregisters
            // this connection and drops the last sender.
            if evicted {
                writer_task.abort();
            } else {
                tokio::select! {
                    _ = &mut writer_task => {}
                    _ = sleep(WRITER_DRAIN_TIMEOUT) => writer_task.abort(),
                }
            }
            info!("Connection {} closed", id);
        });
    }

    /// Send the handshake reply, register for broadcasts, then create the
    /// tank. Returns false if the connection should be dropped.
    ///
    /// Registration comes before the tank exists so the frame carrying
    /// its join flag always reaches the joining client too.
    async fn handle_join(
        id: EntityId,
        name: String,
        settings: &GameSettings,
        world: &RwLock<World>,
        registry: &RwLock<ConnectionRegistry>,
        tx: &mpsc::Sender<Arc<str>>,
        evict_tx: &mut Option<oneshot::Sender<()>>,
    ) -> bool {
        let reply = {
            let world = world.read().await;
            handshake_reply(id, world.universe_size, world.walls.values())
        };

        let reply = match reply {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode handshake for {}: {}", id, e);
                return false;
            }
        };

        if tx.send(Arc::from(reply)).await.is_err() {
            return false;
        }

        let Some(evict) = evict_tx.take() else {
            return false;
        };
        registry.write().await.insert(id, tx.clone(), evict);

        let mut world = world.write().await;
        let tank = world.add_tank(id, name, settings);
        info!("Tank {} ({:?}) joined at {}", id, tank.name, tank.position);
        true
    }

    /// Fixed-rate simulation and broadcast loop.
    async fn run_tick_loop(
        settings: Arc<GameSettings>,
        world: Arc<RwLock<World>>,
        intake: Arc<Mutex<CommandIntake>>,
        registry: Arc<RwLock<ConnectionRegistry>>,
        pending_removals: Arc<Mutex<BTreeSet<EntityId>>>,
    ) {
        let mut ticker = interval(settings.frame_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let commands = intake.lock().await.drain();

            let (result, frame) = {
                let mut world = world.write().await;
                let result = tick(&mut world, &commands, &settings);
                let frame = encode_frame(&world);
                (result, frame)
            };

            for event in &result.events {
                if event.is_notable() {
                    info!(frame = result.frame, "{:?}", event);
                } else {
                    debug!(frame = result.frame, "{:?}", event);
                }
            }

            match frame {
                Ok(text) => {
                    let text: Arc<str> = Arc::from(text);
                    #[cfg(feature = "debug-tracing")]
                    tracing::trace!(frame = result.frame, bytes = text.len(), "Broadcasting frame");

                    let failed = registry.read().await.broadcast(&text);
                    if !failed.is_empty() {
                        pending_removals.lock().await.extend(failed);
                    }
                }
                Err(e) => error!("Failed to encode frame {}: {}", result.frame, e),
            }

            Self::remove_departed(&world, &intake, &registry, &pending_removals).await;
        }
    }

    /// Drop every flagged connection, then tell everyone else.
    async fn remove_departed(
        world: &RwLock<World>,
        intake: &Mutex<CommandIntake>,
        registry: &RwLock<ConnectionRegistry>,
        pending_removals: &Mutex<BTreeSet<EntityId>>,
    ) {
        let departing = std::mem::take(&mut *pending_removals.lock().await);
        if departing.is_empty() {
            return;
        }

        {
            let mut registry = registry.write().await;
            for &id in &departing {
                registry.remove(id);
            }
        }

        {
            let mut intake = intake.lock().await;
            for &id in &departing {
                intake.forget(id);
            }
        }

        let (departed, remaining) = {
            let mut world = world.write().await;
            for &id in &departing {
                world.disconnect_tank(id);
            }
            let departed = world.take_disconnected();
            (departed, world.live_tank_count())
        };

        if departed.is_empty() {
            return;
        }

        for tank in &departed {
            info!("Tank {} ({:?}) left with score {}", tank.id, tank.name, tank.score);
        }
        debug!("{} live tanks remain", remaining);

        match encode_departures(&departed) {
            Ok(text) => {
                let failed = registry.read().await.broadcast(&Arc::from(text));
                if !failed.is_empty() {
                    pending_removals.lock().await.extend(failed);
                }
            }
            Err(e) => error!("Failed to encode departures: {}", e),
        }
    }

    /// Number of joined connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
