//! Connection listener, per-connection message pumps, and the serialized
//! decision loop that owns all shared mutable state.
//!
//! Layout: one acceptor task; one reader task per connection that only
//! parses frames and forwards events; one writer task per connection that
//! only drains that connection's outbound queue. Everything that mutates
//! `WorldState`, the session registry, or the scheduler happens on the
//! single `run` loop, which is the linearization point the consistency
//! guarantees depend on. Timer firings enter the same loop as ticks, so a
//! respawn is processed exactly like a client action.

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    decode_message, encode_frame, Message, PlayerEntity, ResourceEntity, TilePos, WorldState,
    MAX_FRAME_LEN,
};
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::broadcast::{BroadcastRouter, OutboundQueue, OUTBOUND_QUEUE_CAPACITY};
use crate::config::ServerConfig;
use crate::scheduler::{matured_planted, RespawnScheduler};
use crate::session::{Session, SessionRegistry};
use crate::utils::timestamp_ms;
use crate::validation::{self, Directive, Rejection};
use crate::worldgen;

const TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Cadence of the safety-net delta broadcast that bounds staleness for
/// clients that missed a granular event.
const DELTA_SYNC_INTERVAL_MS: u64 = 2_000;
/// How long outbound queues get to drain during graceful shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);
/// Frames above `MAX_FRAME_LEN` but below this are skipped in place so one
/// bad message does not cost the connection; anything larger is hostile.
const FRAME_SKIP_CEILING: usize = 1024 * 1024;

/// Events funneled from transport tasks into the decision loop.
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: u32,
        addr: SocketAddr,
        queue: OutboundQueue,
    },
    Inbound {
        conn_id: u32,
        message: Message,
    },
    Closed {
        conn_id: u32,
    },
}

/// An accepted connection that has not sent its Join yet. Counts toward
/// the client capacity and is swept after the client timeout.
#[derive(Debug)]
struct PendingConn {
    addr: SocketAddr,
    queue: OutboundQueue,
    connected_at: u64,
}

/// The authoritative server: transport plus the decision loop owning the
/// world, registry, router, and scheduler.
pub struct Server {
    listener: Option<TcpListener>,
    config: ServerConfig,
    world: WorldState,
    registry: SessionRegistry,
    router: BroadcastRouter,
    scheduler: RespawnScheduler,
    rng: StdRng,
    pending: HashMap<u32, PendingConn>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    last_delta_sync: u64,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: ServerConfig,
        world: WorldState,
        mut scheduler: RespawnScheduler,
    ) -> Result<Self, Box<dyn Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("server listening on {}", listener.local_addr()?);
        scheduler.start_weather_cycle(timestamp_ms());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let rng = StdRng::seed_from_u64(world.seed.wrapping_add(0x5eed));
        let registry = SessionRegistry::new(config.max_clients);

        Ok(Server {
            listener: Some(listener),
            config,
            world,
            registry,
            router: BroadcastRouter::new(),
            scheduler,
            rng,
            pending: HashMap::new(),
            event_tx,
            event_rx,
            last_delta_sync: timestamp_ms(),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn scheduler(&self) -> &RespawnScheduler {
        &self.scheduler
    }

    /// Runs the decision loop until ctrl-c or listener loss.
    pub async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        self.spawn_acceptor();

        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("server started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event, timestamp_ms()),
                    None => break,
                },
                _ = tick.tick() => {
                    self.on_tick(timestamp_ms());
                },
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown().await;
                    break;
                },
            }
        }

        Ok(())
    }

    /// Spawns the accept loop plus a reader and writer task per connection.
    fn spawn_acceptor(&mut self) {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return,
        };
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut next_conn_id: u32 = 0;
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        next_conn_id += 1;
                        let conn_id = next_conn_id;
                        let _ = stream.set_nodelay(true);
                        let (read_half, write_half) = stream.into_split();

                        let queue = OutboundQueue::new(conn_id, OUTBOUND_QUEUE_CAPACITY);
                        tokio::spawn(run_writer(
                            conn_id,
                            write_half,
                            queue.clone(),
                            event_tx.clone(),
                        ));
                        tokio::spawn(run_reader(conn_id, read_half, event_tx.clone()));

                        if event_tx
                            .send(ServerEvent::Connected {
                                conn_id,
                                addr,
                                queue,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_event(&mut self, event: ServerEvent, now: u64) {
        match event {
            ServerEvent::Connected {
                conn_id,
                addr,
                queue,
            } => {
                // Pending connections count toward capacity too, so a flood
                // of never-joining sockets cannot exceed the client limit.
                if self.registry.len() + self.pending.len() >= self.config.max_clients {
                    info!("rejecting connection {} from {}: server full", conn_id, addr);
                    queue.push(Message::ConnectionRejected {
                        reason: "server full".to_string(),
                    });
                    queue.close();
                    return;
                }
                debug!("connection {} accepted from {}", conn_id, addr);
                self.pending.insert(
                    conn_id,
                    PendingConn {
                        addr,
                        queue,
                        connected_at: now,
                    },
                );
            }
            ServerEvent::Inbound { conn_id, message } => {
                self.handle_message(conn_id, message, now);
            }
            ServerEvent::Closed { conn_id } => {
                if let Some(pending) = self.pending.remove(&conn_id) {
                    pending.queue.close();
                } else {
                    self.disconnect_session(conn_id, "connection closed", now);
                }
            }
        }
    }

    fn handle_message(&mut self, conn_id: u32, message: Message, now: u64) {
        // Any inbound traffic proves liveness; excess traffic is shed
        // before it can reach the validation engine.
        if let Some(session) = self.registry.get_mut(conn_id) {
            session.touch_heartbeat(now);
            if !session.allow_message(now, self.config.rate_limit_per_sec) {
                warn!("session {}: rate limit exceeded, dropping message", conn_id);
                return;
            }
        }

        match message {
            Message::Join { name } => self.handle_join(conn_id, name, now),
            Message::Heartbeat => {}
            Message::Ping { timestamp } => {
                self.router
                    .unicast(conn_id, &Message::Pong { timestamp });
            }
            Message::Disconnect => {
                self.disconnect_session(conn_id, "client requested disconnect", now);
            }
            Message::PlayerMovement {
                player_id,
                x,
                y,
                direction,
                timestamp: _,
            } => {
                self.check_actor_claim(conn_id, &player_id);
                match validation::validate_movement(
                    &mut self.world,
                    &mut self.registry,
                    conn_id,
                    x,
                    y,
                    direction,
                    now,
                ) {
                    Ok(directives) => self.execute(directives),
                    Err(rejection) => self.reject_movement(conn_id, rejection, now),
                }
            }
            Message::AttackAction {
                attacker_id,
                target_id,
            } => {
                self.check_actor_claim(conn_id, &attacker_id);
                match validation::validate_attack(
                    &mut self.world,
                    &mut self.registry,
                    &mut self.scheduler,
                    &mut self.rng,
                    conn_id,
                    &target_id,
                    now,
                ) {
                    Ok(directives) => self.execute(directives),
                    Err(rejection) => log_rejection("attack", conn_id, &rejection),
                }
            }
            Message::ItemPickup { item_id, player_id } => {
                self.check_actor_claim(conn_id, &player_id);
                match validation::validate_pickup(
                    &mut self.world,
                    &mut self.registry,
                    conn_id,
                    &item_id,
                    now,
                ) {
                    Ok(directives) => self.execute(directives),
                    Err(rejection) => log_rejection("pickup", conn_id, &rejection),
                }
            }
            Message::PlantRequest {
                player_id,
                item,
                x,
                y,
            } => {
                self.check_actor_claim(conn_id, &player_id);
                match validation::validate_plant(
                    &mut self.world,
                    &mut self.registry,
                    conn_id,
                    item,
                    x,
                    y,
                    self.config.planting_max_range,
                    now,
                ) {
                    Ok(directives) => self.execute(directives),
                    Err(rejection) => log_rejection("plant", conn_id, &rejection),
                }
            }
            other => {
                warn!(
                    "connection {}: unexpected message kind {:?}",
                    conn_id, other
                );
            }
        }
    }

    /// First message from a new connection: create the session and player,
    /// send the accepted handshake plus a full snapshot, announce the join.
    fn handle_join(&mut self, conn_id: u32, name: String, now: u64) {
        let PendingConn { addr, queue, .. } = match self.pending.remove(&conn_id) {
            Some(entry) => entry,
            None => {
                warn!("connection {}: duplicate or unexpected Join", conn_id);
                return;
            }
        };

        if !self.registry.has_capacity() {
            info!("rejecting join from {}: server full", addr);
            queue.push(Message::ConnectionRejected {
                reason: "server full".to_string(),
            });
            queue.close();
            return;
        }

        let player_id = self.world.alloc_id("player");
        let (spawn_x, spawn_y) = worldgen::spawn_position(&mut self.rng);
        let player = PlayerEntity::new(player_id.clone(), name.clone(), spawn_x, spawn_y, now);
        let (px, py) = (player.x, player.y);
        self.world.upsert_player(player);
        self.registry
            .register(Session::new(conn_id, player_id.clone(), addr, now));
        self.router.register(conn_id, queue);

        self.router.unicast(
            conn_id,
            &Message::ConnectionAccepted {
                session_id: conn_id,
                player_id: player_id.clone(),
                world_seed: self.world.seed,
                planting_max_range: self.config.planting_max_range,
                heartbeat_interval_secs: self.config.heartbeat_interval_secs,
            },
        );
        // Pending respawns ride along so a fresh client does not mistake
        // about-to-return resources for permanently absent ones.
        self.router.unicast(
            conn_id,
            &Message::WorldStateSnapshot {
                snapshot: self.world.create_snapshot(),
                pending_respawns: self.scheduler.pending().to_vec(),
            },
        );
        self.router.broadcast_all_except(
            &Message::PlayerJoin {
                player_id: player_id.clone(),
                name,
                x: px,
                y: py,
            },
            conn_id,
        );

        info!(
            "player {} joined as session {} ({} online)",
            player_id,
            conn_id,
            self.registry.len()
        );
    }

    fn disconnect_session(&mut self, conn_id: u32, reason: &str, now: u64) {
        if let Some(session) = self.registry.deregister(conn_id) {
            self.world.remove_player(&session.player_id, now);
            self.router.remove(conn_id);
            self.router.broadcast_all(&Message::PlayerLeave {
                player_id: session.player_id.clone(),
            });
            info!(
                "player {} left: {} ({} online)",
                session.player_id,
                reason,
                self.registry.len()
            );
        } else {
            self.router.remove(conn_id);
        }
    }

    /// Periodic work: due respawns, matured plants, the weather cycle,
    /// heartbeat expiry, and the staleness-bounding delta broadcast. All of
    /// it runs on the decision loop, never from a separate timer thread.
    fn on_tick(&mut self, now: u64) {
        for entry in self.scheduler.collect_due(now) {
            self.world.unclear_position(TilePos::from_world(entry.x, entry.y), now);
            self.world.add_resource(ResourceEntity::new(
                entry.resource_id.clone(),
                entry.kind,
                entry.x,
                entry.y,
                now,
            ));
            self.router.broadcast_all(&Message::ResourceRespawn {
                resource_id: entry.resource_id,
                kind: entry.kind,
                x: entry.x,
                y: entry.y,
            });
        }

        for planted_id in matured_planted(&self.world, now) {
            if let Some(planted) = self.world.remove_planted(&planted_id, now) {
                if let Some((kind, _)) = planted.kind.plants_into() {
                    let resource_id = self.world.alloc_id("res");
                    self.world.add_resource(ResourceEntity::new(
                        resource_id.clone(),
                        kind,
                        planted.x,
                        planted.y,
                        now,
                    ));
                    self.router.broadcast_all(&Message::PlantTransform {
                        planted_id,
                        resource_id,
                        kind,
                    });
                }
            }
        }

        if self.scheduler.weather_due(now) {
            let zones = worldgen::generate_rain_zones(&mut self.rng);
            self.world.set_rain_zones(zones, now);
        }

        for session_id in self
            .registry
            .expired_sessions(now, self.config.client_timeout_ms())
        {
            warn!("session {}: heartbeat timeout", session_id);
            self.disconnect_session(session_id, "heartbeat timeout", now);
        }

        // Connections that never sent a Join get the same timeout.
        let stale: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_sub(p.connected_at) > self.config.client_timeout_ms())
            .map(|(conn_id, _)| *conn_id)
            .collect();
        for conn_id in stale {
            if let Some(pending) = self.pending.remove(&conn_id) {
                warn!(
                    "connection {} from {} never joined, closing",
                    conn_id, pending.addr
                );
                pending.queue.close();
            }
        }

        if now.saturating_sub(self.last_delta_sync) >= DELTA_SYNC_INTERVAL_MS {
            let delta = self.world.compute_delta(self.last_delta_sync, now);
            if !delta.is_empty() {
                self.router
                    .broadcast_all(&Message::WorldStateDelta { delta });
            }
            self.last_delta_sync = now;
        }
    }

    fn execute(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Broadcast(message) => self.router.broadcast_all(&message),
                Directive::BroadcastExcept(message, excluded) => {
                    self.router.broadcast_all_except(&message, excluded)
                }
                Directive::Unicast(session_id, message) => {
                    self.router.unicast(session_id, &message);
                }
            }
        }
    }

    /// Movement is the one action family whose rejection is communicated:
    /// the client gets snapped back to the authoritative position.
    fn reject_movement(&mut self, conn_id: u32, rejection: Rejection, _now: u64) {
        log_rejection("movement", conn_id, &rejection);
        if matches!(
            rejection,
            Rejection::TooFast { .. } | Rejection::InvalidCoordinates
        ) {
            if let Some(session) = self.registry.get(conn_id) {
                if let Some(player) = self.world.players.get(&session.player_id) {
                    self.router.unicast(
                        conn_id,
                        &Message::PositionCorrection {
                            x: player.x,
                            y: player.y,
                            reason: rejection.to_string(),
                        },
                    );
                }
            }
        }
    }

    /// Clients state who they act as; the server only ever trusts the
    /// session binding. A mismatch is logged for policy review, not acted on.
    fn check_actor_claim(&self, conn_id: u32, claimed_id: &str) {
        if let Some(session) = self.registry.get(conn_id) {
            if session.player_id != claimed_id {
                warn!(
                    "session {}: claimed actor {} but is bound to {}",
                    conn_id, claimed_id, session.player_id
                );
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("server shutting down");
        self.router.broadcast_all(&Message::ServerShutdown);
        // Bounded grace period for writers to flush their queues.
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        self.router.close_all();
        for (_, pending) in self.pending.drain() {
            pending.queue.close();
        }
    }
}

fn log_rejection(action: &str, conn_id: u32, rejection: &Rejection) {
    if rejection.is_silent() {
        debug!("session {}: {} not applied: {}", conn_id, action, rejection);
    } else {
        warn!("session {}: {} rejected: {}", conn_id, action, rejection);
    }
}

/// Reader half: parses length-prefixed frames and forwards decoded messages
/// to the decision loop. Never touches shared state.
async fn run_reader(
    conn_id: u32,
    mut reader: OwnedReadHalf,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut len_buf = [0u8; 4];

    'conn: loop {
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_LEN {
            if len > FRAME_SKIP_CEILING {
                warn!(
                    "connection {}: frame length {} beyond skip ceiling, closing",
                    conn_id, len
                );
                break;
            }
            warn!(
                "connection {}: dropping oversized {}-byte frame",
                conn_id, len
            );
            let mut remaining = len;
            let mut scratch = [0u8; 4096];
            while remaining > 0 {
                let take = remaining.min(scratch.len());
                if reader.read_exact(&mut scratch[..take]).await.is_err() {
                    break 'conn;
                }
                remaining -= take;
            }
            continue;
        }

        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).await.is_err() {
            break;
        }

        match decode_message(&payload) {
            Ok(message) => {
                if event_tx
                    .send(ServerEvent::Inbound { conn_id, message })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                warn!("connection {}: dropping malformed message: {}", conn_id, e);
            }
        }
    }

    let _ = event_tx.send(ServerEvent::Closed { conn_id });
}

/// Writer half: the sole consumer of one connection's outbound queue, which
/// is what guarantees per-recipient FIFO delivery.
async fn run_writer(
    conn_id: u32,
    mut writer: OwnedWriteHalf,
    queue: OutboundQueue,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    while let Some(message) = queue.pop().await {
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("connection {}: failed to encode message: {}", conn_id, e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            debug!("connection {}: write failed: {}", conn_id, e);
            queue.close();
            let _ = event_tx.send(ServerEvent::Closed { conn_id });
            return;
        }
    }
    let _ = writer.shutdown().await;
}
