// Gossip Backend - Decentralized membership over UDP
//
// One task owns the socket: it feeds datagrams and probe ticks into the
// engine, ships whatever the engine wants sent, and republishes the live set
// after every step. Construction blocks until a seed answers (or there are no
// seeds and we start a cluster of our own).

use crate::config::{GossipSettings, PeerConfig};
use crate::gossip::{
    GossipConfig, GossipEngine, GossipEvent, GossipStats, Member, Message, MAX_DATAGRAM_SIZE,
};
use crate::identity::{advertised_address, split_host_port, ResolveError};
use crate::peers::{
    CallbackRegistry, Cancellation, PeerCache, PeerError, PeerManagementType, Peers, PeersCallback,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

struct GossipState {
    socket: UdpSocket,
    engine: Mutex<GossipEngine>,
    gossip_addr: SocketAddr,
    self_address: String,
    cache: PeerCache,
    callbacks: CallbackRegistry,
}

impl GossipState {
    fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) -> Vec<GossipEvent> {
        match Message::from_bytes(bytes) {
            Ok(message) => {
                tracing::trace!(from = %from, kind = message.kind(), "gossip message received");
                self.engine.lock().handle_message(message, std::time::Instant::now())
            }
            Err(e) => {
                tracing::debug!(from = %from, error = %e, "dropping malformed gossip datagram");
                Vec::new()
            }
        }
    }

    fn tick(&self) -> Vec<GossipEvent> {
        self.engine.lock().tick(std::time::Instant::now())
    }

    fn join_messages(&self, seeds: &[SocketAddr]) -> Vec<GossipEvent> {
        self.engine.lock().join_messages(seeds)
    }

    fn leave(&self) -> Vec<GossipEvent> {
        self.engine.lock().leave()
    }

    fn joined(&self) -> bool {
        self.engine.lock().live_member_count() > 0
    }

    async fn dispatch(&self, events: Vec<GossipEvent>) {
        for event in events {
            match event {
                GossipEvent::Send { to, message } => {
                    let bytes = match message.to_bytes() {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!(to = %to, kind = message.kind(), error = %e, "cannot encode gossip message");
                            continue;
                        }
                    };
                    if let Err(e) = self.socket.send_to(&bytes, to).await {
                        tracing::debug!(to = %to, error = %e, "gossip send failed");
                    }
                }
                GossipEvent::Joined(member) => {
                    tracing::info!(member = %member.gossip_addr(), peer = member.peer_addr(), "member alive");
                }
                GossipEvent::Suspected(member) => {
                    tracing::debug!(member = %member.gossip_addr(), "member suspected");
                }
                GossipEvent::Failed(member) => {
                    tracing::warn!(member = %member.gossip_addr(), peer = member.peer_addr(), "member failed");
                }
                GossipEvent::Left(member) => {
                    tracing::info!(member = %member.gossip_addr(), peer = member.peer_addr(), "member left");
                }
            }
        }
    }

    /// Push the engine's live set into the cache; notify if it moved
    fn publish(&self) {
        let next = self.engine.lock().live_peers();
        let count = next.len();
        if self.cache.replace_if_changed(next) {
            tracing::info!(peers = count, "gossip peer set changed");
            self.callbacks.notify();
        }
    }

    async fn bootstrap(
        &self,
        seeds: &[SocketAddr],
        settings: &GossipSettings,
        ctx: &Cancellation,
    ) -> Result<(), PeerError> {
        let deadline = Instant::now() + settings.join_timeout();
        let mut resend = time::interval(settings.probe_interval());
        resend.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        tracing::info!(seeds = seeds.len(), "joining gossip cluster");

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(PeerError::Cancelled),
                _ = time::sleep_until(deadline) => {
                    tracing::warn!(seeds = seeds.len(), "no seed answered before the join timeout");
                    return Err(PeerError::BootstrapFailed { attempted: seeds.len() });
                }
                _ = resend.tick() => {
                    let joins = self.join_messages(seeds);
                    self.dispatch(joins).await;
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => {
                            let events = self.handle_datagram(&buf[..len], from);
                            self.dispatch(events).await;
                        }
                        Err(e) => tracing::debug!(error = %e, "gossip receive failed during join"),
                    }
                    if self.joined() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run(self: Arc<Self>, stop: Cancellation, probe_interval: Duration) {
        let mut ticker = time::interval(probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let events = tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => self.tick(),
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.handle_datagram(&buf[..len], from),
                    Err(e) => {
                        tracing::debug!(error = %e, "gossip receive failed");
                        continue;
                    }
                },
            };
            self.dispatch(events).await;
            self.publish();
        }

        let farewells = self.leave();
        tracing::info!(notified = farewells.len(), "leaving gossip cluster");
        self.dispatch(farewells).await;
    }
}

/// Gossip-backed peer management
pub struct GossipPeers {
    state: Arc<GossipState>,
    stop: Cancellation,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl GossipPeers {
    /// Bind the gossip socket, join through the configured seeds and start the
    /// protocol task.
    pub async fn start(config: &dyn PeerConfig, ctx: &Cancellation) -> Result<Self, PeerError> {
        if ctx.is_cancelled() {
            return Err(PeerError::Cancelled);
        }

        let settings = config.gossip_settings()?;
        let self_address = advertised_address(config)?;

        let socket = UdpSocket::bind(settings.listen_addr.as_str()).await?;
        let bound = socket.local_addr()?;
        let gossip_addr = advertised_gossip_addr(bound, &self_address).await?;

        let (seeds, self_entries) =
            resolve_seeds(&settings.known_members, gossip_addr, bound).await;

        tracing::info!(
            address = %self_address,
            gossip = %gossip_addr,
            seeds = seeds.len(),
            "starting gossip membership"
        );

        let engine = GossipEngine::new(gossip_addr, &self_address, GossipConfig::from(&settings));
        let state = Arc::new(GossipState {
            socket,
            engine: Mutex::new(engine),
            gossip_addr,
            self_address,
            cache: PeerCache::default(),
            callbacks: CallbackRegistry::new(),
        });

        let contacts = settings.known_members.len() - self_entries;
        if seeds.is_empty() && contacts > 0 {
            // every configured contact failed to resolve
            return Err(PeerError::BootstrapFailed { attempted: contacts });
        }
        if seeds.is_empty() {
            tracing::info!("no other known members, starting a new cluster");
        } else {
            state.bootstrap(&seeds, &settings, ctx).await?;
        }
        state.publish();

        let stop = Cancellation::new();
        let task = tokio::spawn(state.clone().run(stop.clone(), settings.probe_interval()));

        Ok(Self {
            state,
            stop,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Address our gossip socket is reachable at
    pub fn gossip_addr(&self) -> SocketAddr {
        self.state.gossip_addr
    }

    /// The PeerAddress we advertise
    pub fn self_address(&self) -> &str {
        &self.state.self_address
    }

    /// Snapshot of the member table, ourselves first
    pub fn members(&self) -> Vec<Member> {
        self.state.engine.lock().members()
    }

    pub fn stats(&self) -> GossipStats {
        self.state.engine.lock().stats().clone()
    }
}

#[async_trait]
impl Peers for GossipPeers {
    fn kind(&self) -> PeerManagementType {
        PeerManagementType::Gossip
    }

    fn get_peers(&self) -> Result<Vec<String>, PeerError> {
        Ok(self.state.cache.peers())
    }

    fn register_updated_peers_callback(&self, callback: PeersCallback) {
        self.state.callbacks.register(callback);
    }

    async fn close(&self, timeout: Duration) -> Result<(), PeerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.stop.cancel();
        let Some(handle) = self.task.lock().take() else {
            return Ok(());
        };

        let abort = handle.abort_handle();
        match time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "gossip task ended abnormally");
                Ok(())
            }
            Err(_) => {
                abort.abort();
                tracing::warn!(gossip = %self.state.gossip_addr, "gossip task did not stop in time");
                Err(PeerError::ShutdownTimeout(timeout))
            }
        }
    }
}

/// Where other members should send our datagrams.
///
/// A wildcard bind is replaced by the host we advertise to peers.
async fn advertised_gossip_addr(
    bound: SocketAddr,
    self_address: &str,
) -> Result<SocketAddr, PeerError> {
    if !bound.ip().is_unspecified() {
        return Ok(bound);
    }

    let (host, _) = split_host_port(self_address)?;
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, bound.port()));
    }

    // the resolved iterator borrows `host`
    let mut resolved = lookup_host((host.as_str(), bound.port())).await?;
    let first = resolved.next();
    first.ok_or_else(|| ResolveError::InvalidAddress(self_address.to_string()).into())
}

/// Turn configured contacts into socket addresses.
///
/// Accepts `host:port`, a bare IP or a bare hostname; bare entries use our own
/// gossip port. Entries pointing at ourselves are dropped and counted in the
/// second element; unresolvable ones are logged and skipped.
async fn resolve_seeds(
    known_members: &[String],
    gossip_addr: SocketAddr,
    bound: SocketAddr,
) -> (Vec<SocketAddr>, usize) {
    let mut seeds = Vec::new();
    let mut self_entries = 0;

    for entry in known_members {
        let entry = entry.trim();
        let resolved = match resolve_contact(entry, gossip_addr.port()).await {
            Some(addr) => addr,
            None => {
                tracing::warn!(contact = entry, "cannot resolve gossip contact, skipping");
                continue;
            }
        };

        if resolved == gossip_addr || resolved == bound {
            self_entries += 1;
            continue;
        }
        if !seeds.contains(&resolved) {
            seeds.push(resolved);
        }
    }

    (seeds, self_entries)
}

async fn resolve_contact(entry: &str, default_port: u16) -> Option<SocketAddr> {
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Some(addr);
    }
    if let Ok(ip) = entry.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return Some(SocketAddr::new(ip, default_port));
    }

    match split_host_port(entry) {
        Ok((host, port)) => {
            let mut resolved = lookup_host((host.as_str(), port)).await.ok()?;
            let first = resolved.next();
            first
        }
        Err(_) => {
            let mut resolved = lookup_host((entry, default_port)).await.ok()?;
            let first = resolved.next();
            first
        }
    }
}
