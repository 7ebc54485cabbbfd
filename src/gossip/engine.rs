// Gossip Engine - Membership state machine
//
// Pure logic, no sockets and no clock of its own: the caller feeds in received
// messages and timer ticks along with the current instant, and gets back the
// datagrams to send plus the membership changes that happened.
//
// Failure detection follows SWIM:
// - Each tick probes one random live member
// - An unanswered probe makes the target Suspect
// - A member left Suspect for too long becomes Dead
// - A member that hears it is suspected refutes by raising its incarnation
//
// After a partition both sides may have declared each other dead. Dead members
// keep receiving our table until their tombstone is reclaimed, and seeds that
// are not live get a fresh Join every tick, so the halves find each other again.

use crate::config::GossipSettings;
use crate::gossip::protocol::{Member, MemberState, Message};
use crate::peers::PeerSet;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Timing knobs for the engine
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// How long a probe may go unanswered
    pub probe_timeout: Duration,
    /// How long a member stays Suspect before it is declared Dead
    pub suspicion_timeout: Duration,
    /// How long Dead/Left tombstones are kept before being forgotten
    pub reclaim: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self::from(&GossipSettings::default())
    }
}

impl From<&GossipSettings> for GossipConfig {
    fn from(settings: &GossipSettings) -> Self {
        Self {
            probe_timeout: settings.probe_timeout(),
            suspicion_timeout: settings.suspicion_timeout(),
            reclaim: settings.reclaim(),
        }
    }
}

impl GossipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_suspicion_timeout(mut self, timeout: Duration) -> Self {
        self.suspicion_timeout = timeout;
        self
    }

    pub fn with_reclaim(mut self, reclaim: Duration) -> Self {
        self.reclaim = reclaim;
        self
    }
}

/// Events produced by the gossip engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipEvent {
    /// Put a datagram on the wire
    Send { to: SocketAddr, message: Message },
    /// A member became alive (new, or back after a refutation)
    Joined(Member),
    /// A member missed a probe
    Suspected(Member),
    /// A suspect member was declared dead
    Failed(Member),
    /// A member announced its departure
    Left(Member),
}

/// Statistics about the gossip engine
#[derive(Clone, Debug, Default)]
pub struct GossipStats {
    pub messages_processed: u64,
    pub probes_sent: u64,
    pub probes_answered: u64,
    pub probes_missed: u64,
    pub refutations: u64,
    pub members_reclaimed: u64,
}

struct MemberEntry {
    member: Member,
    /// When `member.state` last changed
    since: Instant,
}

struct PendingProbe {
    target: SocketAddr,
    deadline: Instant,
}

/// The gossip engine - tracks who is in the cluster
pub struct GossipEngine {
    local: Member,
    config: GossipConfig,
    /// Everyone but us, tombstones included
    members: HashMap<SocketAddr, MemberEntry>,
    /// Outstanding probes by sequence number
    pending: HashMap<u64, PendingProbe>,
    /// Contacts we joined through, retried while they are not live
    seeds: Vec<SocketAddr>,
    next_seq: u64,
    stats: GossipStats,
}

impl GossipEngine {
    /// Create an engine for the member at `gossip_addr` advertising `peer_addr`
    pub fn new(gossip_addr: SocketAddr, peer_addr: &str, config: GossipConfig) -> Self {
        Self {
            local: Member::new(gossip_addr, peer_addr),
            config,
            members: HashMap::new(),
            pending: HashMap::new(),
            seeds: Vec::new(),
            next_seq: 1,
            stats: GossipStats::default(),
        }
    }

    /// Our own entry
    pub fn local(&self) -> &Member {
        &self.local
    }

    pub fn stats(&self) -> &GossipStats {
        &self.stats
    }

    /// Look up another member
    pub fn member(&self, gossip_addr: &SocketAddr) -> Option<&Member> {
        self.members.get(gossip_addr).map(|entry| &entry.member)
    }

    /// Full table, ourselves first
    pub fn members(&self) -> Vec<Member> {
        let mut table = Vec::with_capacity(self.members.len() + 1);
        table.push(self.local.clone());
        table.extend(self.members.values().map(|entry| entry.member.clone()));
        table
    }

    /// Other members currently Alive or Suspect
    pub fn live_member_count(&self) -> usize {
        self.members
            .values()
            .filter(|entry| entry.member.state().is_live())
            .count()
    }

    /// PeerAddresses of every live member, ourselves included
    pub fn live_peers(&self) -> PeerSet {
        let mut peers: PeerSet = self
            .members
            .values()
            .filter(|entry| entry.member.state().is_live())
            .map(|entry| entry.member.peer_addr().to_string())
            .collect();
        if self.local.state().is_live() {
            peers.insert(self.local.peer_addr().to_string());
        }
        peers
    }

    // ========================================================================
    // JOIN / LEAVE
    // ========================================================================

    /// Join requests for each seed. The seeds are remembered and joined again
    /// whenever they drop out of the live set.
    pub fn join_messages(&mut self, seeds: &[SocketAddr]) -> Vec<GossipEvent> {
        for seed in seeds {
            if *seed != self.local.gossip_addr() && !self.seeds.contains(seed) {
                self.seeds.push(*seed);
            }
        }

        seeds
            .iter()
            .filter(|seed| **seed != self.local.gossip_addr())
            .map(|seed| self.join_to(*seed))
            .collect()
    }

    fn join_to(&self, seed: SocketAddr) -> GossipEvent {
        GossipEvent::Send {
            to: seed,
            message: Message::Join {
                from: self.local.clone(),
            },
        }
    }

    /// Mark ourselves Left and tell every live member
    pub fn leave(&mut self) -> Vec<GossipEvent> {
        self.local.set_state(MemberState::Left);
        let announcement = self.local.clone();

        self.members
            .values()
            .filter(|entry| entry.member.state().is_live())
            .map(|entry| GossipEvent::Send {
                to: entry.member.gossip_addr(),
                message: Message::Leave {
                    member: announcement.clone(),
                },
            })
            .collect()
    }

    // ========================================================================
    // MESSAGE PROCESSING
    // ========================================================================

    /// Process an incoming message
    pub fn handle_message(&mut self, message: Message, now: Instant) -> Vec<GossipEvent> {
        self.stats.messages_processed += 1;
        let mut events = Vec::new();

        match message {
            Message::Join { from } => {
                let reply_to = from.gossip_addr();
                self.merge(from, now, &mut events);
                events.push(self.ack(0, reply_to));
            }

            Message::Ping { seq, from, members } => {
                let reply_to = from.gossip_addr();
                self.merge(from, now, &mut events);
                for member in members {
                    self.merge(member, now, &mut events);
                }
                // built after merging so a refutation rides on this ack
                events.push(self.ack(seq, reply_to));
            }

            Message::Ack { seq, from, members } => {
                let answered = self
                    .pending
                    .get(&seq)
                    .is_some_and(|probe| probe.target == from.gossip_addr());
                if answered {
                    self.pending.remove(&seq);
                    self.stats.probes_answered += 1;
                }
                self.merge(from, now, &mut events);
                for member in members {
                    self.merge(member, now, &mut events);
                }
            }

            Message::Leave { member } => {
                self.merge(member, now, &mut events);
            }
        }

        events
    }

    fn ack(&self, seq: u64, to: SocketAddr) -> GossipEvent {
        GossipEvent::Send {
            to,
            message: Message::Ack {
                seq,
                from: self.local.clone(),
                members: self.members(),
            },
        }
    }

    /// Fold one rumor into the table
    fn merge(&mut self, rumor: Member, now: Instant, events: &mut Vec<GossipEvent>) {
        if rumor.gossip_addr() == self.local.gossip_addr() {
            self.merge_about_self(&rumor);
            return;
        }

        match self.members.get_mut(&rumor.gossip_addr()) {
            Some(entry) => {
                if !rumor.supersedes(&entry.member) {
                    return;
                }
                let state_changed = rumor.state() != entry.member.state();
                entry.member = rumor;
                if state_changed {
                    entry.since = now;
                    events.push(Self::transition_event(&entry.member));
                }
            }
            None => {
                // unknown tombstones are kept so stale alive rumors cannot revive them
                if rumor.state().is_live() {
                    events.push(GossipEvent::Joined(rumor.clone()));
                }
                self.members.insert(
                    rumor.gossip_addr(),
                    MemberEntry {
                        member: rumor,
                        since: now,
                    },
                );
            }
        }
    }

    fn merge_about_self(&mut self, rumor: &Member) {
        if self.local.state() == MemberState::Left {
            return;
        }

        if rumor.state() == MemberState::Alive {
            // a previous run of ours may have left a higher incarnation behind
            if rumor.incarnation() > self.local.incarnation() {
                self.local.set_incarnation(rumor.incarnation());
            }
            return;
        }

        if rumor.incarnation() >= self.local.incarnation() {
            self.local.set_incarnation(rumor.incarnation() + 1);
            self.stats.refutations += 1;
            tracing::debug!(
                state = ?rumor.state(),
                incarnation = self.local.incarnation(),
                "refuting rumor about ourselves"
            );
        }
    }

    fn transition_event(member: &Member) -> GossipEvent {
        match member.state() {
            MemberState::Alive => GossipEvent::Joined(member.clone()),
            MemberState::Suspect => GossipEvent::Suspected(member.clone()),
            MemberState::Dead => GossipEvent::Failed(member.clone()),
            MemberState::Left => GossipEvent::Left(member.clone()),
        }
    }

    // ========================================================================
    // FAILURE DETECTION
    // ========================================================================

    /// Advance timers and send the next probe
    pub fn tick(&mut self, now: Instant) -> Vec<GossipEvent> {
        let mut events = Vec::new();

        self.expire_probes(now, &mut events);
        self.confirm_suspects(now, &mut events);
        self.reclaim_tombstones(now);

        if let Some(probe) = self.next_probe(now) {
            events.push(probe);
        }

        if self.local.state() != MemberState::Left {
            events.extend(self.rejoin_seeds());
            if let Some(push) = self.push_to_dead() {
                events.push(push);
            }
        }

        events
    }

    fn expire_probes(&mut self, now: Instant, events: &mut Vec<GossipEvent>) {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, probe)| probe.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in expired {
            let Some(probe) = self.pending.remove(&seq) else {
                continue;
            };
            self.stats.probes_missed += 1;

            if let Some(entry) = self.members.get_mut(&probe.target) {
                if entry.member.state() == MemberState::Alive {
                    entry.member.set_state(MemberState::Suspect);
                    entry.since = now;
                    events.push(GossipEvent::Suspected(entry.member.clone()));
                }
            }
        }
    }

    fn confirm_suspects(&mut self, now: Instant, events: &mut Vec<GossipEvent>) {
        let timeout = self.config.suspicion_timeout;
        for entry in self.members.values_mut() {
            if entry.member.state() == MemberState::Suspect
                && now.saturating_duration_since(entry.since) >= timeout
            {
                entry.member.set_state(MemberState::Dead);
                entry.since = now;
                events.push(GossipEvent::Failed(entry.member.clone()));
            }
        }
    }

    fn reclaim_tombstones(&mut self, now: Instant) {
        let reclaim = self.config.reclaim;
        let before = self.members.len();
        self.members.retain(|_, entry| {
            entry.member.state().is_live() || now.saturating_duration_since(entry.since) < reclaim
        });
        self.stats.members_reclaimed += (before - self.members.len()) as u64;
    }

    /// Join again through every seed that is not a live member
    fn rejoin_seeds(&self) -> Vec<GossipEvent> {
        self.seeds
            .iter()
            .filter(|seed| !self.member(seed).is_some_and(|m| m.state().is_live()))
            .map(|seed| self.join_to(*seed))
            .collect()
    }

    /// Send our table to one random Dead member that is not reclaimed yet.
    ///
    /// If it is actually alive it refutes, and its ack brings it back. Not a
    /// probe: nothing is pending and no answer is expected.
    fn push_to_dead(&self) -> Option<GossipEvent> {
        let dead: Vec<SocketAddr> = self
            .members
            .values()
            .filter(|entry| entry.member.state() == MemberState::Dead)
            .map(|entry| entry.member.gossip_addr())
            .collect();

        let target = *dead.choose(&mut rand::thread_rng())?;
        Some(GossipEvent::Send {
            to: target,
            message: Message::Ping {
                seq: 0,
                from: self.local.clone(),
                members: self.members(),
            },
        })
    }

    fn next_probe(&mut self, now: Instant) -> Option<GossipEvent> {
        let candidates: Vec<SocketAddr> = self
            .members
            .values()
            .filter(|entry| entry.member.state().is_live())
            .map(|entry| entry.member.gossip_addr())
            .filter(|addr| !self.pending.values().any(|probe| probe.target == *addr))
            .collect();

        let target = *candidates.choose(&mut rand::thread_rng())?;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1).max(1);
        self.pending.insert(
            seq,
            PendingProbe {
                target,
                deadline: now + self.config.probe_timeout,
            },
        );
        self.stats.probes_sent += 1;

        Some(GossipEvent::Send {
            to: target,
            message: Message::Ping {
                seq,
                from: self.local.clone(),
                members: self.members(),
            },
        })
    }
}
