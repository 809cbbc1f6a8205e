//! Shared swarm state: who is online in the hub and who holds operator.
//!
//! One [`Swarm`] is created at launch and handed to every client unit as an
//! `Arc<Swarm>`. Both sets sit behind a single mutex, so compound
//! operations such as [`Swarm::claim_grant_round`] are one critical section.
//! The lock is never held across an await point.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Aggregate counts for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwarmStatus {
    pub roster: usize,
    pub online: usize,
    pub privileged: usize,
}

/// Result of [`Swarm::claim_grant_round`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantRound {
    /// Members this round should op, in nick order.
    pub claimed: Vec<String>,
    /// Members skipped because an earlier round's grant is still pending.
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Sets {
    online: BTreeSet<String>,
    privileged: HashSet<String>,
    /// (channel, nick) nominated by a grant round whose grant is not
    /// confirmed yet.
    pending: HashMap<(String, String), Instant>,
}

#[derive(Debug)]
pub struct Swarm {
    /// Every nick in the swarm, fixed at launch.
    roster: HashSet<String>,
    pending_ttl: Duration,
    sets: Mutex<Sets>,
}

impl Swarm {
    pub fn new<I, S>(roster: I, pending_ttl: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roster: roster.into_iter().map(Into::into).collect(),
            pending_ttl,
            sets: Mutex::new(Sets::default()),
        }
    }

    /// Whether `nick` belongs to the swarm.
    pub fn in_roster(&self, nick: &str) -> bool {
        self.roster.contains(nick)
    }

    pub fn mark_online(&self, nick: &str) {
        self.sets.lock().online.insert(nick.to_string());
    }

    /// Drop `nick` from every set. Privilege does not survive leaving.
    pub fn mark_offline(&self, nick: &str) {
        let mut sets = self.sets.lock();
        sets.online.remove(nick);
        sets.privileged.remove(nick);
        sets.pending.retain(|(_, pending), _| pending != nick);
    }

    pub fn grant_privilege(&self, nick: &str) {
        let mut sets = self.sets.lock();
        sets.pending.retain(|(_, pending), _| pending != nick);
        sets.privileged.insert(nick.to_string());
    }

    /// Returns whether `nick` was privileged before.
    pub fn revoke_privilege(&self, nick: &str) -> bool {
        self.sets.lock().privileged.remove(nick)
    }

    pub fn is_online(&self, nick: &str) -> bool {
        self.sets.lock().online.contains(nick)
    }

    pub fn is_privileged(&self, nick: &str) -> bool {
        self.sets.lock().privileged.contains(nick)
    }

    pub fn online_count(&self) -> usize {
        self.sets.lock().online.len()
    }

    pub fn privileged_count(&self) -> usize {
        self.sets.lock().privileged.len()
    }

    /// Online members without operator, in nick order.
    pub fn unprivileged_online_members(&self) -> Vec<String> {
        let sets = self.sets.lock();
        sets.online
            .iter()
            .filter(|nick| !sets.privileged.contains(*nick))
            .cloned()
            .collect()
    }

    /// Pick the members a grant round in `channel` should op, and mark them
    /// pending there so a concurrent or immediately following round in the
    /// same channel does not pick them again. Pending marks older than the
    /// TTL are ignored, so grants the server never confirmed are retried by a
    /// later round.
    pub fn claim_grant_round(&self, channel: &str, now: Instant) -> GrantRound {
        let mut sets = self.sets.lock();
        let ttl = self.pending_ttl;
        sets.pending
            .retain(|_, nominated| now.saturating_duration_since(*nominated) < ttl);

        let mut round = GrantRound::default();
        for nick in sets.online.iter().filter(|nick| !sets.privileged.contains(*nick)) {
            if sets.pending.contains_key(&(channel.to_string(), nick.clone())) {
                round.pending += 1;
            } else {
                round.claimed.push(nick.clone());
            }
        }
        for nick in &round.claimed {
            sets.pending.insert((channel.to_string(), nick.clone()), now);
        }
        round
    }

    pub fn snapshot(&self) -> SwarmStatus {
        let sets = self.sets.lock();
        SwarmStatus {
            roster: self.roster.len(),
            online: sets.online.len(),
            privileged: sets.privileged.len(),
        }
    }
}
