//! Client identities: who each swarm member is on the network.

use std::net::IpAddr;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::SwarmConfig;

/// Immutable identity of one swarm client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub local_addr: IpAddr,
    pub nick: String,
    pub ident: String,
    pub realname: String,
    /// The one client that propagates operator status to the rest.
    pub leader: bool,
}

impl Identity {
    /// Build the identity for client number `id` (1-based). Client 1 is the
    /// leader.
    pub fn generate<R: Rng + ?Sized>(
        id: usize,
        local_addr: IpAddr,
        config: &SwarmConfig,
        rng: &mut R,
    ) -> Identity {
        let nick = nick_for(&config.nick_base, id);
        let realname = config
            .real_names
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| nick.clone());
        Identity {
            local_addr,
            leader: nick == config.leader_nick(),
            ident: random_ident(rng),
            realname,
            nick,
        }
    }
}

/// `{base}{id:03}`, with a `c` suffix for the leader (id 1).
pub fn nick_for(base: &str, id: usize) -> String {
    if id == 1 {
        format!("{base}{id:03}c")
    } else {
        format!("{base}{id:03}")
    }
}

/// Four lowercase letters followed by two digits.
pub fn random_ident<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut ident: String = (0..4).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    ident.push_str(&format!("{:02}", rng.gen_range(0..100)));
    ident
}
