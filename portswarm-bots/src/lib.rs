//! portswarm-bots: a swarm of IRC clients that hold a shared hub channel.
//!
//! Each client binds its own local address, keeps itself joined and
//! answered-to under kicks and disconnects, and reports presence and
//! operator status to a shared [`swarm::Swarm`]. The leader client hands
//! operator status to the rest of the swarm in batches.

pub mod admin;
pub mod bot;
pub mod config;
pub mod host;
pub mod identity;
pub mod runner;
pub mod supervisor;
pub mod swarm;
