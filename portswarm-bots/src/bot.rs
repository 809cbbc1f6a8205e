//! Per-client protocol state machine.
//!
//! A [`Bot`] consumes decoded server lines and emits commands through a
//! [`CommandSink`]. It owns the client's channel membership and timers, and
//! reports hub presence and operator changes to the shared [`Swarm`].
//!
//! Phases: `Connecting → Registered → JoinedHub ⇄ Rejoining → Disconnected`.
//! `Rejoining` means the client was kicked from the hub and is waiting for
//! its rejoin to be confirmed.
//!
//! Time is passed in explicitly so the timers can be driven in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use portswarm_sdk::command::Command;
use portswarm_sdk::ctcp::{Ctcp, CtcpKind};
use portswarm_sdk::event::{Event, is_channel};
use portswarm_sdk::{CommandSink, TransportError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::admin::{self, AdminCommand, CommandError};
use crate::config::SwarmConfig;
use crate::host;
use crate::identity::Identity;
use crate::swarm::{GrantRound, Swarm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Registered,
    JoinedHub,
    Rejoining,
    Disconnected,
}

/// Split `members` into MODE lines granting operator in `channel`, at most
/// `batch_size` nicks per line.
pub fn grant_commands(channel: &str, members: &[String], batch_size: usize) -> Vec<Command> {
    members
        .chunks(batch_size.max(1))
        .map(|batch| Command::op_batch(channel, batch))
        .collect()
}

pub struct Bot {
    identity: Identity,
    config: Arc<SwarmConfig>,
    swarm: Arc<Swarm>,
    phase: Phase,
    /// Channels this client believes it is in.
    channels: HashSet<String>,
    /// Channel → time of the kick or of the last rejoin attempt.
    kicked: HashMap<String, Instant>,
    last_idle: Instant,
    idle_after: Duration,
    rng: StdRng,
}

impl Bot {
    pub fn new(identity: Identity, config: Arc<SwarmConfig>, swarm: Arc<Swarm>) -> Self {
        Self::with_rng(identity, config, swarm, StdRng::from_entropy())
    }

    pub fn with_rng(
        identity: Identity,
        config: Arc<SwarmConfig>,
        swarm: Arc<Swarm>,
        mut rng: StdRng,
    ) -> Self {
        let idle_after = draw_idle_interval(&config, &mut rng);
        Self {
            identity,
            config,
            swarm,
            phase: Phase::Connecting,
            channels: HashSet::new(),
            kicked: HashMap::new(),
            last_idle: Instant::now(),
            idle_after,
            rng,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn nick(&self) -> &str {
        &self.identity.nick
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn channels(&self) -> &HashSet<String> {
        &self.channels
    }

    pub fn is_kicked_from(&self, channel: &str) -> bool {
        self.kicked.contains_key(channel)
    }

    /// Start a new connection cycle.
    pub fn begin_cycle(&mut self) {
        self.phase = Phase::Connecting;
    }

    /// Send the registration handshake right after the transport is up.
    pub async fn on_connected<S: CommandSink>(&mut self, sink: &mut S) -> Result<(), TransportError> {
        sink.send(Command::Nick(self.identity.nick.clone())).await?;
        sink.send(Command::User {
            ident: self.identity.ident.clone(),
            realname: self.identity.realname.clone(),
        })
        .await?;
        self.phase = Phase::Registered;
        Ok(())
    }

    /// Process one raw server line. Malformed lines are skipped.
    pub async fn handle_line<S: CommandSink>(
        &mut self,
        sink: &mut S,
        line: &str,
        now: Instant,
    ) -> Result<(), TransportError> {
        match Event::parse(line) {
            Ok(event) => self.handle_event(sink, event, now).await,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed line: {line}");
                Ok(())
            }
        }
    }

    pub async fn handle_event<S: CommandSink>(
        &mut self,
        sink: &mut S,
        event: Event,
        now: Instant,
    ) -> Result<(), TransportError> {
        match event {
            Event::Ping { payload } => {
                tracing::trace!("PING, answering with PONG");
                sink.send(Command::Pong(payload)).await?;
            }

            Event::EndOfMotd => {
                if self.phase == Phase::Registered {
                    self.join_hub(sink, now).await?;
                }
            }

            Event::Joined { channel, nick } if self.is_me(&nick) => {
                if self.kicked.remove(&channel).is_some() {
                    tracing::info!("Rejoined {channel}");
                }
                if self.is_hub(&channel) && self.phase == Phase::Rejoining {
                    self.phase = Phase::JoinedHub;
                }
                self.channels.insert(channel);
            }

            Event::Kicked {
                channel, nick, by, ..
            } if self.is_me(&nick) => {
                tracing::warn!("Kicked from {channel} by {by}, rejoining");
                self.channels.remove(&channel);
                self.kicked.insert(channel.clone(), now);
                if self.is_hub(&channel) && self.phase == Phase::JoinedHub {
                    self.phase = Phase::Rejoining;
                }
                sink.send(Command::Join(channel)).await?;
                if self.swarm.revoke_privilege(&self.identity.nick) {
                    tracing::info!("Lost operator status due to kick");
                }
            }

            Event::ModeChanged {
                target, changes, ..
            } if is_channel(&target) => {
                let mut leader_opped = false;
                for change in changes.iter().filter(|c| c.mode == 'o') {
                    let Some(nick) = change.arg.as_deref() else {
                        continue;
                    };
                    if !self.swarm.in_roster(nick) {
                        continue;
                    }
                    if change.adding {
                        self.swarm.grant_privilege(nick);
                        if self.identity.leader && self.is_me(nick) {
                            leader_opped = true;
                        }
                    } else if self.swarm.revoke_privilege(nick) {
                        tracing::info!("{nick} has been deopped in {target}");
                    }
                }
                if leader_opped {
                    tracing::info!("Opped in {target}, propagating to the swarm");
                    self.grant_round(sink, &target, now).await?;
                }
            }

            Event::Message { from, target, text } => {
                if self.is_me(&target) {
                    if let Some(ctcp) = Ctcp::parse(&text) {
                        self.answer_ctcp(sink, &from, ctcp).await?;
                    }
                } else if self.is_hub(&target) && from == self.config.master_nick {
                    match AdminCommand::parse(&text, &self.config.command_prefix) {
                        Ok(cmd) => self.run_admin(sink, &from, cmd, now).await?,
                        Err(CommandError::NotACommand) => {}
                        Err(e) => tracing::debug!(error = %e, "Ignoring admin command"),
                    }
                }
            }

            other => tracing::trace!(?other, "Unhandled event"),
        }
        Ok(())
    }

    /// Periodic work: rejoin sweep and idle message.
    pub async fn tick<S: CommandSink>(&mut self, sink: &mut S, now: Instant) -> Result<(), TransportError> {
        if matches!(self.phase, Phase::Connecting | Phase::Disconnected) {
            return Ok(());
        }

        let interval = self.config.rejoin_interval();
        let mut due: Vec<String> = self
            .kicked
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) > interval)
            .map(|(channel, _)| channel.clone())
            .collect();
        due.sort();
        for channel in due {
            tracing::info!("Trying to rejoin {channel}");
            self.kicked.insert(channel.clone(), now);
            sink.send(Command::Join(channel)).await?;
        }

        if self.phase == Phase::JoinedHub
            && now.saturating_duration_since(self.last_idle) > self.idle_after
        {
            if let Some(text) = self.config.idle_messages.choose(&mut self.rng).cloned() {
                sink.send(Command::privmsg(&self.config.hub_channel, text))
                    .await?;
            }
            self.last_idle = now;
            self.idle_after = draw_idle_interval(&self.config, &mut self.rng);
        }
        Ok(())
    }

    /// Leave every shared set. Safe to call on any path, any number of times.
    pub fn disconnect(&mut self) {
        self.phase = Phase::Disconnected;
        self.swarm.mark_offline(&self.identity.nick);
    }

    async fn join_hub<S: CommandSink>(&mut self, sink: &mut S, now: Instant) -> Result<(), TransportError> {
        let hub = self.config.hub_channel.clone();
        sink.send(Command::Join(hub.clone())).await?;
        self.channels.insert(hub.clone());
        self.swarm.mark_online(&self.identity.nick);
        self.phase = Phase::JoinedHub;
        self.last_idle = now;
        tracing::info!("Joined {hub}");

        // Channels remembered from a previous session.
        let mut others: Vec<String> = self
            .channels
            .iter()
            .filter(|c| !self.is_hub(c))
            .cloned()
            .collect();
        others.sort();
        for channel in others {
            sink.send(Command::Join(channel)).await?;
        }
        Ok(())
    }

    /// Op every online swarm member that is not opped yet and has no grant
    /// pending in `channel`.
    async fn grant_round<S: CommandSink>(
        &mut self,
        sink: &mut S,
        channel: &str,
        now: Instant,
    ) -> Result<GrantRound, TransportError> {
        let round = self.swarm.claim_grant_round(channel, now);
        if !round.claimed.is_empty() {
            tracing::info!(count = round.claimed.len(), "Granting operator in {channel}");
        }
        for cmd in grant_commands(channel, &round.claimed, self.config.batch_size) {
            sink.send(cmd).await?;
        }
        Ok(round)
    }

    async fn answer_ctcp<S: CommandSink>(
        &mut self,
        sink: &mut S,
        from: &str,
        ctcp: Ctcp<'_>,
    ) -> Result<(), TransportError> {
        let reply = match ctcp.kind {
            CtcpKind::Version => {
                let version = format!("{} ({})", self.config.version_name, host::platform());
                Command::ctcp_reply(from, CtcpKind::Version, Some(&version))
            }
            CtcpKind::Time => {
                let time = chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string();
                Command::ctcp_reply(from, CtcpKind::Time, Some(&time))
            }
            CtcpKind::Ping => match ctcp.params {
                Some(payload) => Command::ctcp_reply(from, CtcpKind::Ping, Some(payload)),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        tracing::debug!("CTCP {} from {from}", ctcp.kind.as_str());
        sink.send(reply).await
    }

    async fn run_admin<S: CommandSink>(
        &mut self,
        sink: &mut S,
        from: &str,
        cmd: AdminCommand,
        now: Instant,
    ) -> Result<(), TransportError> {
        tracing::info!(?cmd, "Admin command from {from}");
        match cmd {
            AdminCommand::Join { channel } => {
                sink.send(Command::Join(channel.clone())).await?;
                self.channels.insert(channel);
            }
            AdminCommand::Part { channel } => {
                if self.is_hub(&channel) {
                    sink.send(Command::notice(from, "Cannot part the hub channel."))
                        .await?;
                } else {
                    sink.send(Command::Part(channel.clone())).await?;
                    self.channels.remove(&channel);
                    self.kicked.remove(&channel);
                }
            }
            AdminCommand::Say { target, text } => {
                sink.send(Command::privmsg(target, text)).await?;
            }
            AdminCommand::Action { target, text } => {
                sink.send(Command::action(target, &text)).await?;
            }
            AdminCommand::Mode { target, modes } => {
                sink.send(Command::Mode {
                    target,
                    modes,
                    args: Vec::new(),
                })
                .await?;
            }
            AdminCommand::OpAll { channel } => {
                if !self.identity.leader {
                    return Ok(());
                }
                let round = self.grant_round(sink, &channel, now).await?;
                if round.claimed.is_empty() {
                    let reply = if round.pending > 0 {
                        format!("Operator grants already pending for {} bot(s).", round.pending)
                    } else {
                        "All bots are already opped.".to_string()
                    };
                    sink.send(Command::notice(from, reply)).await?;
                }
            }
            AdminCommand::Help => {
                if !self.identity.leader {
                    return Ok(());
                }
                let status = format!(
                    "{} ({}) | {}",
                    self.config.version_name,
                    host::platform(),
                    host::system_uptime()
                );
                sink.send(Command::notice(from, status)).await?;
                sink.send(Command::notice(from, admin::help_text(&self.config.command_prefix)))
                    .await?;
            }
        }
        Ok(())
    }

    fn is_me(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.identity.nick)
    }

    fn is_hub(&self, channel: &str) -> bool {
        channel.eq_ignore_ascii_case(&self.config.hub_channel)
    }
}

fn draw_idle_interval(config: &SwarmConfig, rng: &mut StdRng) -> Duration {
    Duration::from_secs(rng.gen_range(config.idle_min_secs..=config.idle_max_secs))
}
