//! One client unit: connect, run a session, clean up, maybe reconnect.

use std::sync::Arc;
use std::time::Duration;

use portswarm_sdk::command::Command;
use portswarm_sdk::{CommandSink, Connection, Received, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument;

use crate::bot::{Bot, Phase};
use crate::config::SwarmConfig;
use crate::identity::Identity;
use crate::swarm::Swarm;

const QUIT_MESSAGE: &str = "Shutting down";

/// How a session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown flag was raised.
    Shutdown,
    /// Connect failed or the connection dropped.
    Lost { registered: bool, reason: String },
}

/// Bounded exponential backoff with up to 25% jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base.min(max),
        }
    }

    pub fn reset(&mut self) {
        self.current = self.base.min(self.max);
    }

    /// Delay before the next attempt. Doubles the base for the one after.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        let jitter_ms = u64::try_from(delay.as_millis() / 4).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            delay
        } else {
            delay.saturating_add(Duration::from_millis(rng.gen_range(0..=jitter_ms)))
        }
    }
}

/// Run one client until shutdown, or until its first session ends when
/// reconnect is disabled. Shared sets are cleaned on every exit path.
pub async fn run_unit(
    identity: Identity,
    config: Arc<SwarmConfig>,
    swarm: Arc<Swarm>,
    shutdown: watch::Receiver<bool>,
) {
    let span = tracing::info_span!(
        "bot",
        nick = %identity.nick,
        addr = %identity.local_addr
    );
    let bot = Bot::new(identity, Arc::clone(&config), swarm);
    run_bot(bot, config, shutdown).instrument(span).await
}

async fn run_bot(mut bot: Bot, config: Arc<SwarmConfig>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(config.reconnect_delay(), config.reconnect_max_delay());
    let mut rng = StdRng::from_entropy();

    loop {
        if *shutdown.borrow() {
            break;
        }
        bot.begin_cycle();
        let end = run_session(&mut bot, &config, &mut shutdown).await;
        bot.disconnect();

        let SessionEnd::Lost { registered, reason } = end else {
            break;
        };
        tracing::warn!("Disconnected: {reason}");
        if !config.reconnect {
            break;
        }
        if registered {
            backoff.reset();
        }
        let delay = backoff.next_delay(&mut rng);
        tracing::info!("Reconnecting in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("Stopped");
}

/// One connection cycle: open, register, pump lines until the connection is
/// lost or shutdown is requested.
pub async fn run_session(
    bot: &mut Bot,
    config: &SwarmConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let connect = config.connect_config(bot.identity().local_addr);
    let opened = tokio::select! {
        res = Connection::open(&connect) => res,
        _ = shutdown.changed() => return SessionEnd::Shutdown,
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(e) => {
            return SessionEnd::Lost {
                registered: false,
                reason: e.to_string(),
            };
        }
    };
    tracing::info!(local = %conn.local_addr(), peer = %conn.peer_addr(), "Connected");

    let result = tokio::select! {
        res = pump(bot, &mut conn, config.recv_timeout()) => res,
        _ = shutdown.changed() => {
            if let Err(e) = conn.send(Command::Quit(Some(QUIT_MESSAGE.to_string()))).await {
                tracing::debug!(error = %e, "Failed to send QUIT");
            }
            conn.close().await;
            return SessionEnd::Shutdown;
        }
    };

    let registered = matches!(bot.phase(), Phase::JoinedHub | Phase::Rejoining);
    let reason = match result {
        Err(TransportError::Closed) => "connection closed by server".to_string(),
        Err(e) => e.to_string(),
        Ok(never) => match never {},
    };
    SessionEnd::Lost { registered, reason }
}

/// Register, then feed received lines and timer ticks to the bot until the
/// transport fails.
async fn pump(
    bot: &mut Bot,
    conn: &mut Connection,
    recv_timeout: Duration,
) -> Result<std::convert::Infallible, TransportError> {
    bot.on_connected(conn).await?;
    loop {
        let received = conn.receive(recv_timeout).await?;
        let now = Instant::now();
        match received {
            Received::Lines(lines) => {
                for line in &lines {
                    bot.handle_line(conn, line, now).await?;
                }
            }
            Received::Timeout => {}
            Received::Closed => return Err(TransportError::Closed),
        }
        bot.tick(conn, now).await?;
    }
}
