//! Launches the swarm: one unit per local address, a status reporter, and
//! cooperative shutdown.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Result, bail};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SwarmConfig;
use crate::identity::Identity;
use crate::runner;
use crate::swarm::Swarm;

/// Assign identities to at most `max_bots` addresses. The first address gets
/// the leader.
pub fn plan<R: Rng + ?Sized>(
    addresses: &[IpAddr],
    config: &SwarmConfig,
    rng: &mut R,
) -> Vec<Identity> {
    addresses
        .iter()
        .take(config.max_bots)
        .enumerate()
        .map(|(i, addr)| Identity::generate(i + 1, *addr, config, rng))
        .collect()
}

pub struct Supervisor {
    config: Arc<SwarmConfig>,
    identities: Vec<Identity>,
    swarm: Arc<Swarm>,
}

impl Supervisor {
    /// Fails when there is nothing to bind to or the config is invalid.
    pub fn new(config: SwarmConfig, addresses: &[IpAddr]) -> Result<Self> {
        config.validate()?;
        if addresses.is_empty() {
            bail!("No usable local addresses found");
        }
        let identities = plan(addresses, &config, &mut rand::thread_rng());
        let swarm = Arc::new(Swarm::new(
            identities.iter().map(|id| id.nick.clone()),
            config.grant_pending(),
        ));
        Ok(Self {
            config: Arc::new(config),
            identities,
            swarm,
        })
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn swarm(&self) -> Arc<Swarm> {
        Arc::clone(&self.swarm)
    }

    /// Run every unit until they have all stopped. Units stop on shutdown,
    /// or after their first session when reconnect is disabled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let total = self.identities.len();
        tracing::info!(
            bots = total,
            server = %self.config.server,
            port = self.config.port,
            hub = %self.config.hub_channel,
            "Starting swarm"
        );

        let delay = self.config.startup_delay();
        if !delay.is_zero() {
            tracing::info!("Waiting {delay:?} before connecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown before startup");
                    return Ok(());
                }
            }
        }

        let reporter = spawn_status_reporter(
            Arc::clone(&self.swarm),
            Arc::clone(&self.config),
            shutdown.clone(),
        );

        let units: Vec<JoinHandle<()>> = self
            .identities
            .into_iter()
            .map(|identity| {
                tokio::spawn(runner::run_unit(
                    identity,
                    Arc::clone(&self.config),
                    Arc::clone(&self.swarm),
                    shutdown.clone(),
                ))
            })
            .collect();

        for result in futures::future::join_all(units).await {
            if let Err(e) = result {
                tracing::error!("Bot task failed: {e}");
            }
        }
        reporter.abort();

        let status = self.swarm.snapshot();
        tracing::info!(
            "All bots stopped ({}/{} online, {} opped)",
            status.online,
            status.roster,
            status.privileged
        );
        Ok(())
    }
}

/// One-shot convenience: build a supervisor and run it.
pub async fn run(
    config: SwarmConfig,
    addresses: &[IpAddr],
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    Supervisor::new(config, addresses)?.run(shutdown).await
}

/// Raise the shutdown flag once `signal` fires. If the signal cannot be
/// listened for, the sender is kept alive so units are not stopped by a
/// closed channel.
pub async fn forward_shutdown<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

fn spawn_status_reporter(
    swarm: Arc<Swarm>,
    config: Arc<SwarmConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.status_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let status = swarm.snapshot();
                    tracing::info!(
                        "Status: {}/{} bots online, {} opped",
                        status.online,
                        status.roster,
                        status.privileged
                    );
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn addrs(n: usize) -> Vec<IpAddr> {
        (0..n)
            .map(|i| IpAddr::from([192, 0, 2, (i + 1) as u8]))
            .collect()
    }

    #[test]
    fn plan_caps_at_max_bots() {
        let config = SwarmConfig {
            max_bots: 3,
            ..SwarmConfig::default()
        };
        let ids = plan(&addrs(5), &config, &mut StdRng::seed_from_u64(1));
        let nicks: Vec<&str> = ids.iter().map(|i| i.nick.as_str()).collect();
        assert_eq!(nicks, ["port001c", "port002", "port003"]);
        assert_eq!(ids[0].local_addr, addrs(1)[0]);
        assert_eq!(ids.iter().filter(|i| i.leader).count(), 1);
    }

    #[test]
    fn no_addresses_is_fatal() {
        assert!(Supervisor::new(SwarmConfig::default(), &[]).is_err());
    }

    #[test]
    fn zero_status_interval_is_rejected() {
        let config = SwarmConfig {
            status_interval_secs: 0,
            ..SwarmConfig::default()
        };
        assert!(Supervisor::new(config, &addrs(2)).is_err());
    }

    #[tokio::test]
    async fn signal_failure_does_not_shut_down() {
        let (tx, mut rx) = watch::channel(false);
        let failed = async { Err(std::io::Error::other("no signal handler")) };
        let task = tokio::spawn(forward_shutdown(failed, tx));

        let changed = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            rx.changed(),
        )
        .await;
        assert!(changed.is_err(), "shutdown flag moved: {changed:?}");
        assert!(!*rx.borrow());
        task.abort();
    }

    #[tokio::test]
    async fn signal_raises_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(forward_shutdown(async { Ok(()) }, tx));
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn roster_matches_identities() {
        let sup = Supervisor::new(SwarmConfig::default(), &addrs(4)).unwrap();
        assert_eq!(sup.identities().len(), 4);
        let swarm = sup.swarm();
        assert!(swarm.in_roster("port001c"));
        assert!(swarm.in_roster("port004"));
        assert!(!swarm.in_roster("port005"));
        assert_eq!(swarm.snapshot().roster, 4);
    }

    #[tokio::test]
    async fn shutdown_during_startup_delay_returns() {
        let config = SwarmConfig {
            startup_delay_secs: 3600,
            ..SwarmConfig::default()
        };
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { run(config, &addrs(2), rx).await });
        tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
