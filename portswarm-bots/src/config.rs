//! Swarm configuration.
//!
//! Every tunable has a default, so the swarm runs with no config file at all.
//! An optional TOML file overrides defaults, and CLI flags override the file.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

/// Largest grant batch servers commonly accept in one MODE line.
pub const MAX_BATCH_SIZE: usize = 12;

#[derive(Parser, Debug, Default)]
#[command(name = "portswarm", about = "Run a swarm of IRC clients, one per local address")]
pub struct Cli {
    /// TOML config file
    #[arg(long, env = "PORTSWARM_CONFIG")]
    pub config: Option<PathBuf>,

    /// IRC server host
    #[arg(long)]
    pub server: Option<String>,

    /// IRC server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Hub channel every client joins
    #[arg(long)]
    pub hub: Option<String>,

    /// Nick allowed to issue administrative commands
    #[arg(long)]
    pub master: Option<String>,

    /// Maximum number of clients
    #[arg(long)]
    pub max_bots: Option<usize>,

    /// Reconnect with backoff after a disconnect
    #[arg(long)]
    pub reconnect: bool,

    /// Seconds to wait before launching clients
    #[arg(long)]
    pub startup_delay: Option<u64>,

    /// Local address to use (repeatable); skips address discovery
    #[arg(long = "address")]
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwarmConfig {
    pub server: String,
    pub port: u16,
    pub hub_channel: String,
    /// Nick whose hub messages are treated as administrative commands.
    pub master_nick: String,
    /// Prefix of administrative command keywords.
    pub command_prefix: String,
    /// Client nicks are `{nick_base}{id:03}`; the leader gets a `c` suffix.
    pub nick_base: String,
    pub max_bots: usize,
    pub batch_size: usize,

    pub rejoin_interval_secs: u64,
    pub idle_min_secs: u64,
    pub idle_max_secs: u64,
    pub status_interval_secs: u64,
    pub startup_delay_secs: u64,

    pub reconnect: bool,
    pub reconnect_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,

    pub send_delay_ms: u64,
    pub recv_timeout_ms: u64,
    pub connect_timeout_secs: u64,
    /// Unconfirmed grants are not re-nominated for this long.
    pub grant_pending_secs: u64,

    /// Name reported in CTCP VERSION and `.help`.
    pub version_name: String,
    pub idle_messages: Vec<String>,
    pub real_names: Vec<String>,
    /// Explicit local addresses. Empty means discover them.
    pub addresses: Vec<IpAddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            server: "irc.example.net".to_string(),
            port: 6667,
            hub_channel: "#hub".to_string(),
            master_nick: "admin".to_string(),
            command_prefix: ".".to_string(),
            nick_base: "port".to_string(),
            max_bots: 200,
            batch_size: 4,
            rejoin_interval_secs: 60,
            idle_min_secs: 3600,
            idle_max_secs: 18000,
            status_interval_secs: 60,
            startup_delay_secs: 15,
            reconnect: false,
            reconnect_delay_secs: 60,
            reconnect_max_delay_secs: 600,
            send_delay_ms: 500,
            recv_timeout_ms: 1000,
            connect_timeout_secs: 30,
            grant_pending_secs: 30,
            version_name: format!("portswarm v{}", env!("CARGO_PKG_VERSION")),
            idle_messages: [
                "lol", "ok", "hmm", "yes", "no", "maybe", "brb", "afk", "yo", "nice.", "hey",
            ]
            .map(String::from)
            .to_vec(),
            real_names: [
                "Kim", "Bob", "John", "Steve", "Alex", "Sam", "Pat", "Chris", "Jay", "Lee", "Max",
                "Casey", "Taylor", "Jordan", "Terry", "Robin", "Charlie", "Jamie", "Drew", "Ryan",
            ]
            .map(String::from)
            .to_vec(),
            addresses: Vec::new(),
        }
    }
}

impl SwarmConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: SwarmConfig = toml::from_str(text)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Merge: CLI flags > config file > defaults. Validates the result.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(server) = &cli.server {
            config.server = server.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(hub) = &cli.hub {
            config.hub_channel = hub.clone();
        }
        if let Some(master) = &cli.master {
            config.master_nick = master.clone();
        }
        if let Some(max) = cli.max_bots {
            config.max_bots = max;
        }
        if cli.reconnect {
            config.reconnect = true;
        }
        if let Some(delay) = cli.startup_delay {
            config.startup_delay_secs = delay;
        }
        if !cli.addresses.is_empty() {
            config.addresses = cli.addresses.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            bail!("server must not be empty");
        }
        if !portswarm_sdk::event::is_channel(&self.hub_channel) {
            bail!("hub_channel {:?} is not a channel name", self.hub_channel);
        }
        if self.master_nick.is_empty() || self.nick_base.is_empty() {
            bail!("master_nick and nick_base must not be empty");
        }
        if self.command_prefix.is_empty() {
            bail!("command_prefix must not be empty");
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            bail!("batch_size must be between 1 and {MAX_BATCH_SIZE}");
        }
        if self.max_bots == 0 {
            bail!("max_bots must be at least 1");
        }
        if self.idle_min_secs > self.idle_max_secs {
            bail!("idle_min_secs must not exceed idle_max_secs");
        }
        if self.idle_messages.is_empty() || self.real_names.is_empty() {
            bail!("idle_messages and real_names must not be empty");
        }
        if self.reconnect_delay_secs > self.reconnect_max_delay_secs {
            bail!("reconnect_delay_secs must not exceed reconnect_max_delay_secs");
        }
        for (name, value) in [
            ("status_interval_secs", self.status_interval_secs),
            ("recv_timeout_ms", self.recv_timeout_ms),
            ("rejoin_interval_secs", self.rejoin_interval_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    /// Connection parameters for one client bound to `local_addr`.
    pub fn connect_config(&self, local_addr: IpAddr) -> portswarm_sdk::ConnectConfig {
        portswarm_sdk::ConnectConfig {
            local_addr,
            server_host: self.server.clone(),
            server_port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            send_delay: Duration::from_millis(self.send_delay_ms),
        }
    }

    pub fn rejoin_interval(&self) -> Duration {
        Duration::from_secs(self.rejoin_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn grant_pending(&self) -> Duration {
        Duration::from_secs(self.grant_pending_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    pub fn leader_nick(&self) -> String {
        format!("{}001c", self.nick_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = SwarmConfig::default();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.leader_nick(), "port001c");
        assert!(!config.reconnect);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SwarmConfig::from_toml(
            r##"
            server = "irc.test"
            hub_channel = "#uptown"
            addresses = ["192.0.2.10", "2001:db8::10"]
            "##,
        )
        .unwrap();
        assert_eq!(config.server, "irc.test");
        assert_eq!(config.hub_channel, "#uptown");
        assert_eq!(config.port, 6667);
        assert_eq!(config.addresses.len(), 2);
        assert!(config.addresses[1].is_ipv6());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SwarmConfig::from_toml("sever = \"typo\"").is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = SwarmConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.hub_channel = "hub".into();
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.idle_min_secs = 10;
        config.idle_max_secs = 5;
        assert!(config.validate().is_err());

        let zeroed: [fn(&mut SwarmConfig); 4] = [
            |c| c.status_interval_secs = 0,
            |c| c.recv_timeout_ms = 0,
            |c| c.rejoin_interval_secs = 0,
            |c| c.connect_timeout_secs = 0,
        ];
        for zero in zeroed {
            let mut config = SwarmConfig::default();
            zero(&mut config);
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("greater than zero"), "{err}");
        }
    }

    #[test]
    fn cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = \"from-file\"\nport = 7000").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            server: Some("from-cli".into()),
            reconnect: true,
            ..Default::default()
        };
        let config = SwarmConfig::resolve(&cli).unwrap();
        assert_eq!(config.server, "from-cli");
        assert_eq!(config.port, 7000);
        assert!(config.reconnect);
    }
}
