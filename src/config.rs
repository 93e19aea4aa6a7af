use std::{fs::read_to_string, net::SocketAddr};

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

use codec::realm::RealmFormat;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    ///
    /// server listen address
    ///
    /// The address and port bound by the UDP server.  The standard
    /// RADIUS authentication port is 1812; legacy deployments that
    /// still speak on 1645 can simply bind that instead.
    ///
    #[serde(default = "Server::bind")]
    pub bind: SocketAddr,
    ///
    /// socket buffer size
    ///
    /// SO_RCVBUF / SO_SNDBUF in bytes.  Authentication bursts arrive
    /// faster than callbacks complete, so the kernel buffer absorbs
    /// the difference.
    ///
    #[serde(default = "Server::socket_buffer")]
    pub socket_buffer: usize,
    ///
    /// background task interval, in seconds
    ///
    /// Tick period of the housekeeping task; periodic work such as
    /// the DNS refresh fires on the first tick at or after its own
    /// interval.
    ///
    #[serde(default = "Server::bk_task_interval")]
    pub bk_task_interval: u64,
    ///
    /// DNS refresh interval, in seconds
    ///
    /// Device entries given by host name are re-resolved this often
    /// so that a NAS moving behind a dynamic address keeps working.
    ///
    #[serde(default = "Server::dns_refresh_interval")]
    pub dns_refresh_interval: u64,
    ///
    /// qualified username convention
    ///
    /// `email` splits `account@realm`, `slash` splits
    /// `realm/account`.
    ///
    #[serde(default)]
    pub realm_format: RealmFormat,
    ///
    /// fallback shared secret
    ///
    /// When set, datagrams from sources without a device entry are
    /// processed under this secret instead of being dropped.
    ///
    #[serde(default)]
    pub default_secret: Option<String>,
    ///
    /// known devices
    ///
    /// One `host;secret` entry per NAS allowed to talk to this
    /// server, where `host` is an IP address or a DNS name.
    ///
    #[serde(default)]
    pub devices: Vec<String>,
}

impl Server {
    fn bind() -> SocketAddr {
        "0.0.0.0:1812".parse().unwrap()
    }

    fn socket_buffer() -> usize {
        131072
    }

    fn bk_task_interval() -> u64 {
        60
    }

    fn dns_refresh_interval() -> u64 {
        900
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: Self::bind(),
            socket_buffer: Self::socket_buffer(),
            bk_task_interval: Self::bk_task_interval(),
            dns_refresh_interval: Self::dns_refresh_interval(),
            realm_format: RealmFormat::default(),
            default_secret: None,
            devices: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Accounts {
    ///
    /// account file path
    ///
    /// Plain-text credential store, one `realm;account;password` per
    /// line; blank lines and `//` comments are ignored.
    ///
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    ///
    /// log level
    ///
    /// An enum representing the available verbosity levels of the
    /// logger.
    ///
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub accounts: Accounts,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: radius-server --config /etc/radius-rs/config.toml
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    ///
    /// Load configure from config file and command line parameters.
    ///
    /// Load command line parameters, if the configuration file path is
    /// specified, the configuration is read from the configuration
    /// file, otherwise the default configuration is used.
    ///
    pub fn load() -> Result<Self> {
        Ok(match Cli::parse().config {
            Some(path) => toml::from_str(&read_to_string(path)?)?,
            None => Self::default(),
        })
    }
}
