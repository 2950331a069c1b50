//! Command line configuration of the daemon.

use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use sonic_restapi_common::{RedisEndpoint, REDIS_UNIX_SOCKET};
use thiserror::Error;
use tracing::Level;

use crate::overlay_mgr::DEFAULT_SYSFS_ROOT;

/// Plain HTTP listening port.
pub const HTTP_PORT: u16 = 8090;
/// HTTPS listening port.
pub const HTTPS_PORT: u16 = 8081;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Both http and https endpoints are disabled")]
    NoEndpoint,

    #[error("--{0} is required when https is enabled")]
    MissingTlsFile(&'static str),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// TLS material paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// CA bundle that client certificates must chain to.
    pub client_ca: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
}

/// SONiC overlay provisioning REST API daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "restapid")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Serve plain HTTP on port 8090
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enablehttp: bool,

    /// Serve HTTPS with client certificates on port 8081
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub enablehttps: bool,

    /// CA certificate(s) client certificates are verified against
    #[arg(long)]
    pub clientcert: Option<PathBuf>,

    /// Trusted client certificate common names, comma separated
    #[arg(long, default_value = "SonicCLient")]
    pub clientcertcommonname: String,

    /// Server certificate chain (PEM)
    #[arg(long)]
    pub servercert: Option<PathBuf>,

    /// Server private key (PEM)
    #[arg(long)]
    pub serverkey: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub loglevel: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Local API test mode: no downstream consumers are running
    #[arg(long)]
    pub localapitestdocker: bool,

    /// Redis server host; the unix socket is used when unset
    #[arg(long)]
    pub redis_host: Option<String>,

    /// Redis server port
    #[arg(long, default_value = "6379")]
    pub redis_port: u16,

    /// Redis unix socket
    #[arg(long, default_value = REDIS_UNIX_SOCKET)]
    pub redis_socket: String,

    /// Pause between dependent table writes, in milliseconds
    #[arg(long, default_value = "1000")]
    pub propagation_ms: u64,

    /// Interval between TLS certificate change checks, in seconds
    #[arg(long, default_value = "3600")]
    pub cert_monitor_secs: u64,

    /// Root of the sysfs tree read for interface state
    #[arg(long, default_value = DEFAULT_SYSFS_ROOT)]
    pub sysfs_root: PathBuf,
}

impl Args {
    /// Checks flag combinations that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enablehttp && !self.enablehttps {
            return Err(ConfigError::NoEndpoint);
        }
        if self.enablehttps {
            self.tls_paths()?;
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.loglevel
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.loglevel.clone()))
    }

    pub fn tls_paths(&self) -> Result<TlsPaths, ConfigError> {
        Ok(TlsPaths {
            client_ca: self
                .clientcert
                .clone()
                .ok_or(ConfigError::MissingTlsFile("clientcert"))?,
            server_cert: self
                .servercert
                .clone()
                .ok_or(ConfigError::MissingTlsFile("servercert"))?,
            server_key: self
                .serverkey
                .clone()
                .ok_or(ConfigError::MissingTlsFile("serverkey"))?,
        })
    }

    pub fn redis_endpoint(&self) -> RedisEndpoint {
        match &self.redis_host {
            Some(host) => RedisEndpoint::Tcp {
                host: host.clone(),
                port: self.redis_port,
            },
            None => RedisEndpoint::Unix {
                path: self.redis_socket.clone(),
            },
        }
    }

    /// Allow-list of client certificate common names.
    pub fn trusted_common_names(&self) -> Vec<String> {
        self.clientcertcommonname
            .split(',')
            .map(str::trim)
            .filter(|cn| !cn.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn propagation_interval(&self) -> Duration {
        Duration::from_millis(self.propagation_ms)
    }

    pub fn cert_monitor_interval(&self) -> Duration {
        Duration::from_secs(self.cert_monitor_secs)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, HTTP_PORT))
    }

    pub fn https_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, HTTPS_PORT))
    }
}
