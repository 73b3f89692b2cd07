//! File based configuration of the `mllp-server` binary.
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:2575"
//! cleanup_interval_ms = 5000
//! encoding = "utf-8"
//!
//! [tls]
//! certificate = "certs/server.pem"
//! private_key = "certs/server.key"
//!
//! [log]
//! level = "info"
//! ```
//!
//! Every key is optional; a missing `[tls]` table means plain TCP.

use crate::accept::AcceptRetry;
use micro_mllp::codec::DEFAULT_MAX_FRAME_SIZE;
use micro_mllp::connection::DEFAULT_HANDSHAKE_TIMEOUT;
use micro_mllp::protocol::TextEncoding;
use serde::Deserialize;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDRESS: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2575);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKLOG: u32 = 1024;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("can't read settings file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid settings: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub server: ServerSettings,
    pub tls: Option<TlsSettings>,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub address: SocketAddr,
    /// Zero means the default of 5 s.
    pub cleanup_interval_ms: u64,
    pub backlog: u32,
    pub encoding: TextEncoding,
    pub max_frame_size: usize,
    /// Zero means the default of 10 s.
    pub handshake_timeout_ms: u64,
    pub accept_retries: u32,
}

impl ServerSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            cleanup_interval_ms: millis(DEFAULT_CLEANUP_INTERVAL),
            backlog: DEFAULT_BACKLOG,
            encoding: TextEncoding::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            handshake_timeout_ms: millis(DEFAULT_HANDSHAKE_TIMEOUT),
            accept_retries: AcceptRetry::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// PEM files of the server certificate chain and its private key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSettings {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// An `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".to_owned() }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io { path: path.to_owned(), source })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
