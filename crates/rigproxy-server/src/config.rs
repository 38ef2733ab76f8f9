//! Relay configuration: TOML file + CLI overrides.

use rigproxy_core::{LoginPolicy, RelayError, RelayResult, DEFAULT_WALLET_MIN_LEN};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub upstream: UpstreamSection,
    /// `[[proxy]]` listen targets.
    #[serde(default)]
    pub proxy: Vec<ProxySection>,
    #[serde(default)]
    pub login: LoginSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub report: ReportSection,
}

/// `[upstream]` section: the pool every rig is relayed to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSection {
    #[serde(default = "default_upstream_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            port: default_port(),
        }
    }
}

/// One `[[proxy]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySection {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// `[login]` section: rewrite policy for the first line.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginSection {
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default)]
    pub bypass_wallet: bool,
    #[serde(default)]
    pub bypass_worker_id: bool,
    #[serde(default = "default_wallet_min_len")]
    pub wallet_min_len: usize,
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            wallet: String::new(),
            password: None,
            agent: default_agent(),
            bypass_wallet: false,
            bypass_worker_id: false,
            wallet_min_len: default_wallet_min_len(),
        }
    }
}

/// `[network]` section: socket options applied to both endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_true")]
    pub keepalive: bool,
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            keepalive: true,
            nodelay: true,
        }
    }
}

/// `[report]` section: periodic registry snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_report_path")]
    pub path: String,
    #[serde(default = "default_report_interval")]
    pub interval_secs: u64,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_report_path(),
            interval_secs: default_report_interval(),
        }
    }
}

fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3333
}
fn default_agent() -> String {
    format!("rigproxy/{}", env!("CARGO_PKG_VERSION"))
}
fn default_wallet_min_len() -> usize {
    DEFAULT_WALLET_MIN_LEN
}
fn default_report_path() -> String {
    "log/report.json".to_string()
}
fn default_report_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// A `host:port` pair, either a listen target or the upstream pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`. IPv6 hosts must be bracketed (`[::1]:3333`).
    pub fn parse(s: &str) -> RelayResult<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RelayError::Config(format!("expected host:port, got {s:?}")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| RelayError::Config(format!("invalid port in {s:?}: {e}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(RelayError::Config(format!("missing host in {s:?}")));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Periodic snapshot settings. `None` in [`RelayConfig`] when disabled.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub interval: Duration,
}

/// CLI values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub upstream: Option<String>,
    pub report_path: Option<String>,
    pub report_interval: Option<u64>,
}

/// Resolved relay configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: Vec<Endpoint>,
    pub upstream: Endpoint,
    pub policy: LoginPolicy,
    pub keepalive: bool,
    pub nodelay: bool,
    pub report: Option<ReportConfig>,
}

impl RelayConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(config_path: &Path, overrides: &Overrides) -> RelayResult<Self> {
        let expanded = expand_tilde(config_path);
        if !expanded.exists() {
            return Err(RelayError::Config(format!(
                "config file not found: {}",
                expanded.display()
            )));
        }
        info!(path = %expanded.display(), "loading config file");
        let content = std::fs::read_to_string(&expanded)?;
        Self::from_toml(&content, overrides)
    }

    /// Build from TOML text, then apply CLI overrides.
    pub fn from_toml(content: &str, overrides: &Overrides) -> RelayResult<Self> {
        let file = toml::from_str::<ConfigFile>(content)
            .map_err(|e| RelayError::Config(format!("config parse error: {e}")))?;
        Self::resolve(file, overrides)
    }

    fn resolve(file: ConfigFile, overrides: &Overrides) -> RelayResult<Self> {
        let upstream = match &overrides.upstream {
            Some(s) => Endpoint::parse(s)?,
            None => Endpoint::new(file.upstream.host, file.upstream.port),
        };

        let listen: Vec<Endpoint> = file
            .proxy
            .into_iter()
            .map(|p| Endpoint::new(p.host, p.port))
            .collect();
        if listen.is_empty() {
            return Err(RelayError::Config(
                "at least one [[proxy]] listen target is required".to_string(),
            ));
        }

        if file.login.wallet.trim().is_empty() {
            return Err(RelayError::Config("login.wallet must be set".to_string()));
        }

        let report = if file.report.enabled {
            let path = overrides
                .report_path
                .clone()
                .unwrap_or(file.report.path);
            let interval_secs = overrides
                .report_interval
                .unwrap_or(file.report.interval_secs);
            if interval_secs == 0 {
                return Err(RelayError::Config(
                    "report.interval_secs must be greater than zero".to_string(),
                ));
            }
            Some(ReportConfig {
                path: expand_tilde_str(&path),
                interval: Duration::from_secs(interval_secs),
            })
        } else {
            None
        };

        Ok(Self {
            listen,
            upstream,
            policy: LoginPolicy {
                wallet: file.login.wallet,
                password: file.login.password.filter(|p| !p.is_empty()),
                agent: file.login.agent,
                bypass_wallet: file.login.bypass_wallet,
                bypass_worker_id: file.login.bypass_worker_id,
                wallet_min_len: file.login.wallet_min_len,
            },
            keepalive: file.network.keepalive,
            nodelay: file.network.nodelay,
            report,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
