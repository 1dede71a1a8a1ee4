//! Deserializable configuration tree mirroring the recognized TOML keys.
//!
//! [`Config`] is parsed once at startup and re-parsed on every
//! [`crate::settings::Settings::reload`]. The tree is intentionally a plain
//! data structure with no behavior of its own; components that need to react
//! to a reload register a callback with `Settings` instead of reading this
//! tree directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration document (the `[http]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
}

impl Config {
    /// Parses a TOML document into a [`Config`].
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    #[serde(default = "default_backlog_size")]
    pub backlog_size: u32,
    #[serde(default = "default_io_thread_pool_size")]
    pub io_thread_pool_size: usize,
    /// Semicolon-separated allow-list; empty disables IP filtering.
    #[serde(default)]
    pub safe_ip: String,
    #[serde(default = "default_true")]
    pub service_enable: bool,
    /// TPS cap; `0` means unlimited.
    #[serde(default)]
    pub service_speed: u32,
    /// Max concurrent connections; `0` means unlimited.
    #[serde(default)]
    pub service_concurrency: usize,
    #[serde(default = "default_session_timeout_secs")]
    pub session_cancel_time_out: u64,
    #[serde(default = "default_ops_timeout_secs")]
    pub ops_cancel_time_out: u64,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub vhosts: Vec<VhostConfig>,
}

impl HttpConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_cancel_time_out)
    }

    pub fn ops_timeout(&self) -> Duration {
        Duration::from_secs(self.ops_cancel_time_out)
    }

    /// The allow-list, split on `;`, with empty segments dropped.
    pub fn safe_ips(&self) -> Vec<&str> {
        self.safe_ip
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Maps `safe_ip`/`service_speed`/`service_concurrency` onto the
    /// `Server` builder's admission control (§4.3). Entries in `safe_ip`
    /// that don't parse as an IP address are skipped rather than rejecting
    /// the whole config.
    pub fn admission_limits(&self) -> crate::limits::AdmissionLimits {
        crate::limits::AdmissionLimits {
            safe_ips: self.safe_ips().iter().filter_map(|ip| ip.parse().ok()).collect(),
            service_speed: self.service_speed,
            service_concurrency: self.service_concurrency,
            ..crate::limits::AdmissionLimits::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VhostConfig {
    /// `"[default]"` is the special fallback vhost name.
    pub server_name: String,
    /// `"<code>~<uri>"`, e.g. `"301~/new"`.
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub docu_root: Option<String>,
    /// Semicolon-separated index filenames, tried in order.
    #[serde(default = "default_docu_index")]
    pub docu_index: String,

    #[serde(default = "default_exec_base")]
    pub exec_thread_pool_size: usize,
    #[serde(default = "default_exec_hard_max")]
    pub exec_thread_pool_size_hard: usize,
    #[serde(default = "default_exec_queue_step")]
    pub exec_thread_pool_size_step_queue_size: usize,

    #[serde(default)]
    pub cgi_get_handlers: Vec<CgiHandlerConfig>,
    #[serde(default)]
    pub cgi_post_handlers: Vec<CgiHandlerConfig>,

    #[serde(default)]
    pub cache_control: Vec<CacheControlConfig>,
    /// Semicolon-separated list of suffixes eligible for compression.
    #[serde(default)]
    pub compress_control: String,

    #[serde(default)]
    pub basic_auth: Vec<BasicAuthConfig>,
}

impl VhostConfig {
    pub fn docu_index_files(&self) -> Vec<&str> {
        self.docu_index
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn compress_suffixes(&self) -> Vec<&str> {
        self.compress_control
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parses `redirect` as `(code, target)`.
    pub fn redirect_rule(&self) -> Option<(u16, &str)> {
        let raw = self.redirect.as_deref()?;
        let (code, target) = raw.split_once('~')?;
        Some((code.parse().ok()?, target))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CgiHandlerConfig {
    pub uri: String,
    pub dl_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControlConfig {
    pub suffix: String,
    pub header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    pub uri: String,
    #[serde(default)]
    pub auth: Vec<BasicAuthCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthCredential {
    pub user: String,
    pub passwd: String,
}

const fn default_backlog_size() -> u32 {
    1024
}
const fn default_io_thread_pool_size() -> usize {
    4
}
const fn default_true() -> bool {
    true
}
const fn default_session_timeout_secs() -> u64 {
    30
}
const fn default_ops_timeout_secs() -> u64 {
    10
}
fn default_version() -> String {
    "vhostd/1".to_string()
}
fn default_docu_index() -> String {
    "index.html".to_string()
}
const fn default_exec_base() -> usize {
    4
}
const fn default_exec_hard_max() -> usize {
    64
}
const fn default_exec_queue_step() -> usize {
    8
}
