//! Virtual host: a named routing context keyed by the `Host` header (§3,
//! §4.4).

pub mod registry;

use crate::auth::BasicAuthTable;
use crate::config::VhostConfig;
use crate::executor::Executor;
use crate::limits::ExecutorLimits;
use registry::Registry;
use std::collections::HashMap;
use std::sync::Arc;

/// A redirect rule that, when set, shadows every route on the vhost (§4.4).
#[derive(Debug, Clone)]
pub struct RedirectRule {
    pub code: u16,
    pub target: String,
}

/// Static-file serving configuration for a vhost with no redirect rule.
#[derive(Debug, Clone)]
pub struct DocRoot {
    pub root: String,
    pub index_files: Vec<String>,
}

/// A named routing context: either a redirect rule or a document root (never
/// both empty, per the data-model invariant), an ordered route table, and
/// the executor that runs its handlers.
pub struct VirtualHost {
    pub name: String,
    pub redirect: Option<RedirectRule>,
    pub doc_root: Option<DocRoot>,
    pub registry: Registry,
    pub basic_auth: BasicAuthTable,
    /// Suffix → `Cache-Control` header value.
    pub cache_control: HashMap<String, String>,
    /// Suffixes eligible for response compression.
    pub compress_suffixes: Vec<String>,
    pub executor: Arc<Executor>,
}

impl VirtualHost {
    /// Builds a vhost from its config-file record. Returns `None` if the
    /// config's executor sizing is invalid (surfaced as an `ExecutorError`
    /// by the caller via `Executor::new`).
    pub fn from_config(config: &VhostConfig) -> Result<Self, crate::errors::ExecutorError> {
        let redirect = config.redirect_rule().map(|(code, target)| RedirectRule {
            code,
            target: target.to_string(),
        });

        let doc_root = config.docu_root.clone().map(|root| DocRoot {
            root,
            index_files: config
                .docu_index_files()
                .into_iter()
                .map(str::to_string)
                .collect(),
        });

        let cache_control = config
            .cache_control
            .iter()
            .map(|entry| (entry.suffix.clone(), entry.header.clone()))
            .collect();

        let compress_suffixes = config
            .compress_suffixes()
            .into_iter()
            .map(str::to_string)
            .collect();

        let limits = ExecutorLimits {
            base: config.exec_thread_pool_size,
            hard_max: config.exec_thread_pool_size_hard,
            queue_step: config.exec_thread_pool_size_step_queue_size,
            ..ExecutorLimits::default()
        };

        Ok(Self {
            name: config.server_name.clone(),
            redirect,
            doc_root,
            registry: Registry::new(),
            basic_auth: BasicAuthTable::from_config(&config.basic_auth),
            cache_control,
            compress_suffixes,
            executor: Executor::new(limits)?,
        })
    }

    /// Whether `name` is the special catch-all vhost name.
    pub fn is_default_name(name: &str) -> bool {
        name == "[default]"
    }

    pub fn cache_control_for(&self, path: &str) -> Option<&str> {
        let suffix = path.rsplit('.').next()?;
        self.cache_control.get(suffix).map(String::as_str)
    }

    pub fn compression_allowed_for(&self, path: &str) -> bool {
        path.rsplit('.')
            .next()
            .is_some_and(|suffix| self.compress_suffixes.iter().any(|s| s == suffix))
    }
}
