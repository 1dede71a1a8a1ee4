//! Settings (§4.9): holds the live configuration snapshot and a registry of
//! reload callbacks. Reload parses the config file fresh; on success the
//! active snapshot is swapped atomically and every callback is invoked with
//! the new tree. On parse failure the active config is left untouched.

use crate::config::Config;
use crate::errors::SettingsError;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

type ReloadCallback = Box<dyn Fn(&Arc<Config>) -> i32 + Send + Sync>;

/// Live configuration plus its reload callback registry.
///
/// `active` is a `Mutex<Arc<Config>>`: readers clone the `Arc` out under a
/// short-lived lock (the same granularity the connection/executor code
/// already uses for its own shared state) rather than holding the lock for
/// the duration of a request.
pub struct Settings {
    path: String,
    active: Mutex<Arc<Config>>,
    callbacks: Mutex<Vec<(String, ReloadCallback)>>,
}

impl Settings {
    pub fn new(path: impl Into<String>, initial: Config) -> Self {
        Self {
            path: path.into(),
            active: Mutex::new(Arc::new(initial)),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Loads and parses `path` as the initial configuration.
    pub async fn load(path: impl Into<String>) -> Result<Self, SettingsError> {
        let path = path.into();
        let config = Self::read_and_parse(&path).await?;
        Ok(Self::new(path, config))
    }

    pub fn current(&self) -> Arc<Config> {
        Arc::clone(&self.active.lock().unwrap())
    }

    /// Registers a callback invoked with the new config on every successful
    /// reload. Returns the name for later removal/debugging.
    pub fn on_reload(&self, name: impl Into<String>, callback: ReloadCallback) {
        self.callbacks.lock().unwrap().push((name.into(), callback));
    }

    /// Re-reads and re-parses the config file. On success, swaps the active
    /// snapshot and invokes every callback, returning the sum of their
    /// return values. On failure, the active config is untouched.
    pub async fn reload(&self) -> Result<i32, SettingsError> {
        let config = Arc::new(Self::read_and_parse(&self.path).await?);

        *self.active.lock().unwrap() = Arc::clone(&config);

        let callbacks = self.callbacks.lock().unwrap();
        let sum = callbacks.iter().fold(0, |acc, (name, callback)| {
            let result = callback(&config);
            info!(name, result, "settings reload callback invoked");
            acc + result
        });

        info!(path = %self.path, callbacks = callbacks.len(), "configuration reloaded");
        Ok(sum)
    }

    async fn read_and_parse(path: &str) -> Result<Config, SettingsError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Read {
                path: path.to_string(),
                source,
            })?;

        Config::from_toml(&text).map_err(|err| {
            warn!(path, error = %err, "config reload failed to parse, keeping active config");
            SettingsError::Parse(err)
        })
    }
}
