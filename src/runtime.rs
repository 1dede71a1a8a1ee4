//! The explicit `Runtime` value (§9 Design Notes) replacing the source's
//! dispatcher/settings/status/timer singletons: every component that needs
//! one of these threads it through by reference instead of reaching for
//! process-global state.

use crate::dispatcher::Dispatcher;
use crate::settings::Settings;
use crate::status::StatusRegistry;
use crate::timer::TimerService;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bundles the cross-cutting services a running server needs: the vhost
/// dispatcher, live settings, the status callback registry, and the shared
/// timer service.
pub struct Runtime {
    pub dispatcher: RwLock<Dispatcher>,
    pub settings: Settings,
    pub status: StatusRegistry,
    pub timer: Arc<TimerService>,
}

impl Runtime {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            dispatcher: RwLock::new(Dispatcher::new()),
            settings,
            status: StatusRegistry::new(),
            timer: TimerService::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, HttpConfig};

    fn empty_config() -> Config {
        Config {
            http: HttpConfig {
                bind_addr: "127.0.0.1".to_string(),
                bind_port: 8080,
                backlog_size: 1024,
                io_thread_pool_size: 4,
                safe_ip: String::new(),
                service_enable: true,
                service_speed: 0,
                service_concurrency: 0,
                session_cancel_time_out: 30,
                ops_cancel_time_out: 10,
                version: "vhostd/1".to_string(),
                vhosts: vec![],
            },
        }
    }

    #[tokio::test]
    async fn runtime_bundles_fresh_services() {
        let runtime = Runtime::new(Settings::new("config.toml", empty_config()));
        assert_eq!(runtime.status.report(), "");
        assert_eq!(runtime.timer.live_count(), 0);
        assert!(runtime.dispatcher.read().await.resolve("anything").is_none());
    }
}
