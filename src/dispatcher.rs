//! Host-header → virtual-host dispatch (§4.5).

use crate::errors::DispatchError;
use crate::vhost::VirtualHost;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maps a lower-cased, port-stripped `Host` header to its [`VirtualHost`],
/// falling back to `[default]` on miss. Vhosts are registered up front at
/// server build time; adding one after [`Dispatcher::initialize`] is
/// rejected (§4.5).
pub struct Dispatcher {
    vhosts: HashMap<String, Arc<VirtualHost>>,
    initialized: AtomicBool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            vhosts: HashMap::new(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn add_vhost(&mut self, vhost: VirtualHost) -> Result<(), DispatchError> {
        if self.initialized.load(Ordering::Acquire) {
            return Err(DispatchError::AlreadyInitialized(vhost.name));
        }
        if self.vhosts.contains_key(&vhost.name) {
            return Err(DispatchError::DuplicateVhost(vhost.name));
        }
        self.vhosts.insert(vhost.name.clone(), Arc::new(vhost));
        Ok(())
    }

    /// Freezes the vhost set; subsequent [`add_vhost`](Self::add_vhost)
    /// calls are rejected. Fails if no `[default]` vhost was registered.
    pub fn initialize(&self) -> Result<(), DispatchError> {
        if !self.vhosts.contains_key("[default]") {
            return Err(DispatchError::NoDefaultVhost);
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Resolves a raw `Host` header value (possibly carrying a `:port`
    /// suffix) to its vhost, falling back to `[default]`.
    pub fn resolve(&self, host_header: &str) -> Option<Arc<VirtualHost>> {
        let name = host_header
            .rsplit_once(':')
            .map_or(host_header, |(host, _port)| host)
            .to_ascii_lowercase();

        self.vhosts
            .get(&name)
            .or_else(|| self.vhosts.get("[default]"))
            .cloned()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VhostConfig;

    fn vhost(name: &str) -> VirtualHost {
        VirtualHost::from_config(&VhostConfig {
            server_name: name.to_string(),
            redirect: None,
            docu_root: Some("./www".into()),
            docu_index: "index.html".into(),
            exec_thread_pool_size: 4,
            exec_thread_pool_size_hard: 64,
            exec_thread_pool_size_step_queue_size: 8,
            cgi_get_handlers: vec![],
            cgi_post_handlers: vec![],
            cache_control: vec![],
            compress_control: String::new(),
            basic_auth: vec![],
        })
        .unwrap()
    }

    #[test]
    fn strips_port_and_lowercases_before_lookup() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_vhost(vhost("example.com")).unwrap();
        dispatcher.add_vhost(vhost("[default]")).unwrap();
        dispatcher.initialize().unwrap();

        let resolved = dispatcher.resolve("EXAMPLE.COM:8080").unwrap();
        assert_eq!(resolved.name, "example.com");
    }

    #[test]
    fn falls_back_to_default_on_miss() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_vhost(vhost("[default]")).unwrap();
        dispatcher.initialize().unwrap();

        let resolved = dispatcher.resolve("unknown.example").unwrap();
        assert_eq!(resolved.name, "[default]");
    }

    #[test]
    fn rejects_add_after_initialize() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_vhost(vhost("[default]")).unwrap();
        dispatcher.initialize().unwrap();

        let err = dispatcher.add_vhost(vhost("late.example")).unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyInitialized(_)));
    }

    #[test]
    fn initialize_requires_default_vhost() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_vhost(vhost("only.example")).unwrap();
        assert!(matches!(
            dispatcher.initialize(),
            Err(DispatchError::NoDefaultVhost)
        ));
    }
}
