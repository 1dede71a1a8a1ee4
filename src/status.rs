//! Status callback registry (§4.9, §4.11): components register a callback
//! returning `(module, key, value)` triples; `/internal/status` renders the
//! aggregate as plain text.

use std::sync::Mutex;

type StatusCallback = Box<dyn Fn() -> Vec<(String, String, String)> + Send + Sync>;

/// Registry of named status callbacks.
#[derive(Default)]
pub struct StatusRegistry {
    callbacks: Mutex<Vec<(String, StatusCallback)>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, callback: StatusCallback) {
        self.callbacks.lock().unwrap().push((name.into(), callback));
    }

    /// Invokes every registered callback and renders the aggregate report
    /// as `module.key: value` lines, one per triple, in registration order.
    pub fn report(&self) -> String {
        let callbacks = self.callbacks.lock().unwrap();
        let mut out = String::new();

        for (_, callback) in callbacks.iter() {
            for (module, key, value) in callback() {
                out.push_str(&module);
                out.push('.');
                out.push_str(&key);
                out.push_str(": ");
                out.push_str(&value);
                out.push('\n');
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_concatenates_all_callbacks_in_order() {
        let registry = StatusRegistry::new();
        registry.register(
            "executor",
            Box::new(|| vec![("executor".to_string(), "workers".to_string(), "4".to_string())]),
        );
        registry.register(
            "dispatcher",
            Box::new(|| vec![("dispatcher".to_string(), "vhosts".to_string(), "2".to_string())]),
        );

        let report = registry.report();
        assert_eq!(report, "executor.workers: 4\ndispatcher.vhosts: 2\n");
    }
}
