//! Built-in admin endpoints (§4.11): `/internal/status`,
//! `/internal/updateconf`, `/internal/drop`. Registered with `built_in =
//! true` on the default vhost's registry at server-build time, using the
//! same `Registry::add` any user route uses.

use crate::executor::{HandlerFn, HandlerOutcome, RequestInstance};
use crate::runtime::Runtime;
use crate::vhost::registry::RouteMethod;
use std::sync::Arc;

pub fn status_handler(runtime: Arc<Runtime>) -> HandlerFn {
    Arc::new(move |_request: RequestInstance| {
        let runtime = Arc::clone(&runtime);
        Box::pin(async move { HandlerOutcome::ok(runtime.status.report().into_bytes()) })
    })
}

pub fn updateconf_handler(runtime: Arc<Runtime>) -> HandlerFn {
    Arc::new(move |_request: RequestInstance| {
        let runtime = Arc::clone(&runtime);
        Box::pin(async move {
            match runtime.settings.reload().await {
                Ok(callbacks_sum) => {
                    HandlerOutcome::ok(format!("reloaded, callbacks sum {callbacks_sum}").into_bytes())
                }
                Err(err) => HandlerOutcome::failed(err.to_string().into_bytes())
                    .with_status_line("500 Internal Server Error"),
            }
        })
    })
}

pub fn drop_handler(runtime: Arc<Runtime>) -> HandlerFn {
    Arc::new(move |request: RequestInstance| {
        let runtime = Arc::clone(&runtime);
        Box::pin(async move {
            let Some(hostname) = request.query_param("hostname").map(str::to_string) else {
                return bad_request("missing `hostname` parameter");
            };
            let Some(uri) = request.query_param("uri").map(str::to_string) else {
                return bad_request("missing `uri` parameter");
            };
            let Some(method) = request.query_param("method").map(str::to_string) else {
                return bad_request("missing `method` parameter");
            };

            let methods: &[RouteMethod] = match method.as_str() {
                "GET" => &[RouteMethod::Get],
                "POST" => &[RouteMethod::Post],
                "ALL" => &[RouteMethod::Get, RouteMethod::Post],
                _ => return bad_request("method must be GET, POST, or ALL"),
            };

            let dispatcher = runtime.dispatcher.read().await;
            let Some(vhost) = dispatcher.resolve(&hostname) else {
                return bad_request("unknown hostname");
            };

            for route_method in methods {
                if let Err(err) = vhost.registry.drop_route(*route_method, &uri).await {
                    return HandlerOutcome::failed(err.to_string().into_bytes())
                        .with_status_line("500 Internal Server Error");
                }
            }

            HandlerOutcome::ok(b"dropped".to_vec())
        })
    })
}

fn bad_request(message: &str) -> HandlerOutcome {
    HandlerOutcome::failed(message.as_bytes().to_vec()).with_status_line("400 Bad Request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, HttpConfig, VhostConfig};
    use crate::executor::RequestMethod;
    use crate::settings::Settings;
    use crate::vhost::VirtualHost;

    fn config() -> Config {
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

    fn req(query: Vec<(String, String)>) -> RequestInstance {
        RequestInstance {
            method: RequestMethod::Get,
            vhost_name: "[default]".into(),
            path: "/internal/drop".into(),
            query,
            headers: Vec::new(),
            body: Vec::new(),
            created_at: std::time::Instant::now(),
        }
    }

    #[tokio::test]
    async fn status_handler_reports_registered_callbacks() {
        let runtime = Runtime::new(Settings::new("config.toml", config()));
        runtime.status.register(
            "executor",
            Box::new(|| vec![("executor".to_string(), "workers".to_string(), "4".to_string())]),
        );

        let handler = status_handler(Arc::clone(&runtime));
        let outcome = handler(req(vec![])).await;
        assert_eq!(outcome.body, b"executor.workers: 4\n");
    }

    #[tokio::test]
    async fn drop_handler_rejects_missing_params() {
        let runtime = Runtime::new(Settings::new("config.toml", config()));
        let handler = drop_handler(runtime);
        let outcome = handler(req(vec![])).await;
        assert_eq!(outcome.effective_status_line(), "400 Bad Request");
    }

    #[tokio::test]
    async fn drop_handler_refuses_built_in_route() {
        let runtime = Runtime::new(Settings::new("config.toml", config()));

        let vhost = VirtualHost::from_config(&VhostConfig {
            server_name: "[default]".into(),
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
        .unwrap();
        vhost
            .registry
            .add(
                RouteMethod::Get,
                "^/internal/status$",
                status_handler(Arc::clone(&runtime)),
                true,
            )
            .await
            .unwrap();

        {
            let mut dispatcher = runtime.dispatcher.write().await;
            dispatcher.add_vhost(vhost).unwrap();
            dispatcher.initialize().unwrap();
        }

        let handler = drop_handler(runtime);
        let outcome = handler(req(vec![
            ("hostname".to_string(), "[default]".to_string()),
            ("uri".to_string(), "^/internal/status$".to_string()),
            ("method".to_string(), "GET".to_string()),
        ]))
        .await;

        assert_eq!(outcome.effective_status_line(), "500 Internal Server Error");
    }
}
