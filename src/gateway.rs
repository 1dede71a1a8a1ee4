//! The [`Handler`] implementation bridging the generic connection FSM to
//! vhost dispatch, route handlers, and static files (§4.3-§4.10): this is
//! the one place that turns a parsed [`Request`] into a vhost lookup, a
//! redirect/auth/route/static-file decision, and a written [`Response`].

use crate::executor::{HandlerOutcome, RequestInstance, RequestMethod};
use crate::http::response::Encoding;
use crate::runtime::Runtime;
use crate::vhost::registry::RouteMethod;
use crate::vhost::VirtualHost;
use crate::{ConnectionData, Handled, Handler, Request, Response, StatusCode};
use std::sync::Arc;

/// Dispatches every request through a [`Runtime`]'s [`crate::dispatcher::Dispatcher`],
/// applying each vhost's redirect rule, basic auth, route table, and
/// document root in that order.
pub struct Gateway {
    runtime: Arc<Runtime>,
}

impl Gateway {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }
}

impl<S: ConnectionData> Handler<S> for Gateway {
    async fn handle(&self, _: &mut S, req: &Request, resp: &mut Response) -> Handled {
        let host = req
            .header(b"host")
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .unwrap_or_default();

        let Some(vhost) = self.runtime.dispatcher.read().await.resolve(&host) else {
            return resp.status(StatusCode::NotFound).body("no virtual host configured");
        };

        if let Some(redirect) = &vhost.redirect {
            let code = StatusCode::from_u16(redirect.code).unwrap_or(StatusCode::Found);
            return resp.status(code).header("location", redirect.target.clone()).body("");
        }

        let path = req.url().path().to_string();

        let auth_header = req
            .header(b"authorization")
            .map(|h| String::from_utf8_lossy(h).into_owned());
        if vhost.basic_auth.check(&path, auth_header.as_deref()) == Some(false) {
            return resp
                .status(StatusCode::Unauthorized)
                .header("www-authenticate", "Basic")
                .body("authentication required");
        }

        let route_method = if req.method().is_get() {
            Some(RouteMethod::Get)
        } else if req.method().is_post() {
            Some(RouteMethod::Post)
        } else {
            None
        };

        if let Some(route_method) = route_method {
            if let Some(route) = vhost.registry.find(route_method, &path).await {
                if let Some(handler) = route.handler.clone() {
                    let instance = build_instance(req, &vhost.name, route_method);
                    let outcome = vhost.executor.submit(instance, handler).await;
                    vhost
                        .registry
                        .record_outcome(&route.pattern, outcome.is_success())
                        .await;
                    return write_outcome(resp, &outcome, &vhost, &path);
                }
            }
        }

        if let Some(doc_root) = &vhost.doc_root {
            if let Some((file_path, body)) = crate::static_file::resolve(doc_root, &path).await {
                resp.status(StatusCode::Ok)
                    .header("content-type", crate::static_file::content_type_for(&file_path));
                if let Some(cache_control) = vhost.cache_control_for(&path) {
                    resp.header("cache-control", cache_control.to_string());
                }
                return write_body(resp, &vhost, &path, body, req);
            }
        }

        resp.status(StatusCode::NotFound).body("not found")
    }
}

fn build_instance(req: &Request, vhost_name: &str, route_method: RouteMethod) -> RequestInstance {
    let method = match route_method {
        RouteMethod::Get => RequestMethod::Get,
        RouteMethod::Post => RequestMethod::Post,
    };

    RequestInstance {
        method,
        vhost_name: vhost_name.to_string(),
        path: req.url().path().to_string(),
        query: req.url().query_pairs().to_vec(),
        headers: req
            .headers()
            .map(|(k, v)| {
                (
                    String::from_utf8_lossy(k).into_owned(),
                    String::from_utf8_lossy(v).into_owned(),
                )
            })
            .collect(),
        body: req.body().map(<[u8]>::to_vec).unwrap_or_default(),
        created_at: std::time::Instant::now(),
    }
}

fn write_outcome(resp: &mut Response, outcome: &HandlerOutcome, vhost: &VirtualHost, path: &str) -> Handled {
    let status_line = outcome.effective_status_line();
    let code = status_line
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<u16>().ok())
        .and_then(StatusCode::from_u16)
        .unwrap_or(if outcome.is_success() {
            StatusCode::Ok
        } else {
            StatusCode::InternalServerError
        });

    resp.status(code);
    for (name, value) in &outcome.headers {
        resp.header(name.clone(), value.clone());
    }
    if let Some(cache_control) = vhost.cache_control_for(path) {
        resp.header("cache-control", cache_control.to_string());
    }
    resp.body(outcome.body.clone())
}

fn write_body(resp: &mut Response, vhost: &VirtualHost, path: &str, body: Vec<u8>, req: &Request) -> Handled {
    if vhost.compression_allowed_for(path) {
        if let Some(accept) = req.header(b"accept-encoding") {
            if let Some(encoding) = Encoding::negotiate(accept) {
                resp.header("content-encoding", encoding.as_str());
                resp.set_compression(encoding);
            }
        }
    }
    resp.body(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasicAuthConfig, BasicAuthCredential, Config, HttpConfig, VhostConfig};
    use crate::settings::Settings;

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

    async fn gateway_with_default_vhost(vhost_config: VhostConfig) -> (Gateway, Arc<Runtime>) {
        let runtime = Runtime::new(Settings::new("config.toml", config()));
        let vhost = VirtualHost::from_config(&vhost_config).unwrap();
        {
            let mut dispatcher = runtime.dispatcher.write().await;
            dispatcher.add_vhost(vhost).unwrap();
            dispatcher.initialize().unwrap();
        }
        (Gateway::new(Arc::clone(&runtime)), runtime)
    }

    fn minimal_vhost_config(docu_root: &str) -> VhostConfig {
        VhostConfig {
            server_name: "[default]".into(),
            redirect: None,
            docu_root: Some(docu_root.to_string()),
            docu_index: "index.html".into(),
            exec_thread_pool_size: 4,
            exec_thread_pool_size_hard: 64,
            exec_thread_pool_size_step_queue_size: 8,
            cgi_get_handlers: vec![],
            cgi_post_handlers: vec![],
            cache_control: vec![],
            compress_control: String::new(),
            basic_auth: vec![],
        }
    }

    #[tokio::test]
    async fn serves_static_file_from_doc_root() {
        let dir = std::env::temp_dir().join(format!("vhostd-gateway-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("index.html"), b"hello").await.unwrap();

        let (gateway, runtime) =
            gateway_with_default_vhost(minimal_vhost_config(&dir.to_string_lossy())).await;

        let mut conn = crate::server::connection::HttpConnection::from_req_with(
            Gateway::new(Arc::clone(&runtime)),
            "GET / HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );
        conn.parse().unwrap();
        gateway.handle(&mut (), &conn.request, &mut conn.response).await;

        assert!(conn.response.buffer().starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(conn.response.buffer().ends_with(b"hello"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_route_and_file_yields_404() {
        let (gateway, runtime) = gateway_with_default_vhost(minimal_vhost_config("./nonexistent")).await;

        let mut conn = crate::server::connection::HttpConnection::from_req_with(
            Gateway::new(Arc::clone(&runtime)),
            "GET /nope HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );
        conn.parse().unwrap();
        gateway.handle(&mut (), &conn.request, &mut conn.response).await;

        assert!(conn.response.buffer().starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn redirect_rule_shadows_everything() {
        let mut config = minimal_vhost_config("./www");
        config.redirect = Some("301~/new-home".into());
        let (gateway, runtime) = gateway_with_default_vhost(config).await;

        let mut conn = crate::server::connection::HttpConnection::from_req_with(
            Gateway::new(Arc::clone(&runtime)),
            "GET /anything HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );
        conn.parse().unwrap();
        gateway.handle(&mut (), &conn.request, &mut conn.response).await;

        assert!(conn.response.buffer().starts_with(b"HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(conn
            .response
            .buffer()
            .windows(b"location: /new-home".len())
            .any(|w| w == b"location: /new-home"));
    }

    #[tokio::test]
    async fn unauthenticated_request_to_protected_path_is_rejected() {
        let mut config = minimal_vhost_config("./www");
        config.basic_auth = vec![BasicAuthConfig {
            uri: "/secret".to_string(),
            auth: vec![BasicAuthCredential {
                user: "alice".to_string(),
                passwd: "hunter2".to_string(),
            }],
        }];
        let (gateway, runtime) = gateway_with_default_vhost(config).await;

        let mut conn = crate::server::connection::HttpConnection::from_req_with(
            Gateway::new(Arc::clone(&runtime)),
            "GET /secret HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );
        conn.parse().unwrap();
        gateway.handle(&mut (), &conn.request, &mut conn.response).await;

        assert!(conn.response.buffer().starts_with(b"HTTP/1.1 401 Unauthorized\r\n"));
    }

    #[tokio::test]
    async fn registered_route_wins_over_static_file() {
        let dir = std::env::temp_dir().join(format!("vhostd-gateway-route-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("api.txt"), b"static").await.unwrap();

        let (gateway, runtime) =
            gateway_with_default_vhost(minimal_vhost_config(&dir.to_string_lossy())).await;

        {
            let dispatcher = runtime.dispatcher.read().await;
            let vhost = dispatcher.resolve("example.com").unwrap();
            vhost
                .registry
                .add(
                    RouteMethod::Get,
                    "^/api.txt$",
                    std::sync::Arc::new(|_req: RequestInstance| {
                        Box::pin(async { HandlerOutcome::ok(b"from route".to_vec()) })
                    }),
                    false,
                )
                .await
                .unwrap();
        }

        let mut conn = crate::server::connection::HttpConnection::from_req_with(
            Gateway::new(Arc::clone(&runtime)),
            "GET /api.txt HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );
        conn.parse().unwrap();
        gateway.handle(&mut (), &conn.request, &mut conn.response).await;

        assert!(conn.response.buffer().ends_with(b"from route"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
