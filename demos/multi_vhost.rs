//! Multi-vhost server: a `[default]` vhost serving static files plus the
//! built-in admin endpoints, an `api.local` vhost with a couple of GET/POST
//! routes, and an `old.local` vhost that redirects everything.

use std::sync::Arc;
use tokio::net::TcpListener;
use vhostd::config::{Config, HttpConfig, VhostConfig};
use vhostd::executor::{HandlerOutcome, RequestInstance};
use vhostd::gateway::Gateway;
use vhostd::runtime::Runtime;
use vhostd::settings::Settings;
use vhostd::vhost::registry::RouteMethod;
use vhostd::vhost::VirtualHost;
use vhostd::Server;
use vhostd::{admin, executor::HandlerFn};

fn default_vhost_config() -> VhostConfig {
    VhostConfig {
        server_name: "[default]".to_string(),
        redirect: None,
        docu_root: Some("./demos/www".to_string()),
        docu_index: "index.html".to_string(),
        exec_thread_pool_size: 4,
        exec_thread_pool_size_hard: 64,
        exec_thread_pool_size_step_queue_size: 8,
        cgi_get_handlers: vec![],
        cgi_post_handlers: vec![],
        cache_control: vec![],
        compress_control: "html;css;js".to_string(),
        basic_auth: vec![],
    }
}

fn api_vhost_config() -> VhostConfig {
    VhostConfig {
        server_name: "api.local".to_string(),
        redirect: None,
        docu_root: None,
        docu_index: "index.html".to_string(),
        exec_thread_pool_size: 8,
        exec_thread_pool_size_hard: 32,
        exec_thread_pool_size_step_queue_size: 4,
        cgi_get_handlers: vec![],
        cgi_post_handlers: vec![],
        cache_control: vec![],
        compress_control: String::new(),
        basic_auth: vec![],
    }
}

fn old_vhost_config() -> VhostConfig {
    VhostConfig {
        server_name: "old.local".to_string(),
        redirect: Some("301~/".to_string()),
        docu_root: None,
        docu_index: "index.html".to_string(),
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
            vhosts: vec![default_vhost_config(), api_vhost_config(), old_vhost_config()],
        },
    }
}

fn echo_handler() -> HandlerFn {
    Arc::new(|request: RequestInstance| {
        Box::pin(async move {
            let body = format!("{} {} ({} bytes)", request.vhost_name, request.path, request.body.len());
            HandlerOutcome::ok(body.into_bytes())
        })
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let runtime = Runtime::new(Settings::new("config.toml", config()));

    {
        let mut dispatcher = runtime.dispatcher.write().await;
        for vhost_config in &runtime.settings.current().http.vhosts {
            dispatcher
                .add_vhost(VirtualHost::from_config(vhost_config).unwrap())
                .unwrap();
        }
        dispatcher.initialize().unwrap();
    }

    {
        let dispatcher = runtime.dispatcher.read().await;

        let default_vhost = dispatcher.resolve("[default]").unwrap();
        default_vhost
            .registry
            .add(
                RouteMethod::Get,
                "^/internal/status$",
                admin::status_handler(Arc::clone(&runtime)),
                true,
            )
            .await
            .unwrap();
        default_vhost
            .registry
            .add(
                RouteMethod::Get,
                "^/internal/updateconf$",
                admin::updateconf_handler(Arc::clone(&runtime)),
                true,
            )
            .await
            .unwrap();
        default_vhost
            .registry
            .add(
                RouteMethod::Get,
                "^/internal/drop$",
                admin::drop_handler(Arc::clone(&runtime)),
                true,
            )
            .await
            .unwrap();

        let api_vhost = dispatcher.resolve("api.local").unwrap();
        api_vhost
            .registry
            .add(RouteMethod::Get, "^/echo$", echo_handler(), false)
            .await
            .unwrap();
        api_vhost
            .registry
            .add(RouteMethod::Post, "^/echo$", echo_handler(), false)
            .await
            .unwrap();
    }

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .handler(Gateway::new(Arc::clone(&runtime)))
        .build()
        .launch()
        .await;
}
