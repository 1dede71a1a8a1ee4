//! Minimal single-vhost server: one `[default]` vhost with a document root
//! and no routes, configured entirely in-process (no TOML file on disk).

use std::sync::Arc;
use tokio::net::TcpListener;
use vhostd::config::{Config, HttpConfig, VhostConfig};
use vhostd::gateway::Gateway;
use vhostd::runtime::Runtime;
use vhostd::settings::Settings;
use vhostd::vhost::VirtualHost;
use vhostd::Server;

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
            vhosts: vec![VhostConfig {
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
                compress_control: String::new(),
                basic_auth: vec![],
            }],
        },
    }
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

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .handler(Gateway::new(Arc::clone(&runtime)))
        .admission(runtime.settings.current().http.admission_limits())
        .build()
        .launch()
        .await;
}
