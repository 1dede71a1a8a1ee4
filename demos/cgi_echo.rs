//! Dynamic-module vhost: a single GET handler loaded at startup from a
//! shared library exporting `module_init`/`cgi_get_handler`/`module_exit`,
//! echoing its query parameters back as the response body.

use std::sync::Arc;
use tokio::net::TcpListener;
use vhostd::config::{Config, HttpConfig, VhostConfig};
use vhostd::gateway::Gateway;
use vhostd::loader::{self, Module};
use vhostd::runtime::Runtime;
use vhostd::settings::Settings;
use vhostd::vhost::registry::RouteMethod;
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

    // Path to a `cdylib` built from the `module_init`/`cgi_get_handler`/
    // `module_exit`/`free_msg` C ABI this loader targets.
    let module_path =
        std::env::var("VHOSTD_CGI_MODULE").unwrap_or_else(|_| "./demos/modules/libecho.so".to_string());
    let module = Arc::new(unsafe { Module::load(&module_path).expect("failed to load CGI module") });

    {
        let dispatcher = runtime.dispatcher.read().await;
        let default_vhost = dispatcher.resolve("[default]").unwrap();
        default_vhost
            .registry
            .add(RouteMethod::Get, "^/echo$", loader::as_get_handler(Arc::clone(&module)), false)
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
