//! vhostd - embeddable multi-vhost HTTP/1.x server with a dynamic-module CGI ABI
//!
//! A performance-oriented HTTP server built around named [`VirtualHost`]s, each
//! with its own regex-routed handler registry, request executor, and resource
//! limits. Handlers can be registered directly in-process or loaded at runtime
//! from a shared library through the [`loader`] module.
//!
//! # Features
//!
//! ## Routing & dispatch
//! - **Per-vhost handler registries** - [`vhost::registry::Registry`] maps a
//!   path pattern to a handler; lookups are `RwLock`-guarded for concurrent reads.
//! - **Host-header dispatch** - [`dispatcher`] resolves the `Host` header (with a
//!   configurable default vhost) before a request ever reaches a registry.
//! - **Dynamic modules** - [`loader`] loads handlers from `cdylib` modules via
//!   [`libloading`], so routes can be added without recompiling the server.
//!
//! ## Execution
//! - **Per-vhost adaptive worker pools** - [`executor`] resizes its pool between
//!   [`limits::ExecutorLimits::base`] and [`limits::ExecutorLimits::hard_max`] as
//!   queue depth changes, with handler panics caught and converted to 500s.
//! - **Timers** - [`timer::TimerService`] backs connection/session timeouts and
//!   the executor's periodic resize tick.
//!
//! ## Security & protection
//! - **Built-in DoS/DDoS protection** - per-connection and per-server limits are
//!   enabled by default.
//! - **Fully configurable limits and timeouts** for requests, responses, and
//!   connections (see [`limits`]).
//! - **Custom connection filtering** - implement [`ConnectionFilter`] to reject
//!   unwanted connections at the TCP level.
//! - **Basic authentication** - [`auth`] guards routes with RFC 7617 Basic Auth.
//!
//! ## Operability
//! - **Live config reload** - [`settings`] hot-swaps a parsed TOML [`config::Config`]
//!   without a restart and notifies registered callbacks.
//! - **Status reporting and admin routes** - [`status`] and [`admin`] expose
//!   `/internal/status`, `/internal/updateconf`, and `/internal/drop`.
//! - **Structured logging** - built on [`tracing`](https://docs.rs/tracing).
//!
//! [`gateway::Gateway`] is the [`Handler`] that ties all of the above together:
//! vhost resolution, redirects, basic auth, route dispatch, and static files,
//! in that order, for every connection the [`Server`] drives.
//!
//! # Quick Start
//!
//! ```no_run
//! use vhostd::{Server, Handler, Request, Response, Handled, StatusCode};
//! use tokio::net::TcpListener;
//!
//! struct MyHandler;
//!
//! impl Handler for MyHandler {
//!     async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
//!         resp.status(StatusCode::Ok).body("Hello World!")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .handler(MyHandler)
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! For multi-vhost routing, dynamic modules, and admin endpoints, see
//! [`vhost`], [`loader`], and [`admin`].
pub(crate) mod http {
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod listener;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;

pub mod admin;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod gateway;
pub mod loader;
pub mod runtime;
pub mod settings;
pub mod static_file;
pub mod status;
pub mod timer;
pub mod vhost;

pub use crate::{
    gateway::Gateway,
    http::{
        query,
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Handled, Response,
        },
        types::{Method, StatusCode, Url, Version},
    },
    server::{
        connection::{ConnectionData, ConnectionFilter},
        server_impl::{Handler, Server, ServerBuilder},
    },
    vhost::VirtualHost,
};

#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response) -> Handled>(f: F) {
    f(
        &Request::new(&crate::limits::ReqLimits::default()),
        &mut Response::new(&crate::limits::RespLimits::default()),
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! impt_default_handler {
    ($name:ident) => {
        use vhostd::{Handled, Handler, Request, Response, StatusCode};
        struct $name;

        // `<()>` to check functionality
        impl Handler<()> for $name {
            async fn handle(&self, _: &mut (), _: &Request, resp: &mut Response) -> Handled {
                resp.status(StatusCode::Ok).body("Hello world!")
            }
        }
    };
}

#[doc(hidden)]
#[cfg(test)]
pub(crate) mod tools {
    use std::str::from_utf8;

    #[inline]
    pub(crate) fn str(value: Option<&[u8]>) -> Option<&str> {
        Some(from_utf8(value?).unwrap())
    }

    #[inline]
    pub(crate) fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }

    #[inline]
    pub(crate) fn str_2<'a>(value: (&'a [u8], &'a [u8])) -> (&'a str, &'a str) {
        (from_utf8(value.0).unwrap(), from_utf8(value.1).unwrap())
    }
}
