//! The owned snapshot handed from the Connection FSM to an [`super::Executor`]
//! worker, plus the uniform handler return contract both native and dynamic
//! module handlers produce.

use std::time::Instant;

/// A request, fully detached from the connection's reusable buffers.
///
/// The FSM's `Parser`/`Request` stay zero-copy for header framing; this type
/// owns its data instead, since the instant the connection's task resumes
/// reading the next request, those borrowed slices would no longer be valid
/// for a worker thread still processing the previous one.
#[derive(Debug, Clone)]
pub struct RequestInstance {
    pub method: RequestMethod,
    pub vhost_name: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub created_at: Instant,
}

impl RequestInstance {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Options,
    Other,
}

/// The uniform handler contract (§9 Design Notes): a status plus body and
/// optional extras. `status == 0` is success; a non-zero status maps to
/// `500` unless `status_line` is supplied explicitly.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub status: i32,
    pub body: Vec<u8>,
    pub status_line: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl HandlerOutcome {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 0,
            body,
            status_line: None,
            headers: Vec::new(),
        }
    }

    pub fn failed(body: Vec<u8>) -> Self {
        Self {
            status: 1,
            body,
            status_line: None,
            headers: Vec::new(),
        }
    }

    pub fn with_status_line(mut self, status_line: impl Into<String>) -> Self {
        self.status_line = Some(status_line.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Resolves the effective status line per §8's boundary behavior:
    /// `0` + empty status line → `200`; non-`0` + empty status line → `500`.
    pub fn effective_status_line(&self) -> String {
        self.status_line.clone().unwrap_or_else(|| {
            if self.status == 0 {
                "200 OK".to_string()
            } else {
                "500 Internal Server Error".to_string()
            }
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}
