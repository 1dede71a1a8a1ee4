//! Dynamic Module Loader (§4.8): loads a route handler from a shared
//! library exporting a small C ABI, via `libloading` (the safe
//! `dlopen`/`dlsym`/`dlclose` wrapper the ecosystem reaches for in place of
//! raw `libc` calls).

use crate::errors::LoaderError;
use crate::executor::{HandlerOutcome, RequestInstance};
use libloading::{Library, Symbol};
use std::ffi::c_int;
use std::os::raw::c_void;
use tracing::info;

/// Mirrors the C ABI's `msg_t { data: byte*, len: size }`.
#[repr(C)]
pub struct Msg {
    pub data: *mut u8,
    pub len: usize,
}

impl Msg {
    fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Copies the buffer out as an owned `Vec`. Safety: caller guarantees
    /// `data`/`len` describe a valid, module-owned allocation.
    unsafe fn to_vec(&self) -> Vec<u8> {
        if self.data.is_null() || self.len == 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts(self.data, self.len).to_vec()
    }
}

type ModuleInitFn = unsafe extern "C" fn() -> c_int;
type ModuleExitFn = unsafe extern "C" fn() -> c_int;
type CgiGetFn = unsafe extern "C" fn(params: *const Msg, resp: *mut Msg, resp_header: *mut Msg) -> c_int;
type CgiPostFn = unsafe extern "C" fn(
    params: *const Msg,
    post_body: *const Msg,
    resp: *mut Msg,
    resp_header: *mut Msg,
) -> c_int;
type FreeMsgFn = unsafe extern "C" fn(*mut c_void);

/// A loaded shared-library handler module. `module_init` ran successfully
/// at load time; `module_exit` runs when this value drops.
pub struct Module {
    library: Library,
    path: String,
    get_handler: Option<CgiGetFn>,
    post_handler: Option<CgiPostFn>,
    free_msg: Option<FreeMsgFn>,
}

impl Module {
    /// Opens `path`, resolves its symbols, and invokes `module_init`. A
    /// non-zero `module_init` return aborts the load.
    ///
    /// # Safety
    /// The caller must trust `path` to be a well-formed module implementing
    /// the documented ABI; loading arbitrary shared libraries runs
    /// unconstrained native code in-process.
    pub unsafe fn load(path: &str) -> Result<Self, LoaderError> {
        let library = Library::new(path).map_err(|source| LoaderError::Open {
            path: path.to_string(),
            source,
        })?;

        let init: Symbol<ModuleInitFn> = library
            .get(b"module_init\0")
            .map_err(|_| LoaderError::MissingSymbol("module_init"))?;
        let status = init();
        if status != 0 {
            return Err(LoaderError::InitFailed(status));
        }

        let get_handler = library.get::<CgiGetFn>(b"cgi_get_handler\0").ok().map(|s| *s);
        let post_handler = library.get::<CgiPostFn>(b"cgi_post_handler\0").ok().map(|s| *s);
        let free_msg = library.get::<FreeMsgFn>(b"free_msg\0").ok().map(|s| *s);

        info!(path, "dynamic module loaded");

        Ok(Self {
            library,
            path: path.to_string(),
            get_handler,
            post_handler,
            free_msg,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Invokes the module's `cgi_get_handler`, if exported, translating the
    /// request's query string into `params` and copying the module's
    /// response buffers out before freeing them.
    pub fn call_get(&self, request: &RequestInstance) -> Option<HandlerOutcome> {
        let handler = self.get_handler?;
        let params_bytes = encode_query(&request.query);
        unsafe { self.invoke_get(handler, &params_bytes) }
    }

    pub fn call_post(&self, request: &RequestInstance) -> Option<HandlerOutcome> {
        let handler = self.post_handler?;
        let params_bytes = encode_query(&request.query);
        unsafe { self.invoke_post(handler, &params_bytes, &request.body) }
    }

    unsafe fn invoke_get(&self, handler: CgiGetFn, params_bytes: &[u8]) -> Option<HandlerOutcome> {
        let params = Msg {
            data: params_bytes.as_ptr() as *mut u8,
            len: params_bytes.len(),
        };
        let mut resp = Msg::empty();
        let mut resp_header = Msg::empty();

        let status = handler(&params, &mut resp, &mut resp_header);
        Some(self.collect_outcome(status, &resp, &resp_header))
    }

    unsafe fn invoke_post(
        &self,
        handler: CgiPostFn,
        params_bytes: &[u8],
        body: &[u8],
    ) -> Option<HandlerOutcome> {
        let params = Msg {
            data: params_bytes.as_ptr() as *mut u8,
            len: params_bytes.len(),
        };
        let post_body = Msg {
            data: body.as_ptr() as *mut u8,
            len: body.len(),
        };
        let mut resp = Msg::empty();
        let mut resp_header = Msg::empty();

        let status = handler(&params, &post_body, &mut resp, &mut resp_header);
        Some(self.collect_outcome(status, &resp, &resp_header))
    }

    unsafe fn collect_outcome(&self, status: c_int, resp: &Msg, resp_header: &Msg) -> HandlerOutcome {
        let body = resp.to_vec();
        let header_text = String::from_utf8_lossy(&resp_header.to_vec()).into_owned();

        if let Some(free_msg) = self.free_msg {
            if !resp.data.is_null() {
                free_msg(resp.data as *mut c_void);
            }
            if !resp_header.data.is_null() {
                free_msg(resp_header.data as *mut c_void);
            }
        }

        let mut outcome = HandlerOutcome {
            status,
            body,
            status_line: None,
            headers: Vec::new(),
        };
        for line in header_text.lines() {
            if let Some((name, value)) = line.split_once(':') {
                outcome
                    .headers
                    .push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        outcome
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        unsafe {
            if let Ok(exit) = self.library.get::<ModuleExitFn>(b"module_exit\0") {
                let _ = exit();
            }
        }
    }
}

/// Wraps a loaded module's GET handler as a [`crate::executor::HandlerFn`]
/// for registration into a [`crate::vhost::registry::Registry`].
pub fn as_get_handler(module: std::sync::Arc<Module>) -> crate::executor::HandlerFn {
    std::sync::Arc::new(move |request: RequestInstance| {
        let module = std::sync::Arc::clone(&module);
        Box::pin(async move {
            module
                .call_get(&request)
                .unwrap_or_else(|| HandlerOutcome::failed(b"no GET handler exported".to_vec()))
        })
    })
}

/// Wraps a loaded module's POST handler as a [`crate::executor::HandlerFn`].
pub fn as_post_handler(module: std::sync::Arc<Module>) -> crate::executor::HandlerFn {
    std::sync::Arc::new(move |request: RequestInstance| {
        let module = std::sync::Arc::clone(&module);
        Box::pin(async move {
            module
                .call_post(&request)
                .unwrap_or_else(|| HandlerOutcome::failed(b"no POST handler exported".to_vec()))
        })
    })
}

fn encode_query(query: &[(String, String)]) -> Vec<u8> {
    query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_query_pairs() {
        let query = vec![("x".to_string(), "1".to_string()), ("y".to_string(), "2".to_string())];
        assert_eq!(encode_query(&query), b"x=1&y=2");
    }

    #[test]
    fn missing_library_surfaces_open_error() {
        let result = unsafe { Module::load("/nonexistent/path/to/module.so") };
        assert!(matches!(result, Err(LoaderError::Open { .. })));
    }
}
