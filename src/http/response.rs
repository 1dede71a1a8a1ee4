//! A highly efficient HTTP response builder with on-demand compression.

use crate::{
    http::types::{StatusCode, Version},
    limits::RespLimits,
    BodyWriter, WriteBuffer,
};
use flate2::{write::DeflateEncoder, write::GzEncoder, Compression};
use std::{borrow::Cow, io::Write, rc::Rc, sync::Arc, time::SystemTime};

const SERVER_HEADER: &[u8] = concat!("server: vhostd/", env!("CARGO_PKG_VERSION"), "\r\n").as_bytes();

#[derive(Debug)]
/// HTTP response builder for constructing server responses.
///
/// Provides a fluent interface for building HTTP responses with status codes,
/// headers, and body content. Automatically handles content-length calculation
/// and connection management.
///
/// Build responses by chaining methods in strict order:
/// `status()` -> headers -> any body method.
///
/// Instances are created automatically by the server and passed to
/// the [`Handler::handle`](crate::Handler::handle).
///
/// # Examples
/// ```
/// use vhostd::{Handled, Request, Response, StatusCode};
///
/// // In your implementation `Handler`
/// async fn handle(_req: &Request, resp: &mut Response) -> Handled {
///     resp
///         .status(StatusCode::Ok)
///         .header("content-type", "text/html")
///         .body("<h1>Hello World</h1>")
/// }
/// ```
///
/// # Panics
/// All methods perform validity checks in `debug` mode that panic on violations.
/// In `release` mode, these checks are omitted for performance, which may
/// produce invalid HTTP responses. Before creating a release version, conduct tests.
pub struct Response {
    buffer: Vec<u8>,
    pub(crate) version: Version,
    pub(crate) keep_alive: bool,
    compression: Option<Encoding>,
    posit_length: usize,
    start_body: usize,
    status_line_end: usize,
    state: ResponseState,
}

#[doc(hidden)]
pub struct Handled(());

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResponseState {
    Clean,
    Headers,
    Complete,
}

/// Content-coding negotiated for a response body (§4.10: `deflate` preferred
/// over `gzip` when the client's `Accept-Encoding` lists both).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    /// Picks `deflate` if accepted, else `gzip` if accepted, else no
    /// compression, per the route's configured compress-suffix set.
    pub(crate) fn negotiate(accept_encoding: &[u8]) -> Option<Self> {
        let accept = String::from_utf8_lossy(accept_encoding);
        if accept.contains("deflate") {
            Some(Encoding::Deflate)
        } else if accept.contains("gzip") {
            Some(Encoding::Gzip)
        } else {
            None
        }
    }
}

impl Response {
    #[inline(always)]
    pub(crate) fn new(limits: &RespLimits) -> Self {
        Self {
            buffer: Vec::with_capacity(limits.default_capacity),
            version: Version::Http11,
            keep_alive: true,
            compression: None,
            posit_length: 0,
            start_body: 0,
            status_line_end: 0,
            state: ResponseState::Clean,
        }
    }

    #[inline(always)]
    pub(crate) fn reset(&mut self, limits: &RespLimits) {
        if self.buffer.capacity() > limits.max_capacity {
            self.buffer = Vec::with_capacity(limits.default_capacity);
        } else {
            self.buffer.clear();
        }

        self.version = Version::Http11;
        self.keep_alive = true;
        self.compression = None;
        self.posit_length = 0;
        self.start_body = 0;
        self.status_line_end = 0;
        self.state = ResponseState::Clean;
    }

    /// Inserts the library-computed `Server`/`Date`/CORS headers right after
    /// the status line, once the handler has finished populating the
    /// response. Idempotent no-op if called before `status()`.
    ///
    /// Called by the connection FSM, not by handlers — this is why it lives
    /// outside the `status()`/`header()`/`body()` chain the handler-facing
    /// doc examples exercise.
    #[inline]
    pub(crate) fn finalize_standard_headers(&mut self) -> &mut Self {
        if self.status_line_end == 0 {
            return self;
        }

        let mut extra = Vec::with_capacity(96);
        extra.extend_from_slice(SERVER_HEADER);
        extra.extend_from_slice(b"date: ");
        extra.extend_from_slice(httpdate::fmt_http_date(SystemTime::now()).as_bytes());
        extra.extend_from_slice(b"\r\n");
        extra.extend_from_slice(b"access-control-allow-origin: *\r\n");

        self.buffer.splice(
            self.status_line_end..self.status_line_end,
            extra.iter().copied(),
        );
        let inserted = extra.len();
        self.status_line_end += inserted;
        if self.posit_length != 0 {
            self.posit_length += inserted;
        }
        self.start_body += inserted;

        self
    }

    #[inline(always)]
    pub(crate) fn buffer(&self) -> &Vec<u8> {
        &self.buffer
    }

    /// Marks the body as needing compression with `encoding` once it is
    /// written. The caller is still responsible for adding the matching
    /// `content-encoding` header, since that must happen during the
    /// `Headers` state and this only affects the later `end_body` step.
    #[inline(always)]
    pub(crate) fn set_compression(&mut self, encoding: Encoding) -> &mut Self {
        self.compression = Some(encoding);
        self
    }
}

impl Response {
    /// Forces the connection to close after a response.
    ///
    /// # Examples
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .close()  // Connection will close after this response
    ///     .body("Closing connection")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error messages:
    /// - `Must be called before any finalizing method`
    ///
    /// Panics in `debug` mode when:
    /// - Called after any finalizing method (method returning `Handler`)
    #[inline]
    #[track_caller]
    pub fn close(&mut self) -> &mut Self {
        debug_assert!(
            self.state != ResponseState::Complete,
            "Must be called before any finalizing method",
        );

        self.keep_alive = false;
        self
    }

    /// Sets the HTTP status code for the response.
    ///
    /// # Examples
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::NotFound)
    ///     .body(r#"{"status": "not found", "code": 404}"#)
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be first and called only once`
    ///
    /// Panics in `debug` mode when called multiple times or after any body method.
    #[inline]
    #[track_caller]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Clean,
            "Must be first and called only once"
        );

        self.buffer
            .extend_from_slice(status.to_first_line(self.version));
        self.status_line_end = self.buffer.len();
        self.state = ResponseState::Headers;
        self
    }

    /// Adds a header to the response.
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADINGS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    ///
    /// # Examples
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "text/plain")        // &str, &str
    ///     .header("x-custom-id", 128)                  // &str, i32
    ///     .header("x-cache-enabled", true)             // &str, bool
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    #[inline]
    #[track_caller]
    pub fn header<N: WriteBuffer, V: WriteBuffer>(&mut self, name: N, value: V) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        name.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b": ");
        value.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Add a multi-value header to the response
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADINGS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    ///
    /// # Examples
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header_multi(b"x-tags", ", ", ["user"])
    ///     // x-tags: user
    ///     .header_multi("accept", "; ", ["text/html", "text/plain"])
    ///     // accept: text/html; text/plain
    ///     .header_multi("id-users", ", ", vec![123, 234, 345])
    ///     // id-users: 123, 234, 345
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    #[inline]
    #[track_caller]
    pub fn header_multi<N, S, I, V>(&mut self, name: N, split: S, values: I) -> &mut Self
    where
        N: WriteBuffer,
        S: WriteBuffer,
        I: IntoIterator<Item = V>,
        V: WriteBuffer,
    {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        name.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b": ");

        let mut iter = values.into_iter();
        if let Some(first) = iter.next() {
            first.write_to(&mut self.buffer);

            for value in iter {
                split.write_to(&mut self.buffer);
                value.write_to(&mut self.buffer);
            }
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Adds a header with parameters to the response.
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADINGS:
    /// - `content-length` - calculated automatically
    /// - `connection` - use [`close()`](Response::close)
    ///
    /// # Examples
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header_params("content-type", "; ", vec![
    ///         ("text/html", None),
    ///         ("charset", Some("utf-8")),
    ///     ])
    ///     // Content-Type: text/html; charset=utf-8
    ///     .header_params("cache-control", ", ", [
    ///         ("max-age", Some("3600")),
    ///         ("must-revalidate", None),
    ///     ])
    ///     // Cache-Control: max-age=3600, must-revalidate
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and before any body method`
    #[inline]
    #[track_caller]
    pub fn header_params<N, S, I, K, V>(&mut self, name: N, split: S, params: I) -> &mut Self
    where
        N: WriteBuffer,
        S: WriteBuffer,
        I: IntoIterator<Item = (K, Option<V>)>,
        K: WriteBuffer,
        V: WriteBuffer,
    {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        name.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b": ");

        let mut iter = params.into_iter();
        if let Some((first_key, first_val)) = iter.next() {
            first_key.write_to(&mut self.buffer);
            if let Some(val) = first_val {
                self.buffer.extend_from_slice(b"=");
                val.write_to(&mut self.buffer);
            }

            for (key, value) in iter {
                split.write_to(&mut self.buffer);
                key.write_to(&mut self.buffer);
                if let Some(val) = value {
                    self.buffer.extend_from_slice(b"=");
                    val.write_to(&mut self.buffer);
                }
            }
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Sets the response body and finalizes the response.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Compresses the body if [`set_compression`](Response::set_compression)
    ///   was called
    /// - Calculates and sets the `content-length` header from the final
    ///   (possibly compressed) byte length
    ///
    /// After calling this method, the response is considered complete
    /// and cannot be modified further.
    ///
    /// # Examples
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "text/plain")
    ///     .body("Hello, World!")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and any header methods`
    #[inline]
    #[track_caller]
    pub fn body<T: WriteBuffer>(&mut self, data: T) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        self.start_body();
        data.write_to(&mut self.buffer);
        self.end_body()
    }

    /// Writes the response body via closure and finalizes the response.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Compresses the body if [`set_compression`](Response::set_compression)
    ///   was called
    /// - Calculates and sets the `content-length` header
    ///
    /// After calling this method, the response is considered complete
    /// and cannot be modified further.
    ///
    /// # Examples
    /// Using [`write!`]:
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    /// use std::io::Write;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "application/json")
    ///     .body_with(|writer| {
    ///         // Write JSON directly to the buffer
    ///         write!(writer, r#"{{"status": "ok", "message": "Hello"}}"#);
    ///     })
    /// # });
    /// ```
    ///
    /// # Panics
    /// Error message: `Must be called after status() and any header methods`
    #[inline]
    #[track_caller]
    pub fn body_with<F: FnOnce(&mut BodyWriter)>(&mut self, f: F) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        self.start_body();
        f(&mut BodyWriter(&mut self.buffer));
        self.end_body()
    }
}

impl Response {
    #[inline(always)]
    #[track_caller]
    fn start_body(&mut self) -> &mut Self {
        if let Some(value) = self.connection_header() {
            self.header("connection", value);
        }

        self.buffer.extend_from_slice(b"content-length: ");
        self.posit_length = self.buffer.len();
        self.buffer.extend_from_slice(b"0000000000\r\n\r\n");
        self.start_body = self.buffer.len();
        self
    }

    #[inline(always)]
    fn end_body(&mut self) -> Handled {
        if let Some(encoding) = self.compression {
            let raw = self.buffer.split_off(self.start_body);
            self.buffer.extend_from_slice(&Self::compress(&raw, encoding));
        }

        let body_len = self.buffer.len() - self.start_body;
        let (arr, _) = Response::number_to_bytes(body_len as u128);

        let target_range = self.posit_length..self.posit_length + 10;
        self.buffer[target_range].copy_from_slice(&arr[29..39]);
        self.state = ResponseState::Complete;

        Handled(())
    }

    #[inline]
    fn compress(data: &[u8], encoding: Encoding) -> Vec<u8> {
        match encoding {
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::fast());
                encoder.write_all(data).expect("writes to a Vec<u8> cannot fail");
                encoder.finish().expect("writes to a Vec<u8> cannot fail")
            }
            Encoding::Deflate => {
                let mut encoder =
                    DeflateEncoder::new(Vec::with_capacity(data.len()), Compression::fast());
                encoder.write_all(data).expect("writes to a Vec<u8> cannot fail");
                encoder.finish().expect("writes to a Vec<u8> cannot fail")
            }
        }
    }

    #[inline(always)]
    const fn connection_header(&self) -> Option<&'static [u8]> {
        match (self.version, self.keep_alive) {
            (Version::Http11, true) => None,
            (Version::Http11, false) => Some(b"close"),
            (Version::Http10, true) => Some(b"keep-alive"),
            (Version::Http10, false) => Some(b"close"),
        }
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }
}

pub mod write {
    use super::*;

    /// Writer for constructing the HTTP response body.
    /// Used in [body_with](Response::body_with).
    ///
    /// # Examples
    ///
    /// With [WriteBuffer]:
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .body_with(|w| {
    ///         w.write("This goes in the response body");
    ///         w.write("<html>...</html>");
    ///         w.write(true);
    ///     })
    /// # });
    /// ```
    /// With [std::io::Write]:
    /// ```
    /// # vhostd::run_test(|_, resp| {
    /// use vhostd::StatusCode;
    /// use std::io::Write;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .body_with(|w| {
    ///         write!(w, "This goes in the response body");
    ///         write!(w, "{} - {} = {}", 6, 2, 4);
    ///     })
    /// # });
    /// ```
    #[derive(Debug)]
    pub struct BodyWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl BodyWriter<'_> {
        /// Appends content to the response body.
        ///
        /// Adds data to the body section of the HTTP response. This method
        /// only affects the response body, not headers or status.
        #[inline]
        pub fn write<T: WriteBuffer>(&mut self, value: T) {
            value.write_to(self.0);
        }
    }

    impl std::io::Write for BodyWriter<'_> {
        #[inline]
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        #[inline]
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Trait for writing data to the [`Response`] buffer.
    ///
    /// Implemented for common types like strings, bytes, booleans
    /// and numeric types (excluding floating-point numbers)
    ///
    /// # Note on Floating-Point
    /// Floating-point numbers are not implemented to avoid locale-dependent
    /// formatting and precision issues in protocol headers.
    ///
    /// # Example
    /// ```
    /// use vhostd::WriteBuffer;
    ///
    /// struct MyString(String);
    ///
    /// impl WriteBuffer for MyString {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         buffer.extend_from_slice(self.0.as_bytes())
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Writes the value's representation directly to the buffer.
        ///
        /// This should avoid intermediate allocations and write the
        /// most efficient representation possible.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (bytes, $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let closure = $conn;
                    closure(self, buffer);
                }
            })*
        };
        (number($type:ty), $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(*self as $type, buffer);
                }
            })*
        };
        (non_zero($type:ty), $conn:expr => $($t:ident),*) => {
            $(impl WriteBuffer for std::num::$t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(self.get() as $type, buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl<T: WriteBuffer> WriteBuffer for &mut T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl_write_buffer! {
        bytes, |value: &str, buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value.as_bytes());
        } => &str, String, Box<str>, Cow<'_, str>,
        Arc<str>, Rc<str>, Arc<String>, Rc<String>
    }
    impl_write_buffer! {
        bytes, |value: &[u8], buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value);
        } => &[u8], Vec<u8>, Box<[u8]>, Cow<'_, [u8]>,
        Arc<[u8]>, Rc<[u8]>, Arc<Vec<u8>>, Rc<Vec<u8>>
    }
    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }
    impl_write_buffer! {
        number(u128), impl_write_buffer_u128 => u8, u16, u32, u64, u128, usize
    }
    impl_write_buffer! {
        non_zero(u128), impl_write_buffer_u128 => NonZeroU8,
        NonZeroU16, NonZeroU32, NonZeroU64, NonZeroU128, NonZeroUsize
    }
    impl_write_buffer! {
        number(i128), impl_write_buffer_i128 => i8, i16, i32, i64, i128, isize
    }
    impl_write_buffer! {
        non_zero(i128), impl_write_buffer_i128 => NonZeroI8,
        NonZeroI16, NonZeroI32, NonZeroI64, NonZeroI128, NonZeroIsize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline(always)]
    fn impl_write_buffer_u128(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = Response::number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline(always)]
    fn impl_write_buffer_i128(value: i128, buffer: &mut Vec<u8>) {
        if value < 0 {
            buffer.push(b'-');
        }
        let abs = value.unsigned_abs();

        let (arr, start) = Response::number_to_bytes(abs);
        buffer.extend_from_slice(&arr[start..]);
    }
}

#[cfg(test)]
mod close_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let cases = [
            (Version::Http11, false, ""),
            (Version::Http11, true, "connection: close\r\n"),
            (Version::Http10, false, "connection: keep-alive\r\n"),
            (Version::Http10, true, "connection: close\r\n"),
        ];

        for (version, is_close, header) in cases {
            let mut resp = Response::new(&RespLimits::default());
            resp.version = version;

            assert_eq!(resp.keep_alive, true);
            if is_close {
                resp.close();
                assert_eq!(resp.keep_alive, false);
                resp.close();
                assert_eq!(resp.keep_alive, false);
            }

            resp.status(StatusCode::Ok).body("");
            assert_eq!(
                str_op(&resp.buffer),
                format!(
                    "{}{header}content-length: 0000000000\r\n\r\n",
                    str_op(StatusCode::Ok.to_first_line(version))
                )
            );
        }
    }

    #[test]
    #[should_panic(expected = "Must be called before any finalizing method")]
    fn after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.close();
    }
}

#[cfg(test)]
mod status_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let cases = [
            (StatusCode::Ok, "HTTP/1.1 200 OK\r\n"),
            (StatusCode::NotFound, "HTTP/1.1 404 Not Found\r\n"),
            (StatusCode::Found, "HTTP/1.1 302 Found\r\n"),
            (StatusCode::BadRequest, "HTTP/1.1 400 Bad Request\r\n"),
        ];

        for (status, result) in cases {
            let mut resp = Response::new(&RespLimits::default());

            assert_eq!(resp.buffer, []);
            assert_eq!(resp.state, ResponseState::Clean);

            resp.status(status);
            assert_eq!(str_op(&resp.buffer), result);
            assert_eq!(resp.state, ResponseState::Headers);
        }
    }

    #[test]
    #[should_panic(expected = "Must be first and called only once")]
    fn double_call() {
        Response::new(&RespLimits::default())
            .status(StatusCode::Ok)
            .status(StatusCode::Found);
    }
}

#[cfg(test)]
mod header_tests {
    use super::*;
    use crate::tools::*;

    macro_rules! test_header {
        ($method:ident, $(($name:expr $(, $params:expr)*; $result:expr);)*) => {
           #[test] fn $method() {$(
            let mut resp = Response::new(&RespLimits::default());

            assert_eq!(resp.buffer, []);

            resp.status(StatusCode::Ok);
            assert_eq!(resp.state, ResponseState::Headers);

            resp.$method($name $(, $params)*);
            assert_eq!(str_op(&resp.buffer[17..]), $result);
            assert_eq!(resp.state, ResponseState::Headers);
        )*}};
    }

    test_header! {header,
        ("name", "value"; "name: value\r\n");
        ("", "value"; ": value\r\n");
        ("name", ""; "name: \r\n");

        ("name", 123; "name: 123\r\n");
        ("name", vec![35, 33, 43]; "name: #!+\r\n");
        ("name", false; "name: false\r\n");
        ("name", -123; "name: -123\r\n");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_before_status() {
        Response::new(&RespLimits::default()).header("Name", "value");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header("Name", "value");
    }

    test_header! {header_multi,
        ("name", ", ", ["q", "w", "e"]; "name: q, w, e\r\n");
        ("name", ",", [true, false]; "name: true,false\r\n");
        ("name", "; ", [-123, 123]; "name: -123; 123\r\n");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_multi_before_status() {
        Response::new(&RespLimits::default()).header_multi("Name", ",", ["value1", "value2"]);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_multi_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header_multi("Name", ",", ["value1", "value2"]);
    }

    test_header! {header_params,
        ("name", ", ", [("name", Some("value"))]; "name: name=value\r\n");
        (
            "name", ", ", [("q", Some("1")), ("w", Some("2")), ("e", Some("3"))];
            "name: q=1, w=2, e=3\r\n"
        );
        (
            "name", ";", [("q", Some("v1")), ("w", Some("v2")), ("e", Some("v3"))];
            "name: q=v1;w=v2;e=v3\r\n"
        );
        (
            "name", ", ", [("min", Some(-128)), ("max", Some(128)), ("mean", Some(0))];
            "name: min=-128, max=128, mean=0\r\n"
        );
        (
            "u128", ", ", [("min", Some(u128::MIN)), ("max", Some(u128::MAX))];
            "u128: min=0, max=340282366920938463463374607431768211455\r\n"
        );
        (
            "i128", ", ", [("min", Some(i128::MIN)), ("max", Some(i128::MAX))];
    "i128: min=-170141183460469231731687303715884105728, max=170141183460469231731687303715884105727\r\n"
        );
        (
            "name", ", ", [("debug", Some(true)), ("doc", Some(false))];
            "name: debug=true, doc=false\r\n"
        );
        (
            "name", "; ", [("debug", None), ("text", Some("asd"))];
            "name: debug; text=asd\r\n"
        );
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_params_before_status() {
        Response::new(&RespLimits::default()).header_params(
            "Name",
            ",",
            [("name1", Some("value1")), ("name2", None)],
        );
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_params_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header_params("Name", ",", [("name1", Some("value1")), ("name2", None)]);
    }
}

#[cfg(test)]
mod body_tests {
    use super::*;
    use crate::tools::*;

    macro_rules! test_body {
        ($method:ident, $(($data:expr, $len:expr);)*) => {
        #[test] fn $method() {$(
            let mut resp = Response::new(&RespLimits::default());

            let result_data = test_body!{ $method, resp, $data };

            assert_eq!(
                str_op(&resp.buffer),
                format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
                    format!("{:0>10}", $len),
                    str_op(&result_data)
                )
            );
            assert_eq!(resp.state, ResponseState::Complete);
        )*}};

        (body, $resp:expr, $data:expr) => {{
            $resp.status(StatusCode::Ok).body($data);
            let mut expected = Vec::new();
            $data.write_to(&mut expected);
            expected
        }};
        (body_with, $resp:expr, $data:expr) => {{
            $resp.status(StatusCode::Ok).body_with($data);

            let mut vector = Vec::new();
            let mut result_data = BodyWriter(&mut vector);
            $data(&mut result_data);
            vector
        }};
    }

    test_body! {body,
        ("sample body", 11);
        ("{\"debug\": true, \"doc\": false}", 29);
        (true, 4);
        (-1234, 5);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_before_status() {
        Response::new(&RespLimits::default()).body("Name");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_double_call() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.body("Name");
    }

    test_body! {body_with,
        (|buf: &mut BodyWriter| buf.write("qwe"), 3);
        (|buf: &mut BodyWriter| buf.write(vec![23, 34, 56]), 3);
        (|buf: &mut BodyWriter| buf.write(String::from("body")), 4);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_with_before_status() {
        Response::new(&RespLimits::default()).body_with(|_| {});
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_with_double_call() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body_with(|_| {});
        resp.body_with(|_| {});
    }

    #[test]
    fn compresses_body_and_replaces_content_length() {
        use std::io::Read;

        let mut resp = Response::new(&RespLimits::default());
        resp.set_compression(Encoding::Gzip);
        resp.status(StatusCode::Ok).body("a".repeat(200));

        let prefix = "HTTP/1.1 200 OK\r\ncontent-length: ";
        assert!(str_op(&resp.buffer).starts_with(prefix));

        let header_end = resp.buffer.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let compressed = &resp.buffer[header_end..];

        let mut decoder = flate2::read::GzDecoder::new(compressed);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "a".repeat(200));
        assert!(compressed.len() < 200);
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn full_sequence_with_close() {
        let mut resp = Response::new(&RespLimits::default());
        let result = [
            "HTTP/1.1 302 Found\r\n",
            "HTTP/1.1 302 Found\r\nlocation: /api/update\r\n",
            "connection: close\r\ncontent-length: 0000000011\r\n\r\nSample body",
        ];

        assert_eq!(resp.buffer, []);
        assert_eq!(resp.state, ResponseState::Clean);

        resp.status(StatusCode::Found);
        assert_eq!(str_op(&resp.buffer), result[0]);
        assert_eq!(resp.state, ResponseState::Headers);

        resp.header("location", "/api/update");
        assert_eq!(str_op(&resp.buffer), result[1]);
        assert_eq!(resp.state, ResponseState::Headers);

        assert_eq!(resp.keep_alive, true);
        resp.close();
        assert_eq!(resp.keep_alive, false);
        assert_eq!(str_op(&resp.buffer), result[1]);
        assert_eq!(resp.state, ResponseState::Headers);

        resp.body("Sample body");
        assert_eq!(str_op(&resp.buffer), result[1].to_owned() + result[2]);
        assert_eq!(resp.state, ResponseState::Complete);
    }

    #[test]
    fn full_sequence() {
        let mut resp = Response::new(&RespLimits::default());
        let result = [
            "HTTP/1.1 302 Found\r\n",
            "HTTP/1.1 302 Found\r\nlocation: /api/update\r\n",
            "content-length: 0000000011\r\n\r\nSample body",
        ];

        assert_eq!(resp.buffer, []);
        assert_eq!(resp.state, ResponseState::Clean);

        resp.status(StatusCode::Found);
        assert_eq!(str_op(&resp.buffer), result[0]);
        assert_eq!(resp.state, ResponseState::Headers);

        resp.header("location", "/api/update");
        assert_eq!(str_op(&resp.buffer), result[1]);
        assert_eq!(resp.state, ResponseState::Headers);

        resp.body("Sample body");
        assert_eq!(str_op(&resp.buffer), result[1].to_owned() + result[2]);
        assert_eq!(resp.state, ResponseState::Complete);
    }

    #[test]
    fn minimal_sequence_with_close() {
        let mut resp = Response::new(&RespLimits::default());
        let result = [
            "HTTP/1.1 302 Found\r\n",
            "connection: close\r\ncontent-length: 0000000011\r\n\r\nSample body",
        ];

        assert_eq!(resp.buffer, []);
        assert_eq!(resp.state, ResponseState::Clean);

        resp.status(StatusCode::Found);
        assert_eq!(str_op(&resp.buffer), result[0]);
        assert_eq!(resp.state, ResponseState::Headers);

        assert_eq!(resp.keep_alive, true);
        resp.close();
        assert_eq!(resp.keep_alive, false);
        assert_eq!(str_op(&resp.buffer), result[0]);
        assert_eq!(resp.state, ResponseState::Headers);

        resp.body("Sample body");
        assert_eq!(str_op(&resp.buffer), result[0].to_owned() + result[1]);
        assert_eq!(resp.state, ResponseState::Complete);
    }

    #[test]
    fn minimal_sequence() {
        let mut resp = Response::new(&RespLimits::default());
        let result = [
            "HTTP/1.1 302 Found\r\n",
            "content-length: 0000000011\r\n\r\nSample body",
        ];

        assert_eq!(resp.buffer, []);
        assert_eq!(resp.state, ResponseState::Clean);

        resp.status(StatusCode::Found);
        assert_eq!(str_op(&resp.buffer), result[0]);
        assert_eq!(resp.state, ResponseState::Headers);

        resp.body("Sample body");
        assert_eq!(str_op(&resp.buffer), result[0].to_owned() + result[1]);
        assert_eq!(resp.state, ResponseState::Complete);
    }
}

#[cfg(test)]
mod negotiate_tests {
    use super::*;

    #[test]
    fn prefers_deflate() {
        assert_eq!(Encoding::negotiate(b"gzip, deflate"), Some(Encoding::Deflate));
    }

    #[test]
    fn falls_back_to_gzip() {
        assert_eq!(Encoding::negotiate(b"gzip"), Some(Encoding::Gzip));
    }

    #[test]
    fn none_when_unsupported() {
        assert_eq!(Encoding::negotiate(b"br"), None);
    }
}
