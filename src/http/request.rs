use crate::{
    errors::*,
    http::{
        query::{percent_decode, Query},
        types::{self, Header, HeaderMap},
    },
    limits::ReqLimits,
    server::connection::HttpConnection,
    ConnectionData, Handler, Method, Url, Version,
};
use memchr::{memchr, memchr_iter};
use std::{
    io, mem,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{io::AsyncReadExt, net::TcpStream, time::sleep};

const UNSPECIFIED_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

/// A parsed HTTP request.
///
/// Header names/values and the body stay zero-copy, referencing the
/// connection's reusable read buffer (via transmuted `'static` slices that
/// are only valid until the next reset — see [`Parser::into_static`]).
/// The URL is the exception: percent-decoding the query string requires an
/// allocation regardless, so [`Url`] owns its strings outright.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: HeaderMap,
    body: Option<&'static [u8]>,
    pub(crate) client_addr: SocketAddr,
    pub(crate) server_addr: SocketAddr,
}

impl Request {
    #[inline(always)]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Request {
            method: Method::Get,
            url: Url::new(limits),
            version: Version::Http11,
            headers: HeaderMap::new(limits.header_count),
            body: None,
            client_addr: UNSPECIFIED_ADDR,
            server_addr: UNSPECIFIED_ADDR,
        }
    }

    #[inline(always)]
    pub(crate) fn reset(&mut self) {
        self.method = Method::Get;
        self.url.clear();
        self.version = Version::Http11;
        self.headers.reset();
        self.body = None;
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline(always)]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the first header value with case-insensitive name matching
    /// (per [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)).
    #[inline(always)]
    pub fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.headers.get(name)
    }

    /// All headers as `(name, value)` pairs in the order they were sent.
    #[inline(always)]
    pub fn headers(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.headers.headers.iter().map(|h| (h.name, h.value))
    }

    /// Returns the value of the `Content-Length` header if present.
    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.headers.content_length
    }

    /// Returns the request body if present.
    #[inline(always)]
    pub const fn body(&self) -> Option<&[u8]> {
        self.body
    }

    /// The peer address of the connection this request arrived on.
    #[inline(always)]
    pub const fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// The local address the connection was accepted on.
    #[inline(always)]
    pub const fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }
}

impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    pub(crate) fn parse(&mut self) -> Result<Version, ParseError> {
        self.parse_method()?;
        self.parse_url()?;
        self.check_version()?;
        // Keep-alive defaults per-version; an explicit Connection header overrides this below.
        self.response.keep_alive = self.request.version == Version::Http11;
        self.parse_headers()?;
        self.check_body()?;

        Ok(self.request.version)
    }
}

// Parse first line
impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    fn parse_method(&mut self) -> Result<(), ParseError> {
        let slice = self
            .parser
            .get_slice(0, self.parser.len)
            .ok_or(ParseError::InvalidMethod)?;

        let (method, consumed) = Method::from_bytes(slice)?;
        self.request.method = method;
        self.parser.position = consumed;
        Ok(())
    }

    #[inline]
    fn parse_url(&mut self) -> Result<(), ParseError> {
        let posit = self
            .parser
            .find_char(self.req_limits.url_size, b' ')
            .ok_or(ParseError::InvalidUrl)?;

        let parser = &mut self.parser;
        let raw = parser
            .get_slice(parser.position, posit)
            .ok_or(ParseError::InvalidUrl)?;

        if raw.is_empty() || raw[0] != b'/' {
            return Err(ParseError::InvalidUrl);
        }

        let (path_bytes, query_bytes) = match memchr(b'?', raw) {
            Some(q) => (&raw[..q], Some(&raw[q + 1..])),
            None => (raw, None),
        };

        let url = &mut self.request.url;
        url.target = raw.to_vec();
        url.path = normalize_path(path_bytes);

        if let Some(query) = query_bytes {
            url.query = Some(format!("?{}", String::from_utf8_lossy(query)));

            let limit = url.query_parts.capacity();
            let mut raw_pairs: Vec<(&[u8], &[u8])> = Vec::with_capacity(limit);
            Query::parse_into(&mut raw_pairs, query, limit)?;

            for (k, v) in raw_pairs {
                let mut key = String::new();
                let mut value = String::new();
                percent_decode(k, &mut key);
                percent_decode(v, &mut value);
                url.query_parts.push((key, value));
            }
        }

        parser.update_position(posit);
        Ok(())
    }

    #[inline]
    fn check_version(&mut self) -> Result<(), ParseError> {
        // "HTTP/1.X\r\n" - HTTP version with line break (10 bytes)
        let slice = self
            .parser
            .find_slice(10, b'\n')
            .ok_or(ParseError::InvalidVersion)?;

        if !matches!(slice.len(), 8 | 9) {
            return Err(ParseError::InvalidVersion);
        }

        let version = Version::from_bytes(&slice[..8])?;
        self.response.version = version;
        self.response.keep_alive = version.default_keep_alive();
        self.request.version = version;

        self.parser.has_crlf = slice.last() == Some(&b'\r');

        Ok(())
    }
}

/// Collapses runs of `/` into a single `/` and trims surrounding ASCII
/// whitespace; everything else, including non-ASCII bytes, passes through
/// unchanged (filesystem paths are case- and byte-sensitive). Falls back to
/// a lossy conversion if the path is not valid UTF-8, which can only happen
/// for a client sending raw (non-percent-encoded) non-UTF-8 bytes in the
/// request line.
fn normalize_path(raw: &[u8]) -> String {
    let mut collapsed: Vec<u8> = Vec::with_capacity(raw.len());
    let mut last_was_slash = false;

    for &byte in raw {
        if byte == b'/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        collapsed.push(byte);
    }

    while collapsed.last() == Some(&b' ') {
        collapsed.pop();
    }
    while collapsed.first() == Some(&b' ') {
        collapsed.remove(0);
    }

    match simdutf8::basic::from_utf8(&collapsed) {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(&collapsed).into_owned(),
    }
}

// Parse headers
impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    fn parse_headers(&mut self) -> Result<(), ParseError> {
        for _ in 0..=self.req_limits.header_count {
            let Some(header) = self.parse_header()? else {
                return Ok(());
            };

            if !self.parse_special_header(&header)? {
                self.request.headers.headers.push(header);
            }
        }

        Err(ParseError::TooManyHeaders)
    }

    #[inline]
    fn parse_header(&mut self) -> Result<Option<Header>, ParseError> {
        let parser = &mut self.parser;
        // HeaderName: Someone=data\r\n
        //                            |
        let end = parser
            .find_char(self.req_limits.precalc.h_line, b'\n')
            .ok_or(ParseError::InvalidHeader)?;

        match parser.get_slice(parser.position + end - 1, 2) {
            Some([b'\r', b'\n']) if parser.has_crlf => {}
            Some([_, b'\n']) if !parser.has_crlf => {}
            _ => return Err(ParseError::InvalidHeader),
        }

        // HeaderName: Someone=data\r\n
        //           |
        let Some(split) = parser.find_char(end, b':') else {
            self.check_end_of_headers(end)?;
            return Ok(None);
        };

        if parser.get_slice(parser.position + split, 2) != Some(b": ") {
            return Err(ParseError::InvalidHeader);
        }

        let value_start = split + 2;
        let len_value = end - value_start - parser.has_crlf as usize;

        if split > self.req_limits.header_name_size || len_value > self.req_limits.header_value_size
        {
            return Err(ParseError::InvalidHeader);
        }

        let name = {
            let name = parser
                .get_slice_mut(parser.position, split)
                .ok_or(ParseError::InvalidHeader)?;

            if name.is_empty() {
                return Err(ParseError::InvalidHeader);
            }

            types::to_lower_case(name);
            unsafe { Parser::into_static(name) }
        };

        let value = parser
            .get_slice_static(parser.position + value_start, len_value)
            .ok_or(ParseError::InvalidHeader)?;

        parser.update_position(end);

        Ok(Some(Header::new(name, value)))
    }

    #[inline]
    fn parse_special_header(&mut self, header: &Header) -> Result<bool, ParseError> {
        match header.name {
            b"content-length" => self.parse_content_length(header.value),
            b"connection" => self.parse_connection(header.value),
            _ => return Ok(false),
        }
        .map(|_| true)
    }

    // Auxiliary methods
    #[inline]
    fn check_end_of_headers(&mut self, start: usize) -> Result<(), ParseError> {
        let parser = &mut self.parser;
        // [\r, \n, \r, \n] or [x, x, \n, \n]
        let p_end = parser
            .get_slice(parser.position + start - 3, 4)
            .ok_or(ParseError::InvalidHeader)?;

        if !match parser.has_crlf {
            true => p_end.ends_with(b"\r\n\r\n"),
            false => p_end.ends_with(b"\n\n"),
        } {
            return Err(ParseError::InvalidHeader);
        }

        parser.position += parser.has_crlf as usize + 1;

        Ok(())
    }

    #[inline]
    fn parse_content_length(&mut self, value: &[u8]) -> Result<(), ParseError> {
        let len = types::slice_to_usize(value).ok_or(ParseError::InvalidContentLength)?;
        if len > self.req_limits.body_size {
            return Err(ParseError::BodyTooLarge);
        }
        self.request.headers.content_length = Some(len);
        Ok(())
    }

    #[inline]
    fn parse_connection(&mut self, value: &[u8]) -> Result<(), ParseError> {
        let mut normalized = [0; 10];
        let len = types::into_lower_case(value, &mut normalized);

        match &normalized[..len] {
            b"keep-alive" => self.response.keep_alive = true,
            b"close" => self.response.keep_alive = false,
            _ => return Err(ParseError::InvalidConnection),
        }

        Ok(())
    }
}

// Parse body
impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    fn check_body(&mut self) -> Result<(), ParseError> {
        let parser = &self.parser;
        let body = parser.len - parser.position;

        match self.request.headers.content_length {
            Some(len) if len == body => {
                let slice = parser.get_slice_static(parser.position, len).ok_or(
                    ParseError::BodyMismatch {
                        expected: len,
                        available: body,
                    },
                )?;

                self.request.body = Some(slice);
                Ok(())
            }
            Some(len) => Err(ParseError::BodyMismatch {
                expected: len,
                available: body,
            }),
            None => match body == 0 {
                true => Ok(()),
                false => Err(ParseError::UnexpectedBody(body)),
            },
        }
    }
}

//

#[derive(Debug, Clone, PartialEq)]
#[repr(align(64))]
pub(crate) struct Parser {
    pub(crate) position: usize,
    pub(crate) len: usize,
    pub(crate) has_crlf: bool,
    buffer: Box<[u8]>,
}

impl Parser {
    #[inline(always)]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        let buffer = vec![0; limits.precalc.buffer].into_boxed_slice();

        Parser {
            position: 0,
            len: 0,
            has_crlf: false,
            buffer,
        }
    }

    #[cfg(test)]
    pub(crate) fn from<V: AsRef<[u8]>>(limits: &ReqLimits, value: V) -> Self {
        let mut buffer = vec![0; limits.precalc.buffer];

        let value = value.as_ref();
        buffer[0..value.len()].copy_from_slice(value);

        Parser {
            position: 0,
            len: value.len(),
            has_crlf: false,
            buffer: buffer.into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.position = 0;
        self.len = 0;
        self.has_crlf = false;
        self.buffer.fill(0);
    }
}

// Work with Buffer
impl Parser {
    // Reading level
    #[inline]
    pub(crate) async fn fill_buffer(
        &mut self,
        stream: &mut TcpStream,
        time: Duration,
    ) -> Result<usize, io::Error> {
        tokio::select! {
            biased;

            read_result = stream.read(&mut self.buffer) => {
                let n = read_result?;
                self.len = n;
                Ok(n)
            }
            _ = sleep(time) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            },
        }
    }

    // Search level
    #[inline]
    fn find_slice(&mut self, limit: usize, delimiter: u8) -> Option<&[u8]> {
        let step = self.find_char(limit, delimiter)?;
        let last_index = self.update_position(step);
        let slice = self.get_slice(last_index, step)?;
        Some(slice)
    }

    #[inline]
    fn find_char(&self, step: usize, delimiter: u8) -> Option<usize> {
        let slice = self.get_slice(self.position, step)?;
        memchr(delimiter, slice)
    }

    // Low level
    #[inline(always)]
    fn get_slice(&self, start: usize, step: usize) -> Option<&[u8]> {
        self.buffer.get(start..start + step)
    }

    #[inline(always)]
    fn get_slice_mut(&mut self, start: usize, step: usize) -> Option<&mut [u8]> {
        self.buffer.get_mut(start..start + step)
    }

    #[inline(always)]
    pub(crate) fn update_position(&mut self, step: usize) -> usize {
        let old = self.position;
        self.position += step + 1;
        old
    }

    // Unsafe level
    #[inline(always)]
    fn get_slice_static(&self, start: usize, step: usize) -> Option<&'static [u8]> {
        let value = self.get_slice(start, step)?;
        unsafe { Some(Self::into_static(value)) }
    }

    #[inline(always)]
    // SAFETY: these `'static` slices alias the connection's own read buffer.
    // They are valid only until the buffer is next reset or refilled, which
    // cannot happen while the borrowing `Request` is alive on the same
    // connection's single owning task. Any data that must outlive that
    // window (crossing to an executor worker) is copied into owned
    // `RequestInstance` fields before the connection resumes reading.
    const unsafe fn into_static(src: &[u8]) -> &'static [u8] {
        unsafe { mem::transmute(src) }
    }
}

#[cfg(test)]
mod request_self {
    use super::*;
    use crate::tools::*;

    #[test]
    fn reset() {
        let limits = ReqLimits::default();
        let mut t =
            HttpConnection::from_req("OPTIONS /qwe?q=1 HTTP/1.0\r\nHost: 127.0.0.1\r\n\r\n");

        assert_eq!(t.parse(), Ok(Version::Http10));
        t.request.reset();
        assert_eq!(Request::new(&limits), t.request);
    }

    #[test]
    fn parse_method() {
        #[rustfmt::skip]
        let cases = [
            ("GET /url",   Some(Method::Get)),
            ("POST /x",    Some(Method::Post)),
            ("OPTIONS /x", Some(Method::Options)),
            ("PUT /x",     Some(Method::Other("PUT".into()))),
            ("DELETE /x",  Some(Method::Other("DELETE".into()))),
        ];

        for (line, expected) in cases {
            let mut t = HttpConnection::from_req(line);
            assert_eq!(t.parse_method(), Ok(()));
            assert_eq!(Some(t.request.method.clone()), expected);
        }
    }

    #[test]
    fn parse_url_normalizes_path() {
        #[rustfmt::skip]
        let cases = [
            ("/ ",                "/",        vec![]),
            ("/// ",               "/",        vec![]),
            ("/api/user ",         "/api/user", vec![]),
            ("///api//user/// ",   "/api/user/", vec![]),
            (
                "/api/find?user=qwe&id=223 ",
                "/api/find",
                vec![("user".into(), "qwe".into()), ("id".into(), "223".into())],
            ),
            (
                "/search?q=hello%20world ",
                "/search",
                vec![("q".into(), "hello world".into())],
            ),
        ];

        for (line, path, query) in cases {
            let mut t = HttpConnection::from_req(line);
            assert_eq!(t.parse_url(), Ok(()));
            assert_eq!(t.request.url.path(), path);
            assert_eq!(t.request.url.query_pairs().to_vec(), query);
        }
    }

    #[test]
    fn rejects_missing_leading_slash() {
        let mut t = HttpConnection::from_req("qwe ");
        assert_eq!(t.parse_url(), Err(ParseError::InvalidUrl));
    }
}
