use std::fmt;

use httparse;

use crate::headers;
use crate::scan::{self, ScanError};
use crate::shared::{BodyKind, Version};
use super::context::Settings;
use super::error::Error;


/// Maximum number of header fields in a request
pub const MAX_HEADERS_NUM: usize = 64;

/// Request method as detected from the start of the request line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    /// Anything else, answered with `501 Not Implemented`
    Unknown,
}

impl Method {
    pub fn detect(request_line: &[u8]) -> Method {
        use self::Method::*;
        let methods: [(&[u8], Method); 5] = [
            (b"GET ", Get),
            (b"PUT ", Put),
            (b"DELETE ", Delete),
            (b"POST ", Post),
            (b"HEAD ", Head),
        ];
        methods.iter()
            .find(|&&(prefix, _)| request_line.starts_with(prefix))
            .map(|&(_, method)| method)
            .unwrap_or(Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        use self::Method::*;
        match *self {
            Get => "GET",
            Head => "HEAD",
            Post => "POST",
            Put => "PUT",
            Delete => "DELETE",
            Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version of a request line that may not parse as a whole
pub fn sniff_version(request_line: &[u8]) -> Version {
    let end = request_line.iter().position(|&ch| ch == b'\r')
        .unwrap_or(request_line.len());
    if request_line[..end].ends_with(b"HTTP/1.0") {
        Version::Http10
    } else {
        Version::Http11
    }
}

/// Parsed request head
///
/// Owns a linear copy of the header block (request line up to and
/// including the blank line), which is what the field lookups scan.
#[derive(Debug)]
pub struct Head {
    /// The HTTP method.
    pub method: Method,
    /// The HTTP protocol version, echoed in the response status line.
    pub version: Version,
    /// Decoded resource path, always starting with `/`.
    pub resource: String,
    /// The body kind is either fixed or chunked.
    pub body_kind: BodyKind,
    /// Whether the connection stays open after the response.
    pub keep_alive: bool,
    /// Client sent `Expect: 100-continue`.
    pub expect_continue: bool,
    raw: Vec<u8>,
}

impl Head {
    /// Parses the raw header block
    ///
    /// POST and PUT without either framing fail with `LengthRequired`.
    pub fn parse(raw: Vec<u8>, settings: &Settings) -> Result<Head, Error> {
        let method = Method::detect(&raw);
        let (version, connection, chunked, expect_continue) = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_NUM];
            let mut req = httparse::Request::new(&mut headers);
            match req.parse(&raw)? {
                httparse::Status::Complete(_) => {}
                httparse::Status::Partial => {
                    return Err(ScanError::Truncated.into());
                }
            }
            let version = Version::from_minor(req.version.unwrap_or(1));
            let mut connection = None;
            let mut chunked = false;
            let mut expect_continue = false;
            for header in req.headers.iter() {
                if headers::is_connection(header.name) {
                    if headers::is_close(header.value) {
                        connection = Some(false);
                    } else if headers::is_keep_alive(header.value) {
                        connection = Some(true);
                    }
                } else if headers::is_transfer_encoding(header.name) {
                    chunked = headers::is_chunked(header.value);
                } else if headers::is_expect(header.name) {
                    expect_continue = headers::is_continue(header.value);
                }
            }
            (version, connection, chunked, expect_continue)
        };
        let resource = scan::resource(&raw, settings.max_resource)?;
        let body_kind = if chunked {
            BodyKind::Chunked
        } else {
            match scan::content_length(&raw)? {
                Some(len) => BodyKind::Fixed(len),
                None if matches!(method, Method::Post | Method::Put) => {
                    return Err(Error::LengthRequired);
                }
                None => BodyKind::Fixed(0),
            }
        };
        let keep_alive = !cfg!(feature="keepalive-disable")
            && connection.unwrap_or(version.keep_alive_default());
        Ok(Head {
            method: method,
            version: version,
            resource: resource,
            body_kind: body_kind,
            keep_alive: keep_alive,
            expect_continue: expect_continue,
            raw: raw,
        })
    }

    /// The header block as received
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Case-insensitive lookup of a header field value
    pub fn field(&self, name: &str, max: usize)
        -> Result<Option<&[u8]>, ScanError>
    {
        scan::field_value(&self.raw, name, max)
    }

    pub fn query(&self, index: usize) -> Result<&[u8], ScanError> {
        scan::query_value(&self.raw, index)
    }

    pub fn param(&self, index: usize) -> Result<&[u8], ScanError> {
        scan::param_value(&self.raw, index)
    }
}

#[cfg(test)]
mod test {
    use crate::server::DefaultContext;
    use crate::server::context::Settings;
    use crate::shared::{BodyKind, Version};
    use super::{sniff_version, Head, Method};
    use crate::server::Error;

    fn settings() -> Settings {
        Settings::from_context(&DefaultContext)
    }

    fn parse(data: &[u8]) -> Result<Head, Error> {
        Head::parse(data.to_vec(), &settings())
    }

    #[test]
    fn detect_method() {
        assert_eq!(Method::detect(b"GET / HTTP/1.1"), Method::Get);
        assert_eq!(Method::detect(b"HEAD / HTTP/1.1"), Method::Head);
        assert_eq!(Method::detect(b"DELETE /x HTTP/1.1"), Method::Delete);
        assert_eq!(Method::detect(b"OPTIONS * HTTP/1.1"), Method::Unknown);
        assert_eq!(Method::detect(b"GETX / HTTP/1.1"), Method::Unknown);
        assert_eq!(sniff_version(b"FOO / HTTP/1.0\r\n\r\n"), Version::Http10);
        assert_eq!(sniff_version(b"FOO /"), Version::Http11);
    }

    #[test]
    fn simple_get() {
        let head = parse(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        assert_eq!(head.method, Method::Get);
        assert_eq!(head.version, Version::Http11);
        assert_eq!(head.resource, "/index.html");
        assert_eq!(head.body_kind, BodyKind::Fixed(0));
        assert_eq!(head.keep_alive, !cfg!(feature="keepalive-disable"));
        assert_eq!(head.field("host", 256).unwrap(), Some(&b"x"[..]));
    }

    #[test]
    fn connection_overrides() {
        let head = parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap();
        assert!(!head.keep_alive);
        let head = parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!head.keep_alive);
        let head = parse(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n")
            .unwrap();
        assert_eq!(head.keep_alive, !cfg!(feature="keepalive-disable"));
    }

    #[test]
    fn framing() {
        let head = parse(b"PUT /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\
                           Content-Length: 10\r\n\r\n").unwrap();
        assert_eq!(head.body_kind, BodyKind::Chunked);
        let head = parse(b"POST /f HTTP/1.1\r\nContent-Length: 10\r\n\
                           Expect: 100-continue\r\n\r\n").unwrap();
        assert_eq!(head.body_kind, BodyKind::Fixed(10));
        assert!(head.expect_continue);
        assert_matches!(parse(b"POST /f HTTP/1.1\r\n\r\n"),
                        Err(Error::LengthRequired));
        assert_matches!(parse(b"GET /f HTTP/1.1\r\nContent-Length: x\r\n\r\n"),
                        Err(Error::Scan(_)));
    }

    #[test]
    fn bad_head() {
        assert_matches!(parse(b"GET / HTTP/1.1\r\nBad Header\r\n\r\n"),
                        Err(Error::BadHeaders(_)));
        assert_matches!(parse(b"GET nopath HTTP/1.1\r\n\r\n"),
                        Err(Error::Scan(_)));
    }
}
