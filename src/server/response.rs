use std::fmt;
use std::time::SystemTime;

use httpdate::fmt_http_date;

use crate::packet::{Packet, PacketPool, PoolError, Wait};
use crate::shared::Version;
use super::protocol::CacheInfo;
use super::request::Method;


/// Response status code and reason phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: &'static str,
}

impl Status {
    pub const CONTINUE: Status = Status { code: 100, reason: "Continue" };
    pub const OK: Status = Status { code: 200, reason: "OK" };
    pub const NOT_MODIFIED: Status =
        Status { code: 304, reason: "Not Modified" };
    pub const BAD_REQUEST: Status = Status { code: 400, reason: "Bad Request" };
    pub const UNAUTHORIZED: Status =
        Status { code: 401, reason: "Unauthorized" };
    pub const NOT_FOUND: Status = Status { code: 404, reason: "Not Found" };
    pub const INTERNAL_SERVER_ERROR: Status =
        Status { code: 500, reason: "Internal Server Error" };
    pub const NOT_IMPLEMENTED: Status =
        Status { code: 501, reason: "Not Implemented" };
}

impl From<(u16, &'static str)> for Status {
    fn from((code, reason): (u16, &'static str)) -> Status {
        Status { code: code, reason: reason }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// What the application says about a response header
#[derive(Debug, Clone, Copy)]
pub struct ResponseHead<'a> {
    pub status: Status,
    pub content_type: Option<&'a str>,
    /// Known body length, ignored when `chunked` is set
    pub content_length: Option<u64>,
    pub chunked: bool,
    /// Extra header lines, each terminated by CRLF
    pub additional: &'a [u8],
}

impl<'a> ResponseHead<'a> {
    pub fn new(status: Status) -> ResponseHead<'a> {
        ResponseHead {
            status: status,
            content_type: None,
            content_length: None,
            chunked: false,
            additional: b"",
        }
    }

    /// Whether the client can find the end of the body without a close
    pub fn length_known(&self) -> bool {
        self.chunked
            || self.status.code == 304
            || (self.content_length.is_some()
                && !cfg!(feature="omit-content-length"))
    }
}

/// Per-request facts the generator needs besides the head itself
#[derive(Debug, Clone, Copy)]
pub struct HeaderContext {
    pub version: Version,
    pub method: Method,
    pub keep_alive: bool,
    pub date: Option<SystemTime>,
    pub cache: Option<CacheInfo>,
}

fn line(packet: &mut Packet, text: &str, wait: Wait) -> Result<(), PoolError>
{
    packet.append(text.as_bytes(), wait)?;
    packet.append(b"\r\n", wait)
}

/// Builds the status line and header fields of a response
///
/// Fields come in fixed order: Content-Type, Connection, Content-Length or
/// Transfer-Encoding, Date, Cache-Control with Last-Modified, the caller's
/// block. On allocation failure the partly built packet is released.
pub fn generate_header(head: &ResponseHead, ctx: &HeaderContext,
    pool: &PacketPool, wait: Wait)
    -> Result<Packet, PoolError>
{
    let mut packet = pool.allocate(wait)?;
    line(&mut packet, &format!("{} {}", ctx.version, head.status), wait)?;
    if let Some(content_type) = head.content_type {
        line(&mut packet, &format!("Content-Type: {}", content_type), wait)?;
    }
    if ctx.keep_alive && head.length_known() {
        line(&mut packet, "Connection: keep-alive", wait)?;
    } else {
        line(&mut packet, "Connection: close", wait)?;
    }
    if head.chunked {
        line(&mut packet, "Transfer-Encoding: chunked", wait)?;
    } else if let Some(length) = head.content_length {
        if !cfg!(feature="omit-content-length") {
            line(&mut packet, &format!("Content-Length: {}", length), wait)?;
        }
    }
    if let Some(date) = ctx.date {
        line(&mut packet, &format!("Date: {}", fmt_http_date(date)), wait)?;
    }
    let cacheable = ctx.method == Method::Get
        && (head.status.code == 200 || head.status.code == 304);
    if let (true, Some(cache)) = (cacheable, ctx.cache) {
        line(&mut packet, &format!("Cache-Control: max-age={}",
                                   cache.max_age), wait)?;
        if let Some(modified) = cache.last_modified {
            line(&mut packet, &format!("Last-Modified: {}",
                                       fmt_http_date(modified)), wait)?;
        }
    }
    packet.append(head.additional, wait)?;
    packet.append(b"\r\n", wait)?;
    Ok(packet)
}

/// A complete response with a short fixed body
pub fn simple_response(head: &ResponseHead, ctx: &HeaderContext,
    body: &[u8], pool: &PacketPool, wait: Wait)
    -> Result<Packet, PoolError>
{
    let mut packet = generate_header(head, ctx, pool, wait)?;
    packet.append(body, wait)?;
    Ok(packet)
}

/// Appends one chunk of a chunked body, an empty `data` ends the body
pub fn append_chunk(packet: &mut Packet, data: &[u8], wait: Wait)
    -> Result<(), PoolError>
{
    if data.is_empty() {
        return packet.append(b"0\r\n\r\n", wait);
    }
    packet.append(format!("{:x}\r\n", data.len()).as_bytes(), wait)?;
    packet.append(data, wait)?;
    packet.append(b"\r\n", wait)
}

/// The interim response sent for `Expect: 100-continue`
pub fn continue_line(version: Version) -> String {
    format!("{} {}\r\n\r\n", version, Status::CONTINUE)
}
