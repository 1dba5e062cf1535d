use std::net::SocketAddr;
use std::time::Duration;

use crate::packet::{Packet, PacketPool};
use crate::shared::{BodyKind, Version};
use super::body::{BodyReader, Fetch};
use super::context::Settings;
use super::error::{Error, HttpError};
use super::multipart::{boundary_from_content_type, BodySource, Multipart};
use super::request::{Head, Method};
use super::response::{append_chunk, generate_header, simple_response};
use super::response::{HeaderContext, ResponseHead, Status};
use super::transport::Session;
use super::Statistics;


/// Raw request bytes straight from the session
pub(crate) struct SessionFetch<'s> {
    pub session: &'s mut dyn Session,
    pub timeout: Duration,
    pub stats: &'s mut Statistics,
}

impl<'s> Fetch for SessionFetch<'s> {
    fn fetch(&mut self) -> Result<Packet, Error> {
        let packet = self.session.receive(self.timeout)?;
        self.stats.total_bytes_received += packet.len() as u64;
        Ok(packet)
    }
}

struct BodyFeed<'s> {
    body: &'s mut BodyReader,
    fetch: SessionFetch<'s>,
}

impl<'s> BodySource for BodyFeed<'s> {
    fn next_body_packet(&mut self) -> Result<Option<Packet>, Error> {
        self.body.next_packet(&mut self.fetch)
    }
}

/// Sends `packet` and accounts for it
pub(crate) fn transmit(session: &mut dyn Session, packet: Packet,
    timeout: Duration, stats: &mut Statistics)
    -> Result<(), Error>
{
    let len = packet.len() as u64;
    session.send(packet, timeout)?;
    stats.total_bytes_sent += len;
    Ok(())
}

/// How far the response of the current request went
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ResponseState {
    /// Response header is sent
    pub started: bool,
    /// Anything at all is sent
    pub sent: bool,
    /// Body uses chunked framing
    pub chunked: bool,
    /// Application asked for chunked framing
    pub want_chunked: bool,
    /// Terminal chunk is sent
    pub terminated: bool,
    /// The generated header announced `Connection: close`
    pub closes: bool,
}

/// Handle on one request and its response
///
/// Passed to `Handler::request_notify`. Borrowed state lives as long as the
/// request does, nothing here outlives the response.
pub struct Exchange<'a> {
    head: &'a Head,
    session: &'a mut dyn Session,
    pool: &'a PacketPool,
    settings: &'a Settings,
    stats: &'a mut Statistics,
    body: &'a mut BodyReader,
    response: &'a mut ResponseState,
    header_ctx: HeaderContext,
    multipart: Option<Multipart>,
}

impl<'a> Exchange<'a> {
    pub(crate) fn new(head: &'a Head, session: &'a mut dyn Session,
        pool: &'a PacketPool, settings: &'a Settings,
        stats: &'a mut Statistics, body: &'a mut BodyReader,
        response: &'a mut ResponseState, header_ctx: HeaderContext)
        -> Exchange<'a>
    {
        Exchange {
            head: head,
            session: session,
            pool: pool,
            settings: settings,
            stats: stats,
            body: body,
            response: response,
            header_ctx: header_ctx,
            multipart: None,
        }
    }

    pub fn method(&self) -> Method {
        self.head.method
    }

    /// Decoded resource path
    pub fn resource(&self) -> &str {
        &self.head.resource
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Whether the client asked to keep the connection open
    pub fn keep_alive(&self) -> bool {
        self.head.keep_alive
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.peer_addr()
    }

    /// The request head as received, request line included
    pub fn header(&self) -> &[u8] {
        self.head.raw()
    }

    /// Case-insensitive header field lookup, whitespace trimmed
    pub fn field(&self, name: &str) -> Result<Option<&[u8]>, Error> {
        Ok(self.head.field(name, self.settings.max_header_field)?)
    }

    /// Value of the `index`-th query item of the resource
    pub fn query(&self, index: usize) -> Result<&[u8], Error> {
        Ok(self.head.query(index)?)
    }

    /// Value of the `index`-th `;` parameter of the resource
    pub fn param(&self, index: usize) -> Result<&[u8], Error> {
        Ok(self.head.param(index)?)
    }

    pub fn body_kind(&self) -> BodyKind {
        self.head.body_kind
    }

    pub fn content_length(&self) -> Option<u64> {
        match self.head.body_kind {
            BodyKind::Fixed(len) => Some(len),
            BodyKind::Chunked => None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.head.body_kind == BodyKind::Chunked
    }

    /// Next de-framed packet of the request body, `None` at its end
    pub fn body_packet(&mut self) -> Result<Option<Packet>, Error> {
        let mut fetch = SessionFetch {
            session: &mut *self.session,
            timeout: self.settings.receive_timeout,
            stats: &mut *self.stats,
        };
        self.body.next_packet(&mut fetch)
    }

    /// Copies request body bytes into `buf`, 0 means the body is over
    pub fn read_body(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut fetch = SessionFetch {
            session: &mut *self.session,
            timeout: self.settings.receive_timeout,
            stats: &mut *self.stats,
        };
        self.body.read(&mut fetch, buf)
    }

    /// Reads and releases whatever is left of the request body
    pub fn drain_body(&mut self) -> Result<u64, Error> {
        let mut fetch = SessionFetch {
            session: &mut *self.session,
            timeout: self.settings.receive_timeout,
            stats: &mut *self.stats,
        };
        self.body.drain(&mut fetch)
    }

    fn multipart_source(&mut self) -> Result<(), Error> {
        if self.multipart.is_some() {
            return Ok(());
        }
        let content_type = self.field("Content-Type")?
            .ok_or(Error::NotMultipart)?;
        let token = boundary_from_content_type(content_type)
            .ok_or(Error::NotMultipart)?;
        self.multipart = Some(Multipart::new(&token, self.pool,
            self.settings.max_header_size, self.settings.allocate_wait)?);
        Ok(())
    }

    /// Moves to the next part of a `multipart/form-data` body
    ///
    /// Copies the part's header block into `dst` and returns its length, or
    /// `None` after the closing delimiter.
    pub fn entity_header(&mut self, dst: &mut [u8])
        -> Result<Option<usize>, Error>
    {
        self.multipart_source()?;
        let mut feed = BodyFeed {
            body: &mut *self.body,
            fetch: SessionFetch {
                session: &mut *self.session,
                timeout: self.settings.receive_timeout,
                stats: &mut *self.stats,
            },
        };
        match self.multipart {
            Some(ref mut multipart) => multipart.entity_header(&mut feed, dst),
            None => Err(Error::NotMultipart),
        }
    }

    /// Next piece of the current part's content
    ///
    /// See `Multipart::entity_content` for the end-of-part protocol.
    pub fn entity_content(&mut self) -> Result<Option<Packet>, Error> {
        self.multipart_source()?;
        let mut feed = BodyFeed {
            body: &mut *self.body,
            fetch: SessionFetch {
                session: &mut *self.session,
                timeout: self.settings.receive_timeout,
                stats: &mut *self.stats,
            },
        };
        match self.multipart {
            Some(ref mut multipart) => multipart.entity_content(&mut feed),
            None => Err(Error::NotMultipart),
        }
    }

    /// Makes the next `send_header` use chunked framing
    pub fn set_response_chunked(&mut self, chunked: bool) {
        self.response.want_chunked = chunked;
    }

    pub fn response_started(&self) -> bool {
        self.response.started
    }

    /// Anything, header or raw packet, went out for this request
    pub fn response_sent(&self) -> bool {
        self.response.sent
    }

    /// A fresh packet from the server's pool
    pub fn allocate_packet(&mut self) -> Result<Packet, Error> {
        Ok(self.pool.allocate(self.settings.allocate_wait)?)
    }

    fn send(&mut self, packet: Packet) -> Result<(), Error> {
        self.response.sent = true;
        let timeout = self.settings.send_timeout;
        transmit(&mut *self.session, packet, timeout, &mut *self.stats)
    }

    /// Sends a complete response with `info` as a plain text body
    pub fn send_response(&mut self, status: Status, info: &str,
        additional: &[u8])
        -> Result<(), Error>
    {
        if self.response.started {
            return Err(Error::ResponseStarted);
        }
        let mut head = ResponseHead::new(status);
        if !info.is_empty() {
            head.content_type = Some("text/plain");
        }
        head.content_length = Some(info.len() as u64);
        head.additional = additional;
        let body = if self.head.method == Method::Head { "" } else { info };
        let packet = simple_response(&head, &self.header_ctx,
            body.as_bytes(), self.pool, self.settings.allocate_wait)?;
        self.response.started = true;
        self.response.chunked = false;
        self.response.closes = !(self.header_ctx.keep_alive
                                 && head.length_known());
        self.send(packet)
    }

    /// Generates and sends the response header
    pub fn send_header(&mut self, head: &ResponseHead) -> Result<(), Error> {
        if self.response.started {
            return Err(Error::ResponseStarted);
        }
        let mut head = *head;
        if self.response.want_chunked {
            head.chunked = true;
        }
        let packet = generate_header(&head, &self.header_ctx, self.pool,
                                     self.settings.allocate_wait)?;
        self.response.started = true;
        self.response.chunked = head.chunked;
        self.response.closes = !(self.header_ctx.keep_alive
                                 && head.length_known());
        self.send(packet)
    }

    /// Sends body bytes, chunk-framed when the response is chunked
    ///
    /// Answers to HEAD carry no body, so nothing is sent for them.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() || self.head.method == Method::Head {
            return Ok(());
        }
        let wait = self.settings.allocate_wait;
        let packet = if self.response.chunked {
            let mut packet = Packet::empty(self.pool);
            append_chunk(&mut packet, data, wait)?;
            packet
        } else {
            self.pool.allocate_with(data, wait)?
        };
        self.send(packet)
    }

    /// Sends a packet as is
    pub fn send_packet(&mut self, packet: Packet) -> Result<(), Error> {
        self.send(packet)
    }

    /// Answers a failed request with its error status, if nothing was sent
    ///
    /// Returns whether the connection may serve another request. Only
    /// `404` keeps it open.
    pub(crate) fn fail(&mut self, err: &Error) -> bool {
        if let Error::Pool(_) = *err {
            warn!("buffer pool exhausted serving {}", self.head.resource);
            self.stats.allocation_errors += 1;
        }
        if self.response.sent {
            return false;
        }
        let status = Status::from(err.http_status());
        let keep_alive = status.code == 404 && self.header_ctx.keep_alive;
        self.header_ctx.keep_alive = keep_alive;
        match self.send_response(status, status.reason, b"") {
            Ok(()) => keep_alive,
            Err(e) => {
                debug!("can't send error response: {}", e);
                false
            }
        }
    }

    /// Ends a chunked response with the terminal chunk, once
    pub(crate) fn finish(&mut self) -> Result<(), Error> {
        if self.response.started && self.response.chunked
            && !self.response.terminated && self.head.method != Method::Head
        {
            self.response.terminated = true;
            let mut packet = Packet::empty(self.pool);
            append_chunk(&mut packet, b"", self.settings.allocate_wait)?;
            self.send(packet)?;
        }
        Ok(())
    }
}
