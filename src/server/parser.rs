use std::io;
use std::time::{SystemTime, UNIX_EPOCH};
use std::str::from_utf8;

use httpdate::parse_http_date;

use crate::fs::Filesystem;
use crate::packet::Packet;
use crate::scan::HeaderEnd;
use crate::shared::Version;
use super::auth::{self, check_basic, check_digest};
use super::auth::{basic_challenge, digest_challenge};
use super::body::BodyReader;
use super::context::Context;
use super::error::{Error, HttpError};
use super::exchange::{transmit, Exchange, ResponseState, SessionFetch};
use super::mime::MimeMap;
use super::protocol::{Authentication, CacheInfo, Handler, Notify};
use super::request::{sniff_version, Head, Method};
use super::response::{continue_line, simple_response};
use super::response::{HeaderContext, ResponseHead, Status};
use super::transport::{Session, TransportError};
use super::HttpServer;


/// What happens to the session after a request
enum Outcome {
    /// Wait for the next request, starting with these bytes
    KeepAlive(Packet),
    Close,
}

/// Why the authentication gate stopped a request
enum Denied {
    /// Answer `401` with this `WWW-Authenticate` line
    Challenge(String),
    Failed(Error),
}

impl<H, F, C> HttpServer<H, F, C>
    where H: Handler, F: Filesystem, C: Context,
{
    /// Serves requests from one session until it closes
    ///
    /// The session is disconnected and nonces bound to it are invalidated
    /// on return, whatever ended it.
    pub fn serve_session(&mut self, session: &mut dyn Session) {
        let id = session.id();
        debug!("session {:?} from {:?} opened", id, session.peer_addr());
        self.current_session = Some(id);
        let mut input = Packet::empty(&self.pool);
        loop {
            match self.process_request(session, input) {
                Ok(Outcome::KeepAlive(surplus)) => input = surplus,
                Ok(Outcome::Close) => break,
                Err(e) => {
                    if let Error::Pool(_) = e {
                        warn!("buffer pool exhausted, session {:?}", id);
                        self.stats.allocation_errors += 1;
                    } else {
                        debug!("session {:?} aborted: {}", id, e);
                    }
                    break;
                }
            }
        }
        session.disconnect(self.settings.disconnect_timeout);
        self.current_session = None;
        self.nonces.session_closed(id);
        debug!("session {:?} closed", id);
    }

    /// Accumulates packets until the request head is complete
    ///
    /// Returns the head bytes and whatever followed them, or `None` when
    /// the peer went quiet before sending anything.
    fn read_head(&mut self, session: &mut dyn Session, mut input: Packet)
        -> Result<Option<(Vec<u8>, Packet)>, Error>
    {
        let mut scanner = HeaderEnd::new();
        let mut found = scanner.feed_packet(&input);
        let end = loop {
            if let Some(end) = found {
                break end;
            }
            if scanner.scanned() > self.settings.max_header_size {
                return Err(Error::HeaderTooLarge);
            }
            let more = match session.receive(self.settings.receive_timeout) {
                Ok(more) => more,
                Err(TransportError::Timeout)
                | Err(TransportError::Disconnected)
                if input.is_empty() => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };
            self.stats.total_bytes_received += more.len() as u64;
            found = scanner.feed_packet(&more);
            input.push_packet(more);
        };
        if end > self.settings.max_header_size {
            return Err(Error::HeaderTooLarge);
        }
        let (head, rest) = input.split_at(end, self.settings.allocate_wait)?;
        Ok(Some((head.to_vec(), rest)))
    }

    fn count_request(&mut self, method: Method) {
        let counter = match method {
            Method::Get => &mut self.stats.get_requests,
            Method::Head => &mut self.stats.head_requests,
            Method::Post => &mut self.stats.post_requests,
            Method::Put => &mut self.stats.put_requests,
            Method::Delete => &mut self.stats.delete_requests,
            Method::Unknown => &mut self.stats.unknown_requests,
        };
        *counter += 1;
    }

    /// Sends a complete response carrying the reason phrase as body
    fn send_status(&mut self, session: &mut dyn Session, version: Version,
        method: Method, status: Status, additional: &[u8], keep_alive: bool)
        -> Result<(), Error>
    {
        let ctx = HeaderContext {
            version: version,
            method: method,
            keep_alive: keep_alive,
            date: self.handler.gmt_now(),
            cache: None,
        };
        let mut head = ResponseHead::new(status);
        head.content_type = Some("text/plain");
        head.content_length = Some(status.reason.len() as u64);
        head.additional = additional;
        let body = if method == Method::Head { "" } else { status.reason };
        let packet = simple_response(&head, &ctx, body.as_bytes(),
            &self.pool, self.settings.allocate_wait)?;
        transmit(session, packet, self.settings.send_timeout,
                 &mut self.stats)
    }

    /// Runs the authentication gate for `head`
    fn authenticate(&mut self, session: &mut dyn Session, head: &Head)
        -> Result<(), Denied>
    {
        let required = self.handler.authentication_check(head.method,
                                                         &head.resource);
        let authorization = auth::authorization(head, &self.settings);
        let challenge = match required {
            Authentication::None => return Ok(()),
            Authentication::Basic(ref creds) => {
                let passed = authorization.map_or(false, |value| {
                    check_basic(value, creds, &self.settings).authorized
                });
                if passed {
                    return Ok(());
                }
                basic_challenge(&creds.realm)
            }
            Authentication::Digest(ref creds) => {
                let now = self.context.now();
                let passed = match authorization {
                    Some(value) => check_digest(value, creds, head.method,
                        session.id(), now, &mut self.nonces, &self.settings,
                        &mut self.handler),
                    None => false,
                };
                if passed {
                    return Ok(());
                }
                let id = match self.nonces.allocate(now, &mut self.rng) {
                    Some(id) => id,
                    None => {
                        warn!("no digest nonce left for {}", head.resource);
                        return Err(Denied::Failed(Error::NonceExhausted));
                    }
                };
                digest_challenge(&creds.realm, self.nonces.value(id))
            }
        };
        if authorization.is_some() {
            info!("invalid credentials for {} {} from {:?}",
                  head.method, head.resource, session.peer_addr());
            self.handler.invalid_credentials(&head.resource,
                session.peer_addr(), head.method);
        }
        Err(Denied::Challenge(challenge))
    }

    fn process_request(&mut self, session: &mut dyn Session, input: Packet)
        -> Result<Outcome, Error>
    {
        let (raw, rest) = match self.read_head(session, input) {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(Outcome::Close),
            Err(Error::HeaderTooLarge) => {
                info!("request head exceeds {} bytes",
                      self.settings.max_header_size);
                self.stats.invalid_http_headers += 1;
                self.send_status(session, Version::Http11, Method::Unknown,
                                 Status::BAD_REQUEST, b"", false)?;
                return Ok(Outcome::Close);
            }
            Err(e) => return Err(e),
        };
        let method = Method::detect(&raw);
        self.count_request(method);
        let version = sniff_version(&raw);
        if method == Method::Unknown {
            debug!("unsupported method in {:?}",
                   String::from_utf8_lossy(&raw[..raw.len().min(16)]));
            self.send_status(session, version, method,
                             Status::NOT_IMPLEMENTED, b"", false)?;
            return Ok(Outcome::Close);
        }
        let head = match Head::parse(raw, &self.settings) {
            Ok(head) => head,
            Err(e) => {
                if let Error::BadHeaders(_) = e {
                    self.stats.invalid_http_headers += 1;
                }
                info!("bad {} request: {}", method, e);
                self.send_status(session, version, method,
                                 e.http_status().into(), b"", false)?;
                return Ok(Outcome::Close);
            }
        };
        debug!("{} {} on session {:?}", head.method, head.resource,
               session.id());
        let has_body = !head.body_kind.is_empty();

        match self.authenticate(session, &head) {
            Ok(()) => {}
            Err(Denied::Challenge(challenge)) => {
                // a pending body is not worth reading just to skip it
                let keep_alive = head.keep_alive && !has_body;
                self.send_status(session, head.version, head.method,
                    Status::UNAUTHORIZED, challenge.as_bytes(), keep_alive)?;
                return Ok(if keep_alive { Outcome::KeepAlive(rest) }
                          else { Outcome::Close });
            }
            Err(Denied::Failed(e)) => {
                self.send_status(session, head.version, head.method,
                                 e.http_status().into(), b"", false)?;
                return Ok(Outcome::Close);
            }
        }

        if head.expect_continue && has_body {
            let line = continue_line(head.version);
            let packet = self.pool.allocate_with(line.as_bytes(),
                                                 self.settings.allocate_wait)?;
            transmit(session, packet, self.settings.send_timeout,
                     &mut self.stats)?;
        }

        let cache = match head.method {
            Method::Get | Method::Head => {
                self.handler.cache_info(&head.resource)
            }
            _ => None,
        };
        let header_ctx = HeaderContext {
            version: head.version,
            method: head.method,
            keep_alive: head.keep_alive,
            date: self.handler.gmt_now(),
            cache: cache,
        };
        let mut body = BodyReader::new(head.body_kind, rest,
                                       self.settings.allocate_wait)
            .framing_limit(self.settings.max_header_size);
        let mut response = ResponseState::default();
        let reusable = {
            let mut exchange = Exchange::new(&head, &mut *session,
                &self.pool, &self.settings, &mut self.stats, &mut body,
                &mut response, header_ctx);
            let result = match self.handler.request_notify(&mut exchange) {
                Ok(Notify::Continue) => default_processing(&mut exchange,
                    &mut self.fs, &self.mime, cache, self.settings.mss),
                Ok(Notify::Completed) => completed(&mut exchange),
                Err(e) => Err(declined(e)),
            };
            match result.and_then(|()| exchange.finish()) {
                Ok(()) => true,
                Err(e) => {
                    info!("{} {} failed: {}", head.method, head.resource, e);
                    exchange.fail(&e)
                }
            }
        };
        if !reusable {
            return Ok(Outcome::Close);
        }
        if !body.is_done() {
            let drained = {
                let mut fetch = SessionFetch {
                    session: &mut *session,
                    timeout: self.settings.receive_timeout,
                    stats: &mut self.stats,
                };
                body.drain(&mut fetch)
            };
            match drained {
                Ok(skipped) => {
                    debug!("skipped {} of {} body bytes", skipped,
                           body.received());
                }
                Err(e) => {
                    debug!("can't skip rest of request body: {}", e);
                    return Ok(Outcome::Close);
                }
            }
        }
        if head.keep_alive && response.started && !response.closes {
            Ok(Outcome::KeepAlive(body.into_surplus()))
        } else {
            Ok(Outcome::Close)
        }
    }
}

/// Error returned by the handler itself, always answered with `500`
fn declined(err: Error) -> Error {
    match err {
        Error::Callback(_) | Error::Pool(_) | Error::InvalidChain => err,
        other => Error::Callback(other.to_string()),
    }
}

/// What the server does with a request the handler let through
fn default_processing<F>(exchange: &mut Exchange, fs: &mut F,
    mime: &MimeMap, cache: Option<CacheInfo>, mss: usize)
    -> Result<(), Error>
    where F: Filesystem + ?Sized,
{
    match exchange.method() {
        Method::Get | Method::Head | Method::Post => {
            serve_file(exchange, fs, mime, cache, mss)
        }
        Method::Put => store_file(exchange, fs),
        Method::Delete => remove_file(exchange, fs),
        Method::Unknown => Ok(()),
    }
}

/// Generic success for handlers that completed PUT or DELETE silently
fn completed(exchange: &mut Exchange) -> Result<(), Error> {
    match exchange.method() {
        Method::Put | Method::Delete if !exchange.response_sent() => {
            exchange.send_response(Status::OK, "", b"")
        }
        _ => Ok(()),
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// `If-Modified-Since` is present and not older than `modified`
fn not_modified(exchange: &Exchange, modified: SystemTime) -> bool {
    let value = match exchange.field("If-Modified-Since") {
        Ok(Some(value)) => value,
        _ => return false,
    };
    match from_utf8(value).ok().and_then(|v| parse_http_date(v).ok()) {
        Some(since) => unix_secs(modified) <= unix_secs(since),
        None => {
            debug!("unparsable If-Modified-Since {:?}",
                   String::from_utf8_lossy(value));
            false
        }
    }
}

fn serve_file<F>(exchange: &mut Exchange, fs: &mut F, mime: &MimeMap,
    cache: Option<CacheInfo>, mss: usize)
    -> Result<(), Error>
    where F: Filesystem + ?Sized,
{
    if exchange.method() == Method::Post {
        exchange.drain_body()?;
    }
    if exchange.response_sent() {
        return Ok(());
    }
    let resource = exchange.resource().to_string();
    let size = fs.stat(&resource)?;
    if let Some(modified) = cache.and_then(|c| c.last_modified) {
        if not_modified(exchange, modified) {
            return exchange.send_header(&ResponseHead::new(
                Status::NOT_MODIFIED));
        }
    }
    let mut head = ResponseHead::new(Status::OK);
    head.content_type = Some(mime.lookup(&resource));
    head.content_length = Some(size);
    exchange.send_header(&head)?;
    if exchange.method() == Method::Head {
        return Ok(());
    }
    let mut buf = vec![0; mss];
    let mut offset = 0;
    while offset < size {
        let bytes = fs.read(&resource, offset, &mut buf)?;
        if bytes == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof,
                "file shrank while being sent").into());
        }
        exchange.send_data(&buf[..bytes])?;
        offset += bytes as u64;
    }
    Ok(())
}

/// Wraps a filesystem error so that it reports `500`
fn internal(err: io::Error) -> Error {
    Error::Filesystem(io::Error::new(io::ErrorKind::Other, err))
}

fn copy_body<F>(exchange: &mut Exchange, fs: &mut F, resource: &str)
    -> Result<(), Error>
    where F: Filesystem + ?Sized,
{
    while let Some(packet) = exchange.body_packet()? {
        for segment in packet.segments() {
            fs.write(resource, segment).map_err(internal)?;
        }
    }
    Ok(())
}

fn store_file<F>(exchange: &mut Exchange, fs: &mut F) -> Result<(), Error>
    where F: Filesystem + ?Sized,
{
    let resource = exchange.resource().to_string();
    fs.create(&resource).map_err(internal)?;
    if let Err(e) = copy_body(exchange, fs, &resource) {
        if let Err(del) = fs.delete(&resource) {
            debug!("can't remove partial upload {}: {}", resource, del);
        }
        return Err(e);
    }
    if exchange.response_sent() {
        return Ok(());
    }
    exchange.send_response(Status::OK, "", b"")
}

fn remove_file<F>(exchange: &mut Exchange, fs: &mut F) -> Result<(), Error>
    where F: Filesystem + ?Sized,
{
    let resource = exchange.resource().to_string();
    if let Err(e) = fs.delete(&resource) {
        debug!("can't delete {}: {}", resource, e);
        return Err(io::Error::new(io::ErrorKind::NotFound, e).into());
    }
    if exchange.response_sent() {
        return Ok(());
    }
    exchange.send_response(Status::OK, "", b"")
}
