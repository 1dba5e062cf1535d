//! Streaming `multipart/form-data` boundary finder
//!
//! Holds at most the bytes that could still be the start of a boundary
//! plus one freshly fetched packet. Content is handed out as soon as it is
//! known not to belong to a delimiter.
use std::collections::VecDeque;
use std::mem;

use crate::packet::{Packet, PacketPool, PoolError, Wait};
use crate::scan::{starts_with_ignore_case, HeaderEnd, ScanError};
use super::error::Error;


/// Supplier of de-framed body packets
pub trait BodySource {
    /// `None` once the body is exhausted
    fn next_body_packet(&mut self) -> Result<Option<Packet>, Error>;
}

impl BodySource for VecDeque<Packet> {
    fn next_body_packet(&mut self) -> Result<Option<Packet>, Error> {
        Ok(self.pop_front())
    }
}

/// Extracts the boundary token of a `multipart/...` content type
pub fn boundary_from_content_type(value: &[u8]) -> Option<Vec<u8>> {
    if !starts_with_ignore_case(value, b"multipart/") {
        return None;
    }
    let key = b"boundary=";
    let start = (0..value.len())
        .find(|&idx| starts_with_ignore_case(&value[idx..], key))?
        + key.len();
    let rest = &value[start..];
    let token = if rest.first() == Some(&b'"') {
        let end = rest[1..].iter().position(|&ch| ch == b'"')? + 1;
        &rest[1..end]
    } else {
        let end = rest.iter()
            .position(|&ch| ch == b';' || ch == b' ' || ch == b'\t'
                            || ch == b'\r')
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_vec())
    }
}

enum Search {
    /// Boundary starts at this offset
    Found(usize),
    /// Bytes before this offset can not be part of a boundary
    Partial(usize),
}

pub struct Multipart {
    /// `\r\n--` followed by the token
    boundary: Vec<u8>,
    failure: Vec<usize>,
    buf: Packet,
    boundary_found: bool,
    finished: bool,
    max_header: usize,
    wait: Wait,
}

impl Multipart {
    /// Starts a finder for `token`
    ///
    /// A CRLF is preloaded so a body starting right with the delimiter
    /// line matches like any later one.
    pub fn new(token: &[u8], pool: &PacketPool, max_header: usize,
        wait: Wait)
        -> Result<Multipart, PoolError>
    {
        let mut boundary = b"\r\n--".to_vec();
        boundary.extend_from_slice(token);
        let failure = failure_table(&boundary);
        Ok(Multipart {
            boundary: boundary,
            failure: failure,
            buf: pool.allocate_with(b"\r\n", wait)?,
            boundary_found: false,
            finished: false,
            max_header: max_header,
            wait: wait,
        })
    }

    /// The closing delimiter has been read
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn search(&self) -> Search {
        let mut matched = 0;
        for (idx, ch) in self.buf.bytes().enumerate() {
            while matched > 0 && ch != self.boundary[matched] {
                matched = self.failure[matched - 1];
            }
            if ch == self.boundary[matched] {
                matched += 1;
            }
            if matched == self.boundary.len() {
                return Search::Found(idx + 1 - matched);
            }
        }
        Search::Partial(self.buf.len() - matched)
    }

    fn take_front(&mut self, len: usize) -> Result<Packet, Error> {
        let pool = self.buf.pool().clone();
        let buf = mem::replace(&mut self.buf, Packet::empty(&pool));
        let (front, rest) = buf.split_at(len, self.wait)?;
        self.buf = rest;
        Ok(front)
    }

    /// Fetches one more packet, false at the end of the body
    fn fill(&mut self, src: &mut dyn BodySource) -> Result<bool, Error> {
        match src.next_body_packet()? {
            Some(packet) => {
                self.buf.push_packet(packet);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Next piece of the current entity's content
    ///
    /// Returns `Ok(None)` once the body is over. After the piece that ends
    /// at a delimiter, further calls fail with `BoundaryAlreadyFound` until
    /// `entity_header` moves past it.
    pub fn entity_content(&mut self, src: &mut dyn BodySource)
        -> Result<Option<Packet>, Error>
    {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.boundary_found {
                return Err(Error::BoundaryAlreadyFound);
            }
            match self.search() {
                Search::Found(start) => {
                    self.boundary_found = true;
                    return self.take_front(start).map(Some);
                }
                Search::Partial(safe) if safe > 0 => {
                    return self.take_front(safe).map(Some);
                }
                Search::Partial(_) => {
                    if !self.fill(src)? {
                        debug!("multipart body ended without delimiter");
                        self.finished = true;
                        let rest = self.take_front(self.buf.len())?;
                        return Ok(if rest.is_empty() { None }
                                  else { Some(rest) });
                    }
                }
            }
        }
    }

    /// Moves past the next delimiter and copies the entity header into `dst`
    ///
    /// Content not read yet is discarded. Returns the header length, or
    /// `None` at the closing delimiter. The header block excludes the CRLF
    /// ending the delimiter line and the blank line.
    pub fn entity_header(&mut self, src: &mut dyn BodySource,
        dst: &mut [u8])
        -> Result<Option<usize>, Error>
    {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.search() {
                Search::Found(start) => {
                    self.buf.advance(start);
                    break;
                }
                Search::Partial(safe) => {
                    self.buf.advance(safe);
                    if !self.fill(src)? {
                        self.finished = true;
                        return Ok(None);
                    }
                }
            }
        }
        self.buf.advance(self.boundary.len());
        self.boundary_found = false;
        while self.buf.len() < 2 {
            if !self.fill(src)? {
                self.finished = true;
                return Ok(None);
            }
        }
        if self.buf.byte_at(0) == Some(b'-') && self.buf.byte_at(1) == Some(b'-')
        {
            self.finished = true;
            return Ok(None);
        }
        let mut scanner = HeaderEnd::new();
        let mut found = scanner.feed_packet(&self.buf);
        let end = loop {
            if let Some(end) = found {
                break end;
            }
            if scanner.scanned() > self.max_header {
                return Err(Error::HeaderTooLarge);
            }
            let more = match src.next_body_packet()? {
                Some(more) => more,
                None => {
                    self.finished = true;
                    return Err(ScanError::Truncated.into());
                }
            };
            found = scanner.feed_packet(&more);
            self.buf.push_packet(more);
        };
        let header = self.take_front(end)?;
        // the delimiter line may carry padding before its CRLF
        let start = header.bytes().zip(header.bytes().skip(1))
            .position(|(a, b)| a == b'\r' && b == b'\n')
            .map_or(end, |pos| pos + 2);
        let len = end.saturating_sub(start + 2);
        if len > dst.len() {
            return Err(ScanError::FieldTooLarge.into());
        }
        header.copy_to_slice(start, &mut dst[..len]);
        Ok(Some(len))
    }
}

fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut len = 0;
    for idx in 1..pattern.len() {
        while len > 0 && pattern[idx] != pattern[len] {
            len = table[len - 1];
        }
        if pattern[idx] == pattern[len] {
            len += 1;
        }
        table[idx] = len;
    }
    table
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use crate::packet::{Packet, PacketPool, Wait};
    use crate::server::Error;
    use super::{boundary_from_content_type, Multipart};

    const BODY: &[u8] = b"preamble\r\n--XyZzY0123456789\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\r\n\
        first value\r\n--XyZzY0123456789\r\n\
        Content-Disposition: form-data; name=\"b\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        second\r\n--XyZ not yet\r\n--XyZzY0123456789--\r\n";

    fn source(pool: &PacketPool, data: &[u8], size: usize)
        -> VecDeque<Packet>
    {
        data.chunks(size)
            .map(|c| pool.allocate_with(c, Wait::NoWait).unwrap())
            .collect()
    }

    fn content(mp: &mut Multipart, src: &mut VecDeque<Packet>) -> Vec<u8> {
        let mut result = Vec::new();
        loop {
            match mp.entity_content(src) {
                Ok(Some(piece)) => piece.copy_to_vec(&mut result),
                Ok(None) => break,
                Err(Error::BoundaryAlreadyFound) => break,
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        result
    }

    #[test]
    fn boundary_token() {
        assert_eq!(boundary_from_content_type(
            b"multipart/form-data; boundary=abc123"),
            Some(b"abc123".to_vec()));
        assert_eq!(boundary_from_content_type(
            b"Multipart/Form-Data; BOUNDARY=\"a b\"; x=y"),
            Some(b"a b".to_vec()));
        assert_eq!(boundary_from_content_type(b"text/plain; boundary=x"),
                   None);
        assert_eq!(boundary_from_content_type(b"multipart/mixed"), None);
    }

    #[test]
    fn entities_across_small_packets() {
        for size in 1..20 {
            let pool = PacketPool::new(512, 8);
            let mut src = source(&pool, BODY, size);
            let mut mp = Multipart::new(b"XyZzY0123456789", &pool, 1024,
                                        Wait::NoWait).unwrap();
            let mut header = [0u8; 128];

            let len = mp.entity_header(&mut src, &mut header).unwrap()
                .unwrap();
            assert_eq!(&header[..len],
                &b"Content-Disposition: form-data; name=\"a\"\r\n"[..]);
            assert_eq!(content(&mut mp, &mut src), b"first value");

            let len = mp.entity_header(&mut src, &mut header).unwrap()
                .unwrap();
            assert_eq!(&header[..len],
                &b"Content-Disposition: form-data; name=\"b\"\r\n\
                   Content-Type: text/plain\r\n"[..]);
            assert_eq!(content(&mut mp, &mut src),
                       &b"second\r\n--XyZ not yet"[..]);

            assert_eq!(mp.entity_header(&mut src, &mut header).unwrap(),
                       None);
            assert!(mp.is_finished());
            drop(mp);
            drop(src);
            assert_eq!(pool.available(), 512);
        }
    }

    #[test]
    fn second_content_call_fails() {
        let pool = PacketPool::new(64, 64);
        let body = b"--b\r\n\r\nxyz\r\n--b--\r\n";
        let mut src = source(&pool, body, 64);
        let mut mp = Multipart::new(b"b", &pool, 1024, Wait::NoWait)
            .unwrap();
        let mut header = [0u8; 16];
        assert_eq!(mp.entity_header(&mut src, &mut header).unwrap(), Some(0));
        let piece = mp.entity_content(&mut src).unwrap().unwrap();
        assert_eq!(piece.to_vec(), b"xyz");
        assert_matches!(mp.entity_content(&mut src),
                        Err(Error::BoundaryAlreadyFound));
        assert_eq!(mp.entity_header(&mut src, &mut header).unwrap(), None);
    }

    #[test]
    fn padded_delimiter_line() {
        let pool = PacketPool::new(64, 8);
        let body = b"--b \t\r\nName: v\r\n\r\nxy\r\n\
                     --b  \r\n\r\nz\r\n--b--\r\n";
        let mut src = source(&pool, body, 5);
        let mut mp = Multipart::new(b"b", &pool, 1024, Wait::NoWait)
            .unwrap();
        let mut header = [0u8; 32];
        let len = mp.entity_header(&mut src, &mut header).unwrap().unwrap();
        assert_eq!(&header[..len], b"Name: v\r\n");
        assert_eq!(content(&mut mp, &mut src), b"xy");
        assert_eq!(mp.entity_header(&mut src, &mut header).unwrap(), Some(0));
        assert_eq!(content(&mut mp, &mut src), b"z");
        assert_eq!(mp.entity_header(&mut src, &mut header).unwrap(), None);
    }

    #[test]
    fn header_too_large_for_destination() {
        let pool = PacketPool::new(64, 64);
        let body = b"--b\r\nName: long value\r\n\r\nx\r\n--b--\r\n";
        let mut src = source(&pool, body, 64);
        let mut mp = Multipart::new(b"b", &pool, 1024, Wait::NoWait)
            .unwrap();
        let mut header = [0u8; 4];
        assert_matches!(mp.entity_header(&mut src, &mut header),
                        Err(Error::Scan(_)));
    }
}
