use std::collections::VecDeque;
use std::mem;

use crate::packet::{Packet, Wait};
use crate::scan::hex_value;
use crate::shared::BodyKind;
use super::error::Error;
use super::transport::TransportError;


/// Source of raw request bytes past the head
pub trait Fetch {
    fn fetch(&mut self) -> Result<Packet, Error>;
}

impl Fetch for VecDeque<Packet> {
    fn fetch(&mut self) -> Result<Packet, Error> {
        self.pop_front()
            .ok_or(Error::Transport(TransportError::Disconnected))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyProgress {
    /// Bytes left
    Fixed(u64),
    /// Bytes left in the current chunk, whether its trailing CRLF is due
    Chunked { remaining: u64, need_crlf: bool },
    Done,
}

/// Uniform reader over fixed-length and chunked bodies
///
/// Yields de-framed body packets. Raw buffers are handed on or released as
/// soon as they are consumed, so only the buffers in flight are held.
pub struct BodyReader {
    progress: BodyProgress,
    raw: Packet,
    ready: Packet,
    received: u64,
    framing_limit: usize,
    framing_left: usize,
    wait: Wait,
}

/// Longest chunk size line or trailer accepted unless configured
const FRAMING_LIMIT: usize = 4096;

impl BodyReader {
    /// Starts reading a body of `kind`, `raw` is whatever followed the head
    pub fn new(kind: BodyKind, raw: Packet, wait: Wait) -> BodyReader {
        let progress = match kind {
            BodyKind::Fixed(0) => BodyProgress::Done,
            BodyKind::Fixed(n) => BodyProgress::Fixed(n),
            BodyKind::Chunked => BodyProgress::Chunked {
                remaining: 0,
                need_crlf: false,
            },
        };
        BodyReader {
            ready: Packet::empty(raw.pool()),
            progress: progress,
            raw: raw,
            received: 0,
            framing_limit: FRAMING_LIMIT,
            framing_left: FRAMING_LIMIT,
            wait: wait,
        }
    }

    /// All of the body has been read (bytes may still wait in `read`)
    pub fn is_done(&self) -> bool {
        self.progress == BodyProgress::Done
    }

    /// Number of body bytes de-framed so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Caps the bytes of one chunk size line, and of the trailer
    pub fn framing_limit(mut self, limit: usize) -> BodyReader {
        self.framing_limit = limit;
        self.framing_left = limit;
        self
    }

    /// Raw bytes received past the end of the body
    ///
    /// On a keep-alive connection this is the start of the next request.
    pub fn into_surplus(self) -> Packet {
        self.raw
    }

    fn next_byte(&mut self, src: &mut dyn Fetch) -> Result<u8, Error> {
        loop {
            if let Some(byte) = self.raw.pop_front() {
                return Ok(byte);
            }
            let more = src.fetch()?;
            self.raw.push_packet(more);
        }
    }

    /// Next byte of chunk framing, counted against the framing limit
    fn framing_byte(&mut self, src: &mut dyn Fetch) -> Result<u8, Error> {
        if self.framing_left == 0 {
            return Err(Error::InvalidChunkSize);
        }
        self.framing_left -= 1;
        self.next_byte(src)
    }

    fn expect_crlf(&mut self, src: &mut dyn Fetch) -> Result<(), Error> {
        if self.next_byte(src)? != b'\r' || self.next_byte(src)? != b'\n' {
            return Err(Error::InvalidChunkSize);
        }
        Ok(())
    }

    /// Parses `hex[;ext]\r\n`
    fn chunk_size(&mut self, src: &mut dyn Fetch) -> Result<u64, Error> {
        self.framing_left = self.framing_limit;
        let mut size: Option<u64> = None;
        loop {
            let ch = self.framing_byte(src)?;
            match hex_value(ch) {
                Some(digit) => {
                    size = Some(size.unwrap_or(0)
                        .checked_mul(16)
                        .and_then(|s| s.checked_add(digit as u64))
                        .ok_or(Error::InvalidChunkSize)?);
                }
                None => {
                    let size = size.ok_or(Error::InvalidChunkSize)?;
                    let mut ch = ch;
                    while ch == b' ' || ch == b'\t' {
                        ch = self.framing_byte(src)?;
                    }
                    if ch == b';' {
                        while ch != b'\r' {
                            ch = self.framing_byte(src)?;
                        }
                    }
                    if ch != b'\r' || self.framing_byte(src)? != b'\n' {
                        return Err(Error::InvalidChunkSize);
                    }
                    return Ok(size);
                }
            }
        }
    }

    /// Skips trailer fields up to and including the empty line
    fn trailer(&mut self, src: &mut dyn Fetch) -> Result<(), Error> {
        self.framing_left = self.framing_limit;
        loop {
            let mut empty = true;
            loop {
                match self.framing_byte(src)? {
                    b'\r' => {
                        if self.framing_byte(src)? != b'\n' {
                            return Err(Error::InvalidChunkSize);
                        }
                        break;
                    }
                    _ => empty = false,
                }
            }
            if empty {
                return Ok(());
            }
        }
    }

    /// Takes up to `limit` bytes off the raw input, fetching if empty
    fn take_raw(&mut self, src: &mut dyn Fetch, limit: u64)
        -> Result<Packet, Error>
    {
        while self.raw.is_empty() {
            let more = src.fetch()?;
            self.raw.push_packet(more);
        }
        let pool = self.raw.pool().clone();
        let raw = mem::replace(&mut self.raw, Packet::empty(&pool));
        if (raw.len() as u64) <= limit {
            return Ok(raw);
        }
        let (body, rest) = raw.split_at(limit as usize, self.wait)?;
        self.raw = rest;
        Ok(body)
    }

    /// Next de-framed piece of the body, `None` at the end
    pub fn next_packet(&mut self, src: &mut dyn Fetch)
        -> Result<Option<Packet>, Error>
    {
        if !self.ready.is_empty() {
            let pool = self.ready.pool().clone();
            return Ok(Some(mem::replace(&mut self.ready,
                                        Packet::empty(&pool))));
        }
        loop {
            match self.progress {
                BodyProgress::Done => return Ok(None),
                BodyProgress::Fixed(left) => {
                    let body = self.take_raw(src, left)?;
                    let left = left - body.len() as u64;
                    self.progress = if left == 0 {
                        BodyProgress::Done
                    } else {
                        BodyProgress::Fixed(left)
                    };
                    self.received += body.len() as u64;
                    return Ok(Some(body));
                }
                BodyProgress::Chunked { remaining: 0, need_crlf } => {
                    if need_crlf {
                        self.expect_crlf(src)?;
                    }
                    let size = self.chunk_size(src)?;
                    if size == 0 {
                        self.trailer(src)?;
                        self.progress = BodyProgress::Done;
                    } else {
                        self.progress = BodyProgress::Chunked {
                            remaining: size,
                            need_crlf: true,
                        };
                    }
                }
                BodyProgress::Chunked { remaining, need_crlf } => {
                    let body = self.take_raw(src, remaining)?;
                    self.progress = BodyProgress::Chunked {
                        remaining: remaining - body.len() as u64,
                        need_crlf: need_crlf,
                    };
                    self.received += body.len() as u64;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Copies body bytes into `buf`, returns 0 only at the end of the body
    pub fn read(&mut self, src: &mut dyn Fetch, buf: &mut [u8])
        -> Result<usize, Error>
    {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.ready.is_empty() {
            match self.next_packet(src)? {
                Some(packet) => self.ready = packet,
                None => return Ok(0),
            }
        }
        let n = self.ready.copy_to_slice(0, buf);
        self.ready.advance(n);
        Ok(n)
    }

    /// Reads and releases the rest of the body, returns bytes discarded
    pub fn drain(&mut self, src: &mut dyn Fetch) -> Result<u64, Error> {
        let mut total = 0;
        while let Some(packet) = self.next_packet(src)? {
            total += packet.len() as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    use crate::packet::{Packet, PacketPool, Wait};
    use crate::server::Error;
    use crate::server::response::append_chunk;
    use crate::shared::BodyKind;
    use super::BodyReader;

    fn fragments(pool: &PacketPool, data: &[u8], size: usize)
        -> VecDeque<Packet>
    {
        data.chunks(size)
            .map(|c| pool.allocate_with(c, Wait::NoWait).unwrap())
            .collect()
    }

    fn read_all(reader: &mut BodyReader, src: &mut VecDeque<Packet>)
        -> Result<Vec<u8>, Error>
    {
        let mut result = Vec::new();
        while let Some(packet) = reader.next_packet(src)? {
            packet.copy_to_vec(&mut result);
        }
        Ok(result)
    }

    #[test]
    fn fixed_keeps_surplus() {
        let pool = PacketPool::new(16, 4);
        let mut src = fragments(&pool, b"hello worldGET /", 5);
        let first = src.pop_front().unwrap();
        let mut reader = BodyReader::new(BodyKind::Fixed(11), first,
                                         Wait::NoWait);
        assert_eq!(read_all(&mut reader, &mut src).unwrap(), b"hello world");
        assert!(reader.is_done());
        assert_eq!(reader.received(), 11);
        let mut surplus = reader.into_surplus();
        for p in src {
            surplus.push_packet(p);
        }
        assert_eq!(surplus.to_vec(), b"GET /");
    }

    #[test]
    fn chunked_with_extension_and_trailer() {
        let pool = PacketPool::new(32, 8);
        let data = b"5;name=x\r\nhello\r\n6\r\n world\r\n0\r\n\
                     X-Trailer: 1\r\n\r\nNEXT";
        let mut src = fragments(&pool, data, 3);
        let mut reader = BodyReader::new(BodyKind::Chunked,
                                         Packet::empty(&pool), Wait::NoWait);
        assert_eq!(read_all(&mut reader, &mut src).unwrap(), b"hello world");
        let mut rest = reader.into_surplus().to_vec();
        for p in src {
            p.copy_to_vec(&mut rest);
        }
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn framing_is_bounded() {
        let pool = PacketPool::new(32, 16);
        let mut long_ext = b"5;".to_vec();
        long_ext.extend_from_slice(&[b'x'; 100]);
        long_ext.extend_from_slice(b"\r\nhello\r\n0\r\n\r\n");
        let mut long_trailer = b"5\r\nhello\r\n0\r\nX-Pad: ".to_vec();
        long_trailer.extend_from_slice(&[b'x'; 100]);
        long_trailer.extend_from_slice(b"\r\n\r\n");
        for data in &[long_ext, long_trailer] {
            let mut src = fragments(&pool, data, 16);
            let mut reader = BodyReader::new(BodyKind::Chunked,
                Packet::empty(&pool), Wait::NoWait).framing_limit(32);
            assert_matches!(read_all(&mut reader, &mut src),
                            Err(Error::InvalidChunkSize));
        }
        let data = b"5;name=x\r\nhello\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let mut src = fragments(&pool, data, 16);
        let mut reader = BodyReader::new(BodyKind::Chunked,
            Packet::empty(&pool), Wait::NoWait).framing_limit(32);
        assert_eq!(read_all(&mut reader, &mut src).unwrap(), b"hello");
        drop(src);
        drop(reader);
        assert_eq!(pool.available(), 32);
    }

    #[test]
    fn chunked_errors() {
        let pool = PacketPool::new(8, 16);
        for bad in &[&b"zz\r\n"[..], &b"5\r\nhelloXX0\r\n\r\n"[..],
                     &b"5\n"[..], &b"\r\n"[..]]
        {
            let mut src = fragments(&pool, bad, 16);
            let mut reader = BodyReader::new(BodyKind::Chunked,
                Packet::empty(&pool), Wait::NoWait);
            assert_matches!(read_all(&mut reader, &mut src),
                            Err(Error::InvalidChunkSize));
        }
    }

    #[test]
    fn truncated_body() {
        let pool = PacketPool::new(8, 16);
        let mut src = fragments(&pool, b"abc", 16);
        let mut reader = BodyReader::new(BodyKind::Fixed(10),
            Packet::empty(&pool), Wait::NoWait);
        assert_matches!(read_all(&mut reader, &mut src),
                        Err(Error::Transport(_)));
    }

    #[test]
    fn chunked_roundtrip() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool = PacketPool::new(512, 32);
        let body = (0..2000).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        for _ in 0..10 {
            let mut encoded = Packet::empty(&pool);
            let mut offset = 0;
            while offset < body.len() {
                let size = rng.gen_range(1..300).min(body.len() - offset);
                append_chunk(&mut encoded, &body[offset..offset + size],
                             Wait::NoWait).unwrap();
                offset += size;
            }
            append_chunk(&mut encoded, b"", Wait::NoWait).unwrap();
            let wire = encoded.to_vec();
            assert!(wire.ends_with(b"\r\n0\r\n\r\n"));
            drop(encoded);

            let piece = rng.gen_range(8..64);
            let mut src = fragments(&pool, &wire, piece);
            let mut reader = BodyReader::new(BodyKind::Chunked,
                Packet::empty(&pool), Wait::NoWait);
            let mut decoded = vec![0u8; 0];
            let mut buf = [0u8; 37];
            loop {
                let n = reader.read(&mut src, &mut buf).unwrap();
                if n == 0 {
                    break;
                }
                decoded.extend_from_slice(&buf[..n]);
            }
            assert_eq!(decoded, body);
            assert!(reader.into_surplus().is_empty());
            assert!(src.is_empty());
        }
        assert_eq!(pool.available(), 512);
    }
}
