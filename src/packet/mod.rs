//! Buffer chains
//!
//! A `Packet` is an owned chain of segments, each one a buffer borrowed from
//! a `PacketPool`. Every segment keeps a read cursor (`start`) and a write
//! cursor (`end`), with `start <= end <= capacity` at all times. Dropping a
//! packet (or any segment split off it) hands the buffers back to the pool.
use std::cmp::min;
use std::collections::VecDeque;
use std::fmt;
use std::mem;

mod pool;

pub use self::pool::{PacketPool, Wait};


quick_error! {
    /// Errors of the buffer chain layer
    #[derive(Debug, PartialEq, Eq)]
    pub enum PoolError {
        Exhausted {
            description("packet pool exhausted")
        }
        OutOfRange(offset: usize, len: usize) {
            description("offset is past the end of the packet")
            display("offset {} is past the end of a {} byte packet",
                    offset, len)
        }
    }
}

pub(crate) struct Segment {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    pool: PacketPool,
}

impl Segment {
    fn new(buf: Vec<u8>, pool: PacketPool) -> Segment {
        Segment {
            buf: buf,
            start: 0,
            end: 0,
            pool: pool,
        }
    }
    fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }
    fn len(&self) -> usize {
        self.end - self.start
    }
    fn room(&self) -> usize {
        self.buf.len() - self.end
    }
    /// Copies as much of `data` as fits, returns the number of bytes taken
    fn push(&mut self, data: &[u8]) -> usize {
        let n = min(self.room(), data.len());
        self.buf[self.end..self.end + n].copy_from_slice(&data[..n]);
        self.end += n;
        n
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        let buf = mem::replace(&mut self.buf, Vec::new());
        self.pool.release(buf);
    }
}

/// An owned, possibly chained, region of network bytes
pub struct Packet {
    pool: PacketPool,
    segments: VecDeque<Segment>,
}

impl Packet {
    fn from_segment(pool: PacketPool, segment: Segment) -> Packet {
        let mut segments = VecDeque::with_capacity(1);
        segments.push_back(segment);
        Packet {
            pool: pool,
            segments: segments,
        }
    }

    /// A packet with no segments at all
    ///
    /// Appending to it allocates from `pool`.
    pub fn empty(pool: &PacketPool) -> Packet {
        Packet {
            pool: pool.clone(),
            segments: VecDeque::new(),
        }
    }

    /// The pool this packet allocates from
    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    /// Total number of bytes over the whole chain
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.len() == 0)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Data of every segment, in chain order
    pub fn segments<'a>(&'a self) -> impl Iterator<Item=&'a [u8]> + 'a {
        self.segments.iter().map(Segment::data)
    }

    /// Iterates over every byte of the chain
    pub fn bytes<'a>(&'a self) -> impl Iterator<Item=u8> + 'a {
        self.segments().flat_map(|s| s.iter().cloned())
    }

    pub fn byte_at(&self, mut offset: usize) -> Option<u8> {
        for segment in &self.segments {
            if offset < segment.len() {
                return Some(segment.data()[offset]);
            }
            offset -= segment.len();
        }
        None
    }

    /// Copies bytes starting at `offset` into `dst`, returns count copied
    pub fn copy_to_slice(&self, mut offset: usize, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        for data in self.segments() {
            if copied == dst.len() {
                break;
            }
            if offset >= data.len() {
                offset -= data.len();
                continue;
            }
            let n = min(data.len() - offset, dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&data[offset..offset + n]);
            copied += n;
            offset = 0;
        }
        copied
    }

    /// Appends every byte of the chain to `dst`
    pub fn copy_to_vec(&self, dst: &mut Vec<u8>) {
        for data in self.segments() {
            dst.extend_from_slice(data);
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.len());
        self.copy_to_vec(&mut result);
        result
    }

    /// Appends `data`, filling the tail segment first and chaining new
    /// buffers from the pool for the rest
    ///
    /// On error the bytes appended so far stay in the packet. Callers
    /// building a response drop the whole packet in that case.
    pub fn append(&mut self, mut data: &[u8], wait: Wait)
        -> Result<(), PoolError>
    {
        if let Some(last) = self.segments.back_mut() {
            let n = last.push(data);
            data = &data[n..];
        }
        while !data.is_empty() {
            let mut segment = self.pool.segment(wait)?;
            let n = segment.push(data);
            data = &data[n..];
            self.segments.push_back(segment);
        }
        Ok(())
    }

    /// Splits the chain into `[0, at)` and `[at, len)`
    ///
    /// Splitting at a segment boundary only moves segments. When `at` falls
    /// inside a segment the part past `at` is copied into a fresh buffer, so
    /// this may fail with `Exhausted`; in that case every buffer of the
    /// packet is released.
    pub fn split_at(self, at: usize, wait: Wait)
        -> Result<(Packet, Packet), PoolError>
    {
        let len = self.len();
        if at > len {
            return Err(PoolError::OutOfRange(at, len));
        }
        let Packet { pool, segments: mut tail } = self;
        let mut head = VecDeque::new();
        let mut left = at;
        while left > 0 {
            let mut segment = match tail.pop_front() {
                Some(segment) => segment,
                None => break,
            };
            if segment.len() <= left {
                left -= segment.len();
                head.push_back(segment);
            } else {
                let mut rest = pool.segment(wait)?;
                rest.push(&segment.data()[left..]);
                segment.end = segment.start + left;
                head.push_back(segment);
                tail.push_front(rest);
                left = 0;
            }
        }
        if left > 0 {
            return Err(PoolError::OutOfRange(at, len));
        }
        Ok((Packet { pool: pool.clone(), segments: head },
            Packet { pool: pool, segments: tail }))
    }

    /// Chains `other` after this packet
    pub fn concat(mut self, other: Packet) -> Packet {
        self.push_packet(other);
        self
    }

    pub fn push_packet(&mut self, other: Packet) {
        self.segments.extend(other.segments);
    }

    /// Drops `n` bytes from the front, releasing consumed segments
    pub fn advance(&mut self, mut n: usize) {
        while n > 0 {
            let consumed = match self.segments.front_mut() {
                Some(segment) => {
                    let step = min(segment.len(), n);
                    segment.start += step;
                    n -= step;
                    segment.len() == 0
                }
                None => return,
            };
            if consumed {
                self.segments.pop_front();
            }
        }
        while self.segments.front().map_or(false, |s| s.len() == 0)
            && self.segments.len() > 1
        {
            self.segments.pop_front();
        }
    }

    /// Removes and returns the first byte of the chain
    pub fn pop_front(&mut self) -> Option<u8> {
        loop {
            let result = match self.segments.front_mut() {
                None => return None,
                Some(segment) if segment.len() == 0 => None,
                Some(segment) => {
                    let byte = segment.buf[segment.start];
                    segment.start += 1;
                    Some(byte)
                }
            };
            if self.segments.front().map_or(false, |s| s.len() == 0) {
                self.segments.pop_front();
            }
            if result.is_some() {
                return result;
            }
        }
    }

    /// Detaches the head segment as a packet of its own
    pub fn take_first_segment(&mut self) -> Option<Packet> {
        let pool = self.pool.clone();
        self.segments.pop_front()
            .map(|segment| Packet::from_segment(pool, segment))
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.len())
            .field("segments", &self.segments.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{PacketPool, PoolError, Wait};

    #[test]
    fn append_chains_buffers() {
        let pool = PacketPool::new(8, 4);
        let packet = pool.allocate_with(b"hello world", Wait::NoWait).unwrap();
        assert_eq!(packet.len(), 11);
        assert_eq!(packet.segment_count(), 3);
        assert_eq!(packet.to_vec(), b"hello world");
        assert_eq!(pool.available(), 5);
        drop(packet);
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn exhausted() {
        let pool = PacketPool::new(2, 4);
        let err = pool.allocate_with(b"0123456789", Wait::NoWait).unwrap_err();
        assert_eq!(err, PoolError::Exhausted);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn split_preserves_length() {
        let pool = PacketPool::new(32, 4);
        let data = b"GET / HTTP/1.1\r\n\r\nbody";
        for at in 0..data.len() + 1 {
            let packet = pool.allocate_with(data, Wait::NoWait).unwrap();
            let (head, tail) = packet.split_at(at, Wait::NoWait).unwrap();
            assert_eq!(head.len() + tail.len(), data.len());
            assert_eq!(head.to_vec(), &data[..at]);
            assert_eq!(tail.to_vec(), &data[at..]);
        }
        assert_eq!(pool.available(), 32);
    }

    #[test]
    fn split_on_boundary_does_not_allocate() {
        let pool = PacketPool::new(4, 4);
        let packet = pool.allocate_with(b"abcdefgh", Wait::NoWait).unwrap();
        assert_eq!(pool.available(), 2);
        let (head, tail) = packet.split_at(4, Wait::NoWait).unwrap();
        assert_eq!(pool.available(), 2);
        assert_eq!(head.to_vec(), b"abcd");
        assert_eq!(tail.to_vec(), b"efgh");
    }

    #[test]
    fn split_out_of_range() {
        let pool = PacketPool::new(4, 4);
        let packet = pool.allocate_with(b"abc", Wait::NoWait).unwrap();
        assert_eq!(packet.split_at(4, Wait::NoWait).unwrap_err(),
                   PoolError::OutOfRange(4, 3));
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn advance_and_pop() {
        let pool = PacketPool::new(8, 3);
        let mut packet = pool.allocate_with(b"abcdefg", Wait::NoWait).unwrap();
        packet.advance(4);
        assert_eq!(packet.to_vec(), b"efg");
        assert_eq!(packet.segment_count(), 2);
        assert_eq!(packet.pop_front(), Some(b'e'));
        assert_eq!(packet.pop_front(), Some(b'f'));
        assert_eq!(packet.pop_front(), Some(b'g'));
        assert_eq!(packet.pop_front(), None);
        assert!(packet.is_empty());
        drop(packet);
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn concat_and_byte_at() {
        let pool = PacketPool::new(8, 4);
        let a = pool.allocate_with(b"ab", Wait::NoWait).unwrap();
        let b = pool.allocate_with(b"cdef", Wait::NoWait).unwrap();
        let mut joined = a.concat(b);
        assert_eq!(joined.len(), 6);
        assert_eq!(joined.byte_at(2), Some(b'c'));
        assert_eq!(joined.byte_at(6), None);
        let mut dst = [0u8; 3];
        assert_eq!(joined.copy_to_slice(1, &mut dst), 3);
        assert_eq!(&dst, b"bcd");
        let first = joined.take_first_segment().unwrap();
        assert_eq!(first.to_vec(), b"ab");
        assert_eq!(joined.to_vec(), b"cdef");
    }
}
