use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{Packet, PoolError, Segment};


/// How long an allocation may block when every buffer is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Fail with `PoolError::Exhausted` right away
    NoWait,
    /// Block up to the duration for another owner to release a buffer
    Timeout(Duration),
    /// Block until a buffer is released
    ///
    /// Only meaningful when buffers are released by another thread. On a
    /// single execution context this never returns once the pool is empty.
    Forever,
}

/// A fixed-capacity pool of equally sized network buffers
///
/// All buffers are allocated when the pool is created. A buffer goes back to
/// the pool when the segment owning it is dropped, so there is no explicit
/// release call and no error path can leak a slot.
#[derive(Clone)]
pub struct PacketPool(Arc<Inner>);

struct Inner {
    payload_size: usize,
    capacity: usize,
    free: Mutex<Vec<Vec<u8>>>,
    released: Condvar,
}

impl PacketPool {
    /// Creates a pool of `capacity` buffers, `payload_size` bytes each
    ///
    /// # Panics
    ///
    /// When `payload_size` is zero
    pub fn new(capacity: usize, payload_size: usize) -> PacketPool {
        assert!(payload_size > 0, "packet payload size must be positive");
        let free = (0..capacity).map(|_| vec![0u8; payload_size]).collect();
        PacketPool(Arc::new(Inner {
            payload_size: payload_size,
            capacity: capacity,
            free: Mutex::new(free),
            released: Condvar::new(),
        }))
    }

    /// Takes one empty single-segment packet out of the pool
    pub fn allocate(&self, wait: Wait) -> Result<Packet, PoolError> {
        let segment = self.segment(wait)?;
        Ok(Packet::from_segment(self.clone(), segment))
    }

    /// Allocates a packet holding a copy of `data`, chaining as many
    /// buffers as needed
    pub fn allocate_with(&self, data: &[u8], wait: Wait)
        -> Result<Packet, PoolError>
    {
        let mut packet = self.allocate(wait)?;
        packet.append(data, wait)?;
        Ok(packet)
    }

    /// Number of buffers currently in the pool
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Number of buffers the pool was created with
    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    /// Size of a single buffer
    pub fn payload_size(&self) -> usize {
        self.0.payload_size
    }

    pub(crate) fn segment(&self, wait: Wait) -> Result<Segment, PoolError> {
        match self.take(wait) {
            Some(buf) => Ok(Segment::new(buf, self.clone())),
            None => {
                trace!("packet pool exhausted ({} buffers)", self.0.capacity);
                Err(PoolError::Exhausted)
            }
        }
    }

    pub(crate) fn release(&self, buf: Vec<u8>) {
        self.lock().push(buf);
        self.0.released.notify_one();
    }

    fn take(&self, wait: Wait) -> Option<Vec<u8>> {
        let mut free = self.lock();
        match wait {
            Wait::NoWait => free.pop(),
            Wait::Forever => loop {
                if let Some(buf) = free.pop() {
                    return Some(buf);
                }
                free = self.0.released.wait(free)
                    .unwrap_or_else(PoisonError::into_inner);
            },
            Wait::Timeout(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(buf) = free.pop() {
                        return Some(buf);
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (guard, _) = self.0.released
                        .wait_timeout(free, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    free = guard;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<Vec<Vec<u8>>> {
        self.0.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PacketPool")
            .field("capacity", &self.0.capacity)
            .field("payload_size", &self.0.payload_size)
            .field("available", &self.available())
            .finish()
    }
}
