//! Digest nonce table
//!
//! A fixed number of slots, each `Invalid`, `Valid` (issued in a
//! challenge) or `Accepted` (answered correctly, bound to the session that
//! answered). Slots are addressed by index, a `NonceId` never outlives the
//! request it was looked up for.
use std::time::{Duration, Instant};

use rand::Rng;
use rand::distributions::Alphanumeric;

use super::transport::SessionId;


pub const NONCE_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Invalid,
    Valid,
    Accepted(SessionId),
}

#[derive(Debug, Clone)]
struct Slot {
    state: State,
    value: [u8; NONCE_SIZE],
    created: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceId(usize);

#[derive(Debug)]
pub struct NoncePool {
    slots: Vec<Slot>,
    timeout: Duration,
}

impl NoncePool {
    pub fn new(slots: usize, timeout: Duration) -> NoncePool {
        NoncePool {
            slots: vec![Slot {
                state: State::Invalid,
                value: [0; NONCE_SIZE],
                created: None,
            }; slots],
            timeout: timeout,
        }
    }

    fn expired(&self, slot: &Slot, now: Instant) -> bool {
        slot.created.map_or(true,
            |created| now.saturating_duration_since(created) > self.timeout)
    }

    /// Issues a fresh nonce
    ///
    /// Takes an invalid slot first, otherwise the oldest valid slot that
    /// has timed out. Accepted slots are never reclaimed here.
    pub fn allocate<R: Rng>(&mut self, now: Instant, rng: &mut R)
        -> Option<NonceId>
    {
        let index = match self.slots.iter()
            .position(|s| s.state == State::Invalid)
        {
            Some(index) => index,
            None => {
                let (index, _) = self.slots.iter().enumerate()
                    .filter(|&(_, s)| s.state == State::Valid)
                    .filter(|&(_, s)| self.expired(s, now))
                    .min_by_key(|&(_, s)| s.created)?;
                index
            }
        };
        let slot = &mut self.slots[index];
        for dst in slot.value.iter_mut() {
            *dst = rng.sample(Alphanumeric);
        }
        slot.state = State::Valid;
        slot.created = Some(now);
        Some(NonceId(index))
    }

    pub fn value(&self, id: NonceId) -> &[u8] {
        &self.slots[id.0].value
    }

    /// Looks up a nonce presented by `session`
    ///
    /// A valid nonce must not be expired. An accepted one passes only for
    /// the session it is bound to.
    pub fn validate(&self, nonce: &[u8], session: SessionId, now: Instant)
        -> Option<NonceId>
    {
        let index = self.slots.iter().position(|s| {
            s.state != State::Invalid && &s.value[..] == nonce
        })?;
        let slot = &self.slots[index];
        match slot.state {
            State::Valid if !self.expired(slot, now) => Some(NonceId(index)),
            State::Accepted(owner) if owner == session => Some(NonceId(index)),
            State::Accepted(_) => {
                debug!("nonce replayed from another session {:?}", session);
                None
            }
            _ => None,
        }
    }

    /// Binds the nonce to `session`, dropping any other nonce it held
    pub fn accept(&mut self, id: NonceId, session: SessionId) {
        for slot in self.slots.iter_mut() {
            if slot.state == State::Accepted(session) {
                slot.state = State::Invalid;
            }
        }
        self.slots[id.0].state = State::Accepted(session);
    }

    /// Invalidates every nonce bound to a closed session
    pub fn session_closed(&mut self, session: SessionId) {
        for slot in self.slots.iter_mut() {
            if slot.state == State::Accepted(session) {
                slot.state = State::Invalid;
            }
        }
    }

    /// Number of nonces currently bound to `session`
    pub fn accepted_by(&self, session: SessionId) -> usize {
        self.slots.iter()
            .filter(|s| s.state == State::Accepted(session))
            .count()
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::server::SessionId;
    use super::{NoncePool, NONCE_SIZE};

    #[test]
    fn allocate_until_full() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();
        let mut pool = NoncePool::new(2, Duration::from_secs(10));
        let a = pool.allocate(now, &mut rng).unwrap();
        let b = pool.allocate(now, &mut rng).unwrap();
        assert!(a != b);
        assert_eq!(pool.value(a).len(), NONCE_SIZE);
        assert!(pool.value(a).iter().all(|c| c.is_ascii_alphanumeric()));
        assert!(pool.allocate(now, &mut rng).is_none());
        // reclaims the oldest once timed out
        let later = now + Duration::from_secs(11);
        assert!(pool.allocate(later, &mut rng).is_some());
    }

    #[test]
    fn accept_binds_to_session() {
        let mut rng = StdRng::seed_from_u64(2);
        let now = Instant::now();
        let mut pool = NoncePool::new(4, Duration::from_secs(10));
        let id = pool.allocate(now, &mut rng).unwrap();
        let nonce = pool.value(id).to_vec();
        let one = SessionId(1);
        let two = SessionId(2);
        assert_eq!(pool.validate(&nonce, one, now), Some(id));
        pool.accept(id, one);
        assert_eq!(pool.validate(&nonce, one, now), Some(id));
        assert_eq!(pool.validate(&nonce, two, now), None);
        assert_eq!(pool.accepted_by(one), 1);
        pool.session_closed(one);
        assert_eq!(pool.accepted_by(one), 0);
        assert_eq!(pool.validate(&nonce, one, now), None);
    }

    #[test]
    fn expired_nonce_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Instant::now();
        let mut pool = NoncePool::new(1, Duration::from_secs(10));
        let id = pool.allocate(now, &mut rng).unwrap();
        let nonce = pool.value(id).to_vec();
        let later = now + Duration::from_secs(30);
        assert_eq!(pool.validate(&nonce, SessionId(1), later), None);
        assert_eq!(pool.validate(b"unknown", SessionId(1), now), None);
    }
}
