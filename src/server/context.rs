use std::time::{Duration, Instant};

use crate::packet::Wait;


/// Server configuration
///
/// Every method has a default, implement the trait to override some of
/// them. All values except `now()` are read once when the server is
/// created.
pub trait Context {
    /// Bounded wait for each receive while parsing a request
    fn receive_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    fn send_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    /// How long to wait for a free buffer when building responses
    fn allocate_wait(&self) -> Wait {
        Wait::Timeout(Duration::from_secs(10))
    }
    /// Age after which an unanswered Digest nonce may be reclaimed
    fn nonce_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    /// Size of the nonce table, two per concurrent session
    fn nonce_slots(&self) -> usize {
        4
    }
    /// Requests whose head is longer than this get `400 Bad Request`
    fn max_header_size(&self) -> usize {
        8192
    }
    /// Longest decoded resource path accepted
    fn max_resource(&self) -> usize {
        256
    }
    /// Longest header field value looked up on behalf of the engine
    fn max_header_field(&self) -> usize {
        256
    }
    /// Longest `Authorization` value considered, Digest values run long
    fn max_authorization(&self) -> usize {
        512
    }
    fn max_name(&self) -> usize {
        20
    }
    fn max_password(&self) -> usize {
        20
    }
    /// Largest piece of file content sent in one packet
    fn mss(&self) -> usize {
        1460
    }
    /// Monotonic clock for nonce expiry
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A context using every default
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContext;

impl Context for DefaultContext {}

/// Configuration values captured at server construction
#[derive(Debug, Clone)]
pub struct Settings {
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub allocate_wait: Wait,
    pub nonce_timeout: Duration,
    pub nonce_slots: usize,
    pub max_header_size: usize,
    pub max_resource: usize,
    pub max_header_field: usize,
    pub max_authorization: usize,
    pub max_name: usize,
    pub max_password: usize,
    pub mss: usize,
}

impl Settings {
    pub fn from_context<C: Context>(ctx: &C) -> Settings {
        Settings {
            receive_timeout: ctx.receive_timeout(),
            send_timeout: ctx.send_timeout(),
            disconnect_timeout: ctx.disconnect_timeout(),
            allocate_wait: ctx.allocate_wait(),
            nonce_timeout: ctx.nonce_timeout(),
            nonce_slots: ctx.nonce_slots(),
            max_header_size: ctx.max_header_size(),
            max_resource: ctx.max_resource(),
            max_header_field: ctx.max_header_field(),
            max_authorization: ctx.max_authorization(),
            max_name: ctx.max_name(),
            max_password: ctx.max_password(),
            mss: ctx.mss(),
        }
    }
}
