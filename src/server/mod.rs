//! The HTTP server engine
//!
//! `HttpServer` owns everything one server instance needs: the packet pool,
//! the filesystem, the application's `Handler`, the nonce table and the
//! statistics. Requests are served one at a time per instance.
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::fs::Filesystem;
use crate::packet::PacketPool;

pub mod context;
pub mod error;
pub mod protocol;
pub mod request;
pub mod response;
pub mod body;
pub mod transport;
pub mod auth;
pub mod nonce;
pub mod multipart;
pub mod mime;
mod exchange;
mod parser;

pub use self::context::{Context, DefaultContext};
pub use self::error::{Error, HttpError};
pub use self::exchange::Exchange;
pub use self::mime::MimeMap;
pub use self::protocol::{Authentication, CacheInfo, Credentials};
pub use self::protocol::{DigestRequest, Handler, Notify};
pub use self::request::{Head, Method};
pub use self::response::{ResponseHead, Status};
pub use self::transport::{Listener, Session, SessionId, TransportError};

use self::context::Settings;
use self::nonce::NoncePool;


/// Counters kept by a server instance
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub get_requests: u64,
    pub head_requests: u64,
    pub put_requests: u64,
    pub delete_requests: u64,
    pub post_requests: u64,
    pub unknown_requests: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    /// Requests aborted because the packet pool ran dry
    pub allocation_errors: u64,
    /// Request heads httparse rejected, or too large ones
    pub invalid_http_headers: u64,
}

/// One HTTP server instance
pub struct HttpServer<H, F, C=DefaultContext> {
    pool: PacketPool,
    fs: F,
    handler: H,
    context: C,
    settings: Settings,
    nonces: NoncePool,
    rng: StdRng,
    mime: MimeMap,
    stats: Statistics,
    current_session: Option<SessionId>,
}

impl<H: Handler, F: Filesystem> HttpServer<H, F, DefaultContext> {
    pub fn new(pool: PacketPool, fs: F, handler: H)
        -> HttpServer<H, F, DefaultContext>
    {
        HttpServer::with_context(pool, fs, handler, DefaultContext)
    }
}

impl<H, F, C> HttpServer<H, F, C>
    where H: Handler, F: Filesystem, C: Context,
{
    pub fn with_context(pool: PacketPool, fs: F, handler: H, context: C)
        -> HttpServer<H, F, C>
    {
        let settings = Settings::from_context(&context);
        HttpServer {
            nonces: NoncePool::new(settings.nonce_slots,
                                   settings.nonce_timeout),
            pool: pool,
            fs: fs,
            handler: handler,
            context: context,
            settings: settings,
            rng: StdRng::from_entropy(),
            mime: MimeMap::new(),
            stats: Statistics::default(),
            current_session: None,
        }
    }

    /// Extension to content type pairs consulted before the built-in table
    pub fn set_mime_overrides(&mut self, overrides: Vec<(String, String)>) {
        self.mime.set_overrides(overrides);
    }

    /// Content type served for `resource`
    pub fn mime_type(&self, resource: &str) -> &str {
        self.mime.lookup(resource)
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    /// Accepts and serves sessions until the listener is closed
    pub fn serve<L: Listener>(&mut self, listener: &mut L)
        -> Result<(), TransportError>
    {
        info!("serving HTTP on port {}{}", listener.local_port(),
              if listener.is_secure() { " (secure)" } else { "" });
        loop {
            let mut session = match listener.accept() {
                Ok(session) => session,
                Err(TransportError::Closed) => {
                    info!("listener closed");
                    return Ok(());
                }
                Err(TransportError::Timeout)
                | Err(TransportError::Disconnected) => continue,
                Err(e) => return Err(e),
            };
            self.serve_session(&mut session);
            listener.relisten()?;
        }
    }

    /// Forgets every nonce bound to a session that went away
    pub fn session_closed(&mut self, session: SessionId) {
        if self.current_session == Some(session) {
            self.current_session = None;
        }
        self.nonces.session_closed(session);
    }

    /// Shuts the listener down, dropping nonces of the current session
    pub fn stop<L: Listener>(&mut self, listener: &mut L) {
        listener.shutdown();
        if let Some(session) = self.current_session.take() {
            self.nonces.session_closed(session);
        }
        info!("server on port {} stopped", listener.local_port());
    }
}
