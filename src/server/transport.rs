use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::packet::Packet;


/// Identity of an accepted connection
///
/// Nonces accepted over Digest authentication are bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

quick_error! {
    /// Errors reported by the transport
    #[derive(Debug)]
    pub enum TransportError {
        Timeout {
            description("timed out waiting for the peer")
        }
        Disconnected {
            description("peer closed the connection")
        }
        Closed {
            description("listener is shut down")
        }
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
    }
}

/// One accepted TCP (or TLS) connection
pub trait Session {
    fn id(&self) -> SessionId;
    fn peer_addr(&self) -> Option<SocketAddr>;
    /// Waits up to `timeout` for the next packet of data
    fn receive(&mut self, timeout: Duration) -> Result<Packet, TransportError>;
    /// Sends every segment of `packet`, taking ownership of it
    fn send(&mut self, packet: Packet, timeout: Duration)
        -> Result<(), TransportError>;
    fn disconnect(&mut self, timeout: Duration);
}

/// The listening side of the transport
pub trait Listener {
    type Session: Session;
    /// Blocks until the next connection, `Closed` ends the serve loop
    fn accept(&mut self) -> Result<Self::Session, TransportError>;
    /// Makes the listener ready for the next connection
    fn relisten(&mut self) -> Result<(), TransportError>;
    /// Stops accepting, tearing down live secure sessions first
    fn shutdown(&mut self);
    fn local_port(&self) -> u16;
    fn is_secure(&self) -> bool {
        false
    }
}
