//! Transport over `std::net` sockets
//!
//! Embedded targets implement `Listener` and `Session` over their own
//! network stack, this one lets the engine run on a hosted OS.
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::packet::{Packet, PacketPool, Wait};
use crate::server::{Listener, Session, SessionId, TransportError};


fn convert(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        => TransportError::Timeout,
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted | io::ErrorKind::UnexpectedEof
        => TransportError::Disconnected,
        _ => TransportError::Io(err),
    }
}

pub struct TcpTransport {
    listener: TcpListener,
    pool: PacketPool,
    next_id: u64,
    closed: bool,
}

pub struct TcpSession {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    id: SessionId,
    pool: PacketPool,
    scratch: Vec<u8>,
}

impl TcpTransport {
    /// Listens on `addr`, received data lands in buffers from `pool`
    pub fn bind<A: ToSocketAddrs>(addr: A, pool: &PacketPool)
        -> io::Result<TcpTransport>
    {
        Ok(TcpTransport {
            listener: TcpListener::bind(addr)?,
            pool: pool.clone(),
            next_id: 0,
            closed: false,
        })
    }
}

impl Listener for TcpTransport {
    type Session = TcpSession;

    fn accept(&mut self) -> Result<TcpSession, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let (stream, peer) = self.listener.accept()?;
        self.next_id += 1;
        debug!("accepted connection {} from {}", self.next_id, peer);
        Ok(TcpSession {
            stream: stream,
            peer: Some(peer),
            id: SessionId(self.next_id),
            pool: self.pool.clone(),
            scratch: vec![0; self.pool.payload_size()],
        })
    }

    fn relisten(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.closed = true;
    }

    fn local_port(&self) -> u16 {
        self.listener.local_addr().map(|addr| addr.port()).unwrap_or(0)
    }
}

impl Session for TcpSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn receive(&mut self, timeout: Duration) -> Result<Packet, TransportError>
    {
        self.stream.set_read_timeout(Some(timeout))?;
        let n = self.stream.read(&mut self.scratch).map_err(convert)?;
        if n == 0 {
            return Err(TransportError::Disconnected);
        }
        self.pool.allocate_with(&self.scratch[..n], Wait::Timeout(timeout))
            .map_err(|e| TransportError::Io(
                io::Error::new(io::ErrorKind::Other, e)))
    }

    fn send(&mut self, packet: Packet, timeout: Duration)
        -> Result<(), TransportError>
    {
        self.stream.set_write_timeout(Some(timeout))?;
        for segment in packet.segments() {
            self.stream.write_all(segment).map_err(convert)?;
        }
        self.stream.flush().map_err(convert)
    }

    fn disconnect(&mut self, _timeout: Duration) {
        self.stream.shutdown(Shutdown::Both)
            .map_err(|e| trace!("shutdown of session {:?}: {}", self.id, e))
            .ok();
    }
}
