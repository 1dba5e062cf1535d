//! HTTP/1.1 server engine working directly on pooled packet chains
//!
//! The engine never copies a request body into a contiguous buffer. Data
//! arrives as `Packet`s borrowed from a fixed `PacketPool` and goes back to
//! the pool as soon as it is consumed, so memory use is bounded by the
//! number of buffers in flight.
//!
//! Start with `server::HttpServer`, a `server::Handler` implementation and
//! a transport (`tcp::TcpTransport` on a hosted OS).

#[macro_use] extern crate log;
#[macro_use] extern crate quick_error;
#[macro_use] extern crate matches;

#[cfg(all(feature="omit-content-length", not(feature="keepalive-disable")))]
compile_error!("feature `omit-content-length` requires `keepalive-disable`, \
                clients could not find the end of a response otherwise");

pub mod server;
pub mod packet;
pub mod scan;
pub mod fs;
pub mod tcp;
pub mod shared;
mod headers;

pub use shared::{BodyKind, Version};
pub use packet::{Packet, PacketPool, PoolError, Wait};
pub use scan::ScanError;
pub use server::{HttpServer, Statistics};
