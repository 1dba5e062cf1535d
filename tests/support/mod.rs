#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use httparse;
use packet_http::server::{Session, SessionId, TransportError};
use packet_http::{Packet, PacketPool, Wait};


/// A session playing back scripted input
///
/// Every queued fragment is returned by one `receive`. An empty queue
/// reports a timeout, as a client that has nothing more to say.
pub struct MockSession {
    id: SessionId,
    pool: PacketPool,
    inbound: VecDeque<Vec<u8>>,
    pub output: Vec<u8>,
    pub disconnected: bool,
}

impl MockSession {
    pub fn new(id: u64, pool: &PacketPool) -> MockSession {
        MockSession {
            id: SessionId(id),
            pool: pool.clone(),
            inbound: VecDeque::new(),
            output: Vec::new(),
            disconnected: false,
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> &mut MockSession {
        self.inbound.push_back(data.to_vec());
        self
    }

    /// Queues `data` cut into fragments of `size` bytes
    pub fn feed_split(&mut self, data: &[u8], size: usize)
        -> &mut MockSession
    {
        for chunk in data.chunks(size) {
            self.inbound.push_back(chunk.to_vec());
        }
        self
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Session for MockSession {
    fn id(&self) -> SessionId {
        self.id
    }
    fn peer_addr(&self) -> Option<SocketAddr> {
        "192.0.2.7:40000".parse().ok()
    }
    fn receive(&mut self, _timeout: Duration)
        -> Result<Packet, TransportError>
    {
        match self.inbound.pop_front() {
            Some(data) => self.pool.allocate_with(&data, Wait::NoWait)
                .map_err(|e| TransportError::Io(
                    io::Error::new(io::ErrorKind::Other, e))),
            None => Err(TransportError::Timeout),
        }
    }
    fn send(&mut self, packet: Packet, _timeout: Duration)
        -> Result<(), TransportError>
    {
        assert!(!self.disconnected, "send after disconnect");
        packet.copy_to_vec(&mut self.output);
        Ok(())
    }
    fn disconnect(&mut self, _timeout: Duration) {
        self.disconnected = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| &v[..])
    }
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn hex_line(data: &[u8]) -> (usize, usize) {
    let end = data.windows(2).position(|w| w == b"\r\n")
        .expect("chunk size line");
    let text = ::std::str::from_utf8(&data[..end]).unwrap();
    let size = usize::from_str_radix(text.split(';').next().unwrap().trim(),
                                     16).unwrap();
    (size, end + 2)
}

/// Splits one response off `data`, returns it and the bytes it took
///
/// `has_body` is false for answers to HEAD.
pub fn split_response(data: &[u8], has_body: bool) -> (Response, usize) {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut raw = httparse::Response::new(&mut headers);
    let head_len = match raw.parse(data).expect("valid response head") {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => panic!("incomplete response head"),
    };
    let mut response = Response {
        code: raw.code.unwrap(),
        reason: raw.reason.unwrap().to_string(),
        headers: raw.headers.iter()
            .map(|h| (h.name.to_string(),
                      String::from_utf8_lossy(h.value).into_owned()))
            .collect(),
        body: Vec::new(),
    };
    let rest = &data[head_len..];
    if !has_body || response.code < 200 || response.code == 304 {
        return (response, head_len);
    }
    let chunked = response.header("Transfer-Encoding")
        .map_or(false, |v| v.eq_ignore_ascii_case("chunked"));
    if chunked {
        let mut pos = 0;
        loop {
            let (size, line) = hex_line(&rest[pos..]);
            pos += line;
            if size == 0 {
                assert_eq!(&rest[pos..pos+2], b"\r\n");
                pos += 2;
                break;
            }
            response.body.extend_from_slice(&rest[pos..pos+size]);
            pos += size;
            assert_eq!(&rest[pos..pos+2], b"\r\n");
            pos += 2;
        }
        return (response, head_len + pos);
    }
    let length = match response.header("Content-Length") {
        Some(len) => len.parse::<usize>().unwrap(),
        None => rest.len(),
    };
    response.body = rest[..length].to_vec();
    (response, head_len + length)
}

/// Every response in `data`, none of them answering HEAD
pub fn responses(data: &[u8]) -> Vec<Response> {
    let mut result = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (response, len) = split_response(&data[pos..], true);
        result.push(response);
        pos += len;
    }
    result
}

/// Encodes `data` with chunked framing, cut into pieces of `size`
pub fn chunked(data: &[u8], size: usize) -> Vec<u8> {
    let mut result = Vec::new();
    for piece in data.chunks(size) {
        result.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        result.extend_from_slice(piece);
        result.extend_from_slice(b"\r\n");
    }
    result.extend_from_slice(b"0\r\n\r\n");
    result
}
