use std::io;

use httparse;

use crate::packet::PoolError;
use crate::scan::ScanError;
use super::transport::TransportError;


quick_error!{
    /// Error type of request processing
    ///
    /// Note, you should not match the enum values and/or make an exhaustive
    /// match over the enum. More errors will be added at will.
    ///
    /// Use HttpError trait instead
    #[derive(Debug)]
    pub enum Error {
        Pool(err: PoolError) {
            description("buffer allocation failed")
            display("buffer allocation failed: {}", err)
        }
        Scan(err: ScanError) {
            from()
            description("error scanning request head")
            display("error scanning request head: {}", err)
        }
        Transport(err: TransportError) {
            from()
            description("transport error")
            display("transport error: {}", err)
        }
        BadHeaders(err: httparse::Error) {
            from()
            description("error parsing headers")
            display("error parsing headers: {:?}", err)
        }
        HeaderTooLarge {
            description("request head is larger than the configured limit")
        }
        InvalidChunkSize {
            description("error parsing chunk size")
        }
        LengthRequired {
            description("request body needs `Content-Length` or chunked \
                         transfer encoding")
        }
        BoundaryAlreadyFound {
            description("multipart boundary found but not consumed")
        }
        NotMultipart {
            description("request is not multipart or has no boundary")
        }
        Filesystem(err: io::Error) {
            from()
            description("filesystem error")
            display("filesystem error: {}", err)
        }
        Callback(msg: String) {
            description("request callback failed")
            display("request callback failed: {}", msg)
        }
        ResponseStarted {
            description("response header is already sent")
        }
        NonceExhausted {
            description("no digest nonce slot available")
        }
        InvalidChain {
            description("packet chain ended where data was expected")
        }
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Error {
        match err {
            PoolError::OutOfRange(..) => Error::InvalidChain,
            err => Error::Pool(err),
        }
    }
}

/// A trait which represents an error which can be formatted as HTTP error page
pub trait HttpError {
    /// Return HTTP status code and status text
    fn http_status(&self) -> (u16, &'static str);
}

const BAD_REQUEST: (u16, &'static str) = (400, "Bad Request");
const NOT_FOUND: (u16, &'static str) = (404, "Not Found");
const INTERNAL: (u16, &'static str) = (500, "Internal Server Error");

impl HttpError for Error {
    fn http_status(&self) -> (u16, &'static str) {
        use self::Error::*;
        match *self {
            BadHeaders(_) => BAD_REQUEST,
            HeaderTooLarge => BAD_REQUEST,
            InvalidChunkSize => BAD_REQUEST,
            LengthRequired => BAD_REQUEST,
            Scan(ScanError::NotFound) => NOT_FOUND,
            Scan(_) => BAD_REQUEST,
            Filesystem(ref e) if e.kind() == io::ErrorKind::NotFound
            => NOT_FOUND,
            _ => INTERNAL,
        }
    }
}
