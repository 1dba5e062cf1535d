use std::net::SocketAddr;
use std::time::SystemTime;

use super::error::Error;
use super::exchange::Exchange;
use super::request::Method;


/// Credentials the application expects for a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub realm: String,
    pub name: String,
    pub password: String,
}

impl Credentials {
    pub fn new<R, N, P>(realm: R, name: N, password: P) -> Credentials
        where R: Into<String>, N: Into<String>, P: Into<String>,
    {
        Credentials {
            realm: realm.into(),
            name: name.into(),
            password: password.into(),
        }
    }
}

/// Result of the authentication check for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    None,
    Basic(Credentials),
    Digest(Credentials),
}

/// What the server does after `request_notify` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// Go on with default processing of the method
    Continue,
    /// The handler produced the response itself
    ///
    /// The server sends nothing more, except a generic `200 OK` for PUT
    /// and DELETE when the handler sent nothing at all.
    Completed,
}

/// Caching facts about a resource, emitted on GET responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    /// `Cache-Control: max-age` in seconds
    pub max_age: u32,
    pub last_modified: Option<SystemTime>,
}

/// A Digest authorization that matched the expected response
#[derive(Debug)]
pub struct DigestRequest<'a> {
    pub name: &'a str,
    pub realm: &'a str,
    pub method: Method,
    pub uri: &'a str,
    pub nonce: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
}

/// A handler of server-side HTTP
///
/// Every method has a default, so a handler only implements the extension
/// points it needs. The handler is owned by the server and called from the
/// request path only.
pub trait Handler {
    /// Decides which authentication, if any, guards a resource
    fn authentication_check(&mut self, _method: Method, _resource: &str)
        -> Authentication
    {
        Authentication::None
    }

    /// Called once per request after authentication passed
    ///
    /// The handler may read the body and send a response through the
    /// exchange. An error makes the server answer `500` if nothing was
    /// sent yet and close the connection.
    fn request_notify(&mut self, _exchange: &mut Exchange<'_>)
        -> Result<Notify, Error>
    {
        Ok(Notify::Continue)
    }

    /// Reports a request that carried wrong credentials
    fn invalid_credentials(&mut self, _resource: &str,
        _peer: Option<SocketAddr>, _method: Method)
    {
    }

    /// Final say on a Digest authorization whose response matched
    fn digest_authenticate(&mut self, _request: &DigestRequest) -> bool {
        true
    }

    fn cache_info(&mut self, _resource: &str) -> Option<CacheInfo> {
        None
    }

    /// Wall clock for `Date` headers, none means no `Date` is sent
    fn gmt_now(&mut self) -> Option<SystemTime> {
        None
    }
}
