//! Basic and Digest authorization checks
//!
//! Credential comparisons always run over the full length of both values,
//! so the work done does not depend on where a mismatch is.
use std::cmp::max;
use std::str::from_utf8;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::scan::starts_with_ignore_case;
use super::context::Settings;
use super::nonce::NoncePool;
use super::protocol::{Credentials, DigestRequest, Handler};
use super::request::{Head, Method};
use super::transport::SessionId;


/// Result of a full-length comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub equal: bool,
    /// Number of byte pairs examined
    pub compared: usize,
}

/// Compares two byte strings without stopping at the first mismatch
pub fn compare_full(a: &[u8], b: &[u8]) -> Comparison {
    let len = max(a.len(), b.len());
    let mut diff = (a.len() != b.len()) as u8;
    let mut compared = 0;
    for idx in 0..len {
        let x = a.get(idx).cloned().unwrap_or(0);
        let y = b.get(idx).cloned().unwrap_or(0);
        diff |= x ^ y;
        compared += 1;
    }
    Comparison { equal: diff == 0, compared: compared }
}

fn credentials_fit(creds: &Credentials, settings: &Settings) -> bool {
    if creds.name.len() > settings.max_name
        || creds.password.len() > settings.max_password
    {
        warn!("credentials for realm {:?} exceed configured limits",
              creds.realm);
        return false;
    }
    true
}

/// Outcome of a Basic check, with the comparison work for instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicCheck {
    pub authorized: bool,
    pub compared: usize,
}

/// Checks an `Authorization: Basic ...` value against `creds`
pub fn check_basic(authorization: &[u8], creds: &Credentials,
    settings: &Settings)
    -> BasicCheck
{
    let denied = BasicCheck { authorized: false, compared: 0 };
    if !credentials_fit(creds, settings)
        || !starts_with_ignore_case(authorization, b"Basic ")
    {
        return denied;
    }
    let token = crate::headers::trim(&authorization[b"Basic ".len()..]);
    // base64 of "name:password" at the configured limits
    let decoded_max = settings.max_name + settings.max_password + 1;
    if token.len() > (decoded_max + 2) / 3 * 4 {
        return denied;
    }
    let decoded = match STANDARD.decode(token) {
        Ok(decoded) => decoded,
        Err(_) => return denied,
    };
    let colon = match decoded.iter().position(|&ch| ch == b':') {
        Some(colon) => colon,
        None => return denied,
    };
    let name = compare_full(&decoded[..colon], creds.name.as_bytes());
    let password = compare_full(&decoded[colon + 1..],
                                creds.password.as_bytes());
    BasicCheck {
        authorized: name.equal & password.equal,
        compared: name.compared + password.compared,
    }
}

/// Parameters of an `Authorization: Digest ...` value
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DigestParams<'a> {
    pub username: &'a str,
    pub realm: Option<&'a str>,
    pub nonce: &'a str,
    pub uri: &'a str,
    pub response: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
    pub qop: Option<&'a str>,
}

/// Splits `key=value, key="value", ...`
fn digest_items(mut rest: &str) -> Option<Vec<(&str, &str)>> {
    let mut items = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c| c == ' ' || c == ',');
        if rest.is_empty() {
            return Some(items);
        }
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        rest = rest[eq + 1..].trim_start();
        let value = if rest.starts_with('"') {
            let end = rest[1..].find('"')? + 1;
            let value = &rest[1..end];
            rest = &rest[end + 1..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim();
            rest = &rest[end..];
            value
        };
        items.push((key, value));
    }
}

/// Parses a Digest authorization, `None` if it is not one or incomplete
pub fn parse_digest(authorization: &[u8]) -> Option<DigestParams> {
    if !starts_with_ignore_case(authorization, b"Digest ") {
        return None;
    }
    let text = from_utf8(&authorization[b"Digest ".len()..]).ok()?;
    let mut params = DigestParams::default();
    let (mut username, mut nonce, mut uri, mut response) =
        (false, false, false, false);
    for (key, value) in digest_items(text)? {
        match key {
            "username" => { params.username = value; username = true; }
            "realm" => params.realm = Some(value),
            "nonce" => { params.nonce = value; nonce = true; }
            "uri" => { params.uri = value; uri = true; }
            "response" => { params.response = value; response = true; }
            "nc" => params.nc = value,
            "cnonce" => params.cnonce = value,
            "qop" => params.qop = Some(value),
            _ => {}
        }
    }
    if username && nonce && uri && response {
        Some(params)
    } else {
        None
    }
}

fn md5_hex(parts: &[&[u8]]) -> String {
    let mut ctx = md5::Context::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            ctx.consume(b":");
        }
        ctx.consume(part);
    }
    format!("{:x}", ctx.compute())
}

/// The expected `response` of a Digest authorization with `qop=auth`
pub fn digest_response(name: &str, realm: &str, password: &str,
    method: &str, uri: &str, nonce: &str, nc: &str, cnonce: &str)
    -> String
{
    let ha1 = md5_hex(&[name.as_bytes(), realm.as_bytes(),
                        password.as_bytes()]);
    let ha2 = md5_hex(&[method.as_bytes(), uri.as_bytes()]);
    md5_hex(&[ha1.as_bytes(), nonce.as_bytes(), nc.as_bytes(),
              cnonce.as_bytes(), b"auth", ha2.as_bytes()])
}

/// Checks a Digest authorization, binding the nonce to `session` on success
pub fn check_digest<H>(authorization: &[u8], creds: &Credentials,
    method: Method, session: SessionId, now: Instant,
    nonces: &mut NoncePool, settings: &Settings, handler: &mut H)
    -> bool
    where H: Handler + ?Sized
{
    if !credentials_fit(creds, settings) {
        return false;
    }
    let params = match parse_digest(authorization) {
        Some(params) => params,
        None => return false,
    };
    if params.qop.map_or(false, |qop| qop != "auth")
        || params.realm.map_or(false, |realm| realm != creds.realm)
    {
        return false;
    }
    let id = match nonces.validate(params.nonce.as_bytes(), session, now) {
        Some(id) => id,
        None => return false,
    };
    let expected = digest_response(&creds.name, &creds.realm,
        &creds.password, method.as_str(), params.uri, params.nonce,
        params.nc, params.cnonce);
    let response = params.response.to_ascii_lowercase();
    let user = compare_full(params.username.as_bytes(),
                            creds.name.as_bytes());
    let digest = compare_full(response.as_bytes(), expected.as_bytes());
    if !(user.equal & digest.equal) {
        return false;
    }
    let request = DigestRequest {
        name: params.username,
        realm: &creds.realm,
        method: method,
        uri: params.uri,
        nonce: params.nonce,
        nc: params.nc,
        cnonce: params.cnonce,
    };
    if !handler.digest_authenticate(&request) {
        return false;
    }
    nonces.accept(id, session);
    true
}

pub fn basic_challenge(realm: &str) -> String {
    format!("WWW-Authenticate: Basic realm=\"{}\"\r\n", realm)
}

pub fn digest_challenge(realm: &str, nonce: &[u8]) -> String {
    format!("WWW-Authenticate: Digest realm=\"{}\", algorithm=\"md5\", \
             nonce=\"{}\", qop=\"auth\"\r\n",
             realm, String::from_utf8_lossy(nonce))
}

/// The raw `Authorization` value of a request, if any fits
pub fn authorization<'a>(head: &'a Head, settings: &Settings)
    -> Option<&'a [u8]>
{
    match head.field("Authorization", settings.max_authorization) {
        Ok(value) => value,
        Err(e) => {
            debug!("unusable Authorization field: {}", e);
            None
        }
    }
}
