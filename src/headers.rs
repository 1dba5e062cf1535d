//! Case-insensitive header name and value helpers

#[inline(always)]
pub fn is_transfer_encoding(val: &str) -> bool {
    val.eq_ignore_ascii_case("transfer-encoding")
}

#[inline(always)]
pub fn is_connection(val: &str) -> bool {
    val.eq_ignore_ascii_case("connection")
}

#[inline(always)]
pub fn is_expect(val: &str) -> bool {
    val.eq_ignore_ascii_case("expect")
}

// header value is byte sequence
// we need case insensitive comparison and strip out of the whitespace
fn is_token(val: &[u8], token: &[u8]) -> bool {
    trim(val).eq_ignore_ascii_case(token)
}

/// Strips leading and trailing linear whitespace
pub fn trim(mut val: &[u8]) -> &[u8] {
    while let Some((&ch, rest)) = val.split_first() {
        match ch {
            b'\r' | b'\n' | b' ' | b'\t' => val = rest,
            _ => break,
        }
    }
    while let Some((&ch, rest)) = val.split_last() {
        match ch {
            b'\r' | b'\n' | b' ' | b'\t' => val = rest,
            _ => break,
        }
    }
    val
}

#[inline(always)]
pub fn is_close(val: &[u8]) -> bool {
    is_token(val, b"close")
}

#[inline(always)]
pub fn is_keep_alive(val: &[u8]) -> bool {
    is_token(val, b"keep-alive")
}

#[inline(always)]
pub fn is_chunked(val: &[u8]) -> bool {
    is_token(val, b"chunked")
}

#[inline(always)]
pub fn is_continue(val: &[u8]) -> bool {
    is_token(val, b"100-continue")
}
