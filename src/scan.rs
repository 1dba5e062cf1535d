//! Byte-level scanning over request heads
//!
//! Everything here is stateless except `HeaderEnd`, which carries the match
//! state of the `CRLFCRLF` search from one buffer to the next.
use crate::packet::Packet;


quick_error! {
    /// Errors of the line and token scanner
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub enum ScanError {
        NotFound {
            description("item not found")
        }
        Truncated {
            description("line ends before the item is complete")
        }
        FieldTooLarge {
            description("value exceeds destination capacity")
        }
        InvalidLength {
            description("incomplete or invalid content length")
        }
        BadResource {
            description("request resource is malformed")
        }
        InvalidHex {
            description("invalid percent escape")
        }
        ImproperlyTerminated {
            description("parameter is improperly terminated")
        }
    }
}

/// Resumable search for the blank line terminating a request head
///
/// Feed consecutive pieces of the stream in order. The reported offset is
/// counted from the first byte ever fed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEnd {
    matched: u8,
    scanned: usize,
}

impl HeaderEnd {
    pub fn new() -> HeaderEnd {
        HeaderEnd::default()
    }

    /// Number of bytes fed so far
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Scans the next piece, returns the offset just past `\r\n\r\n`
    pub fn feed(&mut self, data: &[u8]) -> Option<usize> {
        for (idx, &ch) in data.iter().enumerate() {
            self.matched = match (self.matched, ch) {
                (0, b'\r') | (2, b'\r') => self.matched + 1,
                (1, b'\n') | (3, b'\n') => self.matched + 1,
                // a stray CR may still open the terminator
                (_, b'\r') => 1,
                _ => 0,
            };
            if self.matched == 4 {
                self.matched = 0;
                let end = self.scanned + idx + 1;
                self.scanned = end;
                return Some(end);
            }
        }
        self.scanned += data.len();
        None
    }

    /// Scans every segment of `packet` in chain order
    pub fn feed_packet(&mut self, packet: &Packet) -> Option<usize> {
        for segment in packet.segments() {
            if let Some(end) = self.feed(segment) {
                return Some(end);
            }
        }
        None
    }
}

/// Offset just past the first `\r\n\r\n` in a contiguous buffer
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    HeaderEnd::new().feed(data)
}

pub fn starts_with_ignore_case(data: &[u8], token: &[u8]) -> bool {
    data.len() >= token.len() && data[..token.len()].eq_ignore_ascii_case(token)
}

pub fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// Positions right after the `:` of every field named `name`
fn field_starts<'a>(header: &'a [u8], name: &'a str)
    -> impl Iterator<Item=usize> + 'a
{
    let name = name.as_bytes();
    let line_starts = Some(0).into_iter().chain(
        header.iter().enumerate()
            .filter(|&(_, &ch)| ch == b'\n')
            .map(|(idx, _)| idx + 1));
    line_starts.filter_map(move |start| {
        let line = &header[start..];
        if starts_with_ignore_case(line, name)
            && line.get(name.len()) == Some(&b':')
        {
            Some(start + name.len() + 1)
        } else {
            None
        }
    })
}

/// Looks up a header field by case-insensitive name
///
/// The value has surrounding whitespace stripped. A value that does not
/// end in CR is `Truncated`, one longer than `max` is `FieldTooLarge`.
pub fn field_value<'a>(header: &'a [u8], name: &str, max: usize)
    -> Result<Option<&'a [u8]>, ScanError>
{
    let start = match field_starts(header, name).next() {
        Some(start) => start,
        None => return Ok(None),
    };
    let rest = &header[start..];
    let end = rest.iter().position(|&ch| ch == b'\r')
        .ok_or(ScanError::Truncated)?;
    let value = crate::headers::trim(&rest[..end]);
    if value.len() > max {
        return Err(ScanError::FieldTooLarge);
    }
    Ok(Some(value))
}

/// Parses the `Content-Length` field
///
/// The digit run must follow the colon (after optional spaces) and be
/// terminated by a space or CR.
pub fn content_length(header: &[u8]) -> Result<Option<u64>, ScanError> {
    let start = match field_starts(header, "Content-Length").next() {
        Some(start) => start,
        None => return Ok(None),
    };
    let mut rest = header[start..].iter();
    let mut value: Option<u64> = None;
    loop {
        match rest.next() {
            Some(&b' ') if value.is_none() => continue,
            Some(&ch @ b'0'..=b'9') => {
                let digit = (ch - b'0') as u64;
                value = Some(value.unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or(ScanError::InvalidLength)?);
            }
            Some(&b' ') | Some(&b'\r') => {
                return value.map(Some).ok_or(ScanError::InvalidLength);
            }
            _ => return Err(ScanError::InvalidLength),
        }
    }
}

/// The raw resource token of a request line (between the first two spaces)
fn resource_token(request_line: &[u8]) -> Result<&[u8], ScanError> {
    let line_end = request_line.iter()
        .position(|&ch| ch == b'\r' || ch == b'\n')
        .unwrap_or(request_line.len());
    let line = &request_line[..line_end];
    let method_end = line.iter().position(|&ch| ch == b' ')
        .ok_or(ScanError::Truncated)?;
    let mut start = method_end;
    while line.get(start) == Some(&b' ') {
        start += 1;
    }
    let len = line[start..].iter().position(|&ch| ch == b' ')
        .ok_or(ScanError::Truncated)?;
    Ok(&line[start..start + len])
}

/// Strips `http://host[:port]` or `https://...` if present
fn strip_authority(token: &[u8]) -> Result<&[u8], ScanError> {
    let after_scheme = if starts_with_ignore_case(token, b"http://") {
        &token[b"http://".len()..]
    } else if starts_with_ignore_case(token, b"https://") {
        &token[b"https://".len()..]
    } else {
        return Ok(token);
    };
    match after_scheme.iter().position(|&ch| ch == b'/') {
        Some(slash) => Ok(&after_scheme[slash..]),
        None => Err(ScanError::BadResource),
    }
}

/// Extracts and percent-decodes the resource path of a request line
///
/// Decoding stops at space, `;` or `?`. The decoded path must start with
/// `/` and fit in `max` bytes.
pub fn resource(request_line: &[u8], max: usize)
    -> Result<String, ScanError>
{
    let token = strip_authority(resource_token(request_line)?)?;
    if token.first() != Some(&b'/') {
        return Err(ScanError::BadResource);
    }
    let mut path = Vec::with_capacity(token.len());
    let mut iter = token.iter();
    while let Some(&ch) = iter.next() {
        match ch {
            b';' | b'?' => break,
            b'%' => {
                let hi = iter.next().and_then(|&c| hex_value(c));
                let lo = iter.next().and_then(|&c| hex_value(c));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => path.push(hi << 4 | lo),
                    _ => return Err(ScanError::InvalidHex),
                }
            }
            _ => path.push(ch),
        }
        if path.len() > max {
            return Err(ScanError::FieldTooLarge);
        }
    }
    String::from_utf8(path).map_err(|_| ScanError::BadResource)
}

fn item_value(item: &[u8]) -> &[u8] {
    match item.iter().position(|&ch| ch == b'=') {
        Some(eq) => &item[eq + 1..],
        None => item,
    }
}

/// Value of the `index`-th `?`/`&`-delimited query item
pub fn query_value(request_line: &[u8], index: usize)
    -> Result<&[u8], ScanError>
{
    let token = resource_token(request_line)?;
    let start = token.iter().position(|&ch| ch == b'?')
        .ok_or(ScanError::NotFound)?;
    let query = &token[start + 1..];
    let end = query.iter().position(|&ch| ch == b';')
        .unwrap_or(query.len());
    query[..end].split(|&ch| ch == b'&')
        .nth(index)
        .map(item_value)
        .ok_or(ScanError::NotFound)
}

/// Value of the `index`-th `;`-delimited parameter
///
/// A parameter without `=` is returned whole.
pub fn param_value(request_line: &[u8], index: usize)
    -> Result<&[u8], ScanError>
{
    let token = resource_token(request_line)?;
    let mut items = token.split(|&ch| ch == b';').skip(1);
    let item = items.nth(index).ok_or(ScanError::NotFound)?;
    let end = item.iter().position(|&ch| ch == b'?')
        .unwrap_or(item.len());
    Ok(item_value(&item[..end]))
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    use crate::packet::{PacketPool, Wait};
    use super::{HeaderEnd, ScanError, find_header_end};
    use super::{field_value, content_length, resource, query_value};
    use super::param_value;

    #[test]
    fn header_end_contiguous() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nxx"), Some(18));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r"), None);
        assert_eq!(find_header_end(b"a\r\n\r\r\n\r\n"), Some(8));
        assert_eq!(find_header_end(b"a\r\na\r\n"), None);
    }

    #[test]
    fn header_end_split_across_segments() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = PacketPool::new(64, 512);
        for padding in 0..40 {
            let mut data = b"GET / HTTP/1.1\r\nHost: x".to_vec();
            data.extend((0..padding).map(|_| b'a'));
            data.extend_from_slice(b"\r\n\r\nbody");
            let expected = find_header_end(&data);
            assert_eq!(expected, Some(data.len() - 4));
            for nodes in 1..6 {
                let mut cuts = (0..nodes - 1)
                    .map(|_| rng.gen_range(0..data.len() + 1))
                    .collect::<Vec<_>>();
                cuts.push(0);
                cuts.push(data.len());
                cuts.sort();
                let mut packet = pool.allocate(Wait::NoWait).unwrap();
                let mut scanner = HeaderEnd::new();
                let mut found = None;
                for pair in cuts.windows(2) {
                    let piece = pool
                        .allocate_with(&data[pair[0]..pair[1]], Wait::NoWait)
                        .unwrap();
                    if found.is_none() {
                        found = scanner.feed_packet(&piece);
                    }
                    packet.push_packet(piece);
                }
                assert_eq!(found, expected);
                assert_eq!(packet.len(), data.len());
            }
        }
    }

    #[test]
    fn header_end_at_every_cut() {
        let data = b"POST /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
        let expected = find_header_end(data);
        for cut in 0..data.len() + 1 {
            let mut scanner = HeaderEnd::new();
            let found = scanner.feed(&data[..cut])
                .or_else(|| scanner.feed(&data[cut..]));
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn field_lookup() {
        let head = b"GET / HTTP/1.1\r\nHOST:   example.com  \r\n\
                     Accept: */*\r\n\r\n";
        assert_eq!(field_value(head, "host", 256).unwrap(),
                   Some(&b"example.com"[..]));
        assert_eq!(field_value(head, "Accept", 256).unwrap(),
                   Some(&b"*/*"[..]));
        assert_eq!(field_value(head, "Cookie", 256).unwrap(), None);
        assert_eq!(field_value(head, "host", 4).unwrap_err(),
                   ScanError::FieldTooLarge);
        assert_eq!(field_value(b"GET / HTTP/1.1\r\nHost: abc", "host", 256)
                   .unwrap_err(), ScanError::Truncated);
    }

    #[test]
    fn content_length_values() {
        let ok = b"PUT / HTTP/1.1\r\ncontent-length: 1234\r\n\r\n";
        assert_eq!(content_length(ok).unwrap(), Some(1234));
        let none = b"PUT / HTTP/1.1\r\n\r\n";
        assert_eq!(content_length(none).unwrap(), None);
        for bad in &[&b"PUT / HTTP/1.1\r\nContent-Length: \r\n\r\n"[..],
                     &b"PUT / HTTP/1.1\r\nContent-Length: 12x\r\n\r\n"[..],
                     &b"PUT / HTTP/1.1\r\nContent-Length: 12"[..],
                     &b"PUT / HTTP/1.1\r\nContent-Length: \
                        99999999999999999999999\r\n\r\n"[..]]
        {
            assert_eq!(content_length(bad).unwrap_err(),
                       ScanError::InvalidLength);
        }
    }

    #[test]
    fn resource_query_param() {
        let line = b"GET /a%20b?x=1;p=2 HTTP/1.1\r\n";
        assert_eq!(resource(line, 256).unwrap(), "/a b");
        assert_eq!(query_value(line, 0).unwrap(), b"1");
        assert_eq!(param_value(line, 0).unwrap(), b"2");
        assert_eq!(query_value(line, 1).unwrap_err(), ScanError::NotFound);
        assert_eq!(param_value(line, 1).unwrap_err(), ScanError::NotFound);
    }

    #[test]
    fn query_items() {
        let line = b"GET /s?a=1&b=two&flag HTTP/1.1\r\n";
        assert_eq!(query_value(line, 1).unwrap(), b"two");
        assert_eq!(query_value(line, 2).unwrap(), b"flag");
        let line = b"GET /s;mode;k=v?q=1 HTTP/1.1\r\n";
        assert_eq!(param_value(line, 0).unwrap(), b"mode");
        assert_eq!(param_value(line, 1).unwrap(), b"v");
        assert_eq!(query_value(line, 0).unwrap(), b"1");
    }

    #[test]
    fn resource_errors() {
        assert_eq!(resource(b"GET http://host:80/x%41 HTTP/1.1\r\n", 256)
                   .unwrap(), "/xA");
        assert_eq!(resource(b"GET index.html HTTP/1.1\r\n", 256)
                   .unwrap_err(), ScanError::BadResource);
        assert_eq!(resource(b"GET /%4 HTTP/1.1\r\n", 256).unwrap_err(),
                   ScanError::InvalidHex);
        assert_eq!(resource(b"GET /%zz HTTP/1.1\r\n", 256).unwrap_err(),
                   ScanError::InvalidHex);
        assert_eq!(resource(b"GET /index.html\r\n", 256).unwrap_err(),
                   ScanError::Truncated);
        assert_eq!(resource(b"GET /abcdef HTTP/1.1\r\n", 4).unwrap_err(),
                   ScanError::FieldTooLarge);
    }
}
