use std::fmt::{self, Display};

/// HTTP protocol version of a request or response.
///
/// Only the `HTTP/1.x` family is understood. The request line carries the
/// version the response echoes back.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Version {
    /// HTTP/1.0 protocol version.
    Http10,
    /// HTTP/1.1 protocol version as described in RFC7230 and others.
    Http11,
}

impl Version {
    /// Maps the minor version number reported by `httparse`
    pub fn from_minor(minor: u8) -> Version {
        match minor {
            0 => Version::Http10,
            _ => Version::Http11,
        }
    }

    /// Whether connections stay open unless the client says otherwise
    pub fn keep_alive_default(&self) -> bool {
        *self >= Version::Http11
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Version::*;
        f.write_str(match *self {
            Http10 => "HTTP/1.0",
            Http11 => "HTTP/1.1",
        })
    }
}

#[cfg(test)]
mod test {
    use super::Version;

    #[test]
    fn display() {
        assert_eq!(Version::Http10.to_string(), "HTTP/1.0");
        assert_eq!(Version::Http11.to_string(), "HTTP/1.1");
    }

    #[test]
    fn keep_alive() {
        assert!(!Version::from_minor(0).keep_alive_default());
        assert!(Version::from_minor(1).keep_alive_default());
    }
}
