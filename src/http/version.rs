/// HTTP Version.
///
/// Only the HTTP/1.x family is understood on the wire, `HTTP/0.9` exists so a server can be
/// configured to answer without a status line.
///
/// [httpwg](https://httpwg.org/specs/rfc9112.html#http.version)
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Version(Inner);

#[derive(PartialEq, PartialOrd, Copy, Clone, Eq, Ord, Hash)]
enum Inner {
    Http09,
    Http10,
    Http11,
}

impl Version {
    /// `HTTP/0.9`
    pub const HTTP_09: Version = Version(Inner::Http09);

    /// `HTTP/1.0`
    pub const HTTP_10: Version = Version(Inner::Http10);

    /// `HTTP/1.1`
    pub const HTTP_11: Version = Version(Inner::Http11);

    /// Parse the version token of a start line.
    ///
    /// Only `HTTP/1.0` and `HTTP/1.1` are accepted.
    #[inline]
    pub const fn from_bytes(bytes: &[u8]) -> Option<Version> {
        match bytes {
            b"HTTP/1.0" => Some(Version::HTTP_10),
            b"HTTP/1.1" => Some(Version::HTTP_11),
            _ => None,
        }
    }

    /// Returns string representation of HTTP version, e.g: `HTTP/1.1`
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self.0 {
            Inner::Http09 => "HTTP/0.9",
            Inner::Http10 => "HTTP/1.0",
            Inner::Http11 => "HTTP/1.1",
        }
    }

    /// Returns `true` if connections stay open unless told otherwise.
    #[inline]
    pub const fn is_persistent_by_default(&self) -> bool {
        matches!(self.0, Inner::Http11)
    }
}

impl Default for Version {
    #[inline]
    fn default() -> Version {
        Version::HTTP_11
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}
