use bytes::Bytes;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A UTF-8 encoded string stored as [`Bytes`].
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteStr(Bytes);

impl ByteStr {
    pub fn new(str: impl Into<ByteStr>) -> ByteStr {
        str.into()
    }

    pub fn from_static(str: &'static str) -> ByteStr {
        ByteStr(Bytes::from_static(str.as_bytes()))
    }

    /// Decode raw transport bytes, replacing invalid sequences
    /// with `U+FFFD`.
    ///
    /// Valid input is not copied.
    pub fn from_utf8_lossy(bytes: Bytes) -> ByteStr {
        match std::str::from_utf8(&bytes) {
            Ok(_) => ByteStr(bytes),
            Err(_) => ByteStr::from(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        self
    }
}

impl std::ops::Deref for ByteStr {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        // SAFETY: every constructor checks or guarantees UTF-8
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }
}

// Must agree with `str` for `Borrow<str>` lookups.
impl Hash for ByteStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl fmt::Debug for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for ByteStr {
    fn as_ref(&self) -> &str {
        self
    }
}

impl Borrow<str> for ByteStr {
    fn borrow(&self) -> &str {
        self
    }
}

impl PartialEq<str> for ByteStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ByteStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<ByteStr> for str {
    fn eq(&self, other: &ByteStr) -> bool {
        self == other.as_str()
    }
}

impl From<String> for ByteStr {
    fn from(string: String) -> Self {
        ByteStr(string.into())
    }
}

impl From<&str> for ByteStr {
    fn from(str: &str) -> Self {
        ByteStr(Bytes::copy_from_slice(str.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lossy_keeps_valid_input() {
        let s = ByteStr::from_utf8_lossy(Bytes::from_static(b"text/html"));
        assert_eq!(s, "text/html");
    }

    #[test]
    fn lossy_replaces_invalid_input() {
        let s = ByteStr::from_utf8_lossy(Bytes::from_static(b"a\xffb"));
        assert_eq!(s.as_str(), "a\u{fffd}b");
    }
}
