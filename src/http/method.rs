use super::ByteStr;

use std::fmt;

/// An HTTP method, normalized to upper case.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Trace,
    Connect,
    Patch,
    Custom(ByteStr),
}

impl Method {
    /// Parse a method as sent by the transport, in any case.
    pub fn parse(method: &str) -> Method {
        let upper = method.to_ascii_uppercase();

        match upper.as_str() {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "POST" => Method::Post,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "HEAD" => Method::Head,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            "PATCH" => Method::Patch,
            _ => Method::Custom(upper.into()),
        }
    }

    /// The string representation of this HTTP method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
            Method::Custom(str) => str.as_str(),
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

impl PartialEq<str> for Method {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Method {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case() {
        assert_eq!(Method::parse("post"), Method::Post);
        assert_eq!(Method::parse("Patch"), "PATCH");
        assert_eq!(Method::parse("propfind"), "PROPFIND");
    }
}
