/// The request methods this server recognizes during parsing. Any other token is a parse
/// failure, not an `Unknown` variant - matching `original_source/Http.h`'s closed `HttpMethod`
/// enum rather than `chopin/src/http.rs`'s catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Matches a method token with no trailing space included.
    pub fn from_bytes(bytes: &[u8]) -> Option<Method> {
        match bytes {
            b"CONNECT" => Some(Method::Connect),
            b"DELETE" => Some(Method::Delete),
            b"GET" => Some(Method::Get),
            b"HEAD" => Some(Method::Head),
            b"OPTIONS" => Some(Method::Options),
            b"POST" => Some(Method::Post),
            b"PUT" => Some(Method::Put),
            b"TRACE" => Some(Method::Trace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
        }
    }
}
