use super::method::Method;

/// A parsed HTTP/1.1 request. Field storage is a list of pairs rather than a map so duplicate
/// header names can lose per the spec's first-wins rule without losing relative order of the
/// fields that do survive (see `SPEC_FULL.md` §9).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub fields: Vec<(String, String)>,
    pub content: Vec<u8>,
}

impl HttpRequest {
    /// Parses a request out of `buf`. Succeeds only if `buf` contains a `CRLF CRLF`
    /// end-of-headers marker and the request line and every header line are well-formed.
    /// Mirrors `original_source/Http.cpp::HttpRequest::Parse`, rewritten as a straight-line
    /// byte scanner instead of `strstr` + `std::regex`.
    pub fn parse(buf: &[u8]) -> Option<HttpRequest> {
        let header_end = find_subslice(buf, b"\r\n\r\n")?;
        let header = std::str::from_utf8(&buf[..header_end]).ok()?;

        let mut lines = header.split("\r\n");
        let request_line = lines.next()?;
        let (method, uri, version) = parse_request_line(request_line)?;

        let mut fields = Vec::new();
        for line in lines {
            let (name, value) = parse_header_field(line)?;
            if !fields.iter().any(|(n, _): &(String, String)| n == &name) {
                fields.push((name, value));
            }
        }

        let content = buf[header_end + 4..].to_vec();

        Some(HttpRequest {
            method,
            uri: uri.to_string(),
            version: version.to_string(),
            fields,
            content,
        })
    }

    /// Case-insensitive header lookup, for the handful of headers the handler cares about
    /// (`Connection`, `Range`, `Content-Length`).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.content.len());
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.uri.as_bytes());
        out.extend_from_slice(b" HTTP/");
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.fields {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.content);
        out
    }
}

/// `METHOD SP URI SP "HTTP/" VERSION`. The URI is taken greedily up to the last
/// `" HTTP/"` marker in the line, matching the original's greedy `(.+) HTTP/(.+)` regex.
fn parse_request_line(line: &str) -> Option<(Method, &str, &str)> {
    let space1 = line.find(' ')?;
    let method = Method::from_bytes(line[..space1].as_bytes())?;

    let rest = &line[space1 + 1..];
    let marker = rest.rfind(" HTTP/")?;
    let uri = &rest[..marker];
    let version = &rest[marker + " HTTP/".len()..];

    if uri.is_empty() || version.is_empty() {
        return None;
    }

    Some((method, uri, version))
}

/// `NAME ":" VALUE`, whitespace-trimmed on both sides. Empty name or value fails the parse.
fn parse_header_field(line: &str) -> Option<(String, String)> {
    let colon = line.find(':')?;
    let name = line[..colon].trim();
    let value = line[colon + 1..].trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_request() {
        let req = b"GET /some/path?foo=bar HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\nBodyContent";
        let parsed = HttpRequest::parse(req).unwrap();
        assert_eq!(parsed.method, Method::Get);
        assert_eq!(parsed.uri, "/some/path?foo=bar");
        assert_eq!(parsed.version, "1.1");
        assert_eq!(parsed.header("host"), Some("localhost"));
        assert_eq!(parsed.header("Connection"), Some("close"));
        assert_eq!(parsed.content, b"BodyContent");
    }

    #[test]
    fn fails_without_terminating_crlfcrlf() {
        assert!(HttpRequest::parse(b"GET / HTTP/1.1\r\nHost: x\r\n").is_none());
    }

    #[test]
    fn fails_on_unrecognized_method() {
        assert!(HttpRequest::parse(b"GOT / HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn fails_on_empty_header_value() {
        assert!(HttpRequest::parse(b"GET / HTTP/1.1\r\nX-Empty:\r\n\r\n").is_none());
    }

    #[test]
    fn first_duplicate_header_wins() {
        let req = b"GET / HTTP/1.1\r\nX-Id: first\r\nX-Id: second\r\n\r\n";
        let parsed = HttpRequest::parse(req).unwrap();
        assert_eq!(parsed.header("X-Id"), Some("first"));
    }

    #[test]
    fn parse_serialize_round_trips() {
        let req = HttpRequest {
            method: Method::Get,
            uri: "/index.html".to_string(),
            version: "1.1".to_string(),
            fields: vec![("Host".to_string(), "example.com".to_string())],
            content: Vec::new(),
        };
        let bytes = req.serialize();
        let parsed = HttpRequest::parse(&bytes).unwrap();
        assert_eq!(parsed.method, req.method);
        assert_eq!(parsed.uri, req.uri);
        assert_eq!(parsed.version, req.version);
        assert_eq!(parsed.fields, req.fields);
        assert_eq!(parsed.content, req.content);
    }
}
