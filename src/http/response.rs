use super::status::Status;

/// A response value, built by the handler and serialized straight into a session's buffer.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub version: String,
    pub status: Status,
    pub reason: String,
    pub fields: Vec<(String, String)>,
    pub content: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: Status) -> Self {
        HttpResponse {
            version: "1.1".to_string(),
            reason: status.reason().to_string(),
            status,
            fields: Vec::new(),
            content: Vec::new(),
        }
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        if let Some(existing) = self.fields.iter_mut().find(|(n, _)| n == name) {
            existing.1 = value.into();
        } else {
            self.fields.push((name.to_string(), value.into()));
        }
    }

    /// Builds the small HTML error page used for 400/404/405/416 responses, matching
    /// `original_source/Http.cpp::HttpResponse::Create`.
    pub fn error_page(status: Status, keep_alive: bool) -> Self {
        let code = status.code();
        let reason = status.reason();
        let page = format!(
            "<html><h1 style=\"text-align: center\">{}: {}</h1></html>",
            code, reason
        );

        let mut resp = HttpResponse::new(status);
        resp.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });
        resp.set_header("Content-Encoding", "identity");
        resp.set_header("Content-Type", "text/html; charset=utf-8");
        resp.set_header("Content-Length", page.len().to_string());
        resp.content = page.into_bytes();
        resp
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(96 + self.content.len());
        out.extend_from_slice(b"HTTP/");
        out.extend_from_slice(self.version.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.code().to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.reason.as_bytes());
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

    /// Symmetric with `serialize`; parses a full response out of a byte buffer. Not used on the
    /// server's hot path (the server only ever serializes responses) but kept for the codec's
    /// round-trip testable property and for any embedder writing a test client against it.
    pub fn parse(buf: &[u8]) -> Option<HttpResponse> {
        let header_end = buf
            .windows(4)
            .position(|w| w == b"\r\n\r\n")?;
        let header = std::str::from_utf8(&buf[..header_end]).ok()?;
        let mut lines = header.split("\r\n");
        let status_line = lines.next()?;
        let (version, status, reason) = parse_status_line(status_line)?;

        let mut fields = Vec::new();
        for line in lines {
            let colon = line.find(':')?;
            let name = line[..colon].trim();
            let value = line[colon + 1..].trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            if !fields.iter().any(|(n, _): &(String, String)| n == name) {
                fields.push((name.to_string(), value.to_string()));
            }
        }

        Some(HttpResponse {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            fields,
            content: buf[header_end + 4..].to_vec(),
        })
    }
}

/// `"HTTP/" VERSION SP STATUS SP REASON`.
fn parse_status_line(line: &str) -> Option<(&str, Status, &str)> {
    let rest = line.strip_prefix("HTTP/")?;
    let space1 = rest.find(' ')?;
    let version = &rest[..space1];
    let rest = &rest[space1 + 1..];
    let space2 = rest.find(' ')?;
    let code: u16 = rest[..space2].parse().ok()?;
    let status = Status::from_code(code)?;
    let reason = &rest[space2 + 1..];
    Some((version, status, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_error_page_body() {
        let resp = HttpResponse::error_page(Status::NotFound, true);
        assert_eq!(
            String::from_utf8(resp.content.clone()).unwrap(),
            "<html><h1 style=\"text-align: center\">404: Not Found</h1></html>"
        );
        assert!(resp.fields.contains(&("Connection".to_string(), "keep-alive".to_string())));
    }

    #[test]
    fn serialize_parse_round_trips() {
        let mut resp = HttpResponse::new(Status::Ok);
        resp.set_header("Content-Length", "5");
        resp.content = b"hello".to_vec();

        let bytes = resp.serialize();
        let parsed = HttpResponse::parse(&bytes).unwrap();
        assert_eq!(parsed.status, Status::Ok);
        assert_eq!(parsed.fields, resp.fields);
        assert_eq!(parsed.content, resp.content);
    }
}
