/// Percent-decodes a URI, mirroring `original_source/Http.cpp::DecodeURL`: `%HH` becomes the
/// byte with hex digits H,H (case-insensitive), `+` becomes a space, everything else is copied
/// verbatim. A trailing `%` or `%H` with no second hex digit is copied through literally without
/// consuming what follows it.
pub fn decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i];
        if ch == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        if ch == b'+' {
            out.push(b' ');
        } else {
            out.push(ch);
        }
        i += 1;
    }

    // The decoded bytes may not be valid UTF-8 (arbitrary percent-encoded bytes); lossily
    // recover so callers always get a `String` to join onto a filesystem path.
    String::from_utf8_lossy(&out).into_owned()
}

fn from_hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
