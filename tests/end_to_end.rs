//! End-to-end tests driving a real `Server` over real TCP sockets, the way
//! `chopin-core/tests/integration_app_tests.rs` drives its app through `TestApp` - except this
//! server speaks raw HTTP/1.1 over `std::net` rather than through an async HTTP client, so these
//! tests open a `TcpStream` directly and read/write the wire bytes themselves.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use hearthd::{Server, ServerConfig};

/// Starts a server bound to an OS-assigned port, serving `doc_root`, and returns it alongside
/// that port. The `tempfile::TempDir` must outlive the server or the files it serves vanish out
/// from under it.
fn start_server(doc_root: &std::path::Path) -> Server {
    let mut config = ServerConfig::default();
    config.port = 0;
    config.doc_root = doc_root.to_path_buf();
    config.worker_count = 2;
    Server::start(config).expect("server failed to start")
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", server.port())).expect("connect failed");
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream
}

/// Reads until the peer closes the connection or `read_timeout` elapses, whichever comes first.
/// Good enough for `Connection: close` responses in these tests; tests that reuse the connection
/// read a bounded number of bytes instead (see `read_exact_or_available`).
fn read_to_end_or_timeout(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}

/// Reads bytes until the response's header/body boundary has clearly been crossed and at least
/// `min_len` bytes are in hand - used on keep-alive connections where the peer won't close.
fn read_until(stream: &mut TcpStream, min_len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while out.len() < min_len || !out.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}

#[test]
fn serves_a_small_file_with_200() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"hello").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.contains("Content-Length: 5"), "{text}");
    assert!(text.contains("Content-Type: text/html"), "{text}");
    assert!(text.ends_with("hello"), "{text}");
}

#[test]
fn missing_file_returns_404_with_html_body() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /missing HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "{text}");
    assert!(
        text.contains("<html><h1 style=\"text-align: center\">404: Not Found</h1></html>"),
        "{text}"
    );
}

#[test]
fn non_get_method_returns_405() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"POST / HTTP/1.1\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{text}");
}

#[test]
fn malformed_request_line_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream.write_all(b"GOT / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{text}");
}

#[test]
fn explicit_range_returns_206_with_content_range() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.bin"), b"0123456789").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /big.bin HTTP/1.1\r\nRange: bytes=0-3\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 206 Partial Content\r\n"), "{text}");
    assert!(text.contains("Content-Length: 4"), "{text}");
    assert!(text.contains("Content-Range: bytes 0-3/10"), "{text}");
    assert!(text.ends_with("0123"), "{text}");
}

#[test]
fn suffix_range_returns_last_bytes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.bin"), b"0123456789").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /big.bin HTTP/1.1\r\nRange: bytes=-3\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 206 Partial Content\r\n"), "{text}");
    assert!(text.contains("Content-Range: bytes 7-9/10"), "{text}");
    assert!(text.ends_with("789"), "{text}");
}

#[test]
fn range_outside_file_bounds_returns_416() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.bin"), b"0123456789").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /big.bin HTTP/1.1\r\nRange: bytes=20-30\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 416 Requested Range Not Satisfiable\r\n"), "{text}");
}

#[test]
fn malformed_range_header_is_served_as_plain_200() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.bin"), b"0123456789").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /big.bin HTTP/1.1\r\nRange: items=0-1\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.contains("Content-Length: 10"), "{text}");
    assert!(!text.contains("Content-Range"), "{text}");
    assert!(text.ends_with("0123456789"), "{text}");
}

#[test]
fn directory_uri_serves_index_html() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"home page").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream.write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.ends_with("home page"), "{text}");
}

#[test]
fn path_traversal_is_rejected_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("httpdocs")).unwrap();
    std::fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();
    let server = start_server(&dir.path().join("httpdocs"));

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /../secret.txt HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "{text}");
    assert!(!text.contains("top secret"), "{text}");
}

#[test]
fn keep_alive_serves_two_requests_on_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"first").unwrap();
    std::fs::write(dir.path().join("b.txt"), b"second").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream.write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let first = read_until(&mut stream, 1);
    let first_text = String::from_utf8_lossy(&first);
    assert!(first_text.starts_with("HTTP/1.1 200 OK\r\n"), "{first_text}");
    assert!(first_text.ends_with("first"), "{first_text}");
    assert!(first_text.contains("Connection: keep-alive"), "{first_text}");

    stream
        .write_all(b"GET /b.txt HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let second = read_to_end_or_timeout(&mut stream);
    let second_text = String::from_utf8_lossy(&second);
    assert!(second_text.starts_with("HTTP/1.1 200 OK\r\n"), "{second_text}");
    assert!(second_text.ends_with("second"), "{second_text}");
}

#[test]
fn connection_close_header_closes_after_one_response() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"bye").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /a.txt HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Connection: close"), "{text}");

    // The server should have closed its end; a further read should see EOF (0 bytes), not hang.
    let mut buf = [0u8; 8];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);
}

#[test]
fn many_concurrent_connections_are_all_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"concurrent").unwrap();
    let server = start_server(dir.path());

    let mut handles = Vec::new();
    for _ in 0..64 {
        let port = server.port();
        handles.push(std::thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
            stream
                .write_all(b"GET /a.txt HTTP/1.1\r\nConnection: close\r\n\r\n")
                .unwrap();
            let response = read_to_end_or_timeout(&mut stream);
            String::from_utf8_lossy(&response).ends_with("concurrent")
        }));
    }

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn unknown_extension_falls_back_to_octet_stream() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blob.unknownext"), b"raw bytes").unwrap();
    let server = start_server(dir.path());

    let mut stream = connect(&server);
    stream
        .write_all(b"GET /blob.unknownext HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_to_end_or_timeout(&mut stream);
    let text = String::from_utf8_lossy(&response);

    assert!(text.contains("Content-Type: application/octet-stream"), "{text}");
}

#[test]
fn stop_is_idempotent_and_unblocks_further_connections_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = start_server(dir.path());
    let port = server.port();

    server.stop();
    server.stop();

    assert!(TcpStream::connect_timeout(
        &format!("127.0.0.1:{port}").parse().unwrap(),
        Duration::from_millis(500)
    )
    .is_err());
}
