//! C4: the per-connection state machine. `receive_request` and `send_response` are the two
//! operations a worker turn drives; everything else here is their supporting path-resolution and
//! response-building logic. Mirrors `original_source/Server.cpp`'s `ReceiveRequest`/
//! `SendResponse` functions, generalized off the spec's closed method set and resolved open
//! questions rather than the original's literal behavior where the two disagree.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::http::{self, HttpRequest, HttpResponse, Method, Status};
use crate::session::{Session, SessionState};

/// Reads one chunk of request bytes (or drains a leftover body) and advances `session` toward
/// `Response` or `Done`. Returns `Ok(true)` if the session has more work to do right away
/// (should stay in the active queue) and `Ok(false)` if it should go back to the idle set to
/// wait for the next readiness notification.
pub fn receive_request(session: &mut Session, config: &ServerConfig) -> std::io::Result<bool> {
    if session.drain_remaining > 0 {
        return drain_request_body(session);
    }

    session.buffer.resize(config.buffer_size, 0);
    let n = session.socket.recv(&mut session.buffer)?;
    if n == -1 {
        return Ok(false);
    }
    if n == 0 {
        session.state = SessionState::Done;
        return Ok(false);
    }
    session.buffer.truncate(n as usize);

    let request = match HttpRequest::parse(&session.buffer) {
        Some(request) => request,
        None => {
            stage_error(session, Status::BadRequest);
            return Ok(true);
        }
    };

    if request.method != Method::Get {
        stage_error(session, Status::MethodNotAllowed);
        return Ok(true);
    }

    // Matches `original_source/Server.cpp`'s ordering: the Connection header is only consulted
    // once the request has cleared the parse and method checks above.
    if let Some(connection) = request.header("Connection") {
        if connection.eq_ignore_ascii_case("close") {
            session.keep_alive = false;
        }
    }

    let outcome = resolve_and_open(&request, config, session.keep_alive);

    // GET requests aren't expected to carry a body, but if one was declared anyway, drain it
    // before the connection is reused for the next pipelined request instead of letting it
    // corrupt the next request's parse.
    let declared_length = request
        .header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let already_buffered = request.content.len() as u64;

    match outcome {
        Ok((response, file, content_remaining)) => {
            if declared_length > already_buffered {
                session.drain_remaining = declared_length - already_buffered;
                session.pending_response = Some(response.serialize());
                session.file = file;
                session.content_remaining = content_remaining;
                if session.drain_remaining == 0 {
                    install_pending_response(session);
                }
            } else {
                session.file = file;
                session.content_remaining = content_remaining;
                stage_response(session, response);
            }
        }
        Err(status) => {
            if declared_length > already_buffered {
                session.drain_remaining = declared_length - already_buffered;
                session.pending_response = Some(HttpResponse::error_page(status, session.keep_alive).serialize());
                session.file = None;
                session.content_remaining = 0;
                if session.drain_remaining == 0 {
                    install_pending_response(session);
                }
            } else {
                stage_error(session, status);
            }
        }
    }

    Ok(true)
}

/// Sends buffered bytes (and, for file responses, reads further chunks off disk) until either
/// the response is fully flushed or `deadline` is reached. Returns `Ok(true)` if the worker
/// should keep going (time slice not yet exhausted or a full response was flushed) and
/// `Ok(false)` if the socket reported it would block.
pub fn send_response(session: &mut Session, deadline: Instant) -> std::io::Result<bool> {
    loop {
        if session.buffer_offset == session.buffer.len() && session.content_remaining > 0 {
            let chunk = session.content_remaining.min(session.buffer_capacity as u64) as usize;
            session.buffer.resize(chunk, 0);
            let file = session
                .file
                .as_mut()
                .expect("content_remaining > 0 implies an open file");
            if let Err(e) = file.read_exact(&mut session.buffer) {
                warn!(session = session.id, error = %e, "failed to read response file");
                session.file = None;
                session.content_remaining = 0;
                session.state = if session.keep_alive {
                    SessionState::Request
                } else {
                    SessionState::Done
                };
                return Ok(false);
            }
            session.content_remaining -= chunk as u64;
            session.buffer_offset = 0;
        }

        let sent = session.socket.send(&session.buffer[session.buffer_offset..])?;
        if sent == -1 {
            return Ok(false);
        }
        session.buffer_offset += sent as usize;

        if session.buffer_offset == session.buffer.len() && session.content_remaining == 0 {
            session.file = None;
            session.state = if session.keep_alive {
                SessionState::Request
            } else {
                SessionState::Done
            };
            return Ok(true);
        }

        if Instant::now() >= deadline {
            return Ok(true);
        }
    }
}

fn drain_request_body(session: &mut Session) -> std::io::Result<bool> {
    let chunk = session.drain_remaining.min(session.buffer_capacity as u64).max(1) as usize;
    session.buffer.resize(chunk, 0);
    let n = session.socket.recv(&mut session.buffer)?;
    if n == -1 {
        return Ok(false);
    }
    if n == 0 {
        session.state = SessionState::Done;
        return Ok(false);
    }
    session.drain_remaining = session.drain_remaining.saturating_sub(n as u64);
    if session.drain_remaining == 0 {
        install_pending_response(session);
    }
    Ok(true)
}

fn install_pending_response(session: &mut Session) {
    let bytes = session
        .pending_response
        .take()
        .expect("drain_remaining reached zero with no pending response staged");
    session.buffer = bytes;
    session.buffer_offset = 0;
    session.state = SessionState::Response;
}

/// Stages an already-fully-inline response (error pages): no file to stream, so
/// `content_remaining` stays at zero and `send_response` never tries to read past the buffer.
fn stage_error(session: &mut Session, status: Status) {
    session.file = None;
    session.content_remaining = 0;
    stage_response(session, HttpResponse::error_page(status, session.keep_alive));
}

fn stage_response(session: &mut Session, response: HttpResponse) {
    session.buffer = response.serialize();
    session.buffer_offset = 0;
    session.state = SessionState::Response;
}

/// Resolves the request URI to a file under the document root, parses any `Range` header against
/// its size, and opens it seeked to the right offset. Returns the response headers to send plus
/// the (possibly range-seeked) open file and how many content bytes remain to stream.
///
/// Mirrors `original_source/Server.cpp::ReceiveRequest`'s path-resolution, MIME lookup, and
/// Range-to-206/416 logic, with the traversal check resolved via canonicalization (see
/// `resolve_path`) rather than the original's backslash-only normalization.
fn resolve_and_open(
    request: &HttpRequest,
    config: &ServerConfig,
    keep_alive: bool,
) -> Result<(HttpResponse, Option<File>, u64), Status> {
    let local_path =
        resolve_path(&config.doc_root, &request.uri, &config.default_page).ok_or(Status::NotFound)?;
    let mut file = File::open(&local_path).map_err(|_| Status::NotFound)?;
    let file_size = file.metadata().map_err(|_| Status::NotFound)?.len();

    // A Range header that doesn't parse at all (wrong unit, malformed bounds) is treated exactly
    // like no Range header at all, not as a 416 - only an in-grammar-but-out-of-bounds range gets
    // rejected below.
    let first_range = request
        .header("Range")
        .and_then(|field| http::range::parse(field).first().copied());

    let (status, start, length, content_range) = match first_range {
        Some((start_opt, end_opt)) => {
            let (start, end) = match (start_opt, end_opt) {
                (Some(s), Some(e)) => (s, e),
                (Some(s), None) => (s, file_size.saturating_sub(1)),
                (None, Some(suffix)) => (file_size.saturating_sub(suffix), file_size.saturating_sub(1)),
                (None, None) => (0, file_size.saturating_sub(1)),
            };
            if start > end || start >= file_size || end >= file_size {
                return Err(Status::RequestedRangeNotSatisfiable);
            }
            (
                Status::PartialContent,
                start,
                end - start + 1,
                Some(format!("bytes {}-{}/{}", start, end, file_size)),
            )
        }
        None => (Status::Ok, 0, file_size, None),
    };

    if start > 0 {
        file.seek(SeekFrom::Start(start)).map_err(|_| Status::NotFound)?;
    }

    let content_type = crate::mime::content_type_for(&local_path);
    let mut response = HttpResponse::new(status);
    response.set_header("Connection", if keep_alive { "keep-alive" } else { "close" });
    response.set_header("Content-Type", content_type);
    response.set_header("Content-Length", length.to_string());
    response.set_header("Accept-Ranges", "bytes");
    if let Some(range) = content_range {
        response.set_header("Content-Range", range);
    }

    Ok((response, Some(file), length))
}

/// Joins `uri`'s decoded path onto `doc_root`, appending `default_page` for directory-style
/// requests, then canonicalizes the result and rejects anything that escapes `doc_root` -
/// resolving the spec's "reject `..` traversal" open question via canonicalization rather than
/// component-by-component filtering.
fn resolve_path(doc_root: &Path, uri: &str, default_page: &str) -> Option<PathBuf> {
    let decoded = http::url::decode(uri);
    let mut relative = decoded.trim_start_matches('/').to_string();
    if relative.is_empty() || decoded.ends_with('/') {
        if !relative.is_empty() && !relative.ends_with('/') {
            relative.push('/');
        }
        relative.push_str(default_page);
    }

    let candidate = doc_root.join(&relative);
    let canonical_root = std::fs::canonicalize(doc_root).ok()?;
    let canonical = std::fs::canonicalize(&candidate).ok()?;
    if !canonical.starts_with(&canonical_root) {
        debug!(uri, "rejected request path outside document root");
        return None;
    }
    Some(canonical)
}
