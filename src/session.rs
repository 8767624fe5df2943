use std::fs::File;
use std::time::Instant;

use crate::socket::Socket;

/// Where a `Session` sits in its request/response cycle. Exactly the three states the spec's
/// data model calls for - see `original_source/Session.h`'s `SessionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Request,
    Response,
    Done,
}

/// One per client TCP connection. Mutated only by the single worker currently holding it, or by
/// the scheduler while the session sits in the idle set or active queue under the scheduler
/// lock (see `crate::scheduler`).
pub struct Session {
    pub socket: Socket,
    pub state: SessionState,
    pub keep_alive: bool,
    pub timeout_deadline: Instant,
    pub buffer: Vec<u8>,
    pub buffer_offset: usize,
    pub file: Option<File>,
    pub content_remaining: u64,

    /// Bytes of a GET request body still to be discarded from the socket before the next
    /// request on this connection can be parsed safely (see `SPEC_FULL.md` §4.1's resolved
    /// "Content-Length on GET body" open question).
    pub drain_remaining: u64,
    /// The already-serialized response, held here while `drain_remaining` is worked off.
    pub pending_response: Option<Vec<u8>>,

    /// Raw fd, used only to give log lines a stable per-connection identifier.
    pub id: i32,

    /// The configured buffer size, cached off `ServerConfig` so the handler doesn't need the
    /// config threaded through every call.
    pub buffer_capacity: usize,
}

impl Session {
    pub fn new(socket: Socket, buffer_size: usize, timeout_deadline: Instant) -> Self {
        use std::os::unix::io::AsRawFd;
        let id = socket.as_raw_fd();
        Session {
            socket,
            state: SessionState::Request,
            keep_alive: true,
            timeout_deadline,
            buffer: Vec::with_capacity(buffer_size),
            buffer_offset: 0,
            file: None,
            content_remaining: 0,
            drain_remaining: 0,
            pending_response: None,
            id,
            buffer_capacity: buffer_size,
        }
    }
}
