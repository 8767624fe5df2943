use std::path::PathBuf;
use std::time::Duration;

/// Tunables for a [`crate::Server`]. All fields have spec-mandated defaults; an embedder
/// overrides only what it needs to before calling `Server::start`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the listener binds.
    pub port: u16,
    /// Document root files are served from.
    pub doc_root: PathBuf,
    /// Number of worker threads. `0` means "use hardware concurrency".
    pub worker_count: usize,
    /// How long an idle connection may sit with no bytes before being dropped.
    pub session_timeout: Duration,
    /// Upper bound on how long a single worker turn may spend sending bytes for one session.
    pub max_time_slice: Duration,
    /// Size of the per-session read/write buffer.
    pub buffer_size: usize,
    /// Poll timeout used by the listener thread while waiting to accept.
    pub accept_poll_timeout: Duration,
    /// Name of the file served for a URI ending in `/`.
    pub default_page: String,
}

impl ServerConfig {
    /// Resolves `worker_count == 0` into the platform's hardware concurrency.
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_count
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            doc_root: PathBuf::from("httpdocs"),
            worker_count: 0,
            session_timeout: Duration::from_secs(5),
            max_time_slice: Duration::from_millis(20),
            buffer_size: 16 * 1024,
            accept_poll_timeout: Duration::from_millis(500),
            default_page: "index.html".to_string(),
        }
    }
}
