//! C3: the readiness scheduler - one listener thread, one idle-poll thread, and a pool of worker
//! threads sharing an idle set and an active queue behind a single spinlock, with a loopback
//! wake-pipe used to interrupt the idle thread's blocking poll. Mirrors
//! `original_source/Server.{h,cpp}`'s `ListenThreadRunLoop` / `IdleThreadRunLoop` /
//! `ActiveThreadRunLoop`, adapted from the original's hardcoded wake ports 32190/32191 to an
//! OS-assigned ephemeral loopback port (see `DESIGN.md`'s resolved open question), and from its
//! `condition_variable_any`-over-a-spinlock to a plain `Condvar` used purely as a wake signal
//! with a short timeout backstop, since `std::sync::Condvar` only pairs with `std::sync::Mutex`.

use std::collections::VecDeque;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::errors::{HearthError, HearthResult};
use crate::handler;
use crate::session::{Session, SessionState};
use crate::socket::{poll_raw, ListenSocket, Socket};
use crate::spinlock::Spinlock;

struct SharedState {
    idle_set: Vec<Session>,
    active_queue: VecDeque<Session>,
}

/// A wake signal for the worker pool: not itself a lock over any data, just a way to avoid
/// spinning the worker threads hot while the active queue is empty. Workers back it with a short
/// timeout so a notification racing a check is never missed for long.
#[derive(Default)]
struct ActiveSignal {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl ActiveSignal {
    fn notify(&self) {
        self.condvar.notify_all();
    }

    fn wait_briefly(&self) {
        let guard = self.mutex.lock().unwrap();
        let _ = self.condvar.wait_timeout(guard, Duration::from_millis(20));
    }
}

/// Owns the scheduler's threads and shared state for one running server. Dropping it stops the
/// server, same as calling `stop` explicitly.
pub struct Scheduler {
    run: Arc<AtomicBool>,
    active_signal: Arc<ActiveSignal>,
    wake_writer: Arc<Mutex<Socket>>,
    bound_port: u16,
    listener_handle: Option<JoinHandle<()>>,
    idle_handle: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(config: ServerConfig) -> HearthResult<Scheduler> {
        let listen_socket = ListenSocket::bind(config.port).map_err(HearthError::Bind)?;
        let bound_port = listen_socket.local_addr().map_err(HearthError::Bind)?.port();

        let (wake_writer, wake_reader) = build_wake_pipe().map_err(HearthError::WakePipe)?;

        let run = Arc::new(AtomicBool::new(true));
        let shared = Arc::new(Spinlock::new(SharedState {
            idle_set: Vec::with_capacity(64),
            active_queue: VecDeque::with_capacity(64),
        }));
        let active_signal = Arc::new(ActiveSignal::default());
        let wake_writer = Arc::new(Mutex::new(wake_writer));
        let config = Arc::new(config);

        info!(port = bound_port, doc_root = %config.doc_root.display(), "server starting");

        let listener_handle = {
            let run = Arc::clone(&run);
            let shared = Arc::clone(&shared);
            let wake_writer = Arc::clone(&wake_writer);
            let config = Arc::clone(&config);
            std::thread::spawn(move || {
                listener_thread_run_loop(run, shared, wake_writer, listen_socket, config)
            })
        };

        let idle_handle = {
            let run = Arc::clone(&run);
            let shared = Arc::clone(&shared);
            let active_signal = Arc::clone(&active_signal);
            let config = Arc::clone(&config);
            std::thread::spawn(move || {
                idle_thread_run_loop(run, shared, active_signal, wake_reader, config)
            })
        };

        let worker_count = config.resolved_worker_count();
        let mut worker_handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let run = Arc::clone(&run);
            let shared = Arc::clone(&shared);
            let active_signal = Arc::clone(&active_signal);
            let wake_writer = Arc::clone(&wake_writer);
            let config = Arc::clone(&config);
            worker_handles.push(std::thread::spawn(move || {
                active_thread_run_loop(run, shared, active_signal, wake_writer, config)
            }));
        }

        Ok(Scheduler {
            run,
            active_signal,
            wake_writer,
            bound_port,
            listener_handle: Some(listener_handle),
            idle_handle: Some(idle_handle),
            worker_handles,
        })
    }

    pub fn bound_port(&self) -> u16 {
        self.bound_port
    }

    pub fn stop(&mut self) {
        if !self.run.swap(false, Ordering::SeqCst) {
            return;
        }
        self.active_signal.notify();
        // The idle thread is typically parked inside `poll_raw` with a ~session-timeout-long
        // timeout; poke the wake-pipe so it notices `run == false` right away instead of making
        // `idle_handle.join()` below wait out the timeout.
        wake_idle_thread(&self.wake_writer);

        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.idle_handle.take() {
            let _ = handle.join();
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        info!("server stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listener_thread_run_loop(
    run: Arc<AtomicBool>,
    shared: Arc<Spinlock<SharedState>>,
    wake_writer: Arc<Mutex<Socket>>,
    listen_socket: ListenSocket,
    config: Arc<ServerConfig>,
) {
    while run.load(Ordering::Relaxed) {
        match listen_socket.poll_accept(config.accept_poll_timeout) {
            Ok(1) if run.load(Ordering::Relaxed) => match listen_socket.accept() {
                Ok((socket, addr)) => {
                    if let Err(e) = socket.set_non_blocking(true) {
                        warn!(error = %e, "failed to set socket non-blocking");
                        continue;
                    }
                    let _ = socket.set_tcp_nodelay(true);

                    let deadline = Instant::now() + config.session_timeout;
                    let session = Session::new(socket, config.buffer_size, deadline);
                    info!(session = session.id, peer = %addr, "connected");

                    let mut state = shared.lock();
                    state.idle_set.push(session);
                    wake_idle_thread(&wake_writer);
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Ok(_) => {}
            Err(e) => warn!(error = %e, "listener poll failed"),
        }
    }
}

fn idle_thread_run_loop(
    run: Arc<AtomicBool>,
    shared: Arc<Spinlock<SharedState>>,
    active_signal: Arc<ActiveSignal>,
    mut wake_reader: Socket,
    config: Arc<ServerConfig>,
) {
    let mut poll_info: Vec<libc::pollfd> = Vec::new();

    while run.load(Ordering::Relaxed) {
        {
            let mut state = shared.lock();
            let now = Instant::now();
            let classified_count = poll_info.len().saturating_sub(1);
            let mut activated = 0usize;

            let sessions = std::mem::take(&mut state.idle_set);
            let mut kept = Vec::with_capacity(sessions.len());
            for (i, session) in sessions.into_iter().enumerate() {
                if i >= classified_count {
                    // Arrived after poll_info was last built; give it one idle round before
                    // classifying it.
                    kept.push(session);
                    continue;
                }
                let revents = poll_info[i].revents;
                if revents == 0 {
                    if now < session.timeout_deadline {
                        kept.push(session);
                    } else {
                        debug!(session = session.id, "disconnecting idle session (timeout)");
                    }
                } else if revents & (libc::POLLIN | libc::POLLOUT) != 0 {
                    state.active_queue.push_back(session);
                    activated += 1;
                } else {
                    debug!(session = session.id, revents, "disconnecting idle session");
                }
            }
            state.idle_set = kept;

            if activated > 0 {
                active_signal.notify();
            }

            poll_info.clear();
            poll_info.reserve(state.idle_set.len() + 1);
            for session in &state.idle_set {
                let events = match session.state {
                    SessionState::Request => libc::POLLIN,
                    _ => libc::POLLOUT,
                };
                poll_info.push(libc::pollfd {
                    fd: session.socket.as_raw_fd(),
                    events,
                    revents: 0,
                });
            }
            poll_info.push(libc::pollfd {
                fd: wake_reader.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }

        let timeout = config.session_timeout + Duration::from_millis(100);
        if let Err(e) = poll_raw(&mut poll_info, timeout) {
            warn!(error = %e, "idle poll failed");
            return;
        }
        if !run.load(Ordering::Relaxed) {
            return;
        }

        let mut scratch = [0u8; 1024];
        while let Ok(n) = wake_reader.recv(&mut scratch) {
            if n <= 0 {
                break;
            }
        }
    }
}

fn active_thread_run_loop(
    run: Arc<AtomicBool>,
    shared: Arc<Spinlock<SharedState>>,
    active_signal: Arc<ActiveSignal>,
    wake_writer: Arc<Mutex<Socket>>,
    config: Arc<ServerConfig>,
) {
    let mut current: Option<Session> = None;
    let mut time_slice = config.max_time_slice;

    while run.load(Ordering::Relaxed) {
        let mut still_active = false;

        if let Some(session) = current.as_mut() {
            let result = match session.state {
                SessionState::Request => handler::receive_request(session, &config),
                SessionState::Response => handler::send_response(session, Instant::now() + time_slice),
                SessionState::Done => Ok(false),
            };
            match result {
                Ok(active) => still_active = active,
                Err(e) => {
                    warn!(session = session.id, error = %e, "connection error");
                    session.state = SessionState::Done;
                }
            }
        }

        {
            let mut state = shared.lock();

            if let Some(mut session) = current.take() {
                if session.state != SessionState::Done {
                    if still_active {
                        state.active_queue.push_back(session);
                    } else {
                        session.timeout_deadline = Instant::now() + config.session_timeout;
                        state.idle_set.push(session);
                        wake_idle_thread(&wake_writer);
                    }
                } else {
                    info!(session = session.id, "disconnecting");
                }
            }

            while state.active_queue.is_empty() && run.load(Ordering::Relaxed) {
                drop(state);
                active_signal.wait_briefly();
                if !run.load(Ordering::Relaxed) {
                    return;
                }
                state = shared.lock();
            }

            if !run.load(Ordering::Relaxed) {
                return;
            }

            let queue_len = state.active_queue.len() as u32;
            time_slice = (Duration::from_millis(1000) / queue_len).min(config.max_time_slice);
            current = state.active_queue.pop_front();
        }
    }
}

fn wake_idle_thread(wake_writer: &Mutex<Socket>) {
    let mut writer = wake_writer.lock().unwrap();
    let _ = writer.send(b"w");
}

/// Builds a connected, loopback-only TCP pair used purely to interrupt the idle thread's blocking
/// `poll`. The original hardcodes ports 32190/32191 for this; binding to port 0 instead avoids
/// collisions between concurrently running test servers in this workspace.
fn build_wake_pipe() -> std::io::Result<(Socket, Socket)> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let addr = listener.local_addr()?;
    let writer = TcpStream::connect(addr)?;
    let (reader, _) = listener.accept()?;
    reader.set_nonblocking(true)?;
    Ok((Socket::from_stream(writer), Socket::from_stream(reader)))
}
