// src/server.rs
use crate::config::ServerConfig;
use crate::errors::HearthResult;
use crate::scheduler::Scheduler;

/// The server's public handle. Construction binds the listening socket and starts the
/// listener/idle/worker threads immediately (mirrors `original_source/Server.cpp::Start`);
/// dropping it (or calling `stop`) joins them back down, same as `Server::Stop`.
pub struct Server {
    scheduler: Scheduler,
}

impl Server {
    /// Starts serving `config.doc_root` on `config.port` right away.
    pub fn start(config: ServerConfig) -> HearthResult<Self> {
        let scheduler = Scheduler::start(config)?;
        Ok(Server { scheduler })
    }

    /// The port actually bound - useful when `config.port` was `0` and the OS picked one.
    pub fn port(&self) -> u16 {
        self.scheduler.bound_port()
    }

    /// Stops the listener, idle, and worker threads and waits for them to exit. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    /// Installs a Ctrl-C handler and blocks the calling thread until it fires, then stops the
    /// server. Intended for the binary entry point; library embedders that manage their own
    /// lifecycle should call `stop` directly instead.
    pub fn run_until_ctrl_c(mut self) -> HearthResult<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })
        .expect("failed to install Ctrl-C handler");

        let _ = rx.recv();
        tracing::info!("received shutdown signal");
        self.stop();
        Ok(())
    }
}
