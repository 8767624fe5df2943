use std::io;

/// Fatal, startup-time errors. Per-connection failures never reach this type -
/// they are resolved into session state transitions inside the scheduler (see `handler.rs`).
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    #[error("failed to bind listening socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to create wake-pipe socket: {0}")]
    WakePipe(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type HearthResult<T> = Result<T, HearthError>;
