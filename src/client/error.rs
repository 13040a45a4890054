//! Error types for the language client

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Language server binary not found: {command}")]
    BinaryNotFound {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn language server: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Server returned error: {message} (code: {code})")]
    Server { code: i64, message: String },

    #[error("Invalid server options: {0}")]
    InvalidServerOptions(String),

    #[error("Failed to wait for language server exit: {0}")]
    Wait(#[source] io::Error),

    #[error("Language client {0} was already started")]
    AlreadyStarted(String),

    #[error("Language client {0} is not running")]
    NotRunning(String),

    #[error("Language server process exited")]
    ProcessExited,

    #[error("Stop task failed: {0}")]
    StopTask(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Missing Content-Length header")]
    MissingContentLength,

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { length: usize, limit: usize },
}
