use std::fmt;

use ipclab_transport::TransportError;
use ipclab_worker::{ConversationResult, WorkerError};

// Exit code constants aligned with sysexits and shell conventions.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { .. } | TransportError::ConnectionRefused { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn worker_error(context: &str, err: WorkerError) -> CliError {
    match err {
        WorkerError::Setup(err) => transport_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code for a finished conversation. Interruption wins over failure.
pub fn conversation_code(result: &ConversationResult) -> i32 {
    if result.interrupted {
        INTERRUPTED
    } else if result.is_success() {
        SUCCESS
    } else {
        FAILURE
    }
}
