use std::fmt;

/// Who emitted an event: a role label plus the OS process id.
///
/// Assigned once when a worker starts and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    label: String,
    pid: u32,
}

impl WorkerIdentity {
    /// Identity for the calling process.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_pid(label, std::process::id())
    }

    pub fn with_pid(label: impl Into<String>, pid: u32) -> Self {
        Self {
            label: label.into(),
            pid,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (PID: {})", self.label, self.pid)
    }
}
