use serde::Serialize;

/// Event category as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Status,
    Log,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::Log => "log",
            EventKind::Error => "error",
        }
    }
}

/// Data carried by an event. `size_bytes` only exists alongside `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub step: String,
    pub message: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// One structured event line.
///
/// Wire shape:
/// `{"source": ..., "type": "status"|"log"|"error", "payload": {"step": ...,
/// "message": ..., "data"?: ..., "size_bytes"?: ...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Payload,
}

impl LogEvent {
    pub fn new(
        source: impl Into<String>,
        kind: EventKind,
        step: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            kind,
            payload: Payload {
                step: step.into(),
                message: message.into(),
                attachment: None,
            },
        }
    }

    /// Attach data (and optionally its size) to the event.
    pub fn with_data(mut self, data: impl Into<String>, size_bytes: Option<u64>) -> Self {
        self.payload.attachment = Some(Attachment {
            data: data.into(),
            size_bytes,
        });
        self
    }

    pub fn step(&self) -> &str {
        &self.payload.step
    }

    pub fn data(&self) -> Option<&str> {
        self.payload.attachment.as_ref().map(|a| a.data.as_str())
    }

    /// Serialize as a single JSON line (without the trailing newline).
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to serialize event");
            format!(
                "{{\"source\":{:?},\"type\":\"error\",\"payload\":{{\"step\":\"serialize\",\"message\":\"event could not be serialized\"}}}}",
                self.source
            )
        })
    }

    /// Human-oriented single line rendering.
    pub fn to_pretty_line(&self) -> String {
        let mut line = format!(
            "[{}] {:<6} {}: {}",
            self.source,
            self.kind.as_str(),
            self.payload.step,
            self.payload.message
        );
        if let Some(attachment) = &self.payload.attachment {
            line.push_str(&format!(" data={:?}", attachment.data));
            if let Some(size) = attachment.size_bytes {
                line.push_str(&format!(" size_bytes={size}"));
            }
        }
        line
    }
}
