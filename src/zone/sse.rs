use crate::zone::ZoneError;
use serde::Deserialize;
use serde_json::Value;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence;
/// only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Realtime Database streaming event
#[derive(Debug, Clone, PartialEq)]
pub enum RtdbEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    /// Server stopped the stream (e.g. security rules changed)
    Cancel(String),
    AuthRevoked,
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    #[serde(default)]
    data: Value,
}

impl RtdbEvent {
    pub fn parse(event: &SseEvent) -> Result<Self, ZoneError> {
        let path_data = || -> Result<PathData, ZoneError> {
            serde_json::from_str(&event.data).map_err(|e| ZoneError::MalformedEvent(e.to_string()))
        };

        match event.event.as_str() {
            "put" => {
                let PathData { path, data } = path_data()?;
                Ok(RtdbEvent::Put { path, data })
            }
            "patch" => {
                let PathData { path, data } = path_data()?;
                Ok(RtdbEvent::Patch { path, data })
            }
            "keep-alive" => Ok(RtdbEvent::KeepAlive),
            "cancel" => Ok(RtdbEvent::Cancel(event.data.clone())),
            "auth_revoked" => Ok(RtdbEvent::AuthRevoked),
            other => Err(ZoneError::MalformedEvent(format!("unknown event type '{}'", other))),
        }
    }
}
