use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single payload read from (or destined for) a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    /// Name of the channel the record arrived on.
    pub channel: String,
    pub payload: Bytes,
    pub arrived_at: DateTime<Utc>,
    /// Position within the channel (byte offset for files, broker offset for topics).
    pub offset: Option<u64>,
}

impl Record {
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            payload: payload.into(),
            arrived_at: Utc::now(),
            offset: None,
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
