//! Bounded retention for live log entries.
//!
//! The console only ever shows the most recent entries, so the buffer is a
//! fixed-capacity ring: pushing into a full buffer overwrites the oldest slot
//! and advances the head. Entries keep arrival order; the backend timestamp is
//! carried for display only and never used to sort.

use aegis_protocol::{parse_log_frame, LogLevel};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

pub const DEFAULT_LOG_CAPACITY: usize = 100;

const RECEIPT_TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Backend-assigned label. May repeat across entries.
    pub time: String,
    pub level: LogLevel,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl LogEntry {
    /// Builds an entry from one stream payload.
    ///
    /// Payloads that are not structured frames are kept as `INFO` entries
    /// carrying the raw text and the local receipt time.
    pub fn from_payload(payload: &str, received_at: DateTime<Utc>) -> Self {
        match parse_log_frame(payload) {
            Ok(frame) => Self {
                level: frame.level(),
                time: frame.time,
                content: frame.content,
                received_at,
            },
            Err(err) => {
                tracing::debug!(error = %err, "Keeping unstructured log frame as plain text");
                Self {
                    time: received_at
                        .with_timezone(&Local)
                        .format(RECEIPT_TIME_FORMAT)
                        .to_string(),
                    level: LogLevel::Info,
                    content: payload.to_string(),
                    received_at,
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct LogBuffer {
    slots: Box<[Option<LogEntry>]>,
    head: usize,
    len: usize,
    appended: u64,
}

impl LogBuffer {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            appended: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total entries ever pushed, including evicted ones.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Appends an entry, evicting the oldest one when full.
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, entry: LogEntry) -> Option<LogEntry> {
        let capacity = self.capacity();
        self.appended += 1;

        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = Some(entry);
            self.len += 1;
            return None;
        }

        let evicted = self.slots[self.head].replace(entry);
        self.head = (self.head + 1) % capacity;
        evicted
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |offset| self.slots[(self.head + offset) % capacity].as_ref())
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        if self.len == 0 {
            return None;
        }
        let index = (self.head + self.len - 1) % self.capacity();
        self.slots[index].as_ref()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.iter().cloned().collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize) -> LogEntry {
        LogEntry {
            time: "10:00:00".to_string(),
            level: LogLevel::Info,
            content: format!("e{}", index),
            received_at: Utc::now(),
        }
    }

    fn contents(buffer: &LogBuffer) -> Vec<String> {
        buffer.iter().map(|entry| entry.content.clone()).collect()
    }

    #[test]
    fn keeps_entries_in_arrival_order_below_capacity() {
        let mut buffer = LogBuffer::default();
        for index in 1..=5 {
            assert!(buffer.push(entry(index)).is_none());
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(contents(&buffer), vec!["e1", "e2", "e3", "e4", "e5"]);
    }

    #[test]
    fn retains_last_hundred_of_one_fifty() {
        let mut buffer = LogBuffer::default();
        for index in 1..=150 {
            buffer.push(entry(index));
            assert!(buffer.len() <= DEFAULT_LOG_CAPACITY);
        }

        let expected: Vec<String> = (51..=150).map(|index| format!("e{}", index)).collect();
        assert_eq!(contents(&buffer), expected);
        assert_eq!(buffer.appended(), 150);
        assert_eq!(buffer.latest().map(|e| e.content.as_str()), Some("e150"));
    }

    #[test]
    fn push_into_full_buffer_returns_oldest() {
        let mut buffer = LogBuffer::with_capacity(2);
        buffer.push(entry(1));
        buffer.push(entry(2));
        let evicted = buffer.push(entry(3)).expect("evicted");
        assert_eq!(evicted.content, "e1");
        assert_eq!(contents(&buffer), vec!["e2", "e3"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = LogBuffer::with_capacity(0);
        buffer.push(entry(1));
        buffer.push(entry(2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(contents(&buffer), vec!["e2"]);
    }

    #[test]
    fn structured_payload_keeps_backend_fields() {
        let received_at = Utc::now();
        let entry = LogEntry::from_payload(
            r#"{"time":"09:15:02","level":"WARNING","content":"slow target"}"#,
            received_at,
        );
        assert_eq!(entry.time, "09:15:02");
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.content, "slow target");
        assert_eq!(entry.received_at, received_at);
    }

    #[test]
    fn unstructured_payload_becomes_info_entry() {
        let received_at = Utc::now();
        let entry = LogEntry::from_payload("proxy listening on :8080", received_at);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.content, "proxy listening on :8080");
        assert_eq!(
            entry.time,
            received_at
                .with_timezone(&Local)
                .format(RECEIPT_TIME_FORMAT)
                .to_string()
        );
    }
}
