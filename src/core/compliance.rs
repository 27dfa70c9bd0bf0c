//! Compliance transcription feed.
//!
//! Twilio's real-time transcription webhook posts every transcript fragment to
//! the gateway. [`ComplianceHub`] fans those payloads out to every connected
//! `/compliance` listener and suppresses the duplicate final fragments Twilio
//! sometimes delivers more than once in quick succession.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast buffer per listener before it starts lagging
const FEED_CHANNEL_CAPACITY: usize = 256;

/// Webhook event carrying transcript text
const TRANSCRIPTION_CONTENT_EVENT: &str = "transcription-content";

/// Default window in which identical final transcripts count as duplicates
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(3);

/// Transcription webhook payload, one JSON object per request.
pub type TranscriptionPayload = Map<String, Value>;

/// Sliding window of recently seen transcript keys.
#[derive(Debug)]
struct DedupWindow {
    entries: VecDeque<(Instant, String)>,
    keys: HashSet<String>,
}

/// Remembers normalized transcripts for a fixed TTL.
#[derive(Debug)]
pub struct TranscriptDeduper {
    ttl: Duration,
    window: Mutex<DedupWindow>,
}

impl TranscriptDeduper {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            window: Mutex::new(DedupWindow {
                entries: VecDeque::new(),
                keys: HashSet::new(),
            }),
        }
    }

    /// Returns `true` if `key` was already seen within the TTL, otherwise
    /// records it and returns `false`.
    pub fn check_and_record(&self, key: &str, now: Instant) -> bool {
        let mut guard = self.window.lock();
        let window = &mut *guard;

        while let Some((seen_at, _)) = window.entries.front() {
            if now.saturating_duration_since(*seen_at) <= self.ttl {
                break;
            }
            if let Some((_, expired)) = window.entries.pop_front() {
                window.keys.remove(&expired);
            }
        }

        if window.keys.contains(key) {
            return true;
        }

        window.entries.push_back((now, key.to_string()));
        window.keys.insert(key.to_string());
        false
    }
}

/// Pull the transcript text out of a webhook payload.
///
/// `TranscriptionData` arrives either as an object or as a JSON-encoded
/// string of one; a string that is not JSON is the transcript itself.
pub fn extract_transcript_text(payload: &TranscriptionPayload) -> String {
    match payload.get("TranscriptionData") {
        Some(Value::Object(data)) => value_to_text(data.get("transcript")),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(data)) => value_to_text(data.get("transcript")),
            Ok(other) => value_to_text(Some(&other)),
            Err(_) => raw.clone(),
        },
        _ => String::new(),
    }
}

fn value_to_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Lowercase and collapse whitespace so trivially different fragments match.
pub fn normalize_transcript(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_explicitly_not_final(payload: &TranscriptionPayload) -> bool {
    match payload.get("Final") {
        Some(Value::Bool(final_flag)) => !final_flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

/// Fan-out hub for compliance listeners.
#[derive(Clone)]
pub struct ComplianceHub {
    tx: broadcast::Sender<Arc<str>>,
    deduper: Arc<TranscriptDeduper>,
}

impl ComplianceHub {
    pub fn new(dedup_ttl: Duration) -> Self {
        let (tx, _) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        Self {
            tx,
            deduper: Arc::new(TranscriptDeduper::new(dedup_ttl)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Whether this payload repeats a final transcript seen moments ago.
    ///
    /// Only final `transcription-content` events with non-empty text are
    /// candidates; everything else is always forwarded.
    pub fn is_duplicate(&self, payload: &TranscriptionPayload) -> bool {
        let event = payload.get("TranscriptionEvent").and_then(Value::as_str);
        if event != Some(TRANSCRIPTION_CONTENT_EVENT) || is_explicitly_not_final(payload) {
            return false;
        }

        let normalized = normalize_transcript(&extract_transcript_text(payload));
        if normalized.is_empty() {
            return false;
        }

        self.deduper.check_and_record(&normalized, Instant::now())
    }

    /// Send the payload to every listener.
    ///
    /// Returns the number of listener queues the payload was placed on. That
    /// is the count of connected listeners at send time; a listener whose
    /// socket write later fails is still counted.
    pub fn publish(&self, payload: &TranscriptionPayload) -> usize {
        let message: Arc<str> = Value::Object(payload.clone()).to_string().into();
        match self.tx.send(message) {
            Ok(delivered) => delivered,
            Err(_) => {
                debug!("No compliance listeners connected");
                0
            }
        }
    }
}

impl Default for ComplianceHub {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}
