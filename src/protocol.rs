//! Wire types for the monitoring service.
//!
//! Inbound messages are JSON events; outbound messages are raw binary frame
//! payloads sent unframed over the same socket. The service also exposes a
//! plain HTTP endpoint that resets its proctoring state.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Deserialize;

use crate::error::InvigilError;
use crate::event_log::{EventKind, SessionEvent};

/// Inbound event kinds the monitoring service emits. The service is free to
/// add kinds; anything unrecognized decodes as `Unknown` rather than failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventKind {
    System,
    StatusUpdate,
    Warning,
    Alert,
    TestTerminated,
    #[serde(other)]
    Unknown,
}

/// A decoded monitoring event. `warning_count`, when present, is
/// authoritative and replaces the client's local value.
#[derive(Clone, Debug, Deserialize)]
pub struct MonitorEvent {
    #[serde(rename = "type")]
    pub kind: MonitorEventKind,
    pub message: String,
    #[serde(default)]
    pub warning_count: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MonitorEvent {
    /// Timestamp of the event, falling back to the local receipt time when
    /// the service sent none or an unparsable one.
    pub fn timestamp_or_now(&self) -> DateTime<Local> {
        self.timestamp
            .as_deref()
            .and_then(parse_wire_timestamp)
            .unwrap_or_else(Local::now)
    }
}

pub fn decode_event(raw: &str) -> Result<MonitorEvent, serde_json::Error> {
    serde_json::from_str(raw)
}

impl From<&MonitorEvent> for SessionEvent {
    fn from(ev: &MonitorEvent) -> Self {
        let kind = match ev.kind {
            MonitorEventKind::System | MonitorEventKind::Unknown => EventKind::System,
            MonitorEventKind::StatusUpdate => EventKind::StatusUpdate,
            MonitorEventKind::Warning => EventKind::Warning,
            MonitorEventKind::Alert => EventKind::Alert,
            MonitorEventKind::TestTerminated => EventKind::Terminated,
        };
        SessionEvent {
            kind,
            message: ev.message.clone(),
            timestamp: ev.timestamp_or_now(),
            warning_count: ev.warning_count,
        }
    }
}

/// The service timestamps events with `datetime.now().isoformat()`, which
/// has no offset, but RFC 3339 timestamps are accepted too.
fn parse_wire_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Request/response call that resets server-side proctoring state.
/// Failure is non-fatal to the caller: a local reset proceeds regardless.
pub trait SessionControl {
    fn reset_remote(&mut self) -> Result<(), InvigilError>;
}

/// `POST /reset_proctoring` against the monitoring service.
pub struct HttpSessionControl {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpSessionControl {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl SessionControl for HttpSessionControl {
    fn reset_remote(&mut self) -> Result<(), InvigilError> {
        self.client
            .post(&self.endpoint)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map(|_| ())
            .map_err(|source| InvigilError::ResetCall { source })
    }
}
