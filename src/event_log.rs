use chrono::{DateTime, Local};

/// Kind of an entry in the proctoring log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    System,
    StatusUpdate,
    Warning,
    Alert,
    Terminated,
    Error,
}

/// One entry in the proctoring log. Immutable once appended.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Local>,
    pub warning_count: Option<u32>,
}

impl SessionEvent {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Local::now(),
            warning_count: None,
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(EventKind::System, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }
}

/// Append-only log of session events, in arrival order.
///
/// The only mutation besides append is the coalescing rule: when a
/// status-update arrives and the most recent entry is also a status-update,
/// the new entry replaces it instead of stacking up.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<SessionEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SessionEvent) {
        if event.kind == EventKind::StatusUpdate {
            if let Some(last) = self.entries.last_mut() {
                if last.kind == EventKind::StatusUpdate {
                    *last = event;
                    return;
                }
            }
        }
        self.entries.push(event);
    }

    pub fn entries(&self) -> &[SessionEvent] {
        &self.entries
    }

    pub fn last(&self) -> Option<&SessionEvent> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(msg: &str) -> SessionEvent {
        SessionEvent::new(EventKind::StatusUpdate, msg)
    }

    #[test]
    fn consecutive_status_updates_coalesce_to_latest() {
        let mut log = EventLog::new();
        log.push(status("Status: Attentive"));
        log.push(status("Status: Looking Away"));

        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().message, "Status: Looking Away");
    }

    #[test]
    fn status_update_after_other_kind_appends() {
        let mut log = EventLog::new();
        log.push(SessionEvent::system("Proctoring started"));
        log.push(status("Status: Attentive"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().kind, EventKind::StatusUpdate);
    }

    #[test]
    fn non_status_after_status_keeps_both_in_order() {
        let mut log = EventLog::new();
        log.push(status("Status: Attentive"));
        log.push(SessionEvent::new(EventKind::Warning, "Please face the screen."));

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].kind, EventKind::StatusUpdate);
        assert_eq!(log.entries()[1].kind, EventKind::Warning);
    }

    #[test]
    fn duplicate_non_status_entries_are_kept() {
        let mut log = EventLog::new();
        log.push(SessionEvent::new(EventKind::Warning, "same"));
        log.push(SessionEvent::new(EventKind::Warning, "same"));

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = EventLog::new();
        log.push(SessionEvent::system("Proctoring started"));
        log.clear();

        assert!(log.is_empty());
    }

    #[test]
    fn kind_renders_snake_case() {
        assert_eq!(EventKind::StatusUpdate.to_string(), "status_update");
        assert_eq!(EventKind::System.to_string(), "system");
    }
}
