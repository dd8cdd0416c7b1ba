use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::protocol::MonitorEvent;

/// Unified message type consumed by the session loop.
///
/// Everything that can influence the session — decoded monitoring events,
/// connection closure, user navigation, and the cadence tick — arrives
/// through one queue so the controller processes a single message at a time.
#[derive(Clone, Debug)]
pub enum SessionMsg {
    /// Decoded event from the monitoring service.
    Inbound(MonitorEvent),
    /// Inbound payload that failed to decode (non-fatal).
    DecodeFailed(String),
    /// The duplex connection closed, expectedly or not.
    ConnectionClosed,
    /// Quiz navigation from the user.
    User(UserAction),
    /// Cadence wakeup; time-based triggers run off the clock, not this.
    Tick,
    /// Abandon the session and exit (binary only, not a session outcome).
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAction {
    SelectOption(usize),
    NextQuestion,
    PreviousQuestion,
}

/// Source of session messages (network worker, input thread, etc.)
pub trait SessionMsgSource {
    /// Block for up to `timeout` waiting for a message.
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionMsg, RecvTimeoutError>;
}

/// Message source over an mpsc channel; producers hold clones of the sender.
pub struct ChannelMsgSource {
    rx: Receiver<SessionMsg>,
}

impl ChannelMsgSource {
    pub fn new(rx: Receiver<SessionMsg>) -> Self {
        Self { rx }
    }
}

impl SessionMsgSource for ChannelMsgSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<SessionMsg, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the session one message/tick at a time
pub struct Runner<S: SessionMsgSource, T: Ticker> {
    source: S,
    ticker: T,
}

impl<S: SessionMsgSource, T: Ticker> Runner<S, T> {
    pub fn new(source: S, ticker: T) -> Self {
        Self { source, ticker }
    }

    /// Blocks up to the tick interval and returns the next message, or Tick
    /// on timeout
    pub fn step(&self) -> SessionMsg {
        match self.source.recv_timeout(self.ticker.interval()) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                SessionMsg::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let source = ChannelMsgSource::new(rx);
        let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(1)));

        match runner.step() {
            SessionMsg::Tick => {}
            other => panic!("expected Tick on timeout, got {other:?}"),
        }
    }

    #[test]
    fn step_passes_through_messages() {
        let (tx, rx) = mpsc::channel();
        tx.send(SessionMsg::User(UserAction::NextQuestion)).unwrap();
        let source = ChannelMsgSource::new(rx);
        let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(10)));

        match runner.step() {
            SessionMsg::User(UserAction::NextQuestion) => {}
            other => panic!("expected user action, got {other:?}"),
        }
    }
}
