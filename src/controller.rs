//! The proctoring session controller.
//!
//! Owns the session state machine and composes the connection manager, the
//! frame emitter, and the countdown into one single-threaded object. Three
//! independent sources — inbound monitoring events, the capture cadence, and
//! the one-second countdown — interleave non-deterministically; entry into a
//! terminal state is guarded by a single-transition latch so the first
//! trigger wins and every later one is a no-op.
//!
//! All time-based triggers (cadence, countdown, reconnect, outcome handoff)
//! are deadline fields consumed by [`SessionController::advance`], which
//! takes the current instant as an argument so tests can drive synthetic
//! time.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::capture::FrameEmitter;
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::InvigilError;
use crate::event_log::{EventLog, SessionEvent};
use crate::protocol::{MonitorEvent, MonitorEventKind, SessionControl};
use crate::quiz::{AnswerSheet, Question};
use crate::runtime::{SessionMsg, UserAction};

const MONITORING_STARTED: &str = "Proctoring system activated. Quiz monitoring started.";
const CONNECTION_LOST: &str = "Proctoring connection lost. Attempting to reconnect...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// User finished the question sequence.
    Completed,
    /// The monitoring service forced termination (warning threshold or an
    /// explicit terminated event).
    Warnings,
    /// The countdown reached zero.
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    Terminal(Termination),
}

/// Final, write-once record of how a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    pub answers: Vec<Option<usize>>,
    pub score: usize,
    pub total_questions: usize,
    pub time_spent_secs: u32,
    pub terminated_by_proctoring: bool,
    pub warning_count: u32,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub quiz_seconds: u32,
    pub capture_interval: Duration,
    pub warning_threshold: u32,
    pub termination_display_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            quiz_seconds: cfg.quiz_seconds,
            capture_interval: Duration::from_millis(cfg.capture_interval_ms),
            warning_threshold: cfg.warning_threshold,
            termination_display_delay: Duration::from_millis(cfg.termination_display_delay_ms),
        }
    }
}

pub struct SessionController {
    settings: SessionSettings,
    phase: SessionPhase,
    warning_count: u32,
    log: EventLog,
    conn: ConnectionManager,
    emitter: FrameEmitter,
    control: Box<dyn SessionControl>,
    questions: Vec<Question>,
    answers: AnswerSheet,
    current_question: usize,
    remaining_secs: u32,
    next_capture_at: Option<Instant>,
    next_countdown_at: Option<Instant>,
    handoff_at: Option<Instant>,
    outcome: Option<SessionOutcome>,
    handed_off: bool,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        questions: Vec<Question>,
        conn: ConnectionManager,
        emitter: FrameEmitter,
        control: Box<dyn SessionControl>,
    ) -> Self {
        let answers = AnswerSheet::new(questions.len());
        let remaining_secs = settings.quiz_seconds;
        Self {
            settings,
            phase: SessionPhase::Idle,
            warning_count: 0,
            log: EventLog::new(),
            conn,
            emitter,
            control,
            questions,
            answers,
            current_question: 0,
            remaining_secs,
            next_capture_at: None,
            next_countdown_at: None,
            handoff_at: None,
            outcome: None,
            handed_off: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn current_question(&self) -> usize {
        self.current_question
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.get(self.current_question)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Start the session: open the connection, arm the frame cadence and the
    /// countdown, reset the warning count.
    ///
    /// A failed connect does not fail the start; the quiz runs and the
    /// connection retries on the reconnect schedule, as the original client
    /// behaves when the monitoring service is briefly down.
    pub fn start(&mut self, now: Instant) -> Result<(), InvigilError> {
        if self.phase != SessionPhase::Idle {
            return Err(InvigilError::AlreadyStarted);
        }
        self.phase = SessionPhase::Active;
        self.warning_count = 0;
        self.answers = AnswerSheet::new(self.questions.len());
        self.current_question = 0;
        self.remaining_secs = self.settings.quiz_seconds;
        self.outcome = None;
        self.handed_off = false;
        self.handoff_at = None;
        self.next_countdown_at = Some(now + Duration::from_secs(1));

        match self.conn.open() {
            Ok(()) => {
                info!("monitoring connection open");
                self.log.push(SessionEvent::system(MONITORING_STARTED));
                self.next_capture_at = Some(now + self.settings.capture_interval);
            }
            Err(err) => {
                warn!("could not open monitoring connection: {err}");
                self.log
                    .push(SessionEvent::error(format!("Proctoring connection error: {err}")));
                self.conn.schedule_reconnect(now);
            }
        }
        Ok(())
    }

    /// Process one message from the session queue.
    pub fn handle(&mut self, msg: SessionMsg, now: Instant) {
        match msg {
            SessionMsg::Inbound(ev) => self.on_inbound(ev, now),
            SessionMsg::DecodeFailed(err) => self.on_decode_failed(err),
            SessionMsg::ConnectionClosed => self.on_connection_closed(now),
            SessionMsg::User(action) => self.on_user(action, now),
            SessionMsg::Tick | SessionMsg::Quit => {}
        }
    }

    /// Run every time-based trigger that is due: reconnection, countdown,
    /// frame cadence, and outcome handoff. Returns the session outcome
    /// exactly once, when its handoff deadline passes.
    pub fn advance(&mut self, now: Instant) -> Option<SessionOutcome> {
        if self.is_active() && self.conn.reconnect_due(now) {
            match self.conn.open() {
                Ok(()) => {
                    info!("monitoring connection re-established");
                    self.log.push(SessionEvent::system(MONITORING_STARTED));
                    self.next_capture_at = Some(now + self.settings.capture_interval);
                }
                Err(err) => {
                    warn!("reconnect attempt failed: {err}");
                    self.log
                        .push(SessionEvent::error(format!("Proctoring connection error: {err}")));
                    self.conn.schedule_reconnect(now);
                }
            }
        }

        // One-second countdown; catches up if the loop was delayed.
        loop {
            if !self.is_active() {
                break;
            }
            let Some(due) = self.next_countdown_at else {
                break;
            };
            if now < due {
                break;
            }
            self.remaining_secs = self.remaining_secs.saturating_sub(1);
            self.next_countdown_at = Some(due + Duration::from_secs(1));
            if self.remaining_secs == 0 {
                info!("quiz time over");
                self.terminate(Termination::Timeout, now);
            }
        }

        // Frame cadence, active only while Open && !terminal. A snapshot of
        // None means the camera was not ready for this tick; skip silently.
        if self.is_active() && self.conn.is_open() {
            if let Some(due) = self.next_capture_at {
                if now >= due {
                    if let Some(frame) = self.emitter.next_frame() {
                        self.conn.send_frame(frame);
                    }
                    self.next_capture_at = Some(now + self.settings.capture_interval);
                }
            }
        }

        if let Some(due) = self.handoff_at {
            if now >= due && !self.handed_off {
                self.handed_off = true;
                self.handoff_at = None;
                return self.outcome.clone();
            }
        }
        None
    }

    /// Reset back to idle; only valid before a start or after a terminal
    /// state. Also asks the monitoring service to reset its own state;
    /// failure there is logged and the local reset proceeds.
    pub fn reset(&mut self) -> Result<(), InvigilError> {
        if self.is_active() {
            return Err(InvigilError::ResetWhileActive);
        }
        if let Err(err) = self.control.reset_remote() {
            warn!("remote proctoring reset failed, resetting locally anyway: {err}");
        }
        self.log.clear();
        self.warning_count = 0;
        self.answers = AnswerSheet::new(self.questions.len());
        self.current_question = 0;
        self.remaining_secs = self.settings.quiz_seconds;
        self.next_capture_at = None;
        self.next_countdown_at = None;
        self.handoff_at = None;
        self.outcome = None;
        self.handed_off = false;
        self.phase = SessionPhase::Idle;
        Ok(())
    }

    fn on_inbound(&mut self, ev: MonitorEvent, now: Instant) {
        if !self.is_active() {
            return;
        }
        // The server's warning count is authoritative; adopt, never
        // increment locally.
        if let Some(count) = ev.warning_count {
            if count != self.warning_count {
                info!("warning count now {count}");
            }
            self.warning_count = count;
        }
        self.log.push(SessionEvent::from(&ev));

        if ev.kind == MonitorEventKind::TestTerminated {
            warn!("monitoring service terminated the session");
            self.terminate(Termination::Warnings, now);
        } else if self.warning_count >= self.settings.warning_threshold {
            warn!(
                "warning threshold reached ({}/{})",
                self.warning_count, self.settings.warning_threshold
            );
            self.terminate(Termination::Warnings, now);
        }
    }

    fn on_decode_failed(&mut self, err: String) {
        if !self.is_active() {
            return;
        }
        warn!("undecodable monitoring event: {err}");
        self.log
            .push(SessionEvent::error(format!("Malformed monitoring event: {err}")));
    }

    fn on_connection_closed(&mut self, now: Instant) {
        let unexpected = self.conn.mark_closed();
        self.next_capture_at = None;
        if self.is_active() && unexpected {
            self.log.push(SessionEvent::system(CONNECTION_LOST));
            self.conn.schedule_reconnect(now);
        }
    }

    fn on_user(&mut self, action: UserAction, now: Instant) {
        if !self.is_active() {
            return;
        }
        match action {
            UserAction::SelectOption(option) => {
                let in_range = self
                    .question()
                    .is_some_and(|q| option < q.options.len());
                if in_range {
                    self.answers.select(self.current_question, option);
                }
            }
            UserAction::NextQuestion => {
                if self.current_question + 1 < self.questions.len() {
                    self.current_question += 1;
                } else {
                    info!("question sequence finished");
                    self.terminate(Termination::Completed, now);
                }
            }
            UserAction::PreviousQuestion => {
                self.current_question = self.current_question.saturating_sub(1);
            }
        }
    }

    /// Single-transition latch into a terminal state. The first trigger
    /// wins; every later call is a no-op. Sequencing on entry: cancel the
    /// timers, close the connection (suppressing reconnection), compute the
    /// score, build the outcome, schedule the handoff.
    fn terminate(&mut self, kind: Termination, now: Instant) {
        if matches!(self.phase, SessionPhase::Terminal(_)) {
            return;
        }
        self.phase = SessionPhase::Terminal(kind);
        self.next_countdown_at = None;
        self.next_capture_at = None;
        self.conn.close();

        let score = self.answers.score(&self.questions);
        let terminated_by_proctoring = kind == Termination::Warnings;
        self.outcome = Some(SessionOutcome {
            answers: self.answers.as_slice().to_vec(),
            score,
            total_questions: self.questions.len(),
            time_spent_secs: self.settings.quiz_seconds - self.remaining_secs,
            terminated_by_proctoring,
            warning_count: self.warning_count,
        });
        info!("session terminal: {kind:?}, score {score}/{}", self.questions.len());

        // Warning-triggered terminations stay on screen for a moment before
        // the outcome is reported; normal completion reports immediately.
        let delay = if terminated_by_proctoring {
            self.settings.termination_display_delay
        } else {
            Duration::ZERO
        };
        self.handoff_at = Some(now + delay);
    }
}

/// Test double for the session-control endpoint.
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct TestSessionControl {
        pub calls: Arc<AtomicUsize>,
        pub fail: Arc<AtomicBool>,
    }

    impl TestSessionControl {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn fail_calls(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }
    }

    impl SessionControl for TestSessionControl {
        fn reset_remote(&mut self) -> Result<(), InvigilError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(InvigilError::WorkerGone);
            }
            Ok(())
        }
    }
}
