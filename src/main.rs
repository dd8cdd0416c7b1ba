pub mod capture;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod event_log;
pub mod protocol;
pub mod quiz;
pub mod runtime;

use crate::{
    capture::{CaptureSource, DirectoryCapture, FrameEmitter, SyntheticCapture},
    config::{Config, ConfigStore, FileConfigStore},
    connection::{ConnectionManager, WsConnector},
    controller::{SessionController, SessionOutcome, SessionSettings},
    event_log::EventLog,
    protocol::HttpSessionControl,
    quiz::{Grade, QuestionBank},
    runtime::{ChannelMsgSource, FixedTicker, Runner, SessionMsg, UserAction},
};
use clap::Parser;
use itertools::Itertools;
use log::warn;
use std::{
    error::Error,
    io::{self, BufRead},
    path::PathBuf,
    sync::mpsc::{self, Sender},
    thread,
    time::{Duration, Instant},
};

const TICK_RATE_MS: u64 = 25;

/// proctored quiz client with live webcam monitoring
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal quiz client supervised by a remote proctoring service: webcam frames stream out on a fixed cadence while warnings, alerts, and termination decisions stream back in."
)]
pub struct Cli {
    /// host:port of the monitoring service
    #[clap(short = 's', long)]
    server: Option<String>,

    /// quiz topic to take
    #[clap(short = 't', long)]
    topic: Option<String>,

    /// quiz duration in seconds
    #[clap(long)]
    seconds: Option<u32>,

    /// directory of image files to use as the camera stand-in
    #[clap(short = 'd', long)]
    frames_dir: Option<PathBuf>,

    /// list the available quiz topics and exit
    #[clap(short = 'l', long)]
    list_topics: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(server) = &self.server {
            cfg.server = server.clone();
        }
        if let Some(topic) = &self.topic {
            cfg.topic = topic.clone();
        }
        if let Some(seconds) = self.seconds {
            cfg.quiz_seconds = seconds;
        }
        if let Some(dir) = &self.frames_dir {
            cfg.frames_dir = Some(dir.clone());
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    if cli.list_topics {
        for bank in QuestionBank::catalogue() {
            println!("{:<20} {} ({} questions)", bank.id, bank.name, bank.len());
        }
        return Ok(());
    }

    let mut cfg = FileConfigStore::new().load();
    cli.apply(&mut cfg);

    let bank = QuestionBank::load(&cfg.topic).map_err(|err| {
        let known = QuestionBank::catalogue().iter().map(|b| b.id.clone()).join(", ");
        format!("{err} (available: {known})")
    })?;

    let capture: Box<dyn CaptureSource> = match &cfg.frames_dir {
        Some(dir) => Box::new(DirectoryCapture::new(dir)?),
        None => Box::new(SyntheticCapture::new()),
    };

    let (tx, rx) = mpsc::channel();
    let conn = ConnectionManager::new(
        cfg.ws_url(),
        Box::new(WsConnector),
        tx.clone(),
        Duration::from_millis(cfg.reconnect_delay_ms),
    );
    let mut controller = SessionController::new(
        SessionSettings::from(&cfg),
        bank.questions.clone(),
        conn,
        FrameEmitter::new(capture),
        Box::new(HttpSessionControl::new(cfg.reset_url())),
    );

    spawn_input_thread(tx);

    println!("=== {} ===", bank.name);
    println!("{}", bank.description);
    println!(
        "{} questions, {} seconds. Answer with 1-4, (n)ext, (p)revious, (q)uit.\n",
        bank.len(),
        cfg.quiz_seconds
    );

    controller.start(Instant::now())?;
    print_question(&controller);

    let runner = Runner::new(
        ChannelMsgSource::new(rx),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    let mut printed_events = 0;
    let outcome = loop {
        let msg = runner.step();
        if matches!(msg, SessionMsg::Quit) {
            println!("Session abandoned.");
            return Ok(());
        }
        let navigated = matches!(
            msg,
            SessionMsg::User(UserAction::NextQuestion | UserAction::PreviousQuestion)
        );
        let now = Instant::now();
        controller.handle(msg, now);

        printed_events = print_new_events(controller.log(), printed_events);
        if navigated && controller.is_active() {
            print_question(&controller);
        }
        if let Some(outcome) = controller.advance(now) {
            break outcome;
        }
    };

    print_outcome(&outcome, bank.questions.len());
    Ok(())
}

/// Reads quiz commands from stdin on a dedicated thread, mirroring how the
/// connection worker feeds the same queue from the network side.
fn spawn_input_thread(tx: Sender<SessionMsg>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let msg = match line.trim() {
                "" => continue,
                "n" | "next" => SessionMsg::User(UserAction::NextQuestion),
                "p" | "prev" | "previous" => SessionMsg::User(UserAction::PreviousQuestion),
                "q" | "quit" => SessionMsg::Quit,
                other => match other.parse::<usize>() {
                    Ok(n) if n >= 1 => SessionMsg::User(UserAction::SelectOption(n - 1)),
                    _ => {
                        warn!("unrecognized command: {other}");
                        continue;
                    }
                },
            };
            let quit = matches!(msg, SessionMsg::Quit);
            if tx.send(msg).is_err() || quit {
                break;
            }
        }
    });
}

fn print_new_events(log: &EventLog, printed: usize) -> usize {
    // The tail of the log may have been coalesced rather than appended, so
    // clamp before printing what is genuinely new.
    let printed = printed.min(log.len());
    for event in &log.entries()[printed..] {
        println!(
            "[{}] {}: {}",
            event.timestamp.format("%H:%M:%S"),
            event.kind,
            event.message
        );
    }
    log.len()
}

fn print_question(controller: &SessionController) {
    let Some(question) = controller.question() else {
        return;
    };
    let index = controller.current_question();
    println!(
        "\nQuestion {}/{}: {}",
        index + 1,
        controller.questions().len(),
        question.prompt
    );
    for (i, option) in question.options.iter().enumerate() {
        let marker = if controller.answers().get(index) == Some(i) {
            "*"
        } else {
            " "
        };
        println!(" {marker}{}. {option}", i + 1);
    }
}

fn print_outcome(outcome: &SessionOutcome, total: usize) {
    let grade = Grade::from_score(outcome.score, total);
    let percentage = if total == 0 {
        0
    } else {
        outcome.score * 100 / total
    };

    println!("\n=== Quiz Results ===");
    if outcome.terminated_by_proctoring {
        println!(
            "Test terminated by the proctoring system ({} warnings).",
            outcome.warning_count
        );
    }
    println!("Score: {}/{} ({percentage}%)", outcome.score, total);
    println!("Grade: {} - {}", grade.letter, grade.message);
    println!("Time spent: {}s", outcome.time_spent_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["invigil"]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);

        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn cli_overrides_take_effect() {
        let cli = Cli::parse_from([
            "invigil",
            "-s",
            "exam.example.org:9000",
            "-t",
            "dsa",
            "--seconds",
            "300",
            "-d",
            "/tmp/frames",
        ]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);

        assert_eq!(cfg.server, "exam.example.org:9000");
        assert_eq!(cfg.topic, "dsa");
        assert_eq!(cfg.quiz_seconds, 300);
        assert_eq!(cfg.frames_dir, Some(PathBuf::from("/tmp/frames")));
    }

    #[test]
    fn cli_long_flags_parse() {
        let cli = Cli::parse_from(["invigil", "--server", "h:1", "--topic", "os"]);
        assert_eq!(cli.server.as_deref(), Some("h:1"));
        assert_eq!(cli.topic.as_deref(), Some("os"));
        assert!(!cli.list_topics);
    }

    #[test]
    fn list_topics_flag_parses() {
        let cli = Cli::parse_from(["invigil", "--list-topics"]);
        assert!(cli.list_topics);
    }
}
