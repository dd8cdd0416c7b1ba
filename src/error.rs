// Error types for invigil

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvigilError {
    // Errors for the monitoring connection
    #[error("could not reach monitoring service at {url}")]
    MonitorConnect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("monitoring connection worker has shut down")]
    WorkerGone,

    // Errors for the question bank
    #[error("unknown quiz topic: {topic}")]
    UnknownTopic { topic: String },
    #[error("malformed question bank file: {file}")]
    QuestionBank {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    // Session lifecycle errors
    #[error("a session can only be started from the idle state")]
    AlreadyStarted,
    #[error("session reset is not allowed while a session is active")]
    ResetWhileActive,

    // Errors for the session-control endpoint
    #[error("proctoring reset call failed")]
    ResetCall {
        #[source]
        source: reqwest::Error,
    },
}
