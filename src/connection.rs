//! Duplex connection to the monitoring service.
//!
//! The manager owns the connection state and the reconnection policy; the
//! socket itself lives on a worker thread that feeds decoded events into the
//! session queue, mirroring how the input thread feeds user actions. The
//! controller never touches the socket directly.

use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::InvigilError;
use crate::protocol;
use crate::runtime::SessionMsg;

/// How long the worker blocks in a socket read before checking its outbound
/// queue again.
const SOCKET_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Write half handed back by a connector; sends are best-effort.
pub trait FrameSink {
    fn send_frame(&mut self, bytes: Vec<u8>) -> Result<(), InvigilError>;
    fn close(&mut self);
}

/// Establishes a duplex connection and wires its read side into the session
/// queue. Trait seam so tests run without a live service.
pub trait Connector {
    fn connect(
        &mut self,
        url: &str,
        inbound: Sender<SessionMsg>,
    ) -> Result<Box<dyn FrameSink>, InvigilError>;
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Production connector: blocking tungstenite client with a reader worker.
#[derive(Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(
        &mut self,
        url: &str,
        inbound: Sender<SessionMsg>,
    ) -> Result<Box<dyn FrameSink>, InvigilError> {
        let (socket, _response) =
            tungstenite::connect(url).map_err(|source| InvigilError::MonitorConnect {
                url: url.to_string(),
                source: Box::new(source),
            })?;

        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            // Bounded reads so the worker can interleave outbound frames.
            let _ = stream.set_read_timeout(Some(SOCKET_POLL));
        }

        let (out_tx, out_rx) = mpsc::channel();
        thread::spawn(move || ws_worker(socket, out_rx, inbound));
        Ok(Box::new(WsSink { out_tx }))
    }
}

struct WsSink {
    out_tx: Sender<Outbound>,
}

impl FrameSink for WsSink {
    fn send_frame(&mut self, bytes: Vec<u8>) -> Result<(), InvigilError> {
        self.out_tx
            .send(Outbound::Frame(bytes))
            .map_err(|_| InvigilError::WorkerGone)
    }

    fn close(&mut self) {
        let _ = self.out_tx.send(Outbound::Close);
    }
}

fn ws_worker(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    out_rx: Receiver<Outbound>,
    inbound: Sender<SessionMsg>,
) {
    loop {
        loop {
            match out_rx.try_recv() {
                Ok(Outbound::Frame(bytes)) => {
                    if socket.send(Message::Binary(bytes)).is_err() {
                        let _ = inbound.send(SessionMsg::ConnectionClosed);
                        return;
                    }
                }
                Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => {
                    // Requested close: no closure notification, the manager
                    // already transitioned.
                    let _ = socket.close(None);
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(raw)) => {
                let msg = match protocol::decode_event(&raw) {
                    Ok(ev) => SessionMsg::Inbound(ev),
                    Err(err) => SessionMsg::DecodeFailed(err.to_string()),
                };
                if inbound.send(msg).is_err() {
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                let _ = inbound.send(SessionMsg::ConnectionClosed);
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(_) => {
                let _ = inbound.send(SessionMsg::ConnectionClosed);
                return;
            }
        }
    }
}

/// Owns the connection lifecycle: state, transport handle, and the
/// single-pending-attempt reconnection schedule.
pub struct ConnectionManager {
    url: String,
    connector: Box<dyn Connector>,
    inbound: Sender<SessionMsg>,
    state: ConnectionState,
    sink: Option<Box<dyn FrameSink>>,
    reconnect_delay: Duration,
    reconnect_at: Option<Instant>,
    closed_locally: bool,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        connector: Box<dyn Connector>,
        inbound: Sender<SessionMsg>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            inbound,
            state: ConnectionState::Disconnected,
            sink: None,
            reconnect_delay,
            reconnect_at: None,
            closed_locally: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Establish the duplex connection. Clears any pending reconnection
    /// first so a manual open never races a scheduled one.
    pub fn open(&mut self) -> Result<(), InvigilError> {
        self.reconnect_at = None;
        self.closed_locally = false;
        self.state = ConnectionState::Connecting;
        match self.connector.connect(&self.url, self.inbound.clone()) {
            Ok(sink) => {
                self.sink = Some(sink);
                self.state = ConnectionState::Open;
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Forward a frame while open; silently drop otherwise. Frames are
    /// near-real-time snapshots, so freshness beats completeness and there
    /// is no queueing.
    pub fn send_frame(&mut self, bytes: Vec<u8>) {
        if self.state != ConnectionState::Open {
            debug!("dropping frame: connection is {:?}", self.state);
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if sink.send_frame(bytes).is_err() {
                debug!("dropping frame: connection worker is gone");
            }
        }
    }

    /// Locally requested close; suppresses reconnection.
    pub fn close(&mut self) {
        self.closed_locally = true;
        self.reconnect_at = None;
        if let Some(mut sink) = self.sink.take() {
            self.state = ConnectionState::Closing;
            sink.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Record that the socket closed underneath us. Returns true when the
    /// closure was unexpected (not locally requested).
    pub fn mark_closed(&mut self) -> bool {
        self.sink = None;
        let unexpected = !self.closed_locally
            && matches!(
                self.state,
                ConnectionState::Open | ConnectionState::Connecting
            );
        self.state = ConnectionState::Disconnected;
        unexpected
    }

    /// Schedule exactly one reconnection attempt after the fixed delay.
    pub fn schedule_reconnect(&mut self, now: Instant) {
        if self.reconnect_at.is_none() {
            warn!(
                "monitoring connection lost; reconnecting in {:?}",
                self.reconnect_delay
            );
            self.reconnect_at = Some(now + self.reconnect_delay);
        }
    }

    pub fn cancel_reconnect(&mut self) {
        self.reconnect_at = None;
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_at.is_some()
    }

    pub fn reconnect_due(&self, now: Instant) -> bool {
        self.reconnect_at.is_some_and(|at| now >= at)
    }
}

/// Test connector: records connection attempts and captures sent frames.
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct TestConnector {
        pub attempts: Arc<AtomicUsize>,
        pub fail_next: Arc<AtomicBool>,
        pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
        pub closed: Arc<AtomicBool>,
    }

    impl TestConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        pub fn was_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn fail_next_connect(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }
    }

    impl Connector for TestConnector {
        fn connect(
            &mut self,
            url: &str,
            _inbound: Sender<SessionMsg>,
        ) -> Result<Box<dyn FrameSink>, InvigilError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(InvigilError::MonitorConnect {
                    url: url.to_string(),
                    source: Box::new(tungstenite::Error::ConnectionClosed),
                });
            }
            Ok(Box::new(TestSink {
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    pub struct TestSink {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: Arc<AtomicBool>,
    }

    impl FrameSink for TestSink {
        fn send_frame(&mut self, bytes: Vec<u8>) -> Result<(), InvigilError> {
            self.sent.lock().unwrap().push(bytes);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
