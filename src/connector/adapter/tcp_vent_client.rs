use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, Framed};
use tracing::{debug, info, warn};

use crate::application::{ControllerConnector, ControllerNotice, VentController};
use crate::domain::{
    ControllerMessage, CscConfig, DomainError, Inbound, VentCommand, REQUEST_TERMINATOR,
};

/// Longest line accepted from either side of the link.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec for the vent controller link: frames end at `\r` or `\n`, outgoing
/// frames are terminated with `\r\n`. The empty frame between `\r` and `\n`
/// is left for the reader to skip.
pub fn controller_codec() -> AnyDelimiterCodec {
    let terminator = REQUEST_TERMINATOR.as_bytes().to_vec();
    AnyDelimiterCodec::new_with_max_length(terminator.clone(), terminator, MAX_LINE_LENGTH)
}

type LineSink = SplitSink<Framed<TcpStream, AnyDelimiterCodec>, String>;
type LineStream = SplitStream<Framed<TcpStream, AnyDelimiterCodec>>;
type PendingResponse = Arc<Mutex<Exchange>>;

/// Request/response bookkeeping shared with the reader task.
///
/// The controller answers requests in order, so a reply that arrives after
/// its request timed out precedes the reply to any later request.
#[derive(Default)]
struct Exchange {
    waiter: Option<oneshot::Sender<ControllerMessage>>,
    /// Commands that timed out and may still be answered, oldest first.
    abandoned: VecDeque<&'static str>,
}

enum Claim {
    Waiter(oneshot::Sender<ControllerMessage>),
    Late,
    Unsolicited,
}

impl Exchange {
    fn claim(&mut self, response: &ControllerMessage) -> Claim {
        if self
            .abandoned
            .front()
            .is_some_and(|command| *command == response.command)
        {
            self.abandoned.pop_front();
            return Claim::Late;
        }
        // Answering a newer request means the abandoned ones were dropped.
        self.abandoned.clear();
        match self.waiter.take() {
            Some(waiter) => Claim::Waiter(waiter),
            None => Claim::Unsolicited,
        }
    }
}

/// Client side of the vent controller TCP link.
///
/// A background task reads every line from the controller. Command
/// responses complete the request waiting in [`VentController::send`];
/// events and telemetry go out through the notice channel.
pub struct TcpVentClient {
    peer: String,
    read_timeout: Duration,
    /// Held for the whole request/response exchange, one command at a time.
    writer: Mutex<LineSink>,
    pending: PendingResponse,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpVentClient {
    pub fn start(
        stream: TcpStream,
        read_timeout: Duration,
        notices: mpsc::UnboundedSender<ControllerNotice>,
    ) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (sink, lines) = Framed::new(stream, controller_codec()).split();

        let pending: PendingResponse = Arc::new(Mutex::new(Exchange::default()));
        let connected = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            lines,
            pending.clone(),
            connected.clone(),
            closing.clone(),
            notices,
        ));

        Self {
            peer,
            read_timeout,
            writer: Mutex::new(sink),
            pending,
            connected,
            closing,
            reader_task: Mutex::new(Some(reader_task)),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

#[async_trait]
impl VentController for TcpVentClient {
    async fn send(&self, command: &VentCommand) -> Result<ControllerMessage, DomainError> {
        let mut writer = self.writer.lock().await;
        if !self.is_connected() {
            return Err(DomainError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.waiter = Some(tx);

        let line = command.to_line();
        debug!("-> {}", line);
        if let Err(e) = writer.send(line).await {
            self.pending.lock().await.waiter.take();
            return Err(DomainError::connection(format!(
                "Failed to write to {}: {}",
                self.peer, e
            )));
        }

        match tokio::time::timeout(self.read_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DomainError::NotConnected),
            Err(_) => {
                let mut exchange = self.pending.lock().await;
                exchange.waiter.take();
                exchange.abandoned.push_back(command.name());
                Err(DomainError::timeout(format!(
                    "No response to {} within {:?}",
                    command.name(),
                    self.read_timeout
                )))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        // Fails any request still waiting, which releases the writer.
        self.pending.lock().await.waiter.take();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!("Error closing connection to {}: {}", self.peer, e);
        }
        info!("Closed connection to {}", self.peer);
    }
}

async fn read_loop(
    mut lines: LineStream,
    pending: PendingResponse,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    notices: mpsc::UnboundedSender<ControllerNotice>,
) {
    let reason = loop {
        let frame = match lines.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => break format!("read failed: {}", e),
            None => break "connection closed by controller".to_string(),
        };

        let text = String::from_utf8_lossy(&frame);
        let line = text.trim();
        if line.is_empty() {
            continue;
        }
        debug!("<- {}", line);

        match ControllerMessage::parse(line).and_then(ControllerMessage::into_inbound) {
            Ok(Inbound::Response(response)) => {
                let claim = pending.lock().await.claim(&response);
                match claim {
                    Claim::Waiter(waiter) => {
                        // The requester may have timed out meanwhile.
                        let _ = waiter.send(response);
                    }
                    Claim::Late => debug!("Discarding late response to {}", response.command),
                    Claim::Unsolicited => warn!("Unsolicited response to {}", response.command),
                }
            }
            Ok(Inbound::Event(event)) => {
                if notices.send(ControllerNotice::Event(event)).is_err() {
                    debug!("No listener for controller events");
                }
            }
            Err(e) => warn!("Skipping controller line {:?}: {}", line, e),
        }
    };

    connected.store(false, Ordering::SeqCst);
    pending.lock().await.waiter.take();

    if !closing.load(Ordering::SeqCst) {
        warn!("Vent controller link down: {}", reason);
        let _ = notices.send(ControllerNotice::Disconnected(reason));
    }
}

/// Opens [`TcpVentClient`] connections using the configured timeouts.
#[derive(Debug, Default, Clone)]
pub struct TcpControllerConnector;

impl TcpControllerConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ControllerConnector for TcpControllerConnector {
    async fn connect(
        &self,
        config: &CscConfig,
        notices: mpsc::UnboundedSender<ControllerNotice>,
    ) -> Result<Arc<dyn VentController>, DomainError> {
        let address = (config.host.as_str(), config.port);
        let stream = tokio::time::timeout(config.connection_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| {
                DomainError::timeout(format!(
                    "Connecting to {}:{} took longer than {:?}",
                    config.host,
                    config.port,
                    config.connection_timeout()
                ))
            })?
            .map_err(|e| {
                DomainError::connection(format!(
                    "Cannot connect to {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }

        let client = TcpVentClient::start(stream, config.read_timeout(), notices);
        info!("Connected to vent controller {}", client.peer());
        Ok(Arc::new(client))
    }
}
