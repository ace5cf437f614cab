//! Chat session management - the duplex loop
//!
//! One spawned task receives and decrypts frames, the caller's task reads
//! local input and sends. Both watch one `ShutdownSignal`; `run` returns only
//! after the receive task has stopped.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crypto_session::SessionCipher;
use net_transport::{FrameReader, FrameWriter};
use shared_protocol::{
    DecryptFailurePolicy, Directive, EXIT_SENTINEL, InputLine, MessageFrame, SessionConfig,
    SessionId, SessionRole, SessionState, ShutdownReason,
};

/// Source of locally typed lines; `None` means end of input
#[async_trait]
pub trait LineSource: Send {
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

#[async_trait]
impl LineSource for mpsc::Receiver<String> {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.recv().await)
    }
}

#[async_trait]
impl LineSource for mpsc::UnboundedReceiver<String> {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.recv().await)
    }
}

/// Everything a renderer needs to show about a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Decrypted text from the peer
    PeerMessage(String),
    /// Peer sent the exit sentinel
    PeerExited,
    /// Peer closed the connection without saying goodbye
    PeerDisconnected,
    /// Local line equal to the exit sentinel was refused
    ReservedInput,
    Help,
    ClearScreen,
    /// A frame could not be decrypted
    DecryptionFailed { terminating: bool },
    /// Encrypted message would not fit in the peer's receive buffer
    MessageTooLong { size: usize, max: usize },
    SendError(String),
    ReceiveError(String),
}

/// Cancellation shared by both halves of a session
///
/// The first reason recorded wins; later triggers only re-cancel.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    token: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
    state: RwLock<SessionState>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                token: CancellationToken::new(),
                reason: Mutex::new(None),
                state: RwLock::new(SessionState::Running),
            }),
        }
    }

    /// Request shutdown; returns true if this call recorded the reason
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = {
            let mut slot = self.inner.reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
                true
            } else {
                false
            }
        };

        if first {
            let mut state = self.inner.state.write();
            if let Ok(next) = state.transition(SessionState::ShuttingDown) {
                *state = next;
            }
        }

        self.inner.token.cancel();
        first
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.inner.reason.lock()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    fn close(&self) {
        let mut state = self.inner.state.write();
        match state.transition(SessionState::Closed) {
            Ok(next) => *state = next,
            Err(e) => warn!("Closing session: {}", e),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Outside view of a session, usable while `run` is in progress
#[derive(Clone)]
pub struct SessionHandle {
    signal: ShutdownSignal,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.signal.state()
    }

    /// Stop the session from outside (Ctrl+C)
    pub fn shutdown(&self) {
        if self.signal.trigger(ShutdownReason::Cancelled) {
            info!("Session shutdown requested");
        }
    }
}

/// Summary returned once a session has closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: SessionId,
    pub role: SessionRole,
    pub reason: ShutdownReason,
    pub sent: u64,
    pub received: u64,
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct ReceiveStats {
    received: u64,
    skipped: u64,
}

type EventSink = Arc<dyn Fn(ChatEvent) + Send + Sync>;

/// One encrypted conversation over an established stream
pub struct ChatSession<S> {
    id: SessionId,
    stream: S,
    cipher: Arc<SessionCipher>,
    role: SessionRole,
    config: SessionConfig,
    signal: ShutdownSignal,
}

impl<S> ChatSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, cipher: SessionCipher, role: SessionRole, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            stream,
            cipher: Arc::new(cipher),
            role,
            config,
            signal: ShutdownSignal::new(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            signal: self.signal.clone(),
        }
    }

    /// Run until either side ends the session
    ///
    /// Returns after the receive task has stopped and the session is `Closed`.
    pub async fn run<I, F>(self, input: &mut I, on_event: F) -> SessionReport
    where
        I: LineSource + ?Sized,
        F: Fn(ChatEvent) + Send + Sync + 'static,
    {
        let Self {
            id,
            stream,
            cipher,
            role,
            config,
            signal,
        } = self;
        let on_event: EventSink = Arc::new(on_event);

        info!("[{}] Session started as {}", id, role);

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FrameReader::new(read_half, config.framing, config.receive_buffer_size);
        let mut writer = FrameWriter::new(write_half, config.framing);

        let receiver = tokio::spawn(receive_loop(
            id,
            reader,
            cipher.clone(),
            config.decrypt_failure_policy,
            signal.clone(),
            on_event.clone(),
        ));

        let max_frame = config.receive_buffer_size;
        let mut sent = 0u64;

        loop {
            let line = tokio::select! {
                biased;
                _ = signal.cancelled() => break,
                line = input.read_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("[{}] Input closed", id);
                    send_exit(id, &mut writer, &cipher).await;
                    signal.trigger(ShutdownReason::InputClosed);
                    break;
                }
                Err(e) => {
                    warn!("[{}] Failed to read input: {}", id, e);
                    send_exit(id, &mut writer, &cipher).await;
                    signal.trigger(ShutdownReason::InputClosed);
                    break;
                }
            };

            match InputLine::classify(&line) {
                InputLine::Empty => {}
                InputLine::Directive(Directive::Quit) => {
                    send_exit(id, &mut writer, &cipher).await;
                    signal.trigger(ShutdownReason::LocalQuit);
                    break;
                }
                InputLine::Directive(Directive::Help) => on_event(ChatEvent::Help),
                InputLine::Directive(Directive::Clear) => on_event(ChatEvent::ClearScreen),
                InputLine::Reserved => on_event(ChatEvent::ReservedInput),
                InputLine::Message(text) => {
                    let frame = cipher.encrypt(&text);
                    if frame.len() > max_frame {
                        on_event(ChatEvent::MessageTooLong {
                            size: frame.len(),
                            max: max_frame,
                        });
                        continue;
                    }

                    if let Err(e) = writer.write_frame(frame.as_bytes()).await {
                        error!("[{}] Send failed: {}", id, e);
                        on_event(ChatEvent::SendError(e.to_string()));
                        signal.trigger(ShutdownReason::SendFailed);
                        break;
                    }
                    sent += 1;
                }
            }
        }

        // Rendezvous with the receive task
        let stats = match receiver.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("[{}] Receive task failed: {}", id, e);
                ReceiveStats::default()
            }
        };

        if let Err(e) = writer.shutdown().await {
            debug!("[{}] Stream shutdown: {}", id, e);
        }
        drop(writer);
        signal.close();

        let reason = signal.reason().unwrap_or(ShutdownReason::Cancelled);
        info!(
            "[{}] Session closed: {:?} (sent {}, received {}, skipped {})",
            id, reason, sent, stats.received, stats.skipped
        );

        SessionReport {
            id,
            role,
            reason,
            sent,
            received: stats.received,
            skipped: stats.skipped,
        }
    }
}

async fn receive_loop<R>(
    id: SessionId,
    mut reader: FrameReader<R>,
    cipher: Arc<SessionCipher>,
    policy: DecryptFailurePolicy,
    signal: ShutdownSignal,
    on_event: EventSink,
) -> ReceiveStats
where
    R: AsyncRead + Unpin,
{
    let mut stats = ReceiveStats::default();

    loop {
        let frame = tokio::select! {
            biased;
            _ = signal.cancelled() => break,
            frame = reader.read_frame() => frame,
        };

        let frame = match frame {
            Ok(Some(bytes)) => MessageFrame::new(bytes),
            Ok(None) => {
                info!("[{}] Peer closed the connection", id);
                on_event(ChatEvent::PeerDisconnected);
                signal.trigger(ShutdownReason::PeerClosed);
                break;
            }
            Err(e) => {
                error!("[{}] Receive failed: {}", id, e);
                on_event(ChatEvent::ReceiveError(e.to_string()));
                signal.trigger(ShutdownReason::ReceiveFailed);
                break;
            }
        };

        match cipher.decrypt(&frame) {
            Ok(text) if text == EXIT_SENTINEL => {
                info!("[{}] Peer left the chat", id);
                on_event(ChatEvent::PeerExited);
                signal.trigger(ShutdownReason::PeerExited);
                break;
            }
            Ok(text) => {
                stats.received += 1;
                on_event(ChatEvent::PeerMessage(text));
            }
            Err(e) => {
                let terminating = policy == DecryptFailurePolicy::Terminate;
                warn!("[{}] Dropping {} byte frame: {}", id, frame.len(), e);
                on_event(ChatEvent::DecryptionFailed { terminating });

                if terminating {
                    signal.trigger(ShutdownReason::DecryptionFailed);
                    break;
                }
                stats.skipped += 1;
            }
        }
    }

    debug!("[{}] Receive loop stopped", id);
    stats
}

/// Best effort; the session ends either way
async fn send_exit<W>(id: SessionId, writer: &mut FrameWriter<W>, cipher: &SessionCipher)
where
    W: AsyncWrite + Unpin,
{
    let frame = cipher.encrypt(EXIT_SENTINEL);
    if let Err(e) = writer.write_frame(frame.as_bytes()).await {
        debug!("[{}] Exit notice not delivered: {}", id, e);
    }
}
