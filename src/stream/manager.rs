//! Connection and turn lifecycle management.
//!
//! [`ConnectionManager`] owns the duplex channel for one conversation. It
//! decodes inbound bytes, runs them through the [`EventReceiver`], forwards
//! every event to the active inbound sequence and keeps a response deadline
//! armed while an approval cycle is open.
//!
//! An inbound sequence is the per-turn event stream handed to the caller.
//! A new one is opened whenever the previous turn has closed; otherwise an
//! outbound turn reuses the sequence that is still being fed.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::models::TurnRequest;
use crate::sse::{FrameDecoder, ProtocolEvent};
use crate::traits::DuplexChannel;
use crate::websocket::EventSender;

use super::receiver::{EventReceiver, ReceiverSignal, ReceiverState};

/// Item delivered on an inbound sequence.
pub type SequenceItem = Result<ProtocolEvent, StreamError>;

/// Timing knobs for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long an approval cycle may stay open before it is failed.
    pub response_timeout: Duration,
    /// Ping interval; `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(60),
            keepalive_interval: Some(Duration::from_secs(30)),
        }
    }
}

struct InboundSequence {
    id: u64,
    tx: mpsc::UnboundedSender<SequenceItem>,
}

/// Outcome of starting a turn.
#[derive(Debug)]
pub enum TurnSequence {
    /// A fresh inbound sequence; events for this turn arrive on `events`.
    Opened {
        id: u64,
        events: mpsc::UnboundedReceiver<SequenceItem>,
    },
    /// The existing sequence keeps receiving this turn's events.
    Reused { id: u64 },
}

impl TurnSequence {
    pub fn id(&self) -> u64 {
        match self {
            TurnSequence::Opened { id, .. } | TurnSequence::Reused { id } => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, TurnSequence::Opened { .. })
    }
}

/// What one [`ConnectionManager::pump`] step did.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpOutcome {
    /// A chunk was decoded into this many events.
    Ingested(usize),
    /// A keepalive tick fired; `true` if the ping was written.
    KeepaliveSent(bool),
    /// The approval deadline expired.
    TimedOut(StreamError),
    /// The inbound byte channel closed.
    Disconnected,
}

/// Owns the duplex channel and the per-turn inbound sequence.
pub struct ConnectionManager {
    channel: Arc<dyn DuplexChannel>,
    sender: EventSender,
    decoder: FrameDecoder,
    receiver: EventReceiver,
    sequence: Option<InboundSequence>,
    next_sequence_id: u64,
    config: ManagerConfig,
    deadline: Option<Pin<Box<Sleep>>>,
    keepalive: Option<Interval>,
}

impl ConnectionManager {
    pub fn new(channel: Arc<dyn DuplexChannel>, config: ManagerConfig) -> Self {
        Self::with_receiver(channel, config, EventReceiver::new())
    }

    /// Use a receiver with callbacks already attached.
    pub fn with_receiver(
        channel: Arc<dyn DuplexChannel>,
        config: ManagerConfig,
        receiver: EventReceiver,
    ) -> Self {
        Self {
            channel,
            sender: EventSender::new(),
            decoder: FrameDecoder::new(),
            receiver,
            sequence: None,
            next_sequence_id: 1,
            config,
            deadline: None,
            keepalive: None,
        }
    }

    pub fn channel(&self) -> &Arc<dyn DuplexChannel> {
        &self.channel
    }

    pub fn sender(&self) -> &EventSender {
        &self.sender
    }

    pub fn receiver_state(&self) -> ReceiverState {
        self.receiver.state()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// True while the approval response deadline is armed.
    pub fn deadline_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Id of the inbound sequence currently being fed, if any.
    pub fn active_sequence(&self) -> Option<u64> {
        self.sequence.as_ref().map(|seq| seq.id)
    }

    /// Swap in a new channel after a reconnect.
    ///
    /// Bytes buffered from the old socket belong to a frame that will never
    /// complete, so the decoder is cleared.
    pub fn replace_channel(&mut self, channel: Arc<dyn DuplexChannel>) {
        info!("Replacing duplex channel");
        self.channel = channel;
        self.decoder.reset();
    }

    /// Decide between a fresh inbound sequence and the current one.
    pub fn begin_turn(&mut self) -> TurnSequence {
        let needs_new = self.receiver.state().turn_closed
            || self.sequence.as_ref().map_or(true, |seq| seq.tx.is_closed());

        if !needs_new {
            if let Some(seq) = &self.sequence {
                debug!(sequence_id = seq.id, "Reusing inbound sequence");
                return TurnSequence::Reused { id: seq.id };
            }
        }

        self.receiver.reset();
        self.deadline = None;

        let id = self.next_sequence_id;
        self.next_sequence_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.sequence = Some(InboundSequence { id, tx });
        debug!(sequence_id = id, "Opened inbound sequence");

        TurnSequence::Opened { id, events: rx }
    }

    /// Send a turn and return the sequence its events arrive on.
    ///
    /// Fails without touching any state if the channel is not open or the
    /// write fails.
    pub fn submit(&mut self, request: &TurnRequest) -> Result<TurnSequence, StreamError> {
        if !self.channel.ready_state().is_open() {
            return Err(StreamError::ConnectionLost {
                message: "duplex channel is not open".to_string(),
            });
        }

        if !self.sender.send_turn(self.channel.as_ref(), request) {
            return Err(StreamError::ConnectionLost {
                message: "failed to write turn to duplex channel".to_string(),
            });
        }
        // Replies only arrive through a later `ingest`, so opening the
        // sequence after the write loses nothing.
        Ok(self.begin_turn())
    }

    /// Feed one inbound chunk. Returns the number of events decoded.
    pub fn ingest(&mut self, chunk: &[u8]) -> usize {
        let events = self.decoder.decode(chunk);
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    /// Flush a trailing unterminated frame at end of input.
    pub fn finish_inbound(&mut self) -> usize {
        let events = self.decoder.finish();
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    fn dispatch(&mut self, event: ProtocolEvent) {
        match self.receiver.observe(&event) {
            Some(ReceiverSignal::ApprovalRequested(_)) => {
                debug!(
                    timeout_secs = self.config.response_timeout.as_secs(),
                    "Arming approval response deadline"
                );
                self.deadline = Some(Box::pin(tokio::time::sleep(
                    self.config.response_timeout,
                )));
            }
            Some(ReceiverSignal::ApprovalStreamClosed) => {
                debug!("Disarming approval response deadline");
                self.deadline = None;
            }
            Some(ReceiverSignal::TurnClosed) | None => {}
        }

        match &self.sequence {
            Some(seq) => {
                if seq.tx.send(Ok(event)).is_err() {
                    debug!(sequence_id = seq.id, "Sequence receiver dropped, discarding event");
                }
            }
            None => {
                debug!(
                    event_type = event.event_type_name(),
                    "No inbound sequence, discarding event"
                );
            }
        }
    }

    /// Resolves when the approval deadline expires; pending forever if unarmed.
    pub async fn deadline_elapsed(&mut self) {
        wait_deadline(&mut self.deadline).await
    }

    /// Fail the pending approval cycle.
    ///
    /// The error goes to the current sequence, which is then closed, and is
    /// returned to the caller. The next turn opens a fresh sequence.
    pub fn expire_approval(&mut self) -> StreamError {
        let err = StreamError::ApprovalTimeout {
            duration_secs: self.config.response_timeout.as_secs(),
        };
        warn!("{}", err);
        self.end_sequence(err.clone());
        err
    }

    /// Cancel the in-flight turn.
    ///
    /// Returns whether the interrupt frame was written.
    pub fn interrupt(&mut self, reason: Option<&str>) -> bool {
        let sent = self.sender.send_interrupt(self.channel.as_ref(), reason);
        self.end_sequence(StreamError::Interrupted {
            reason: reason.map(str::to_string),
        });
        sent
    }

    /// Send one ping frame.
    pub fn keepalive(&self) -> bool {
        self.sender.send_ping(self.channel.as_ref())
    }

    fn end_sequence(&mut self, err: StreamError) {
        self.deadline = None;
        if let Some(seq) = self.sequence.take() {
            debug!(sequence_id = seq.id, error = %err, "Closing inbound sequence");
            let _ = seq.tx.send(Err(err));
        }
        self.receiver.reset();
    }

    /// Wait for the next inbound chunk, deadline expiry or keepalive tick
    /// and handle it.
    pub async fn pump(&mut self, incoming: &mut mpsc::Receiver<Bytes>) -> PumpOutcome {
        if self.keepalive.is_none() {
            if let Some(period) = self.config.keepalive_interval {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.keepalive = Some(interval);
            }
        }

        tokio::select! {
            chunk = incoming.recv() => match chunk {
                Some(bytes) => PumpOutcome::Ingested(self.ingest(&bytes)),
                None => {
                    self.finish_inbound();
                    info!("Inbound channel closed");
                    self.end_sequence(StreamError::ConnectionLost {
                        message: "inbound channel closed".to_string(),
                    });
                    PumpOutcome::Disconnected
                }
            },
            _ = wait_deadline(&mut self.deadline) => {
                PumpOutcome::TimedOut(self.expire_approval())
            }
            _ = wait_tick(&mut self.keepalive) => {
                PumpOutcome::KeepaliveSent(self.keepalive())
            }
        }
    }
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
