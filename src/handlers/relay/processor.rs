//! Per-connection ConversationRelay state machine.
//!
//! A [`CallRelay`] owns one socket's view of a call: which call SID it is bound
//! to, the completion stream currently producing a reply, and any events that
//! arrived while that reply was still streaming. The transcript itself lives in
//! the shared [`SessionStore`].
//!
//! Lifecycle: `Idle --setup--> Active --disconnect/shutdown--> Closed`.
//! While a reply is streaming, `setup` and `prompt` events are queued in
//! arrival order and processed once the reply is committed. `interrupt` is
//! applied immediately.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::llm::{BoxedCompletion, CompletionError, CompletionResult, CompletionStream, TextDelta};
use crate::core::session::{SessionStore, Turn};
use crate::errors::{RelayError, RelayResult};

use super::messages::{InboundEvent, MessageRoute, OutgoingMessage, parse_inbound};

/// Connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    /// Socket open, no `setup` seen yet
    Idle,
    /// Bound to a call
    Active { call_sid: String },
    /// Torn down; session entry removed
    Closed,
}

/// Reply currently being streamed back to the caller.
struct InFlightResponse {
    call_sid: String,
    stream: CompletionStream,
    /// Every delta forwarded so far
    buffer: String,
    /// Set by an interrupt; replaces `buffer` on commit
    heard_prefix: Option<String>,
}

fn violation(reason: impl Into<String>) -> RelayError {
    RelayError::ProtocolViolation(reason.into())
}

/// Relay for a single ConversationRelay socket.
pub struct CallRelay {
    sessions: SessionStore,
    completion: BoxedCompletion,
    system_prompt: Arc<str>,
    outbound: mpsc::Sender<MessageRoute>,
    state: RelayState,
    in_flight: Option<InFlightResponse>,
    pending: VecDeque<InboundEvent>,
}

impl CallRelay {
    pub fn new(
        sessions: SessionStore,
        completion: BoxedCompletion,
        system_prompt: impl Into<Arc<str>>,
        outbound: mpsc::Sender<MessageRoute>,
    ) -> Self {
        Self {
            sessions,
            completion,
            system_prompt: system_prompt.into(),
            outbound,
            state: RelayState::Idle,
            in_flight: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Call SID this connection is bound to, if any.
    pub fn call_sid(&self) -> Option<&str> {
        match &self.state {
            RelayState::Active { call_sid } => Some(call_sid),
            _ => None,
        }
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Events waiting for the in-flight reply to finish.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drive the relay until the inbound stream ends, the outbound side fails,
    /// or `shutdown` is cancelled. The session entry is removed on every exit
    /// path.
    pub async fn run<S>(mut self, mut inbound: S, shutdown: CancellationToken)
    where
        S: Stream<Item = String> + Unpin,
    {
        loop {
            select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(
                        call_sid = self.call_sid().unwrap_or("-"),
                        "Shutdown requested, closing ConversationRelay connection"
                    );
                    if let Err(e) = self.outbound.try_send(MessageRoute::Close) {
                        warn!(
                            call_sid = self.call_sid().unwrap_or("-"),
                            error = %e,
                            "Could not queue close frame"
                        );
                    }
                    break;
                }

                frame = inbound.next() => {
                    let Some(raw) = frame else {
                        info!(
                            call_sid = self.call_sid().unwrap_or("-"),
                            "ConversationRelay connection closed by client"
                        );
                        break;
                    };

                    let result = self.handle_text(&raw);
                    if !self.report(result) {
                        break;
                    }
                }

                item = self.next_stream_item(), if self.is_streaming() => {
                    let result = self.on_stream_item(item).await;
                    if !self.report(result) {
                        break;
                    }
                    self.drain_pending();
                }
            }
        }

        self.close();
    }

    /// Decode and apply one raw socket payload.
    pub fn handle_text(&mut self, raw: &str) -> RelayResult<()> {
        let event = parse_inbound(raw);
        debug!(kind = event.kind(), bytes = raw.len(), "Received relay message");
        self.handle_event(event)
    }

    /// Apply one decoded event.
    pub fn handle_event(&mut self, event: InboundEvent) -> RelayResult<()> {
        if self.state == RelayState::Closed {
            return Err(violation("relay is closed"));
        }

        match event {
            InboundEvent::Malformed { reason } => Err(violation(format!("malformed message: {reason}"))),
            InboundEvent::Unrecognized { message_type } => {
                Err(violation(format!("unrecognized message type '{message_type}'")))
            }
            InboundEvent::Interrupt {
                utterance_until_interrupt,
            } => self.on_interrupt(utterance_until_interrupt),
            event if self.in_flight.is_some() => {
                debug!(
                    kind = event.kind(),
                    queued = self.pending.len() + 1,
                    "Reply in flight, queueing event"
                );
                self.pending.push_back(event);
                Ok(())
            }
            InboundEvent::Setup { call_sid } => self.on_setup(call_sid),
            InboundEvent::Prompt { voice_prompt } => self.on_prompt(voice_prompt),
        }
    }

    /// Tear down: cancel the in-flight stream, drop queued events and remove
    /// the session entry. Idempotent.
    pub fn close(&mut self) {
        if self.state == RelayState::Closed {
            return;
        }

        if let Some(response) = self.in_flight.take() {
            debug!(call_sid = %response.call_sid, "Cancelling in-flight completion");
        }
        self.pending.clear();

        if let RelayState::Active { call_sid } = std::mem::replace(&mut self.state, RelayState::Closed) {
            let removed = self.sessions.remove(&call_sid);
            info!(call_sid = %call_sid, removed, "Call session closed");
        }
    }

    fn active_call_sid(&self, kind: &str) -> RelayResult<String> {
        self.call_sid()
            .map(str::to_string)
            .ok_or_else(|| violation(format!("{kind} received before setup")))
    }

    fn on_setup(&mut self, call_sid: String) -> RelayResult<()> {
        if call_sid.is_empty() {
            return Err(violation("setup message without callSid"));
        }

        if let RelayState::Active { call_sid: previous } = &self.state
            && *previous != call_sid
        {
            self.sessions.remove(previous);
            info!(previous = %previous, call_sid = %call_sid, "Rebinding connection to a new call");
        }

        self.sessions.create(&call_sid, &self.system_prompt);
        info!(call_sid = %call_sid, "Call session started");
        self.state = RelayState::Active { call_sid };
        Ok(())
    }

    fn on_prompt(&mut self, voice_prompt: String) -> RelayResult<()> {
        let call_sid = self.active_call_sid("prompt")?;

        let text = voice_prompt.trim();
        if text.is_empty() {
            return Err(violation("empty voicePrompt"));
        }

        self.sessions.append_turn(&call_sid, Turn::user(text))?;
        let transcript = self.sessions.snapshot(&call_sid)?;

        info!(
            call_sid = %call_sid,
            turns = transcript.len(),
            provider = self.completion.name(),
            "Opening completion stream"
        );

        let stream = self.completion.open(transcript);
        self.in_flight = Some(InFlightResponse {
            call_sid,
            stream,
            buffer: String::new(),
            heard_prefix: None,
        });
        Ok(())
    }

    fn on_interrupt(&mut self, heard: String) -> RelayResult<()> {
        let call_sid = self.active_call_sid("interrupt")?;

        if heard.trim().is_empty() {
            debug!(call_sid = %call_sid, "Ignoring interrupt with empty utterance");
            return Ok(());
        }

        if self.sessions.truncate_assistant(&call_sid, &heard)? {
            info!(call_sid = %call_sid, heard_bytes = heard.len(), "Truncated assistant reply");
        } else {
            debug!(call_sid = %call_sid, "Interrupt with no committed assistant reply");
        }

        // The in-flight reply commits only what the caller heard
        if let Some(response) = self.in_flight.as_mut() {
            info!(
                call_sid = %call_sid,
                heard_bytes = heard.len(),
                "Caller interrupted the streaming reply"
            );
            response.heard_prefix = Some(heard);
        }
        Ok(())
    }

    /// Next item from the in-flight stream. Never resolves when idle.
    async fn next_stream_item(&mut self) -> Option<CompletionResult<TextDelta>> {
        match self.in_flight.as_mut() {
            Some(response) => response.stream.next().await,
            None => std::future::pending().await,
        }
    }

    async fn on_stream_item(&mut self, item: Option<CompletionResult<TextDelta>>) -> RelayResult<()> {
        match item {
            Some(Ok(delta)) => {
                let Some(response) = self.in_flight.as_mut() else {
                    return Ok(());
                };
                if delta.is_empty() {
                    return Ok(());
                }
                response.buffer.push_str(&delta);
                self.send(OutgoingMessage::token(delta)).await
            }
            Some(Err(e)) => self.finish_response(Some(e)).await,
            None => self.finish_response(None).await,
        }
    }

    /// Commit the reply and send the terminator.
    async fn finish_response(&mut self, failure: Option<CompletionError>) -> RelayResult<()> {
        let Some(response) = self.in_flight.take() else {
            return Ok(());
        };

        let interrupted = response.heard_prefix.is_some();
        let streamed_bytes = response.buffer.len();
        let content = response.heard_prefix.unwrap_or(response.buffer);
        let committed_bytes = content.len();

        let committed = self
            .sessions
            .append_turn(&response.call_sid, Turn::assistant(content));

        self.send(OutgoingMessage::end_of_response()).await?;
        committed?;

        match failure {
            Some(e) => Err(e.into()),
            None => {
                info!(
                    call_sid = %response.call_sid,
                    streamed_bytes,
                    committed_bytes,
                    interrupted,
                    "Reply complete"
                );
                Ok(())
            }
        }
    }

    /// Replay queued events until one opens a new stream.
    fn drain_pending(&mut self) {
        while !self.is_streaming() {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            let result = self.handle_event(event);
            self.report(result);
        }
    }

    async fn send(&mut self, message: OutgoingMessage) -> RelayResult<()> {
        self.outbound
            .send(MessageRoute::Outgoing(message))
            .await
            .map_err(|_| RelayError::TransportFailure("outbound channel closed".to_string()))
    }

    /// Log an event outcome. Returns `false` when the connection must end.
    fn report(&self, result: RelayResult<()>) -> bool {
        let Err(err) = result else {
            return true;
        };

        let call_sid = self.call_sid().unwrap_or("-");
        match &err {
            RelayError::ProtocolViolation(_) => {
                warn!(call_sid, error = %err, "Dropping relay message")
            }
            RelayError::SessionNotFound(_) => {
                warn!(call_sid, error = %err, "Session missing, update discarded")
            }
            RelayError::AdapterFailure(_) => {
                error!(call_sid, error = %err, "Completion failed, partial reply committed")
            }
            RelayError::TransportFailure(_) => {
                info!(call_sid, error = %err, "Outbound transport closed")
            }
        }

        !err.is_fatal()
    }
}

impl Drop for CallRelay {
    fn drop(&mut self) {
        self.close();
    }
}
