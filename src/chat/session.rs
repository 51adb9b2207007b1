//! Per-connection chat session.
//!
//! # States
//! ```text
//! Connecting → Authenticating ──ok──► Active ──► Closing → Closed
//!                    │                              ▲
//!                    └────────── error ─────────────┘
//! ```
//!
//! # Design Decisions
//! - The session task is the only writer to the socket
//! - Backend calls run in a `JoinSet`; dropping it abandons every pending call
//! - Client frames arriving during the handshake are buffered and processed
//!   after `hello`, so `hello` is always the first frame sent
//! - After a close frame is sent, the socket is drained briefly so the close
//!   reaches the client before the TCP connection goes away

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::chat::auth::{self, AuthContext, Identity};
use crate::chat::envelope::{decode_call, EnvelopeError, Reply};
use crate::chat::error::{ChatError, CloseReason};
use crate::chat::router::{self, CallCompletion, InFlight};
use crate::chat::Runtime;
use crate::net::{ConnectionGuard, ConnectionId, ConnectionState};
use crate::observability::metrics;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// How long to wait for the client's close reply.
const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Why the session loop stopped.
#[derive(Debug)]
enum Ending {
    /// Send this close frame, then hang up.
    Close(CloseReason),
    /// Client closed or the socket failed; nothing more can be written.
    ClientGone,
}

/// A client frame, sorted by what the session does with it.
enum Inbound {
    Text(Utf8Bytes),
    Ignore,
    Invalid(ChatError),
    /// Read failed, e.g. a frame over `chat.max_message_size` or a protocol
    /// violation. A close frame is still attempted.
    Unreadable(axum::Error),
    Gone,
}

impl Inbound {
    fn classify(frame: Option<Result<Message, axum::Error>>) -> Self {
        match frame {
            Some(Ok(Message::Text(text))) => Inbound::Text(text),
            Some(Ok(Message::Binary(_))) => Inbound::Invalid(EnvelopeError::Binary.into()),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Inbound::Ignore,
            Some(Ok(Message::Close(_))) | None => Inbound::Gone,
            Some(Err(e)) => Inbound::Unreadable(e),
        }
    }
}

/// State of one WebSocket chat connection.
pub struct Session {
    guard: ConnectionGuard,
    runtime: Arc<Runtime>,
    context: AuthContext,
    shutdown: broadcast::Receiver<()>,
    state: ConnectionState,
    identity: Option<Identity>,
    in_flight: InFlight,
    calls: JoinSet<CallCompletion>,
}

impl Session {
    pub fn new(
        guard: ConnectionGuard,
        runtime: Arc<Runtime>,
        context: AuthContext,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let in_flight = InFlight::new(runtime.config.chat.max_in_flight);
        Self {
            guard,
            runtime,
            context,
            shutdown,
            state: ConnectionState::Connecting,
            identity: None,
            in_flight,
            calls: JoinSet::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        self.guard.id()
    }

    /// Drive the connection until it closes.
    pub async fn run(self, socket: WebSocket) {
        let span = tracing::info_span!("chat_session", connection_id = %self.id());
        self.run_inner(socket).instrument(span).await
    }

    async fn run_inner(mut self, socket: WebSocket) {
        let (mut sink, mut stream) = socket.split();
        tracing::debug!("Session started");

        let ending = self.drive(&mut sink, &mut stream).await;

        // Abandon outstanding backend calls before touching the socket again.
        self.calls.abort_all();
        self.state = ConnectionState::Closing;
        match ending {
            Ending::Close(reason) => close(&mut sink, &mut stream, reason).await,
            Ending::ClientGone => tracing::debug!("Client went away"),
        }
        self.state = ConnectionState::Closed;
        tracing::debug!(
            state = self.state.as_str(),
            abandoned_calls = self.in_flight.len(),
            user_id = self.identity.as_ref().map(Identity::user_id),
            "Session finished"
        );
    }

    async fn drive(&mut self, sink: &mut WsSink, stream: &mut WsStream) -> Ending {
        self.state = ConnectionState::Authenticating;
        let (identity, buffered) = match self.authenticate(stream).await {
            Ok(authenticated) => authenticated,
            Err(ending) => return ending,
        };

        tracing::info!(user_id = %identity.user_id(), "Connection authorized");
        if sink
            .send(Message::Text(identity.hello().encode().into()))
            .await
            .is_err()
        {
            return Ending::ClientGone;
        }
        self.identity = Some(identity);
        self.state = ConnectionState::Active;

        for text in buffered {
            if let Err(e) = self.dispatch(text.as_str()) {
                return self.fail(e);
            }
        }
        self.serve(sink, stream).await
    }

    /// Run `authorize_connection`, buffering client frames that arrive meanwhile.
    async fn authenticate(
        &mut self,
        stream: &mut WsStream,
    ) -> Result<(Identity, VecDeque<Utf8Bytes>), Ending> {
        let auth = auth::authorize(&self.runtime.backend, self.guard.id(), &self.context);
        tokio::pin!(auth);
        let mut buffered = VecDeque::new();
        let limit = self.runtime.config.chat.max_in_flight;

        loop {
            tokio::select! {
                result = &mut auth => {
                    return match result {
                        Ok(identity) => {
                            metrics::record_auth("ok");
                            Ok((identity, buffered))
                        }
                        Err(e) => {
                            metrics::record_auth("rejected");
                            tracing::warn!(error = %e, "Connection authorization failed");
                            Err(Ending::Close(e.close_reason()))
                        }
                    };
                }
                frame = stream.next() => match Inbound::classify(frame) {
                    Inbound::Text(text) => {
                        if buffered.len() >= limit {
                            return Err(Ending::Close(ChatError::TooManyCalls(limit).close_reason()));
                        }
                        buffered.push_back(text);
                    }
                    Inbound::Ignore => {}
                    Inbound::Invalid(e) => {
                        tracing::warn!(error = %e, "Invalid frame during authorization");
                        return Err(Ending::Close(e.close_reason()));
                    }
                    Inbound::Unreadable(e) => return Err(unreadable(e)),
                    Inbound::Gone => return Err(Ending::ClientGone),
                },
                _ = self.shutdown.recv() => return Err(Ending::Close(CloseReason::SHUTDOWN)),
            }
        }
    }

    /// Route client calls and deliver their results until something ends the session.
    async fn serve(&mut self, sink: &mut WsSink, stream: &mut WsStream) -> Ending {
        loop {
            tokio::select! {
                frame = stream.next() => match Inbound::classify(frame) {
                    Inbound::Text(text) => {
                        if let Err(e) = self.dispatch(text.as_str()) {
                            return self.fail(e);
                        }
                    }
                    Inbound::Ignore => {}
                    Inbound::Invalid(e) => return self.fail(e),
                    Inbound::Unreadable(e) => return unreadable(e),
                    Inbound::Gone => return Ending::ClientGone,
                },
                Some(joined) = self.calls.join_next() => {
                    let completion = match joined {
                        Ok(completion) => completion,
                        Err(e) => {
                            tracing::error!(error = %e, "Call task failed");
                            return Ending::Close(CloseReason::INTERNAL);
                        }
                    };
                    match self.complete(completion) {
                        Ok(Some(reply)) => {
                            if sink.send(Message::Text(reply.encode().into())).await.is_err() {
                                return Ending::ClientGone;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => return self.fail(e),
                    }
                },
                _ = self.shutdown.recv() => return Ending::Close(CloseReason::SHUTDOWN),
            }
        }
    }

    /// Decode a client frame and start its backend call.
    fn dispatch(&mut self, text: &str) -> Result<(), ChatError> {
        let call = decode_call(text)?;
        let key = self.in_flight.insert(&call.request_id, &call.method)?;
        tracing::debug!(request_id = %call.request_id, method = %call.method, "Dispatching call");

        let routed = router::route(call, self.guard.id());
        let authorization = self
            .identity
            .as_ref()
            .and_then(|identity| identity.backend_authorization().cloned());
        self.calls.spawn(router::forward(
            self.runtime.backend.clone(),
            authorization,
            key,
            routed,
        ));
        Ok(())
    }

    /// Match a finished call to its request and build the reply.
    fn complete(&mut self, completion: CallCompletion) -> Result<Option<Reply>, ChatError> {
        let Some(pending) = self.in_flight.complete(&completion.key) else {
            tracing::warn!(key = %completion.key, "Completion for unknown call");
            return Ok(None);
        };
        match completion.result {
            Ok(payload) => {
                metrics::record_call("ok");
                tracing::debug!(
                    request_id = %pending.request_id,
                    method = %pending.method,
                    elapsed = ?pending.started.elapsed(),
                    "Call completed"
                );
                Ok(Some(Reply::Result {
                    request_id: pending.request_id,
                    payload,
                }))
            }
            Err(e) => {
                metrics::record_call("error");
                tracing::warn!(
                    request_id = %pending.request_id,
                    method = %pending.method,
                    error = %e,
                    "Call failed, closing connection"
                );
                Err(e)
            }
        }
    }

    fn fail(&self, error: ChatError) -> Ending {
        if matches!(error, ChatError::MalformedEnvelope(_) | ChatError::DuplicateRequest(_)) {
            tracing::warn!(error = %error, "Rejected client frame");
        }
        Ending::Close(error.close_reason())
    }
}

fn unreadable(error: axum::Error) -> Ending {
    tracing::warn!(error = %error, "Failed to read client frame");
    Ending::Close(CloseReason::BAD_REQUEST)
}

/// Send a close frame and wait briefly for the client to acknowledge it.
async fn close(sink: &mut WsSink, stream: &mut WsStream, reason: CloseReason) {
    let frame = CloseFrame {
        code: reason.code,
        reason: Utf8Bytes::from_static(reason.reason),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, code = reason.code, "Could not send close frame");
        return;
    }
    metrics::record_close(reason.code);
    tracing::info!(code = reason.code, reason = reason.reason, "Connection closed by gateway");
    let linger = async {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(CLOSE_LINGER, linger).await;
}
