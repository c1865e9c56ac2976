//! Message dispatch and request correlation
//!
//! Owns the transport's send side: every outbound message passes through the
//! pre-auth gate here, and every request that expects a correlated reply is
//! assigned a job id recorded in the pending table. Inbound messages whose
//! `target_job_id` matches a pending entry are delivered to the awaiting
//! handle; everything else is handed back to the caller for push routing.

use std::time::Duration;

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::errors::{RequestError, Result};
use crate::events::EventSender;
use crate::registry::SchemaRegistry;
use crate::transport::Transport;
use crate::wire::{EMsg, MessageHeader};

/// How long a correlated request waits for its reply
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Inbound Messages
// ----------------------------------------------------------------------------

/// A received message: header plus still-encoded body
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub header: MessageHeader,
    pub body: Vec<u8>,
}

impl InboundMessage {
    /// Decode the body under a concrete schema type
    pub fn decode<T: DeserializeOwned>(&self) -> core::result::Result<T, RequestError> {
        bincode::deserialize(&self.body).map_err(|e| RequestError::Decode(e.to_string()))
    }
}

type ReplyResult = core::result::Result<InboundMessage, RequestError>;

// ----------------------------------------------------------------------------
// Reply Handles
// ----------------------------------------------------------------------------

/// Handle for a single-reply request
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<ReplyResult>,
    job_id: u64,
}

impl PendingReply {
    /// Job id assigned to the request, for diagnostics
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Await the reply, bounded by [`REQUEST_TIMEOUT`]
    pub async fn wait(self) -> ReplyResult {
        match tokio::time::timeout(REQUEST_TIMEOUT, self.rx).await {
            Err(_) => Err(RequestError::Timeout(REQUEST_TIMEOUT)),
            Ok(Err(_)) => Err(RequestError::ConnectionClosed),
            Ok(Ok(result)) => result,
        }
    }

    fn resolved(result: ReplyResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx, job_id: 0 }
    }
}

/// A [`PendingReply`] that decodes the reply body under a known schema
#[derive(Debug)]
pub struct TypedReply<T> {
    inner: PendingReply,
    _marker: core::marker::PhantomData<T>,
}

impl<T: DeserializeOwned> TypedReply<T> {
    pub fn new(inner: PendingReply) -> Self {
        Self {
            inner,
            _marker: core::marker::PhantomData,
        }
    }

    pub fn job_id(&self) -> u64 {
        self.inner.job_id()
    }

    pub async fn wait(self) -> core::result::Result<T, RequestError> {
        self.inner.wait().await?.decode::<T>()
    }
}

/// Handle for a request that may be answered by several deliveries
#[derive(Debug)]
pub struct ReplyStream {
    rx: mpsc::UnboundedReceiver<ReplyResult>,
    job_id: u64,
}

impl ReplyStream {
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Await the next delivery, bounded by [`REQUEST_TIMEOUT`] per delivery;
    /// `None` once the job is cancelled and drained
    pub async fn next(&mut self) -> Option<ReplyResult> {
        match tokio::time::timeout(REQUEST_TIMEOUT, self.rx.recv()).await {
            Err(_) => Some(Err(RequestError::Timeout(REQUEST_TIMEOUT))),
            Ok(inner) => inner,
        }
    }
}

// ----------------------------------------------------------------------------
// Pending Table
// ----------------------------------------------------------------------------

enum PendingSink {
    OneShot(oneshot::Sender<ReplyResult>),
    Stream(mpsc::UnboundedSender<ReplyResult>),
}

struct PendingRequest {
    sink: PendingSink,
    /// `None` for streamed jobs, which outlive any single delivery deadline
    deadline: Option<Instant>,
    msg: EMsg,
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Send-side owner of the transport plus the job correlation table
pub struct Dispatcher<T: Transport> {
    transport: T,
    registry: SchemaRegistry,
    pending: HashMap<u64, PendingRequest>,
    next_job_id: u64,
    connected: bool,
    authenticated: bool,
    events: EventSender,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, registry: SchemaRegistry, events: EventSender) -> Self {
        Self {
            transport,
            registry,
            pending: HashMap::new(),
            next_job_id: 1,
            connected: false,
            authenticated: false,
            events,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.authenticated = false;
        }
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    fn gate_allows(&self, msg: EMsg) -> bool {
        self.connected && (self.authenticated || msg.allowed_before_auth())
    }

    fn assign_job_id(&mut self) -> u64 {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }

    fn trace_send(&self, msg: EMsg) {
        tracing::debug!(msg = msg.name(), "sending message");
        self.events.debug(format!("sending {}", msg.name()));
    }

    /// Send an uncorrelated message.
    ///
    /// Messages failing the pre-auth gate are silently dropped (with a debug
    /// event) rather than erroring, matching the session contract that
    /// callers simply wait for the authenticated state.
    pub async fn send<B: Serialize>(&mut self, msg: EMsg, body: &B) -> Result<()> {
        if !self.gate_allows(msg) {
            tracing::debug!(msg = msg.name(), "dropping message sent before logon");
            self.events
                .debug(format!("dropped {} (not logged on)", msg.name()));
            return Ok(());
        }
        let encoded = bincode::serialize(body)?;
        self.transport
            .send(MessageHeader::new(msg, true), encoded)
            .await?;
        self.trace_send(msg);
        Ok(())
    }

    /// Send a correlated request expecting exactly one reply
    pub async fn request<B: Serialize>(&mut self, msg: EMsg, body: &B) -> Result<PendingReply> {
        if !self.gate_allows(msg) {
            tracing::debug!(msg = msg.name(), "dropping request sent before logon");
            self.events
                .debug(format!("dropped {} (not logged on)", msg.name()));
            return Ok(PendingReply::resolved(Err(RequestError::ConnectionClosed)));
        }

        let job_id = self.assign_job_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            job_id,
            PendingRequest {
                sink: PendingSink::OneShot(tx),
                deadline: Some(Instant::now() + REQUEST_TIMEOUT),
                msg,
            },
        );

        let mut header = MessageHeader::new(msg, true);
        header.source_job_id = Some(job_id);
        let encoded = bincode::serialize(body)?;
        if let Err(e) = self.transport.send(header, encoded).await {
            self.pending.remove(&job_id);
            return Err(e);
        }
        self.trace_send(msg);
        Ok(PendingReply { rx, job_id })
    }

    /// Send a correlated request whose answer may span several deliveries.
    ///
    /// The job stays registered until [`Dispatcher::cancel_job`] or a
    /// connection loss; callers decide completion from the payloads.
    pub async fn request_stream<B: Serialize>(&mut self, msg: EMsg, body: &B) -> Result<ReplyStream> {
        if !self.gate_allows(msg) {
            tracing::debug!(msg = msg.name(), "dropping request sent before logon");
            self.events
                .debug(format!("dropped {} (not logged on)", msg.name()));
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(Err(RequestError::ConnectionClosed));
            return Ok(ReplyStream { rx, job_id: 0 });
        }

        let job_id = self.assign_job_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.insert(
            job_id,
            PendingRequest {
                sink: PendingSink::Stream(tx),
                deadline: None,
                msg,
            },
        );

        let mut header = MessageHeader::new(msg, true);
        header.source_job_id = Some(job_id);
        let encoded = bincode::serialize(body)?;
        if let Err(e) = self.transport.send(header, encoded).await {
            self.pending.remove(&job_id);
            return Err(e);
        }
        self.trace_send(msg);
        Ok(ReplyStream { rx, job_id })
    }

    /// Route one received message.
    ///
    /// Replies correlated to a pending job are delivered to their handle and
    /// consumed here; anything else is returned for push routing.
    pub fn handle_message(&mut self, header: MessageHeader, body: Vec<u8>) -> Option<InboundMessage> {
        tracing::debug!(msg = header.msg.name(), "received message");
        self.events.debug(format!("received {}", header.msg.name()));

        let job_id = match header.target_job_id {
            Some(id) if self.pending.contains_key(&id) => id,
            _ => {
                return Some(InboundMessage { header, body });
            }
        };

        let result = match self.registry.get(header.msg) {
            Some(entry) => match entry.check(&body) {
                Ok(()) => Ok(InboundMessage { header, body }),
                Err(reason) => {
                    tracing::warn!(msg = entry.name, %reason, "reply failed schema check");
                    Err(RequestError::Decode(reason))
                }
            },
            None => Ok(InboundMessage { header, body }),
        };

        if let Some(request) = self.pending.remove(&job_id) {
            match request.sink {
                PendingSink::OneShot(tx) => {
                    let _ = tx.send(result);
                }
                PendingSink::Stream(tx) => {
                    // Receiver gone means the caller lost interest
                    if tx.send(result).is_ok() {
                        self.pending.insert(
                            job_id,
                            PendingRequest {
                                sink: PendingSink::Stream(tx),
                                deadline: request.deadline,
                                msg: request.msg,
                            },
                        );
                    }
                }
            }
        }
        None
    }

    /// Drop a streamed job, closing its handle
    pub fn cancel_job(&mut self, job_id: u64) {
        self.pending.remove(&job_id);
    }

    /// Fail every pending request, used on connection loss
    pub fn fail_all_pending(&mut self, error: RequestError) {
        for (_, request) in self.pending.drain() {
            match request.sink {
                PendingSink::OneShot(tx) => {
                    let _ = tx.send(Err(error.clone()));
                }
                PendingSink::Stream(tx) => {
                    let _ = tx.send(Err(error.clone()));
                }
            }
        }
    }

    /// Time out single-reply requests whose deadline has passed
    pub fn expire_overdue(&mut self, now: Instant) {
        let overdue: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, r)| matches!(r.deadline, Some(d) if d <= now))
            .map(|(id, _)| *id)
            .collect();
        for job_id in overdue {
            if let Some(request) = self.pending.remove(&job_id) {
                tracing::debug!(msg = request.msg.name(), job_id, "request timed out");
                if let PendingSink::OneShot(tx) = request.sink {
                    let _ = tx.send(Err(RequestError::Timeout(REQUEST_TIMEOUT)));
                }
            }
        }
    }

    /// Earliest pending-request deadline, for the caller's timer wheel
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|r| r.deadline).min()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use crate::transport::MockTransport;
    use crate::types::ResultCode;
    use crate::wire::{PlayerCountRequest, PlayerCountResponse};

    fn dispatcher() -> (Dispatcher<MockTransport>, tokio::sync::mpsc::UnboundedReceiver<crate::events::Event>) {
        let (events, rx) = event_channel();
        (
            Dispatcher::new(MockTransport::new(), SchemaRegistry::standard(), events),
            rx,
        )
    }

    #[tokio::test]
    async fn test_pre_auth_gate_drops_silently() {
        let (mut dispatch, mut events) = dispatcher();
        dispatch.set_connected(true);

        dispatch
            .send(EMsg::ClientAuthList, &Vec::<u8>::new())
            .await
            .unwrap();
        assert!(dispatch.transport().sent().is_empty());
        assert!(matches!(
            events.try_recv().unwrap(),
            crate::events::Event::Debug(_)
        ));

        // Logon itself passes the gate
        dispatch
            .send(EMsg::ClientLogon, &Vec::<u8>::new())
            .await
            .unwrap();
        assert_eq!(dispatch.transport().sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_and_receive_emit_debug_traces() {
        let (mut dispatch, mut events) = dispatcher();
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);

        dispatch
            .send(
                EMsg::ClientPlayerCountRequest,
                &PlayerCountRequest { app_id: 440 },
            )
            .await
            .unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            crate::events::Event::Debug("sending ClientPlayerCountRequest".to_string())
        );

        dispatch.handle_message(MessageHeader::new(EMsg::GsStatusReply, true), vec![1]);
        assert_eq!(
            events.try_recv().unwrap(),
            crate::events::Event::Debug("received GsStatusReply".to_string())
        );
    }

    #[tokio::test]
    async fn test_request_reply_correlation() {
        let (mut dispatch, _events) = dispatcher();
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);

        let reply = dispatch
            .request(
                EMsg::ClientPlayerCountRequest,
                &PlayerCountRequest { app_id: 440 },
            )
            .await
            .unwrap();
        let job_id = reply.job_id();
        assert_eq!(
            dispatch.transport().sent()[0].0.source_job_id,
            Some(job_id)
        );

        let body = bincode::serialize(&PlayerCountResponse {
            result: ResultCode::OK,
            player_count: 12,
        })
        .unwrap();
        let consumed = dispatch.handle_message(
            MessageHeader::reply_to(EMsg::ClientPlayerCountResponse, true, job_id),
            body,
        );
        assert!(consumed.is_none());

        let message = reply.wait().await.unwrap();
        let decoded: PlayerCountResponse = message.decode().unwrap();
        assert_eq!(decoded.player_count, 12);
    }

    #[tokio::test]
    async fn test_uncorrelated_message_passed_through() {
        let (mut dispatch, _events) = dispatcher();
        let passed = dispatch.handle_message(
            MessageHeader::new(EMsg::GsStatusReply, true),
            vec![1],
        );
        assert!(passed.is_some());

        // Unknown target job id also passes through
        let passed = dispatch.handle_message(
            MessageHeader::reply_to(EMsg::GsStatusReply, true, 999),
            vec![1],
        );
        assert!(passed.is_some());
    }

    #[tokio::test]
    async fn test_reply_failing_schema_check_surfaces_decode_error() {
        let (mut dispatch, _events) = dispatcher();
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);

        let reply = dispatch
            .request(
                EMsg::ClientPlayerCountRequest,
                &PlayerCountRequest { app_id: 440 },
            )
            .await
            .unwrap();
        let job_id = reply.job_id();

        dispatch.handle_message(
            MessageHeader::reply_to(EMsg::ClientPlayerCountResponse, true, job_id),
            vec![0xFF],
        );
        assert!(matches!(reply.wait().await, Err(RequestError::Decode(_))));
    }

    #[tokio::test]
    async fn test_expire_overdue_times_out_request() {
        let (mut dispatch, _events) = dispatcher();
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);

        let reply = dispatch
            .request(
                EMsg::ClientPlayerCountRequest,
                &PlayerCountRequest { app_id: 440 },
            )
            .await
            .unwrap();
        assert!(dispatch.next_deadline().is_some());

        dispatch.expire_overdue(Instant::now() + REQUEST_TIMEOUT + Duration::from_millis(1));
        assert!(dispatch.next_deadline().is_none());
        assert!(matches!(reply.wait().await, Err(RequestError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fail_all_pending() {
        let (mut dispatch, _events) = dispatcher();
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);

        let reply = dispatch
            .request(
                EMsg::ClientPlayerCountRequest,
                &PlayerCountRequest { app_id: 440 },
            )
            .await
            .unwrap();
        dispatch.fail_all_pending(RequestError::ConnectionClosed);
        assert_eq!(reply.wait().await, Err(RequestError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_stream_receives_multiple_deliveries() {
        let (mut dispatch, _events) = dispatcher();
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);

        let mut stream = dispatch
            .request_stream(EMsg::ClientProductInfoRequest, &Vec::<u8>::new())
            .await
            .unwrap();
        let job_id = stream.job_id();

        let body = bincode::serialize(&crate::wire::ProductInfoResponse::default()).unwrap();
        for _ in 0..2 {
            dispatch.handle_message(
                MessageHeader::reply_to(EMsg::ClientProductInfoResponse, true, job_id),
                body.clone(),
            );
        }

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());

        dispatch.cancel_job(job_id);
        assert!(stream.next().await.is_none());
    }
}
