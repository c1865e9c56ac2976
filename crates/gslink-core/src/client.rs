//! Client facade
//!
//! [`GsClient`] composes the dispatcher, the session state machine and the
//! ticket ledger over one owned transport. The owner drives it by feeding
//! transport events through [`GsClient::handle_transport_event`] (or the
//! [`GsClient::pump`] convenience loop) and firing due timers via
//! [`GsClient::poll_due`]; everything observable comes back on the event
//! channel handed out at construction.

use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::aggregator::{AggregationJob, AggregationResult};
use crate::dispatch::{Dispatcher, PendingReply, ReplyStream, TypedReply};
use crate::errors::{RequestError, Result, SessionError};
use crate::events::{event_channel, Event, EventSender};
use crate::machine_id::{machine_id_for, MachineIdPolicy};
use crate::registry::SchemaRegistry;
use crate::session::{DeferredAction, LogonAttempt, LogonConfig, SessionManager, SessionState};
use crate::storage::{read_one, BlobStorage};
use crate::tickets::{ResyncWait, TicketLedger};
use crate::transport::{Transport, TransportEvent};
use crate::types::{AppId, PackageId, ResultCode, SubjectId};
use crate::wire::{
    EMsg, LoggedOffNotice, LogonResponse, PlayerCountRequest, PlayerCountResponse,
    ProductChangesRequest, ProductChangesResponse, ProductInfoEntry, ProductInfoQuery,
    ProductInfoRequest, ProductInfoResponse, ServerListRequest, ServerListResponse,
    ServiceMethodCall, ServiceMethodReply, StatusReply,
};

/// Blob name for the persisted reconnection endpoint list
const ENDPOINTS_BLOB: &str = "endpoints.json";

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Static configuration of a [`GsClient`]
pub struct ClientConfig {
    /// Retry transient session drops automatically
    pub auto_relogin: bool,
    pub machine_id_policy: MachineIdPolicy,
    /// Seed format strings for the token-derived identity policy
    pub machine_id_formats: [String; 3],
    /// Public key tickets must be signed with
    pub ticket_issuer: VerifyingKey,
    /// Overrides the derived per-machine storage key
    pub machine_key: Option<String>,
}

impl ClientConfig {
    pub fn new(ticket_issuer: VerifyingKey) -> Self {
        Self {
            auto_relogin: true,
            machine_id_policy: MachineIdPolicy::TokenDerived,
            machine_id_formats: crate::machine_id::default_seed_formats(),
            ticket_issuer,
            machine_key: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Game-server backend session client
pub struct GsClient<T: Transport> {
    config: ClientConfig,
    dispatch: Dispatcher<T>,
    session: SessionManager,
    tickets: TicketLedger,
    storage: Box<dyn BlobStorage>,
    events: EventSender,
    endpoints_primed: bool,
    secure: Option<bool>,
}

impl<T: Transport> GsClient<T> {
    /// Build a client and the event stream its owner subscribes to
    pub fn new(
        transport: T,
        registry: SchemaRegistry,
        storage: Box<dyn BlobStorage>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, events_rx) = event_channel();
        let machine_key = config
            .machine_key
            .clone()
            .unwrap_or_else(crate::machine_id::internal_machine_key);
        let client = Self {
            dispatch: Dispatcher::new(transport, registry, events.clone()),
            session: SessionManager::new(config.auto_relogin, events.clone(), machine_key),
            tickets: TicketLedger::new(config.ticket_issuer, events.clone()),
            config,
            storage,
            events,
            endpoints_primed: false,
            secure: None,
        };
        (client, events_rx)
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.session.subject()
    }

    /// Last reported anti-cheat status, if any
    pub fn secure(&self) -> Option<bool> {
        self.secure
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn tickets(&self) -> &TicketLedger {
        &self.tickets
    }

    pub fn transport(&self) -> &T {
        self.dispatch.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.dispatch.transport_mut()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Log on with a fresh identity
    pub async fn logon(&mut self, config: LogonConfig) -> Result<()> {
        self.prime_endpoints_once();
        let machine_id = machine_id_for(
            self.config.machine_id_policy,
            config.token.as_deref(),
            &self.config.machine_id_formats,
            &mut *self.storage,
        );
        self.session
            .begin_logon(
                &mut self.dispatch,
                &*self.storage,
                LogonAttempt::Fresh(config),
                machine_id,
            )
            .await
    }

    /// Log on again with the identity of the previous attempt
    pub async fn logon_repeat(&mut self) -> Result<()> {
        self.prime_endpoints_once();
        self.session
            .begin_logon(
                &mut self.dispatch,
                &*self.storage,
                LogonAttempt::RepeatPrevious,
                None,
            )
            .await
    }

    /// Graceful logoff with the standard grace period
    pub async fn logoff(&mut self) -> Result<()> {
        self.session.begin_logoff(&mut self.dispatch).await
    }

    /// Hard disconnect: rejects all pending requests, cancels retries
    pub async fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect(&mut self.dispatch).await
    }

    fn prime_endpoints_once(&mut self) {
        if self.endpoints_primed {
            return;
        }
        self.endpoints_primed = true;
        if let Some(bytes) = read_one(&*self.storage, ENDPOINTS_BLOB) {
            match serde_json::from_slice(&bytes) {
                Ok(endpoints) => self.dispatch.transport_mut().prime_endpoints(endpoints),
                Err(e) => tracing::warn!("ignoring bad endpoint list blob: {e}"),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Event Driving
    // ------------------------------------------------------------------------

    /// Feed one transport event through the client
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Connected => {
                self.session.on_transport_connected(&mut self.dispatch).await
            }
            TransportEvent::Message { header, body } => {
                match self.dispatch.handle_message(header, body) {
                    Some(inbound) => self.route_push(inbound).await,
                    None => Ok(()),
                }
            }
            TransportEvent::Endpoints(endpoints) => {
                tracing::debug!(count = endpoints.len(), "persisting endpoint list");
                let bytes = serde_json::to_vec(&endpoints)
                    .map_err(|e| crate::errors::GsError::storage(e.to_string()))?;
                self.storage.write_named(ENDPOINTS_BLOB, &bytes)
            }
            TransportEvent::Closed { code, reason } => {
                self.session
                    .on_channel_closed(&mut self.dispatch, code, &reason)
                    .await
            }
        }
    }

    async fn route_push(&mut self, inbound: crate::dispatch::InboundMessage) -> Result<()> {
        match inbound.header.msg {
            EMsg::ClientLogOnResponse => {
                let response: LogonResponse = match inbound.decode() {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!("bad logon response: {e}");
                        self.events.debug(format!("undecodable logon response: {e}"));
                        return Ok(());
                    }
                };
                self.session
                    .on_logon_response(&mut self.dispatch, &mut *self.storage, &response)
                    .await?;
                if response.result == ResultCode::OK {
                    // Sequence counters never survive a fresh logon
                    self.tickets.reset_sequences();
                    if !self.tickets.is_empty() {
                        let _ = self.tickets.send_auth_list(&mut self.dispatch, None).await?;
                    }
                }
                Ok(())
            }
            EMsg::ClientLoggedOff => {
                let notice: LoggedOffNotice = inbound.decode().unwrap_or(LoggedOffNotice {
                    result: ResultCode::INVALID,
                });
                self.session.on_logged_off(&mut self.dispatch, &notice).await
            }
            EMsg::ClientTicketAuthComplete => {
                match inbound.decode() {
                    Ok(push) => self.tickets.on_auth_complete(&push),
                    Err(e) => tracing::warn!("bad ticket auth push: {e}"),
                }
                Ok(())
            }
            EMsg::ClientAuthListAck => {
                match inbound.decode() {
                    Ok(ack) => self.tickets.on_ack(&ack),
                    Err(e) => tracing::warn!("bad auth list ack: {e}"),
                }
                Ok(())
            }
            EMsg::GsStatusReply => {
                match inbound.decode::<StatusReply>() {
                    Ok(status) => {
                        self.secure = Some(status.is_secure);
                        self.events.emit(Event::Secure {
                            is_secure: status.is_secure,
                        });
                    }
                    Err(e) => tracing::warn!("bad status reply: {e}"),
                }
                Ok(())
            }
            other => {
                tracing::debug!(msg = other.name(), "unhandled push");
                self.events.debug(format!("unhandled message {}", other.name()));
                Ok(())
            }
        }
    }

    /// Fire due timers: request deadlines and deferred session actions
    pub async fn poll_due(&mut self) -> Result<()> {
        let now = Instant::now();
        self.dispatch.expire_overdue(now);
        match self.session.poll_due(now) {
            Some(DeferredAction::Relogin) => self.session.relogin(&mut self.dispatch).await,
            Some(DeferredAction::ForceDisconnect) => {
                self.session.force_disconnect(&mut self.dispatch).await
            }
            None => Ok(()),
        }
    }

    /// Earliest pending deadline across the session and dispatch layers
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.session.next_deadline(), self.dispatch.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drain transport events for up to `budget`, firing due timers along
    /// the way. Returns once the transport is idle or the budget elapses.
    pub async fn pump(&mut self, budget: Duration) -> Result<()> {
        let deadline = Instant::now() + budget;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let next = tokio::time::timeout(
                deadline - now,
                self.dispatch.transport_mut().next_event(),
            )
            .await;
            match next {
                Ok(Some(event)) => {
                    self.handle_transport_event(event).await?;
                    self.poll_due().await?;
                }
                Ok(None) | Err(_) => {
                    self.poll_due().await?;
                    return Ok(());
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------------

    /// Activate a batch of tickets and start the ledger resync.
    ///
    /// The returned handle resolves once the backend acknowledges the new
    /// snapshot sequence.
    pub async fn activate_tickets(
        &mut self,
        app_id: AppId,
        tickets: &[Vec<u8>],
        now_unix: u32,
    ) -> Result<ResyncWait> {
        let subject = self.session.subject().ok_or(SessionError::NotLoggedOn)?;
        self.tickets
            .activate(&mut self.dispatch, subject, app_id, tickets, now_unix)
            .await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Ask how many players are currently in an app
    pub async fn request_player_count(
        &mut self,
        app_id: AppId,
    ) -> Result<TypedReply<PlayerCountResponse>> {
        let reply = self
            .dispatch
            .request(EMsg::ClientPlayerCountRequest, &PlayerCountRequest { app_id })
            .await?;
        Ok(TypedReply::new(reply))
    }

    /// Ask for product changes since a known change number
    pub async fn request_product_changes(
        &mut self,
        since_change_number: u32,
    ) -> Result<TypedReply<ProductChangesResponse>> {
        let reply = self
            .dispatch
            .request(
                EMsg::ClientProductChangesRequest,
                &ProductChangesRequest {
                    since_change_number,
                    send_app_changes: true,
                    send_package_changes: true,
                },
            )
            .await?;
        Ok(TypedReply::new(reply))
    }

    /// Start a bulk product-info query.
    ///
    /// The backend may answer across several deliveries; the returned job
    /// folds them and completes only when every requested app and package
    /// is resolved or reported unknown.
    pub async fn start_product_info<A, P>(
        &mut self,
        app_ids: &[AppId],
        package_ids: &[PackageId],
        parse_app: impl Fn(&ProductInfoEntry) -> A + Send + 'static,
        parse_package: impl Fn(&ProductInfoEntry) -> P + Send + 'static,
    ) -> Result<ProductInfoJob<A, P>> {
        let request = ProductInfoRequest {
            apps: app_ids.iter().map(|id| ProductInfoQuery::new(*id)).collect(),
            packages: package_ids
                .iter()
                .map(|id| ProductInfoQuery::new(*id))
                .collect(),
        };
        let stream = self
            .dispatch
            .request_stream(EMsg::ClientProductInfoRequest, &request)
            .await?;
        Ok(ProductInfoJob {
            stream,
            job: AggregationJob::new(app_ids.iter().copied(), package_ids.iter().copied()),
            parse_app: Box::new(parse_app),
            parse_package: Box::new(parse_package),
        })
    }

    /// Drop a still-running streamed job
    pub fn cancel_job(&mut self, job_id: u64) {
        self.dispatch.cancel_job(job_id);
    }

    // ------------------------------------------------------------------------
    // Unified Methods
    // ------------------------------------------------------------------------

    /// Call a unified service method addressed by an
    /// `"Interface.Method#Version"` key.
    ///
    /// The reply payload is checked against the registry's
    /// `"..._Response"` schema when one is registered for the method.
    pub async fn send_unified<Req, Resp>(
        &mut self,
        method: &str,
        body: &Req,
    ) -> Result<UnifiedReply<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let call = ServiceMethodCall {
            method_name: method.to_string(),
            payload: bincode::serialize(body)?,
            is_notification: false,
        };
        let response_check = self
            .dispatch
            .registry()
            .get_unified(&format!("{method}_Response"))
            .map(|entry| entry.decode_check());
        let reply = self.dispatch.request(EMsg::ClientServiceMethod, &call).await?;
        Ok(UnifiedReply {
            inner: reply,
            response_check,
            _marker: core::marker::PhantomData,
        })
    }

    /// Fetch a server list via `GameServers.GetServerList#1`
    pub async fn request_server_list(
        &mut self,
        filter: &str,
        limit: u32,
    ) -> Result<UnifiedReply<ServerListResponse>> {
        self.send_unified(
            "GameServers.GetServerList#1",
            &ServerListRequest {
                filter: filter.to_string(),
                limit,
            },
        )
        .await
    }
}

// ----------------------------------------------------------------------------
// Query Handles
// ----------------------------------------------------------------------------

/// In-flight product-info query
pub struct ProductInfoJob<A, P> {
    stream: ReplyStream,
    job: AggregationJob<A, P>,
    parse_app: Box<dyn Fn(&ProductInfoEntry) -> A + Send>,
    parse_package: Box<dyn Fn(&ProductInfoEntry) -> P + Send>,
}

impl<A, P> ProductInfoJob<A, P> {
    pub fn job_id(&self) -> u64 {
        self.stream.job_id()
    }

    fn fold(&mut self, delivery: &ProductInfoResponse) {
        for entry in &delivery.apps {
            let value = (self.parse_app)(entry);
            self.job.apps.resolve(entry.id, value);
        }
        for id in &delivery.unknown_app_ids {
            self.job.apps.mark_unknown(*id);
        }
        for entry in &delivery.packages {
            let value = (self.parse_package)(entry);
            self.job.packages.resolve(entry.id, value);
        }
        for id in &delivery.unknown_package_ids {
            self.job.packages.mark_unknown(*id);
        }
    }

    /// Await deliveries until both collections are fully accounted for
    pub async fn wait(mut self) -> core::result::Result<AggregationResult<A, P>, RequestError> {
        while !self.job.is_complete() {
            match self.stream.next().await {
                Some(Ok(message)) => {
                    let delivery: ProductInfoResponse = message.decode()?;
                    self.fold(&delivery);
                }
                Some(Err(e)) => return Err(e),
                None => return Err(RequestError::ConnectionClosed),
            }
        }
        Ok(self.job.finish())
    }
}

/// Reply handle for a unified method call
pub struct UnifiedReply<T> {
    inner: PendingReply,
    /// Registry decode check for the method's `"..._Response"` schema, if any
    response_check: Option<crate::registry::DecodeCheck>,
    _marker: core::marker::PhantomData<T>,
}

impl<T: DeserializeOwned> UnifiedReply<T> {
    pub fn job_id(&self) -> u64 {
        self.inner.job_id()
    }

    /// Await the reply, unwrap the service envelope and decode the payload
    pub async fn wait(self) -> core::result::Result<T, RequestError> {
        let envelope: ServiceMethodReply = self.inner.wait().await?.decode()?;
        if envelope.result != ResultCode::OK {
            return Err(RequestError::Backend(envelope.result));
        }
        if let Some(check) = self.response_check {
            check(&envelope.payload).map_err(RequestError::Decode)?;
        }
        bincode::deserialize(&envelope.payload).map_err(|e| RequestError::Decode(e.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
