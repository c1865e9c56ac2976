//! Session lifecycle state machine
//!
//! Drives the logical session from connect through authentication,
//! degraded/relogin cycles, and termination. Time never blocks here:
//! deferred actions (the 1 s relogin delay, the 4 s logoff grace) are
//! exposed as data via [`SessionManager::poll_due`] so the owner decides
//! when to sleep and when to fire.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::time::Instant;

use crate::dispatch::Dispatcher;
use crate::errors::{RequestError, Result, SessionError};
use crate::events::{Event, EventSender};
use crate::storage::{read_one, BlobStorage};
use crate::transport::Transport;
use crate::types::{AppId, CellId, ResultCode, ServerFlags, SubjectId};
use crate::wire::{
    EMsg, LogOffNotice, LoggedOffNotice, LogonRequest, LogonResponse, ServerTypeInfo,
    PRIVATE_ADDR_MASK, PROTOCOL_VERSION,
};

/// Fixed delay before an automatic relogin attempt
pub const RELOGIN_DELAY: Duration = Duration::from_secs(1);

/// Grace period before a logoff forces the channel closed
pub const LOGOFF_GRACE: Duration = Duration::from_secs(4);

/// Default game and query port announced to the backend
pub const DEFAULT_PORT: u16 = 27015;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle state of the logical session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingLogonResult,
    Authenticated,
    LoggingOff,
    Terminated,
}

// ----------------------------------------------------------------------------
// Logon Configuration
// ----------------------------------------------------------------------------

/// Caller-supplied description of the server identity to log on with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonConfig {
    pub app_id: AppId,
    pub game_dir: String,
    pub game_version: String,
    pub game_port: u16,
    pub query_port: u16,
    pub secure: bool,
    pub dedicated: bool,
    /// Long-lived server token; `None` logs on anonymously
    pub token: Option<String>,
    /// Region hint; when absent the persisted hint is used
    pub cell_id: Option<CellId>,
    /// LAN address, sent obfuscated in the logon request
    pub private_addr: Option<Ipv4Addr>,
}

impl LogonConfig {
    pub fn new<D: Into<String>, V: Into<String>>(app_id: AppId, game_dir: D, game_version: V) -> Self {
        Self {
            app_id,
            game_dir: game_dir.into(),
            game_version: game_version.into(),
            game_port: DEFAULT_PORT,
            query_port: DEFAULT_PORT,
            secure: false,
            dedicated: true,
            token: None,
            cell_id: None,
            private_addr: None,
        }
    }
}

/// Frozen identity actually used on the wire, reused verbatim by every
/// automatic relogin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonIdentity {
    pub app_id: AppId,
    pub game_dir: String,
    pub game_version: String,
    pub game_port: u16,
    pub query_port: u16,
    pub flags: ServerFlags,
    pub token: Option<String>,
    pub cell_id: Option<CellId>,
    pub obfuscated_private_addr: u32,
    pub client_supplied_id: u64,
    pub machine_id: Option<Vec<u8>>,
}

/// What identity a logon attempt uses
#[derive(Debug, Clone)]
pub enum LogonAttempt {
    /// Fresh identity from a configuration
    Fresh(LogonConfig),
    /// Reuse the identity of the previous attempt
    RepeatPrevious,
}

// ----------------------------------------------------------------------------
// Deferred Actions
// ----------------------------------------------------------------------------

/// Action the owner must perform once its deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    /// Reconnect and log on again with the previous identity
    Relogin,
    /// Force the channel closed (logoff grace expired)
    ForceDisconnect,
}

#[derive(Debug, Clone, Copy)]
struct Deferred {
    action: DeferredAction,
    due: Instant,
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Owner of the session lifecycle
pub struct SessionManager {
    state: SessionState,
    identity: Option<LogonIdentity>,
    subject: Option<SubjectId>,
    public_addr: Option<String>,
    cell_id: CellId,
    logging_off: bool,
    auto_relogin: bool,
    deferred: Option<Deferred>,
    events: EventSender,
    /// Scopes the persisted cell-id hint when several servers share a store
    machine_key: String,
}

impl SessionManager {
    pub fn new(auto_relogin: bool, events: EventSender, machine_key: String) -> Self {
        Self {
            state: SessionState::Disconnected,
            identity: None,
            subject: None,
            public_addr: None,
            cell_id: 0,
            logging_off: false,
            auto_relogin,
            deferred: None,
            events,
            machine_key,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subject(&self) -> Option<SubjectId> {
        self.subject
    }

    pub fn public_addr(&self) -> Option<&str> {
        self.public_addr.as_deref()
    }

    pub fn cell_id(&self) -> CellId {
        self.cell_id
    }

    pub fn identity(&self) -> Option<&LogonIdentity> {
        self.identity.as_ref()
    }

    fn cell_blob_name(&self) -> String {
        format!("cell-id-{}", self.machine_key)
    }

    // ------------------------------------------------------------------------
    // Logon
    // ------------------------------------------------------------------------

    /// Start a logon attempt.
    ///
    /// `machine_id` is the identity blob produced under the configured
    /// policy; it is frozen into the identity and reused by relogins.
    pub async fn begin_logon<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        storage: &dyn BlobStorage,
        attempt: LogonAttempt,
        machine_id: Option<Vec<u8>>,
    ) -> Result<()> {
        match self.state {
            SessionState::Disconnected | SessionState::Terminated => {}
            _ => return Err(SessionError::AlreadyLoggedOn.into()),
        }

        let identity = match attempt {
            LogonAttempt::Fresh(config) => self.freeze_identity(config, storage, machine_id)?,
            LogonAttempt::RepeatPrevious => self
                .identity
                .clone()
                .ok_or(SessionError::NoPreviousIdentity)?,
        };

        tracing::debug!(app_id = identity.app_id, "starting logon");
        self.identity = Some(identity);
        self.logging_off = false;
        self.deferred = None;
        self.state = SessionState::Connecting;

        if dispatch.is_connected() {
            self.send_logon(dispatch).await
        } else {
            dispatch.transport_mut().connect().await
        }
    }

    fn freeze_identity(
        &self,
        config: LogonConfig,
        storage: &dyn BlobStorage,
        machine_id: Option<Vec<u8>>,
    ) -> Result<LogonIdentity> {
        if config.app_id == 0 {
            return Err(SessionError::MissingField { field: "app_id" }.into());
        }
        if config.game_dir.is_empty() {
            return Err(SessionError::MissingField { field: "game_dir" }.into());
        }
        if config.game_version.is_empty() {
            return Err(SessionError::MissingField {
                field: "game_version",
            }
            .into());
        }

        let cell_id = config.cell_id.or_else(|| {
            read_one(storage, &self.cell_blob_name())
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|text| text.parse().ok())
        });

        let mut flags = ServerFlags::PRIVATE;
        if config.secure {
            flags |= ServerFlags::SECURE;
        }
        if config.dedicated {
            flags |= ServerFlags::DEDICATED;
        }
        if cfg!(target_os = "linux") {
            flags |= ServerFlags::LINUX;
        }

        let obfuscated_private_addr = config
            .private_addr
            .map(|addr| u32::from(addr) ^ PRIVATE_ADDR_MASK)
            .unwrap_or(0);

        let client_supplied_id = if config.token.is_some() {
            SubjectId::game_server().raw()
        } else {
            SubjectId::anonymous_game_server().raw()
        };

        Ok(LogonIdentity {
            app_id: config.app_id,
            game_dir: config.game_dir,
            game_version: config.game_version,
            game_port: config.game_port,
            query_port: config.query_port,
            flags,
            token: config.token,
            cell_id,
            obfuscated_private_addr,
            client_supplied_id,
            machine_id,
        })
    }

    async fn send_logon<T: Transport>(&mut self, dispatch: &mut Dispatcher<T>) -> Result<()> {
        let identity = match &self.identity {
            Some(identity) => identity.clone(),
            None => return Err(SessionError::NoPreviousIdentity.into()),
        };

        let msg = if identity.token.is_some() {
            EMsg::ClientLogonGameServer
        } else {
            EMsg::ClientLogon
        };
        let request = LogonRequest {
            protocol_version: PROTOCOL_VERSION,
            client_supplied_id: identity.client_supplied_id,
            cell_id: identity.cell_id,
            auth_token: identity.token.clone(),
            obfuscated_private_addr: identity.obfuscated_private_addr,
            machine_id: identity.machine_id.clone(),
        };

        tracing::debug!(msg = msg.name(), "sending logon request");
        dispatch.send(msg, &request).await?;
        self.state = SessionState::AwaitingLogonResult;
        Ok(())
    }

    /// Transport reports the channel is up
    pub async fn on_transport_connected<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
    ) -> Result<()> {
        dispatch.set_connected(true);
        if self.state == SessionState::Connecting && self.identity.is_some() {
            self.send_logon(dispatch).await?;
        }
        Ok(())
    }

    /// Handle the backend's answer to a logon request
    pub async fn on_logon_response<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        storage: &mut dyn BlobStorage,
        response: &LogonResponse,
    ) -> Result<()> {
        if response.result == ResultCode::OK {
            let subject = SubjectId::from_raw(response.assigned_id);
            tracing::debug!(subject = subject.raw(), cell_id = response.cell_id, "logged on");

            self.subject = Some(subject);
            self.public_addr = response.public_addr.clone();
            self.cell_id = response.cell_id;
            self.state = SessionState::Authenticated;
            dispatch.set_authenticated(true);

            // Remember the assigned region hint for future attempts
            if let Err(e) =
                storage.write_named(&self.cell_blob_name(), self.cell_id.to_string().as_bytes())
            {
                tracing::warn!("failed to persist cell id: {e}");
            }

            self.announce_server_type(dispatch).await?;
            self.events.emit(Event::LoggedOn {
                subject,
                public_addr: self.public_addr.clone(),
                cell_id: self.cell_id,
            });
            return Ok(());
        }

        if response.result.is_retryable_logon() {
            tracing::debug!(code = %response.result, "logon deferred by backend, will retry");
            dispatch.transport_mut().disconnect().await?;
            dispatch.set_connected(false);
            dispatch.fail_all_pending(RequestError::ConnectionClosed);
            self.state = SessionState::Connecting;
            self.defer(DeferredAction::Relogin, RELOGIN_DELAY);
            return Ok(());
        }

        tracing::warn!(code = %response.result, "logon rejected");
        self.state = SessionState::Terminated;
        self.deferred = None;
        dispatch.transport_mut().disconnect().await?;
        dispatch.set_connected(false);
        dispatch.fail_all_pending(RequestError::ConnectionClosed);
        self.events.emit(Event::FatalError {
            code: response.result,
            reason: format!("logon rejected: {}", response.result),
        });
        Ok(())
    }

    /// Required metadata push after every successful logon
    async fn announce_server_type<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
    ) -> Result<()> {
        let identity = match &self.identity {
            Some(identity) => identity,
            None => return Ok(()),
        };
        let info = ServerTypeInfo {
            app_id: identity.app_id,
            flags: identity.flags.bits(),
            game_addr: 0,
            game_port: identity.game_port,
            query_port: identity.query_port,
            game_dir: identity.game_dir.clone(),
            game_version: identity.game_version.clone(),
        };
        dispatch.send(EMsg::GsServerType, &info).await
    }

    // ------------------------------------------------------------------------
    // Logoff / Closure
    // ------------------------------------------------------------------------

    /// Start a graceful logoff; the channel is forced closed after
    /// [`LOGOFF_GRACE`] if the backend does not close it first
    pub async fn begin_logoff<T: Transport>(&mut self, dispatch: &mut Dispatcher<T>) -> Result<()> {
        if self.state != SessionState::Authenticated {
            return Err(SessionError::NotLoggedOn.into());
        }
        tracing::debug!("logging off");
        self.logging_off = true;
        self.state = SessionState::LoggingOff;
        dispatch.send(EMsg::ClientLogOff, &LogOffNotice {}).await?;
        self.defer(DeferredAction::ForceDisconnect, LOGOFF_GRACE);
        Ok(())
    }

    /// Backend pushed a logged-off notification
    pub async fn on_logged_off<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        notice: &LoggedOffNotice,
    ) -> Result<()> {
        self.handle_log_off(dispatch, notice.result, "logged off by backend")
            .await
    }

    /// Transport reported the channel closed or faulted
    pub async fn on_channel_closed<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        code: ResultCode,
        reason: &str,
    ) -> Result<()> {
        if matches!(
            self.state,
            SessionState::Disconnected | SessionState::Terminated
        ) {
            return Ok(());
        }
        self.handle_log_off(dispatch, code, reason).await
    }

    async fn handle_log_off<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        code: ResultCode,
        reason: &str,
    ) -> Result<()> {
        dispatch.set_connected(false);
        dispatch.fail_all_pending(RequestError::ConnectionClosed);
        self.subject = None;

        if self.logging_off {
            // Expected completion of a caller-initiated logoff
            tracing::debug!(code = %code, "logoff complete");
            self.state = SessionState::Terminated;
            self.deferred = None;
            self.logging_off = false;
            dispatch.transport_mut().disconnect().await?;
            self.events.emit(Event::Disconnected {
                code,
                reason: reason.to_string(),
            });
            return Ok(());
        }

        if code.is_transient_disconnect() && self.auto_relogin && self.identity.is_some() {
            // A retry may already be scheduled if the transport reports the
            // closure twice (push followed by channel drop)
            if self.state == SessionState::Connecting && self.deferred.is_some() {
                return Ok(());
            }
            tracing::debug!(code = %code, "session dropped, scheduling relogin");
            // Hard disconnect so the retry reconnects from a clean channel
            dispatch.transport_mut().disconnect().await?;
            self.state = SessionState::Connecting;
            self.defer(DeferredAction::Relogin, RELOGIN_DELAY);
            self.events.emit(Event::Disconnected {
                code,
                reason: reason.to_string(),
            });
            return Ok(());
        }

        tracing::warn!(code = %code, reason, "session terminated");
        self.state = SessionState::Terminated;
        self.deferred = None;
        dispatch.transport_mut().disconnect().await?;
        self.events.emit(Event::FatalError {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Caller-initiated hard disconnect: no retry, pending requests reject
    pub async fn disconnect<T: Transport>(&mut self, dispatch: &mut Dispatcher<T>) -> Result<()> {
        tracing::debug!("disconnecting");
        self.deferred = None;
        self.logging_off = false;
        self.subject = None;
        self.state = SessionState::Disconnected;
        dispatch.fail_all_pending(RequestError::ConnectionClosed);
        dispatch.transport_mut().disconnect().await?;
        dispatch.set_connected(false);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Deferred Actions
    // ------------------------------------------------------------------------

    fn defer(&mut self, action: DeferredAction, delay: Duration) {
        self.deferred = Some(Deferred {
            action,
            due: Instant::now() + delay,
        });
    }

    /// Take the deferred action whose deadline has passed, if any
    pub fn poll_due(&mut self, now: Instant) -> Option<DeferredAction> {
        match self.deferred {
            Some(deferred) if deferred.due <= now => {
                self.deferred = None;
                Some(deferred.action)
            }
            _ => None,
        }
    }

    /// Deadline of the pending deferred action, for the owner's timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deferred.map(|d| d.due)
    }

    /// Execute a due [`DeferredAction::Relogin`]
    pub async fn relogin<T: Transport>(&mut self, dispatch: &mut Dispatcher<T>) -> Result<()> {
        if self.state != SessionState::Connecting || self.identity.is_none() {
            return Ok(());
        }
        tracing::debug!("attempting relogin");
        if dispatch.is_connected() {
            self.send_logon(dispatch).await
        } else {
            dispatch.transport_mut().connect().await
        }
    }

    /// Execute a due [`DeferredAction::ForceDisconnect`]
    pub async fn force_disconnect<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
    ) -> Result<()> {
        tracing::debug!("logoff grace expired, forcing disconnect");
        self.handle_log_off(dispatch, ResultCode::INVALID, "logoff grace expired")
            .await
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
