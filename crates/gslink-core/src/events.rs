//! Push-style events emitted to client subscribers
//!
//! Every externally observable state change is surfaced as an [`Event`] on
//! an unbounded channel handed out at client construction. Per-subject
//! notifications carry the subject as a typed field; subscribers filter
//! on it.

use tokio::sync::mpsc;

use crate::types::{AppId, AuthSessionResponse, CellId, ResultCode, SubjectId};

// ----------------------------------------------------------------------------
// Event Types
// ----------------------------------------------------------------------------

/// Payload shared by ticket status/validation events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketEvent {
    /// Subject whose ticket was validated; our own id for self-tickets
    pub subject: SubjectId,
    /// App-owner subject, when the backend reports one
    pub owner: Option<SubjectId>,
    pub app_id: AppId,
    pub ticket_crc: u32,
    /// Sub-token embedded in the ticket, used for the secondary handshake
    pub gc_token: u64,
    /// Backend-assigned ticket state code
    pub state: u32,
    pub response: AuthSessionResponse,
}

/// Events emitted by a client session
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Authentication completed; the session is usable
    LoggedOn {
        subject: SubjectId,
        public_addr: Option<String>,
        cell_id: CellId,
    },
    /// The session dropped non-fatally; an automatic relogin may follow
    Disconnected { code: ResultCode, reason: String },
    /// The session terminated fatally; no automatic retry will occur
    FatalError { code: ResultCode, reason: String },
    /// Free-form diagnostic line
    Debug(String),
    /// Backend reported this server's anti-cheat/secure status
    Secure { is_secure: bool },
    /// Our own (self) ticket changed validation state
    AuthTicketStatus(TicketEvent),
    /// A remote holder's ticket was validated or rejected
    AuthTicketValidation(TicketEvent),
}

// ----------------------------------------------------------------------------
// Event Sender
// ----------------------------------------------------------------------------

/// Cloneable emitter half of the event channel.
///
/// Emission never fails; a dropped receiver simply discards events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Emit an event to subscribers
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Emit a debug event (alongside any tracing the caller does)
    pub fn debug<S: Into<String>>(&self, text: S) {
        self.emit(Event::Debug(text.into()));
    }
}

/// Create the event channel for one client session
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_receive() {
        let (tx, mut rx) = event_channel();
        tx.debug("hello");
        tx.emit(Event::Secure { is_secure: true });

        assert_eq!(rx.try_recv().unwrap(), Event::Debug("hello".to_string()));
        assert_eq!(rx.try_recv().unwrap(), Event::Secure { is_secure: true });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = event_channel();
        drop(rx);
        // Must not panic
        tx.debug("nobody listening");
    }
}
