//! Authorization ticket ledger
//!
//! Tracks the set of tickets this server has told the backend are active.
//! The backend's authorization list is a snapshot, not a delta stream, so
//! every local change retransmits the full set with strictly increasing
//! sequence counters; validation outcomes arrive later as pushes keyed by
//! the ticket's crc32.

use std::time::Duration;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tokio::sync::watch;

use crate::dispatch::Dispatcher;
use crate::errors::{RequestError, Result, TicketError};
use crate::events::{Event, EventSender, TicketEvent};
use crate::transport::Transport;
use crate::types::{AppId, SubjectId};
use crate::wire::{AuthListAck, AuthListUpdate, EMsg, TicketAuthComplete, TicketEntry};

/// How long a resync waits for the backend's sequence acknowledgement
pub const RESYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed length of the signed leading section of a ticket
const TICKET_SECTION_LEN: usize = 32;

/// ed25519 signature length
const SIGNATURE_LEN: usize = 64;

// ----------------------------------------------------------------------------
// App Tickets
// ----------------------------------------------------------------------------

/// Parsed view of an opaque app ticket.
///
/// Layout (little-endian): a 32-byte signed section holding the sub-token
/// length (always 8), the sub-token, the holder's subject id, the app id
/// and the issue/expiry timestamps, followed by a signature length (0 or
/// 64) and the signature over the section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTicket {
    pub gc_token: u64,
    pub subject: SubjectId,
    pub app_id: AppId,
    pub issued_at: u32,
    pub expires_at: u32,
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

impl AppTicket {
    /// Parse raw ticket bytes; `index` identifies the ticket within an
    /// activation batch for error reporting
    pub fn parse(index: usize, bytes: &[u8]) -> core::result::Result<Self, TicketError> {
        let malformed = |reason: &str| TicketError::Malformed {
            index,
            reason: reason.to_string(),
        };

        if bytes.len() < TICKET_SECTION_LEN + 4 {
            return Err(malformed("too short"));
        }
        let gc_token_len = read_u32(bytes, 0);
        if gc_token_len != 8 {
            return Err(malformed("bad sub-token length"));
        }

        let gc_token = read_u64(bytes, 4);
        let subject = SubjectId::from_raw(read_u64(bytes, 12));
        let app_id = read_u32(bytes, 20);
        let issued_at = read_u32(bytes, 24);
        let expires_at = read_u32(bytes, 28);

        let sig_len = read_u32(bytes, TICKET_SECTION_LEN) as usize;
        let signature = match sig_len {
            0 => None,
            SIGNATURE_LEN => {
                let start = TICKET_SECTION_LEN + 4;
                if bytes.len() < start + SIGNATURE_LEN {
                    return Err(malformed("truncated signature"));
                }
                let mut sig = [0u8; SIGNATURE_LEN];
                sig.copy_from_slice(&bytes[start..start + SIGNATURE_LEN]);
                Some(sig)
            }
            _ => return Err(malformed("bad signature length")),
        };

        Ok(Self {
            gc_token,
            subject,
            app_id,
            issued_at,
            expires_at,
            signature,
        })
    }

    /// Validate a parsed ticket against the expected app, issuer key and
    /// current time
    pub fn validate(
        &self,
        index: usize,
        bytes: &[u8],
        expected_app: AppId,
        issuer: &VerifyingKey,
        now_unix: u32,
    ) -> core::result::Result<(), TicketError> {
        if self.app_id != expected_app {
            return Err(TicketError::WrongApp {
                index,
                expected: expected_app,
                actual: self.app_id,
            });
        }
        if self.expires_at <= now_unix {
            return Err(TicketError::Expired { index });
        }
        let signature = self.signature.ok_or(TicketError::Unsigned { index })?;
        let signature = Signature::from_bytes(&signature);
        issuer
            .verify(&bytes[..TICKET_SECTION_LEN], &signature)
            .map_err(|_| TicketError::BadSignature { index })
    }

    /// Read the embedded sub-token straight out of raw ticket bytes
    pub fn gc_token_of(bytes: &[u8]) -> u64 {
        if bytes.len() < 12 {
            return 0;
        }
        read_u64(bytes, 4)
    }
}

/// Encode a ticket in wire layout, used by issuing-side tooling and tests
pub fn encode_ticket(
    gc_token: u64,
    subject: SubjectId,
    app_id: AppId,
    issued_at: u32,
    expires_at: u32,
    signer: Option<&ed25519_dalek::SigningKey>,
) -> Vec<u8> {
    use ed25519_dalek::Signer;

    let mut bytes = Vec::with_capacity(TICKET_SECTION_LEN + 4 + SIGNATURE_LEN);
    bytes.extend_from_slice(&8u32.to_le_bytes());
    bytes.extend_from_slice(&gc_token.to_le_bytes());
    bytes.extend_from_slice(&subject.raw().to_le_bytes());
    bytes.extend_from_slice(&app_id.to_le_bytes());
    bytes.extend_from_slice(&issued_at.to_le_bytes());
    bytes.extend_from_slice(&expires_at.to_le_bytes());
    debug_assert_eq!(bytes.len(), TICKET_SECTION_LEN);

    match signer {
        Some(key) => {
            let signature = key.sign(&bytes[..TICKET_SECTION_LEN]);
            bytes.extend_from_slice(&(SIGNATURE_LEN as u32).to_le_bytes());
            bytes.extend_from_slice(&signature.to_bytes());
        }
        None => bytes.extend_from_slice(&0u32.to_le_bytes()),
    }
    bytes
}

// ----------------------------------------------------------------------------
// Ledger Records
// ----------------------------------------------------------------------------

/// One active-ticket record in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTicketRecord {
    /// Subject the ticket authorizes; [`SubjectId::ZERO`] for our own ticket
    pub subject: SubjectId,
    pub app_id: AppId,
    pub crc: u32,
    pub ticket: Vec<u8>,
    /// Backend-assigned state code
    pub state: u32,
}

impl ActiveTicketRecord {
    pub fn is_self(&self) -> bool {
        self.subject == SubjectId::ZERO
    }
}

// ----------------------------------------------------------------------------
// Resync Handle
// ----------------------------------------------------------------------------

/// Awaits the backend acknowledging a snapshot sequence number
#[derive(Debug)]
pub struct ResyncWait {
    rx: watch::Receiver<u32>,
    seq: u32,
}

impl ResyncWait {
    /// The sequence number this handle waits for
    pub fn sequence(&self) -> u32 {
        self.seq
    }

    /// Wait until the acked sequence reaches this snapshot's, bounded by
    /// [`RESYNC_TIMEOUT`]
    pub async fn wait(mut self) -> core::result::Result<(), RequestError> {
        let seq = self.seq;
        match tokio::time::timeout(RESYNC_TIMEOUT, self.rx.wait_for(|acked| *acked >= seq)).await {
            Err(_) => Err(RequestError::Timeout(RESYNC_TIMEOUT)),
            Ok(Err(_)) => Err(RequestError::ConnectionClosed),
            Ok(Ok(_)) => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------
// Ticket Ledger
// ----------------------------------------------------------------------------

/// De-duplicated active-ticket set with snapshot resynchronization
pub struct TicketLedger {
    records: Vec<ActiveTicketRecord>,
    seq_sent: u32,
    seq_acked: u32,
    issuer: VerifyingKey,
    ack_tx: watch::Sender<u32>,
    events: EventSender,
}

impl TicketLedger {
    pub fn new(issuer: VerifyingKey, events: EventSender) -> Self {
        let (ack_tx, _) = watch::channel(0);
        Self {
            records: Vec::new(),
            seq_sent: 0,
            seq_acked: 0,
            issuer,
            ack_tx,
            events,
        }
    }

    pub fn records(&self) -> &[ActiveTicketRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sequences(&self) -> (u32, u32) {
        (self.seq_sent, self.seq_acked)
    }

    /// Activate a batch of tickets for `app_id` and resync the full set.
    ///
    /// Validation is atomic: if any ticket is rejected, no ticket in the
    /// batch touches the ledger. A ticket whose embedded subject equals
    /// `self_subject` is stored as a self-ticket; any other subject may
    /// hold at most one active ticket per app, so a newer ticket evicts
    /// the older record for the same (subject, app) pair. Activating an
    /// already-known (subject, crc) pair is idempotent but the resync
    /// still fires, keeping sequence counters aligned.
    pub async fn activate<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        self_subject: SubjectId,
        app_id: AppId,
        tickets: &[Vec<u8>],
        now_unix: u32,
    ) -> Result<ResyncWait> {
        // Validate everything before mutating anything
        let mut parsed = Vec::with_capacity(tickets.len());
        for (index, bytes) in tickets.iter().enumerate() {
            let ticket = AppTicket::parse(index, bytes)?;
            ticket.validate(index, bytes, app_id, &self.issuer, now_unix)?;
            parsed.push(ticket);
        }

        for (ticket, bytes) in parsed.iter().zip(tickets.iter()) {
            let crc = crc32fast::hash(bytes);
            let subject = if ticket.subject == self_subject {
                SubjectId::ZERO
            } else {
                ticket.subject
            };

            if self
                .records
                .iter()
                .any(|r| r.subject == subject && r.crc == crc)
            {
                tracing::debug!(crc, "ticket already active, skipping");
                continue;
            }
            if subject != SubjectId::ZERO {
                self.records
                    .retain(|r| !(r.subject == subject && r.app_id == app_id));
            }

            tracing::debug!(subject = subject.raw(), app_id, crc, "activating ticket");
            self.records.push(ActiveTicketRecord {
                subject,
                app_id,
                crc,
                ticket: bytes.clone(),
                state: if subject == SubjectId::ZERO { 0 } else { 1 },
            });
        }

        self.send_auth_list(dispatch, Some(app_id)).await
    }

    /// Transmit the full active-ticket snapshot.
    ///
    /// `force_app` guarantees an app id appears in the announced set even
    /// when no ticket currently remains for it.
    pub async fn send_auth_list<T: Transport>(
        &mut self,
        dispatch: &mut Dispatcher<T>,
        force_app: Option<AppId>,
    ) -> Result<ResyncWait> {
        let mut app_ids: Vec<AppId> = Vec::new();
        if let Some(app) = force_app {
            app_ids.push(app);
        }
        for record in &self.records {
            if !app_ids.contains(&record.app_id) {
                app_ids.push(record.app_id);
            }
        }

        let sequence = self.seq_sent + 1;
        let update = AuthListUpdate {
            tokens_left: 0,
            last_seq_sent: self.seq_sent,
            last_seq_acked: self.seq_acked,
            tickets: self
                .records
                .iter()
                .map(|r| TicketEntry {
                    state: r.state,
                    subject: r.subject.raw(),
                    app_id: r.app_id,
                    crc: r.crc,
                    ticket: r.ticket.clone(),
                })
                .collect(),
            app_ids,
            sequence,
        };

        tracing::debug!(sequence, tickets = update.tickets.len(), "sending auth list");
        dispatch.send(EMsg::ClientAuthList, &update).await?;
        self.seq_sent = sequence;

        Ok(ResyncWait {
            rx: self.ack_tx.subscribe(),
            seq: sequence,
        })
    }

    /// Handle the backend acknowledging a snapshot sequence
    pub fn on_ack(&mut self, ack: &AuthListAck) {
        tracing::debug!(sequence = ack.sequence, "auth list acked");
        self.seq_acked = ack.sequence;
        self.ack_tx.send_replace(ack.sequence);
    }

    /// Handle a validation-outcome push.
    ///
    /// Unknown checksums are ignored (stale or duplicate notifications);
    /// a non-OK outcome removes the record, since the backend has revoked
    /// it unilaterally.
    pub fn on_auth_complete(&mut self, push: &TicketAuthComplete) {
        let position = match self.records.iter().position(|r| r.crc == push.ticket_crc) {
            Some(position) => position,
            None => {
                tracing::debug!(crc = push.ticket_crc, "validation push for unknown ticket");
                self.events.debug(format!(
                    "ignoring auth outcome for unknown ticket crc {}",
                    push.ticket_crc
                ));
                return;
            }
        };

        self.records[position].state = push.state;
        let record_is_self = self.records[position].is_self();
        let gc_token = AppTicket::gc_token_of(&self.records[position].ticket);
        if !push.response.is_ok() {
            tracing::debug!(crc = push.ticket_crc, response = push.response.0, "ticket revoked");
            self.records.remove(position);
        }

        let event = TicketEvent {
            subject: SubjectId::from_raw(push.subject),
            owner: (push.owner != 0).then_some(SubjectId::from_raw(push.owner)),
            app_id: push.app_id,
            ticket_crc: push.ticket_crc,
            gc_token,
            state: push.state,
            response: push.response,
        };
        self.events.emit(if record_is_self {
            Event::AuthTicketStatus(event)
        } else {
            Event::AuthTicketValidation(event)
        });
    }

    /// Reset sequence counters after a fresh logon
    pub fn reset_sequences(&mut self) {
        self.seq_sent = 0;
        self.seq_acked = 0;
        self.ack_tx.send_replace(0);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use crate::registry::SchemaRegistry;
    use crate::transport::MockTransport;
    use crate::types::AuthSessionResponse;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    const NOW: u32 = 1_700_000_000;
    const APP: AppId = 730;

    fn self_subject() -> SubjectId {
        SubjectId::anonymous_game_server()
    }

    fn remote_subject(account: u32) -> SubjectId {
        use crate::types::{AccountType, Universe};
        SubjectId::new(Universe::Public, AccountType::Individual, 1, account)
    }

    struct Fixture {
        signer: SigningKey,
        ledger: TicketLedger,
        dispatch: Dispatcher<MockTransport>,
        events: tokio::sync::mpsc::UnboundedReceiver<Event>,
    }

    impl Fixture {
        /// Next queued event that is not a debug trace
        fn next_event(&mut self) -> Option<Event> {
            while let Ok(event) = self.events.try_recv() {
                if !matches!(event, Event::Debug(_)) {
                    return Some(event);
                }
            }
            None
        }
    }

    fn fixture() -> Fixture {
        let signer = SigningKey::generate(&mut OsRng);
        let (events_tx, events) = event_channel();
        let ledger = TicketLedger::new(signer.verifying_key(), events_tx.clone());
        let mut dispatch =
            Dispatcher::new(MockTransport::new(), SchemaRegistry::standard(), events_tx);
        dispatch.set_connected(true);
        dispatch.set_authenticated(true);
        Fixture {
            signer,
            ledger,
            dispatch,
            events,
        }
    }

    fn ticket_for(fixture: &Fixture, subject: SubjectId, gc_token: u64) -> Vec<u8> {
        encode_ticket(
            gc_token,
            subject,
            APP,
            NOW - 60,
            NOW + 3600,
            Some(&fixture.signer),
        )
    }

    fn sent_update(fixture: &Fixture, index: usize) -> AuthListUpdate {
        let (header, body) = &fixture.dispatch.transport().sent()[index];
        assert_eq!(header.msg, EMsg::ClientAuthList);
        bincode::deserialize(body).unwrap()
    }

    #[test]
    fn test_parse_round_trip() {
        let signer = SigningKey::generate(&mut OsRng);
        let bytes = encode_ticket(0xABCD, remote_subject(7), APP, NOW, NOW + 100, Some(&signer));
        let ticket = AppTicket::parse(0, &bytes).unwrap();
        assert_eq!(ticket.gc_token, 0xABCD);
        assert_eq!(ticket.subject, remote_subject(7));
        assert_eq!(ticket.app_id, APP);
        assert!(ticket.signature.is_some());
        assert_eq!(AppTicket::gc_token_of(&bytes), 0xABCD);

        ticket
            .validate(0, &bytes, APP, &signer.verifying_key(), NOW)
            .unwrap();
    }

    #[test]
    fn test_validation_rejections() {
        let signer = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let key = signer.verifying_key();

        assert!(matches!(
            AppTicket::parse(3, &[0u8; 8]),
            Err(TicketError::Malformed { index: 3, .. })
        ));

        let expired = encode_ticket(1, remote_subject(1), APP, NOW - 100, NOW - 1, Some(&signer));
        let ticket = AppTicket::parse(0, &expired).unwrap();
        assert!(matches!(
            ticket.validate(0, &expired, APP, &key, NOW),
            Err(TicketError::Expired { index: 0 })
        ));

        let unsigned = encode_ticket(1, remote_subject(1), APP, NOW, NOW + 100, None);
        let ticket = AppTicket::parse(1, &unsigned).unwrap();
        assert!(matches!(
            ticket.validate(1, &unsigned, APP, &key, NOW),
            Err(TicketError::Unsigned { index: 1 })
        ));

        let forged = encode_ticket(1, remote_subject(1), APP, NOW, NOW + 100, Some(&other));
        let ticket = AppTicket::parse(2, &forged).unwrap();
        assert!(matches!(
            ticket.validate(2, &forged, APP, &key, NOW),
            Err(TicketError::BadSignature { index: 2 })
        ));

        let wrong_app = encode_ticket(1, remote_subject(1), 440, NOW, NOW + 100, Some(&signer));
        let ticket = AppTicket::parse(0, &wrong_app).unwrap();
        assert!(matches!(
            ticket.validate(0, &wrong_app, APP, &key, NOW),
            Err(TicketError::WrongApp {
                index: 0,
                expected: APP,
                actual: 440
            })
        ));
    }

    #[tokio::test]
    async fn test_activate_stores_self_ticket_with_zero_subject() {
        let mut f = fixture();
        let bytes = ticket_for(&f, self_subject(), 42);

        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[bytes], NOW)
            .await
            .unwrap();

        assert_eq!(f.ledger.records().len(), 1);
        assert!(f.ledger.records()[0].is_self());

        let update = sent_update(&f, 0);
        assert_eq!(update.sequence, 1);
        assert_eq!(update.tickets.len(), 1);
        assert_eq!(update.tickets[0].subject, 0);
        assert_eq!(update.app_ids, vec![APP]);
    }

    #[tokio::test]
    async fn test_activate_rejects_batch_atomically() {
        let mut f = fixture();
        let good = ticket_for(&f, remote_subject(1), 1);
        let expired = encode_ticket(
            2,
            remote_subject(2),
            APP,
            NOW - 100,
            NOW - 1,
            Some(&f.signer),
        );

        let err = f
            .ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[good, expired], NOW)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::errors::GsError::Ticket(TicketError::Expired { index: 1 })
        ));
        assert!(f.ledger.is_empty());
        assert!(f.dispatch.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_activation_is_idempotent_but_resyncs() {
        let mut f = fixture();
        let bytes = ticket_for(&f, remote_subject(9), 5);

        f.ledger
            .activate(
                &mut f.dispatch,
                self_subject(),
                APP,
                &[bytes.clone()],
                NOW,
            )
            .await
            .unwrap();
        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[bytes], NOW)
            .await
            .unwrap();

        assert_eq!(f.ledger.records().len(), 1);
        let first = sent_update(&f, 0);
        let second = sent_update(&f, 1);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(first.tickets, second.tickets);
    }

    #[tokio::test]
    async fn test_newer_ticket_supersedes_same_subject_and_app() {
        let mut f = fixture();
        let old = ticket_for(&f, remote_subject(3), 10);
        let new = ticket_for(&f, remote_subject(3), 11);

        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[old], NOW)
            .await
            .unwrap();
        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[new.clone()], NOW)
            .await
            .unwrap();

        assert_eq!(f.ledger.records().len(), 1);
        assert_eq!(f.ledger.records()[0].crc, crc32fast::hash(&new));
    }

    #[tokio::test]
    async fn test_empty_activation_still_resyncs_with_forced_app() {
        let mut f = fixture();
        let wait = f
            .ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[], NOW)
            .await
            .unwrap();
        assert_eq!(wait.sequence(), 1);

        let update = sent_update(&f, 0);
        assert!(update.tickets.is_empty());
        assert_eq!(update.app_ids, vec![APP]);
    }

    #[tokio::test]
    async fn test_resync_wait_resolves_on_ack() {
        let mut f = fixture();
        let wait = f
            .ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[], NOW)
            .await
            .unwrap();

        f.ledger.on_ack(&AuthListAck {
            app_ids: vec![APP],
            sequence: wait.sequence(),
        });
        wait.wait().await.unwrap();
        assert_eq!(f.ledger.sequences(), (1, 1));
    }

    #[tokio::test]
    async fn test_auth_complete_ok_updates_state_and_emits_validation() {
        let mut f = fixture();
        let bytes = ticket_for(&f, remote_subject(4), 77);
        let crc = crc32fast::hash(&bytes);
        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[bytes], NOW)
            .await
            .unwrap();

        f.ledger.on_auth_complete(&TicketAuthComplete {
            subject: remote_subject(4).raw(),
            owner: 0,
            app_id: APP,
            ticket_crc: crc,
            state: 2,
            response: AuthSessionResponse::OK,
        });

        assert_eq!(f.ledger.records()[0].state, 2);
        match f.next_event().unwrap() {
            Event::AuthTicketValidation(event) => {
                assert_eq!(event.subject, remote_subject(4));
                assert_eq!(event.gc_token, 77);
                assert!(event.response.is_ok());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_complete_failure_removes_record() {
        let mut f = fixture();
        let bytes = ticket_for(&f, self_subject(), 8);
        let crc = crc32fast::hash(&bytes);
        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[bytes], NOW)
            .await
            .unwrap();

        f.ledger.on_auth_complete(&TicketAuthComplete {
            subject: self_subject().raw(),
            owner: 0,
            app_id: APP,
            ticket_crc: crc,
            state: 3,
            response: AuthSessionResponse::NO_LICENSE_OR_EXPIRED,
        });

        assert!(f.ledger.is_empty());
        assert!(matches!(
            f.next_event().unwrap(),
            Event::AuthTicketStatus(event) if !event.response.is_ok()
        ));
    }

    #[tokio::test]
    async fn test_auth_complete_unknown_crc_is_ignored() {
        let mut f = fixture();
        f.ledger.on_auth_complete(&TicketAuthComplete {
            subject: 0,
            owner: 0,
            app_id: APP,
            ticket_crc: 0xDEAD_BEEF,
            state: 1,
            response: AuthSessionResponse::OK,
        });
        assert!(matches!(f.events.try_recv().unwrap(), Event::Debug(_)));
    }

    #[tokio::test]
    async fn test_reset_sequences_after_fresh_logon() {
        let mut f = fixture();
        f.ledger
            .activate(&mut f.dispatch, self_subject(), APP, &[], NOW)
            .await
            .unwrap();
        f.ledger.on_ack(&AuthListAck {
            app_ids: vec![APP],
            sequence: 1,
        });
        assert_eq!(f.ledger.sequences(), (1, 1));

        f.ledger.reset_sequences();
        assert_eq!(f.ledger.sequences(), (0, 0));

        let wait = f
            .ledger
            .send_auth_list(&mut f.dispatch, None)
            .await
            .unwrap();
        assert_eq!(wait.sequence(), 1);
    }
}
