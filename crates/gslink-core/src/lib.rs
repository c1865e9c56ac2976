//! GsLink Core Protocol Implementation
//!
//! Client-side protocol layer for a dedicated game server talking to its
//! remote backend over an externally provided transport. This crate owns
//! everything above the raw channel: the session lifecycle state machine,
//! typed message dispatch with job-id correlation, the authorization
//! ticket ledger, and the fragmented-response aggregator used by bulk
//! queries.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod aggregator;
pub mod client;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod machine_id;
pub mod registry;
pub mod session;
pub mod storage;
pub mod tickets;
pub mod transport;
pub mod types;
pub mod wire;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use client::{ClientConfig, GsClient, ProductInfoJob, UnifiedReply};
pub use dispatch::{Dispatcher, InboundMessage, PendingReply, ReplyStream, TypedReply};
pub use errors::{GsError, RequestError, Result, SessionError, TicketError};
pub use events::{Event, TicketEvent};
pub use machine_id::MachineIdPolicy;
pub use registry::{MessageKey, SchemaRegistry};
pub use session::{LogonConfig, SessionState};
pub use storage::{BlobStorage, FileStorage, MemoryStorage};
pub use tickets::{ActiveTicketRecord, AppTicket, ResyncWait, TicketLedger};
pub use transport::{Endpoint, MockTransport, Transport, TransportEvent};
pub use types::{AppId, CellId, PackageId, ResultCode, ServerFlags, SubjectId};
pub use wire::{EMsg, MessageHeader};
