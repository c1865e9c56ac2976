//! Wire-level message identifiers and typed message bodies
//!
//! The external transport delivers framed messages as a [`MessageHeader`]
//! plus an opaque body. This module defines the message-id space and the
//! typed bodies the core encodes and decodes (via bincode) on either side
//! of that split. The transport never interprets bytes below the
//! header/body boundary.

use serde::{Deserialize, Serialize};

use crate::types::{AppId, AuthSessionResponse, CellId, PackageId, ResultCode};

/// Protocol version announced in every logon attempt
pub const PROTOCOL_VERSION: u32 = 65575;

/// Mask applied to the private address field in a logon request
pub const PRIVATE_ADDR_MASK: u32 = 0xBAAD_F00D;

// ----------------------------------------------------------------------------
// Message Identifiers
// ----------------------------------------------------------------------------

/// Numeric message identifiers shared with the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EMsg {
    Invalid = 0,
    Multi = 1,
    ChannelEncryptRequest = 1303,
    ChannelEncryptResponse = 1304,
    ChannelEncryptResult = 1305,
    ClientLogOnResponse = 751,
    ClientLoggedOff = 757,
    GsStatusReply = 865,
    GsServerType = 880,
    ClientTicketAuthComplete = 5426,
    ClientAuthList = 5432,
    ClientAuthListAck = 5434,
    ClientLogOff = 5502,
    ClientLogon = 5514,
    ClientLogonGameServer = 5515,
    ClientPlayerCountRequest = 5786,
    ClientPlayerCountResponse = 5787,
    ClientServiceMethod = 5893,
    ClientServiceMethodResponse = 5894,
    ClientProductChangesRequest = 8901,
    ClientProductChangesResponse = 8902,
    ClientProductInfoRequest = 8903,
    ClientProductInfoResponse = 8904,
}

impl EMsg {
    /// Map a raw message id back to a known identifier
    pub fn from_raw(raw: u32) -> Option<EMsg> {
        use EMsg::*;
        Some(match raw {
            0 => Invalid,
            1 => Multi,
            1303 => ChannelEncryptRequest,
            1304 => ChannelEncryptResponse,
            1305 => ChannelEncryptResult,
            751 => ClientLogOnResponse,
            757 => ClientLoggedOff,
            865 => GsStatusReply,
            880 => GsServerType,
            5426 => ClientTicketAuthComplete,
            5432 => ClientAuthList,
            5434 => ClientAuthListAck,
            5502 => ClientLogOff,
            5514 => ClientLogon,
            5515 => ClientLogonGameServer,
            5786 => ClientPlayerCountRequest,
            5787 => ClientPlayerCountResponse,
            5893 => ClientServiceMethod,
            5894 => ClientServiceMethodResponse,
            8901 => ClientProductChangesRequest,
            8902 => ClientProductChangesResponse,
            8903 => ClientProductInfoRequest,
            8904 => ClientProductInfoResponse,
            _ => return None,
        })
    }

    /// Name used for debug traces
    pub fn name(&self) -> &'static str {
        match self {
            EMsg::Invalid => "Invalid",
            EMsg::Multi => "Multi",
            EMsg::ChannelEncryptRequest => "ChannelEncryptRequest",
            EMsg::ChannelEncryptResponse => "ChannelEncryptResponse",
            EMsg::ChannelEncryptResult => "ChannelEncryptResult",
            EMsg::ClientLogOnResponse => "ClientLogOnResponse",
            EMsg::ClientLoggedOff => "ClientLoggedOff",
            EMsg::GsStatusReply => "GsStatusReply",
            EMsg::GsServerType => "GsServerType",
            EMsg::ClientTicketAuthComplete => "ClientTicketAuthComplete",
            EMsg::ClientAuthList => "ClientAuthList",
            EMsg::ClientAuthListAck => "ClientAuthListAck",
            EMsg::ClientLogOff => "ClientLogOff",
            EMsg::ClientLogon => "ClientLogon",
            EMsg::ClientLogonGameServer => "ClientLogonGameServer",
            EMsg::ClientPlayerCountRequest => "ClientPlayerCountRequest",
            EMsg::ClientPlayerCountResponse => "ClientPlayerCountResponse",
            EMsg::ClientServiceMethod => "ClientServiceMethod",
            EMsg::ClientServiceMethodResponse => "ClientServiceMethodResponse",
            EMsg::ClientProductChangesRequest => "ClientProductChangesRequest",
            EMsg::ClientProductChangesResponse => "ClientProductChangesResponse",
            EMsg::ClientProductInfoRequest => "ClientProductInfoRequest",
            EMsg::ClientProductInfoResponse => "ClientProductInfoResponse",
        }
    }

    /// Messages that may be sent before authentication is established.
    ///
    /// Everything else is silently dropped while not logged on; callers are
    /// expected to wait for the authenticated state.
    pub fn allowed_before_auth(&self) -> bool {
        matches!(
            self,
            EMsg::ChannelEncryptRequest
                | EMsg::ChannelEncryptResponse
                | EMsg::ChannelEncryptResult
                | EMsg::ClientLogon
                | EMsg::ClientLogonGameServer
        )
    }
}

// ----------------------------------------------------------------------------
// Message Header
// ----------------------------------------------------------------------------

/// Header carried with every framed message.
///
/// `source_job_id` is set on outbound requests expecting a correlated reply;
/// the backend echoes it back as `target_job_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub msg: EMsg,
    /// Whether the body is schema-encoded (as opposed to opaque bytes)
    pub proto: bool,
    pub source_job_id: Option<u64>,
    pub target_job_id: Option<u64>,
}

impl MessageHeader {
    /// Plain header with no correlation ids
    pub fn new(msg: EMsg, proto: bool) -> Self {
        Self {
            msg,
            proto,
            source_job_id: None,
            target_job_id: None,
        }
    }

    /// Header for a reply correlated to an earlier request
    pub fn reply_to(msg: EMsg, proto: bool, job_id: u64) -> Self {
        Self {
            msg,
            proto,
            source_job_id: None,
            target_job_id: Some(job_id),
        }
    }
}

// ----------------------------------------------------------------------------
// Logon Bodies
// ----------------------------------------------------------------------------

/// Body of `ClientLogon` / `ClientLogonGameServer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogonRequest {
    pub protocol_version: u32,
    pub client_supplied_id: u64,
    pub cell_id: Option<CellId>,
    /// Long-lived server token; absent for anonymous logons
    pub auth_token: Option<String>,
    /// Private address XORed with [`PRIVATE_ADDR_MASK`], 0 if unknown
    pub obfuscated_private_addr: u32,
    pub machine_id: Option<Vec<u8>>,
}

/// Body of `ClientLogOnResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogonResponse {
    pub result: ResultCode,
    pub assigned_id: u64,
    pub public_addr: Option<String>,
    pub cell_id: CellId,
    pub heartbeat_secs: u32,
}

/// Body of `ClientLogOff` (empty)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogOffNotice {}

/// Body of `ClientLoggedOff`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedOffNotice {
    pub result: ResultCode,
}

/// Body of `GsServerType`, the metadata push required after every logon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerTypeInfo {
    pub app_id: AppId,
    pub flags: u32,
    pub game_addr: u32,
    pub game_port: u16,
    pub query_port: u16,
    pub game_dir: String,
    pub game_version: String,
}

/// Body of `GsStatusReply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub is_secure: bool,
}

// ----------------------------------------------------------------------------
// Ticket Bodies
// ----------------------------------------------------------------------------

/// One ledger entry as transmitted in an auth-list snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketEntry {
    /// Backend-assigned state code; 0 for a self-ticket, 1 when pending
    pub state: u32,
    /// Raw subject id, 0 when the ticket belongs to this server
    pub subject: u64,
    pub app_id: AppId,
    pub crc: u32,
    pub ticket: Vec<u8>,
}

/// Body of `ClientAuthList`: a full snapshot of the active ticket set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthListUpdate {
    pub tokens_left: u32,
    pub last_seq_sent: u32,
    pub last_seq_acked: u32,
    pub tickets: Vec<TicketEntry>,
    pub app_ids: Vec<AppId>,
    pub sequence: u32,
}

/// Body of `ClientAuthListAck`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthListAck {
    pub app_ids: Vec<AppId>,
    /// Echo of the snapshot sequence being acknowledged
    pub sequence: u32,
}

/// Body of `ClientTicketAuthComplete`, a backend validation push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAuthComplete {
    pub subject: u64,
    pub owner: u64,
    pub app_id: AppId,
    pub ticket_crc: u32,
    pub state: u32,
    pub response: AuthSessionResponse,
}

// ----------------------------------------------------------------------------
// Query Bodies
// ----------------------------------------------------------------------------

/// Body of `ClientPlayerCountRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCountRequest {
    pub app_id: AppId,
}

/// Body of `ClientPlayerCountResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCountResponse {
    pub result: ResultCode,
    pub player_count: u32,
}

impl PlayerCountResponse {
    /// Extract the count, mapping a non-OK result to a request error
    pub fn into_count(self) -> core::result::Result<u32, crate::errors::RequestError> {
        if self.result == ResultCode::OK {
            Ok(self.player_count)
        } else {
            Err(crate::errors::RequestError::Backend(self.result))
        }
    }
}

/// Body of `ClientProductChangesRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductChangesRequest {
    pub since_change_number: u32,
    pub send_app_changes: bool,
    pub send_package_changes: bool,
}

/// A single changed product in a changes response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductChange {
    pub id: u32,
    pub change_number: u32,
    pub needs_token: bool,
}

/// Body of `ClientProductChangesResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductChangesResponse {
    pub current_change_number: u32,
    pub app_changes: Vec<ProductChange>,
    pub package_changes: Vec<ProductChange>,
}

/// One requested item in a bulk product-info query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfoQuery {
    pub id: u32,
    pub access_token: u64,
}

impl ProductInfoQuery {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            access_token: 0,
        }
    }
}

/// Body of `ClientProductInfoRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfoRequest {
    pub apps: Vec<ProductInfoQuery>,
    pub packages: Vec<ProductInfoQuery>,
}

/// One resolved item in a product-info delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfoEntry {
    pub id: u32,
    pub change_number: u32,
    pub missing_token: bool,
    /// Opaque metadata payload, parsed by a caller-supplied parser
    pub payload: Vec<u8>,
}

/// Body of `ClientProductInfoResponse`.
///
/// A single logical query may be answered by several of these; each carries
/// a subset of the requested ids, resolved or reported unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfoResponse {
    pub apps: Vec<ProductInfoEntry>,
    pub unknown_app_ids: Vec<AppId>,
    pub packages: Vec<ProductInfoEntry>,
    pub unknown_package_ids: Vec<PackageId>,
    pub response_pending: bool,
}

// ----------------------------------------------------------------------------
// Unified Method Envelope
// ----------------------------------------------------------------------------

/// Body of `ClientServiceMethod`: a request addressed by a textual
/// `Interface.Method#Version` key rather than a numeric message id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMethodCall {
    pub method_name: String,
    pub payload: Vec<u8>,
    pub is_notification: bool,
}

/// Body of `ClientServiceMethodResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMethodReply {
    pub method_name: String,
    pub result: ResultCode,
    pub payload: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Unified Method Bodies
// ----------------------------------------------------------------------------

/// Request body for `GameServers.GetServerList#1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerListRequest {
    pub filter: String,
    pub limit: u32,
}

/// One server in a `GameServers.GetServerList#1` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSummary {
    pub addr: String,
    pub app_id: AppId,
    pub name: String,
    pub players: u32,
    pub max_players: u32,
}

/// Response body for `GameServers.GetServerList#1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerListResponse {
    pub servers: Vec<ServerSummary>,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emsg_raw_round_trip() {
        for msg in [
            EMsg::ClientLogon,
            EMsg::ClientLogOnResponse,
            EMsg::ClientAuthList,
            EMsg::ClientProductInfoResponse,
        ] {
            assert_eq!(EMsg::from_raw(msg as u32), Some(msg));
        }
        assert_eq!(EMsg::from_raw(424_242), None);
    }

    #[test]
    fn test_preauth_allow_list() {
        assert!(EMsg::ClientLogon.allowed_before_auth());
        assert!(EMsg::ClientLogonGameServer.allowed_before_auth());
        assert!(EMsg::ChannelEncryptResponse.allowed_before_auth());
        assert!(!EMsg::ClientAuthList.allowed_before_auth());
        assert!(!EMsg::ClientLogOff.allowed_before_auth());
    }

    #[test]
    fn test_body_round_trip() {
        let req = LogonRequest {
            protocol_version: PROTOCOL_VERSION,
            client_supplied_id: 0x0170_0000_0000_0000,
            cell_id: Some(14),
            auth_token: None,
            obfuscated_private_addr: 0,
            machine_id: None,
        };
        let bytes = bincode::serialize(&req).unwrap();
        let back: LogonRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_player_count_into_count() {
        let ok = PlayerCountResponse {
            result: ResultCode::OK,
            player_count: 17,
        };
        assert_eq!(ok.into_count().unwrap(), 17);

        let bad = PlayerCountResponse {
            result: ResultCode::FAIL,
            player_count: 0,
        };
        assert!(matches!(
            bad.into_count(),
            Err(crate::errors::RequestError::Backend(ResultCode::FAIL))
        ));
    }
}
