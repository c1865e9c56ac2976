//! Message-id to schema registry
//!
//! An explicit, immutable table mapping message identifiers (and textual
//! unified-method keys) to their registered body schemas. The table is built
//! once at startup and handed to the dispatch layer by value, so multiple
//! independent sessions in one process never share registry state.

use hashbrown::HashMap;
use serde::de::DeserializeOwned;

use crate::wire::{self, EMsg};

// ----------------------------------------------------------------------------
// Registry Keys
// ----------------------------------------------------------------------------

/// Lookup key: either a numeric message id or a unified
/// `"Interface.Method#Version_Request"` / `"..._Response"` string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Id(EMsg),
    Unified(String),
}

impl MessageKey {
    pub fn unified<S: Into<String>>(name: S) -> Self {
        MessageKey::Unified(name.into())
    }
}

// ----------------------------------------------------------------------------
// Schema Entries
// ----------------------------------------------------------------------------

/// Decode check verifying a body parses under a registered type
pub type DecodeCheck = fn(&[u8]) -> core::result::Result<(), String>;

/// A registered message schema: a display name plus a decode check that
/// verifies a body parses under the registered type
pub struct SchemaEntry {
    pub name: &'static str,
    check: DecodeCheck,
}

impl SchemaEntry {
    /// Run the decode check against raw body bytes
    pub fn check(&self, body: &[u8]) -> core::result::Result<(), String> {
        (self.check)(body)
    }

    /// The decode check itself, for callers that outlive this borrow
    pub fn decode_check(&self) -> DecodeCheck {
        self.check
    }
}

fn check_decodes<T: DeserializeOwned>(body: &[u8]) -> core::result::Result<(), String> {
    bincode::deserialize::<T>(body)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

// ----------------------------------------------------------------------------
// Schema Registry
// ----------------------------------------------------------------------------

/// Immutable messageId → schema table consumed by the dispatch layer.
///
/// Absence of an entry means the body is passed through as an opaque byte
/// sequence.
pub struct SchemaRegistry {
    entries: HashMap<MessageKey, SchemaEntry>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a schema for a key
    pub fn register<T: DeserializeOwned>(&mut self, key: MessageKey, name: &'static str) {
        self.entries.insert(
            key,
            SchemaEntry {
                name,
                check: check_decodes::<T>,
            },
        );
    }

    /// Look up the schema for a message id
    pub fn get(&self, msg: EMsg) -> Option<&SchemaEntry> {
        self.entries.get(&MessageKey::Id(msg))
    }

    /// Look up the schema for a unified method key
    pub fn get_unified(&self, key: &str) -> Option<&SchemaEntry> {
        self.entries.get(&MessageKey::Unified(key.to_string()))
    }

    /// Whether a schema is registered for this message id
    pub fn contains(&self, msg: EMsg) -> bool {
        self.entries.contains_key(&MessageKey::Id(msg))
    }

    /// The standard table covering every message this crate speaks
    pub fn standard() -> Self {
        use wire::*;

        let mut reg = Self::new();
        reg.register::<LogonRequest>(MessageKey::Id(EMsg::ClientLogon), "ClientLogon");
        reg.register::<LogonRequest>(
            MessageKey::Id(EMsg::ClientLogonGameServer),
            "ClientLogonGameServer",
        );
        reg.register::<LogonResponse>(
            MessageKey::Id(EMsg::ClientLogOnResponse),
            "ClientLogOnResponse",
        );
        reg.register::<LogOffNotice>(MessageKey::Id(EMsg::ClientLogOff), "ClientLogOff");
        reg.register::<LoggedOffNotice>(MessageKey::Id(EMsg::ClientLoggedOff), "ClientLoggedOff");
        reg.register::<ServerTypeInfo>(MessageKey::Id(EMsg::GsServerType), "GsServerType");
        reg.register::<StatusReply>(MessageKey::Id(EMsg::GsStatusReply), "GsStatusReply");
        reg.register::<AuthListUpdate>(MessageKey::Id(EMsg::ClientAuthList), "ClientAuthList");
        reg.register::<AuthListAck>(MessageKey::Id(EMsg::ClientAuthListAck), "ClientAuthListAck");
        reg.register::<TicketAuthComplete>(
            MessageKey::Id(EMsg::ClientTicketAuthComplete),
            "ClientTicketAuthComplete",
        );
        reg.register::<PlayerCountRequest>(
            MessageKey::Id(EMsg::ClientPlayerCountRequest),
            "ClientPlayerCountRequest",
        );
        reg.register::<PlayerCountResponse>(
            MessageKey::Id(EMsg::ClientPlayerCountResponse),
            "ClientPlayerCountResponse",
        );
        reg.register::<ProductChangesRequest>(
            MessageKey::Id(EMsg::ClientProductChangesRequest),
            "ClientProductChangesRequest",
        );
        reg.register::<ProductChangesResponse>(
            MessageKey::Id(EMsg::ClientProductChangesResponse),
            "ClientProductChangesResponse",
        );
        reg.register::<ProductInfoRequest>(
            MessageKey::Id(EMsg::ClientProductInfoRequest),
            "ClientProductInfoRequest",
        );
        reg.register::<ProductInfoResponse>(
            MessageKey::Id(EMsg::ClientProductInfoResponse),
            "ClientProductInfoResponse",
        );
        reg.register::<ServiceMethodCall>(
            MessageKey::Id(EMsg::ClientServiceMethod),
            "ClientServiceMethod",
        );
        reg.register::<ServiceMethodReply>(
            MessageKey::Id(EMsg::ClientServiceMethodResponse),
            "ClientServiceMethodResponse",
        );

        // Unified methods
        reg.register::<ServerListRequest>(
            MessageKey::unified("GameServers.GetServerList#1_Request"),
            "GameServers.GetServerList#1_Request",
        );
        reg.register::<ServerListResponse>(
            MessageKey::unified("GameServers.GetServerList#1_Response"),
            "GameServers.GetServerList#1_Response",
        );

        reg
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultCode;
    use crate::wire::LogonResponse;

    #[test]
    fn test_standard_registry_lookup() {
        let reg = SchemaRegistry::standard();
        assert!(reg.contains(EMsg::ClientLogon));
        assert!(reg.contains(EMsg::ClientAuthList));
        assert!(!reg.contains(EMsg::ChannelEncryptRequest));
        assert!(reg
            .get_unified("GameServers.GetServerList#1_Response")
            .is_some());
        assert!(reg.get_unified("Nonexistent.Method#1_Response").is_none());
    }

    #[test]
    fn test_decode_check_accepts_valid_body() {
        let reg = SchemaRegistry::standard();
        let body = bincode::serialize(&LogonResponse {
            result: ResultCode::OK,
            assigned_id: 1,
            public_addr: None,
            cell_id: 0,
            heartbeat_secs: 9,
        })
        .unwrap();

        let entry = reg.get(EMsg::ClientLogOnResponse).unwrap();
        assert!(entry.check(&body).is_ok());
    }

    #[test]
    fn test_decode_check_rejects_garbage() {
        let reg = SchemaRegistry::standard();
        let entry = reg.get(EMsg::ClientLogOnResponse).unwrap();
        assert!(entry.check(&[0xFF]).is_err());
    }
}
