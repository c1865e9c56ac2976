//! Transport abstraction
//!
//! The core treats the connection to the backend as a black box: an
//! already-encrypted channel that can send a framed message and raise
//! events when one arrives or the channel drops. Endpoint discovery and
//! wire-level encryption live below this seam.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::ResultCode;
use crate::wire::MessageHeader;

// ----------------------------------------------------------------------------
// Endpoints
// ----------------------------------------------------------------------------

/// One backend endpoint in the persisted reconnection list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Events raised by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The channel is connected and ready to carry framed messages
    Connected,
    /// A framed message arrived
    Message { header: MessageHeader, body: Vec<u8> },
    /// The transport learned a fresh endpoint list worth persisting
    Endpoints(Vec<Endpoint>),
    /// The channel dropped or faulted
    Closed { code: ResultCode, reason: String },
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Interface consumed by the dispatch layer.
///
/// Implementations own reconnect-level concerns (endpoint choice, channel
/// encryption); the core only sends framed messages and reacts to events.
#[async_trait]
pub trait Transport: Send {
    /// Establish the channel; a [`TransportEvent::Connected`] follows
    async fn connect(&mut self) -> Result<()>;

    /// Tear down the channel without a logoff handshake
    async fn disconnect(&mut self) -> Result<()>;

    /// Send one framed message
    async fn send(&mut self, header: MessageHeader, body: Vec<u8>) -> Result<()>;

    /// Await the next transport event; `None` once the transport is finished
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Whether the channel is currently connected
    fn is_connected(&self) -> bool;

    /// Seed the endpoint list from persisted state, once, at construction
    /// or first logon
    fn prime_endpoints(&mut self, endpoints: Vec<Endpoint>);
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// In-memory transport for tests: captures sends, replays queued events
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: bool,
    events: VecDeque<TransportEvent>,
    sent: Vec<(MessageHeader, Vec<u8>)>,
    primed: Vec<Endpoint>,
    connect_count: u32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for delivery via [`Transport::next_event`]
    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    /// Messages sent so far, oldest first
    pub fn sent(&self) -> &[(MessageHeader, Vec<u8>)] {
        &self.sent
    }

    /// Drain and return captured sends
    pub fn take_sent(&mut self) -> Vec<(MessageHeader, Vec<u8>)> {
        std::mem::take(&mut self.sent)
    }

    /// Endpoints passed to [`Transport::prime_endpoints`]
    pub fn primed_endpoints(&self) -> &[Endpoint] {
        &self.primed
    }

    /// How many times `connect` was called
    pub fn connect_count(&self) -> u32 {
        self.connect_count
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.connect_count += 1;
        self.events.push_back(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn send(&mut self, header: MessageHeader, body: Vec<u8>) -> Result<()> {
        self.sent.push((header, body));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn prime_endpoints(&mut self, endpoints: Vec<Endpoint>) {
        self.primed = endpoints;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::EMsg;

    #[tokio::test]
    async fn test_mock_transport_connect_emits_event() {
        let mut transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
        assert_eq!(transport.next_event().await, None);
    }

    #[tokio::test]
    async fn test_mock_transport_captures_sends() {
        let mut transport = MockTransport::new();
        transport.connect().await.unwrap();

        let header = MessageHeader::new(EMsg::ClientLogOff, true);
        transport.send(header.clone(), vec![1, 2, 3]).await.unwrap();

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0].0, header);
        assert_eq!(transport.sent()[0].1, vec![1, 2, 3]);
    }

    #[test]
    fn test_endpoint_json_round_trip() {
        let endpoints = vec![
            Endpoint {
                host: "cm1.example.net".to_string(),
                port: 27017,
            },
            Endpoint {
                host: "cm2.example.net".to_string(),
                port: 27018,
            },
        ];
        let json = serde_json::to_vec(&endpoints).unwrap();
        let back: Vec<Endpoint> = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, endpoints);
    }
}
