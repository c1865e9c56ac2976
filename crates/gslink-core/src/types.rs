//! Core types for the gslink protocol layer
//!
//! This module defines the fundamental identifiers and result codes used
//! throughout the protocol, using newtype patterns for semantic validation
//! and type safety.

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Scalar Aliases
// ----------------------------------------------------------------------------

/// Numeric identifier of a game/application title
pub type AppId = u32;

/// Numeric identifier of a license package
pub type PackageId = u32;

/// Region/endpoint-cluster hint assigned by the backend
pub type CellId = u32;

// ----------------------------------------------------------------------------
// Subject Identifier
// ----------------------------------------------------------------------------

/// Account universe, packed into the top byte of a [`SubjectId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Universe {
    Invalid = 0,
    Public = 1,
    Beta = 2,
    Internal = 3,
    Dev = 4,
}

/// Account type, packed into bits 52..56 of a [`SubjectId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccountType {
    Invalid = 0,
    Individual = 1,
    Multiseat = 2,
    GameServer = 3,
    AnonGameServer = 4,
}

/// 64-bit structured identifier for an account or server entity.
///
/// Bit layout, high to low: universe (8), account type (4), instance (20),
/// account id (32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(u64);

impl SubjectId {
    /// The zero identifier, used by the ticket ledger to mark self-tickets
    pub const ZERO: Self = Self(0);

    /// Build an identifier from its packed components
    pub fn new(universe: Universe, kind: AccountType, instance: u32, account: u32) -> Self {
        let packed = ((universe as u64) << 56)
            | ((kind as u64) << 52)
            | (((instance as u64) & 0xFFFFF) << 32)
            | account as u64;
        Self(packed)
    }

    /// Wrap a raw 64-bit identifier
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Identity used for an anonymous game-server logon
    pub fn anonymous_game_server() -> Self {
        Self::new(Universe::Public, AccountType::AnonGameServer, 0, 0)
    }

    /// Identity used for a token-based (persistent) game-server logon
    pub fn game_server() -> Self {
        Self::new(Universe::Public, AccountType::GameServer, 0, 0)
    }

    /// Get the raw 64-bit value
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Account id component (low 32 bits)
    pub fn account_id(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// Instance component (bits 32..52)
    pub fn instance(&self) -> u32 {
        ((self.0 >> 32) & 0xFFFFF) as u32
    }

    /// Account type component (bits 52..56)
    pub fn account_type_raw(&self) -> u8 {
        ((self.0 >> 52) & 0xF) as u8
    }

    /// Universe component (top byte)
    pub fn universe_raw(&self) -> u8 {
        (self.0 >> 56) as u8
    }

    /// Whether this is the zero identifier
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Result Codes
// ----------------------------------------------------------------------------

/// Backend result code.
///
/// Kept as an open newtype rather than a closed enum so that codes this
/// crate does not know about survive a round trip and can be surfaced to
/// callers unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const INVALID: Self = Self(0);
    pub const OK: Self = Self(1);
    pub const FAIL: Self = Self(2);
    pub const NO_CONNECTION: Self = Self(3);
    pub const INVALID_PASSWORD: Self = Self(5);
    pub const LOGGED_IN_ELSEWHERE: Self = Self(6);
    pub const ACCESS_DENIED: Self = Self(15);
    pub const BANNED: Self = Self(17);
    pub const SERVICE_UNAVAILABLE: Self = Self(20);
    pub const EXPIRED: Self = Self(27);
    pub const TRY_ANOTHER_ENDPOINT: Self = Self(48);

    /// Codes that trigger a disconnect-and-retry during a logon attempt
    pub fn is_retryable_logon(&self) -> bool {
        matches!(*self, Self::SERVICE_UNAVAILABLE | Self::TRY_ANOTHER_ENDPOINT)
    }

    /// Codes treated as transient when an established session drops.
    ///
    /// Anything outside this set is authentication-fatal and must not be
    /// retried automatically.
    pub fn is_transient_disconnect(&self) -> bool {
        matches!(
            *self,
            Self::INVALID
                | Self::FAIL
                | Self::NO_CONNECTION
                | Self::SERVICE_UNAVAILABLE
                | Self::TRY_ANOTHER_ENDPOINT
        )
    }

    /// Human-readable name for known codes
    pub fn name(&self) -> &'static str {
        match *self {
            Self::INVALID => "Invalid",
            Self::OK => "OK",
            Self::FAIL => "Fail",
            Self::NO_CONNECTION => "NoConnection",
            Self::INVALID_PASSWORD => "InvalidPassword",
            Self::LOGGED_IN_ELSEWHERE => "LoggedInElsewhere",
            Self::ACCESS_DENIED => "AccessDenied",
            Self::BANNED => "Banned",
            Self::SERVICE_UNAVAILABLE => "ServiceUnavailable",
            Self::EXPIRED => "Expired",
            Self::TRY_ANOTHER_ENDPOINT => "TryAnotherEndpoint",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

// ----------------------------------------------------------------------------
// Auth Session Responses
// ----------------------------------------------------------------------------

/// Outcome of a backend-side ticket validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthSessionResponse(pub i32);

impl AuthSessionResponse {
    pub const OK: Self = Self(0);
    pub const USER_NOT_CONNECTED: Self = Self(1);
    pub const NO_LICENSE_OR_EXPIRED: Self = Self(2);
    pub const VAC_BANNED: Self = Self(3);
    pub const LOGGED_IN_ELSEWHERE: Self = Self(4);
    pub const VAC_CHECK_TIMED_OUT: Self = Self(5);
    pub const TICKET_CANCELED: Self = Self(6);
    pub const TICKET_ALREADY_USED: Self = Self(7);
    pub const TICKET_INVALID: Self = Self(8);
    pub const PUBLISHER_BAN: Self = Self(9);

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

impl fmt::Display for AuthSessionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Server Flags
// ----------------------------------------------------------------------------

/// Bitmask announced to the backend describing this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFlags(pub u32);

impl ServerFlags {
    pub const NONE: Self = Self(0);
    pub const ACTIVE: Self = Self(1);
    pub const SECURE: Self = Self(2);
    pub const DEDICATED: Self = Self(4);
    pub const LINUX: Self = Self(8);
    pub const PASSWORDED: Self = Self(16);
    pub const PRIVATE: Self = Self(32);

    /// Whether every bit in `other` is set in `self`
    pub fn contains(&self, other: ServerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl core::ops::BitOr for ServerFlags {
    type Output = ServerFlags;

    fn bitor(self, rhs: ServerFlags) -> ServerFlags {
        ServerFlags(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for ServerFlags {
    fn bitor_assign(&mut self, rhs: ServerFlags) {
        self.0 |= rhs.0;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
