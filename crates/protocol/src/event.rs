//! Event-Modell des Signaling-Protokolls
//!
//! Ein `NetworkEvent` ist die einzige Einheit die ueber die Leitung geht:
//! ein Tripel aus Ereignistyp, virtueller Verbindungs-ID und Nutzdaten.
//!
//! ## Design
//! - `NetEventType` entspricht dem festen uint8-Enum des Wire-Formats
//! - `ConnectionId` benennt eine virtuelle Verbindung aus Sicht EINES Peers;
//!   dieselbe logische Paarung traegt auf jeder Seite eine andere ID
//! - `NetEventData` ist eine Tagged Union mit genau einem belegten Slot

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// NetEventType
// ---------------------------------------------------------------------------

/// Typ eines Signaling-Events (Wire-Wert: uint8)
///
/// Die Werte 1-8 laufen in beide Richtungen mit umgekehrter Leserichtung:
/// eingehend ist `NewConnection` die Bitte "verbinde mich", ausgehend die
/// Meldung "ein neuer Peer ist mit dir verbunden".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetEventType {
    Invalid = 0,
    UnreliableMessageReceived = 1,
    ReliableMessageReceived = 2,
    ServerInitialized = 3,
    ServerInitFailed = 4,
    ServerClosed = 5,
    NewConnection = 6,
    ConnectionFailed = 7,
    Disconnected = 8,
    FatalError = 100,
    Warning = 101,
    Log = 102,
}

impl TryFrom<u8> for NetEventType {
    type Error = u8;

    fn try_from(wert: u8) -> Result<Self, u8> {
        match wert {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::UnreliableMessageReceived),
            2 => Ok(Self::ReliableMessageReceived),
            3 => Ok(Self::ServerInitialized),
            4 => Ok(Self::ServerInitFailed),
            5 => Ok(Self::ServerClosed),
            6 => Ok(Self::NewConnection),
            7 => Ok(Self::ConnectionFailed),
            8 => Ok(Self::Disconnected),
            100 => Ok(Self::FatalError),
            101 => Ok(Self::Warning),
            102 => Ok(Self::Log),
            unbekannt => Err(unbekannt),
        }
    }
}

impl fmt::Display for NetEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "Invalid",
            Self::UnreliableMessageReceived => "UnreliableMessageReceived",
            Self::ReliableMessageReceived => "ReliableMessageReceived",
            Self::ServerInitialized => "ServerInitialized",
            Self::ServerInitFailed => "ServerInitFailed",
            Self::ServerClosed => "ServerClosed",
            Self::NewConnection => "NewConnection",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::Disconnected => "Disconnected",
            Self::FatalError => "FatalError",
            Self::Warning => "Warning",
            Self::Log => "Log",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// ID einer virtuellen Verbindung aus Sicht eines Peers
///
/// Der Wert -1 ist reserviert (`INVALID`) und markiert Events die sich auf
/// keine Verbindung beziehen (Server-Signale). Serverseitig vergebene IDs
/// liegen in [16384, 32767], clientseitig gewaehlte typisch in [0, 16383].
///
/// Die JSON-Form ist `{"id": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    pub id: i16,
}

impl ConnectionId {
    /// Reservierter Wert fuer verbindungslose Events
    pub const INVALID: Self = Self { id: -1 };

    /// Erstellt eine ConnectionId aus einem Rohwert
    pub fn new(id: i16) -> Self {
        Self { id }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

// ---------------------------------------------------------------------------
// NetEventData
// ---------------------------------------------------------------------------

/// Nutzdaten eines Events – genau eine Variante ist belegt
///
/// Strings werden intern als native Rust-Strings gehalten; erst das
/// Wire-Format wandelt in UTF-16 Code-Units um.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEventData {
    Null,
    ByteArray(Vec<u8>),
    Utf16String(String),
}

impl NetEventData {
    /// Gibt den String-Inhalt zurueck falls vorhanden (Adress-Payloads)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf16String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NetEventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::ByteArray(bytes) => write!(f, "{} bytes", bytes.len()),
            Self::Utf16String(s) => write!(f, "{s:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkEvent
// ---------------------------------------------------------------------------

/// Ereignis-Tripel `(Typ, ConnectionId, Daten)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub event_type: NetEventType,
    pub connection_id: ConnectionId,
    pub data: NetEventData,
}

impl NetworkEvent {
    /// Erstellt ein neues Event
    pub fn new(event_type: NetEventType, connection_id: ConnectionId, data: NetEventData) -> Self {
        Self {
            event_type,
            connection_id,
            data,
        }
    }

    /// Erstellt ein Event mit String-Nutzdaten
    pub fn with_string(
        event_type: NetEventType,
        connection_id: ConnectionId,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            event_type,
            connection_id,
            NetEventData::Utf16String(text.into()),
        )
    }
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NetworkEvent[{}, id={}, daten={}]",
            self.event_type, self.connection_id, self.data
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
