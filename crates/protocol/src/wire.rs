//! Wire-Format fuer Signaling-Events
//!
//! Zwei interoperable Serialisierungen, beide little-endian wo numerisch.
//!
//! ## Binaerformat (massgeblich, Binaer-Frames)
//!
//! ```text
//! offset  groesse  feld
//!   0       1      eventType    (uint8)
//!   1       1      dataType     (uint8: 0=Null, 1=ByteArray, 2=Utf16String)
//!   2       2      connectionId (int16, little-endian)
//!   [danach Nutzdaten, Layout abhaengig vom dataType]
//! ```
//!
//! - `Null`: keine weiteren Bytes
//! - `ByteArray`: `uint32` Byte-Laenge + rohe Bytes
//! - `Utf16String`: `uint32` Laenge in UTF-16 Code-Units + Laenge*2 Bytes.
//!   Die Laenge zaehlt Code-Units, nicht Code-Points: Zeichen ausserhalb
//!   der Basic Multilingual Plane belegen ein Surrogat-Paar.
//!
//! ## JSON-Format (Text-Frames, Debugging)
//!
//! `{"type": int, "connectionId": {"id": int}, "data": X}` mit
//! `X` = null | String | Array von Byte-Werten. Jede andere Form ist ein
//! Dekodierfehler; der Aufrufer loggt und verwirft das Frame.

use bytes::{BufMut, BytesMut};
use serde_json::Value;
use thiserror::Error;

use crate::event::{ConnectionId, NetEventData, NetEventType, NetworkEvent};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Wire-Werte des dataType-Felds
const DATA_TYPE_NULL: u8 = 0;
const DATA_TYPE_BYTE_ARRAY: u8 = 1;
const DATA_TYPE_UTF16_STRING: u8 = 2;

/// Groesse des festen Event-Headers in Bytes
pub const HEADER_LAENGE: usize = 4;

/// Groesse des Laengen-Prefix vor den Nutzdaten
const LAENGEN_FELD: usize = 4;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Dekodieren eines Events
///
/// Ein Dekodierfehler betrifft immer nur das einzelne Frame; die Verbindung
/// wird deswegen nicht getrennt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Header oder Nutzdaten laufen ueber das Puffer-Ende hinaus
    #[error("Event abgeschnitten")]
    Truncated,

    /// UTF-16-Daten mit ungerader Byte-Anzahl
    #[error("UTF-16-Daten mit ungerader Byte-Anzahl")]
    TrailingByte,

    /// Unbekannter Wert im dataType-Feld
    #[error("unbekannter Daten-Typ: {0}")]
    InvalidDataType(u8),

    /// Unbekannter Wert im eventType-Feld
    #[error("unbekannter Event-Typ: {0}")]
    InvalidEventType(u8),

    /// JSON-Form nicht parsebar oder falsch geformt
    #[error("JSON nicht parsebar: {0}")]
    Json(String),
}

// ---------------------------------------------------------------------------
// Binaerformat
// ---------------------------------------------------------------------------

impl NetworkEvent {
    /// Serialisiert das Event ins Binaerformat
    pub fn to_byte_array(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LAENGE + LAENGEN_FELD);
        buf.put_u8(self.event_type as u8);
        buf.put_u8(match &self.data {
            NetEventData::Null => DATA_TYPE_NULL,
            NetEventData::ByteArray(_) => DATA_TYPE_BYTE_ARRAY,
            NetEventData::Utf16String(_) => DATA_TYPE_UTF16_STRING,
        });
        buf.put_i16_le(self.connection_id.id);

        match &self.data {
            NetEventData::Null => {}
            NetEventData::ByteArray(bytes) => {
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
            }
            NetEventData::Utf16String(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                buf.put_u32_le(units.len() as u32);
                for unit in units {
                    buf.put_u16_le(unit);
                }
            }
        }

        buf.to_vec()
    }

    /// Dekodiert ein Event aus dem Binaerformat
    pub fn from_byte_array(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LAENGE {
            return Err(DecodeError::Truncated);
        }
        let event_type = NetEventType::try_from(buf[0]).map_err(DecodeError::InvalidEventType)?;
        let data_type = buf[1];
        let id = i16::from_le_bytes([buf[2], buf[3]]);

        let data = match data_type {
            DATA_TYPE_NULL => NetEventData::Null,
            DATA_TYPE_BYTE_ARRAY => {
                let laenge = nutzdaten_laenge(buf)?;
                let ende = HEADER_LAENGE + LAENGEN_FELD + laenge;
                if buf.len() < ende {
                    return Err(DecodeError::Truncated);
                }
                NetEventData::ByteArray(buf[HEADER_LAENGE + LAENGEN_FELD..ende].to_vec())
            }
            DATA_TYPE_UTF16_STRING => {
                let laenge = nutzdaten_laenge(buf)?;
                let ende = HEADER_LAENGE + LAENGEN_FELD + laenge * 2;
                if buf.len() < ende {
                    return Err(DecodeError::Truncated);
                }
                let units = utf16_code_units(&buf[HEADER_LAENGE + LAENGEN_FELD..ende])?;
                // Kaputte Surrogate sind kein Protokollfehler; sie werden
                // durch U+FFFD ersetzt
                NetEventData::Utf16String(String::from_utf16_lossy(&units))
            }
            unbekannt => return Err(DecodeError::InvalidDataType(unbekannt)),
        };

        Ok(Self::new(event_type, ConnectionId::new(id), data))
    }
}

/// Liest das uint32-Laengen-Prefix hinter dem Header
fn nutzdaten_laenge(buf: &[u8]) -> Result<usize, DecodeError> {
    if buf.len() < HEADER_LAENGE + LAENGEN_FELD {
        return Err(DecodeError::Truncated);
    }
    Ok(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize)
}

/// Interpretiert einen Byte-Puffer als little-endian UTF-16 Code-Units
///
/// Eine ungerade Byte-Anzahl ist ein Dekodierfehler (`TrailingByte`).
pub fn utf16_code_units(buf: &[u8]) -> Result<Vec<u16>, DecodeError> {
    if buf.len() % 2 != 0 {
        return Err(DecodeError::TrailingByte);
    }
    Ok(buf
        .chunks_exact(2)
        .map(|paar| u16::from_le_bytes([paar[0], paar[1]]))
        .collect())
}

// ---------------------------------------------------------------------------
// JSON-Format
// ---------------------------------------------------------------------------

impl NetworkEvent {
    /// Parst ein Event aus der JSON-Form
    pub fn from_json_str(text: &str) -> Result<Self, DecodeError> {
        let wert: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;

        let typ = wert
            .get("type")
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| DecodeError::Json("Feld 'type' fehlt oder ist keine Zahl".into()))?;
        let event_type = NetEventType::try_from(typ).map_err(DecodeError::InvalidEventType)?;

        let connection_id: ConnectionId = serde_json::from_value(
            wert.get("connectionId")
                .cloned()
                .ok_or_else(|| DecodeError::Json("Feld 'connectionId' fehlt".into()))?,
        )
        .map_err(|e| DecodeError::Json(format!("connectionId ungueltig: {e}")))?;

        let data = match wert.get("data") {
            None | Some(Value::Null) => NetEventData::Null,
            Some(Value::String(s)) => NetEventData::Utf16String(s.clone()),
            Some(Value::Array(eintraege)) => {
                let mut bytes = Vec::with_capacity(eintraege.len());
                for eintrag in eintraege {
                    let byte = eintrag
                        .as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            DecodeError::Json("Byte-Array enthaelt ungueltigen Wert".into())
                        })?;
                    bytes.push(byte);
                }
                NetEventData::ByteArray(bytes)
            }
            Some(_) => {
                return Err(DecodeError::Json("Feld 'data' hat eine unbekannte Form".into()))
            }
        };

        Ok(Self::new(event_type, connection_id, data))
    }

    /// Serialisiert das Event in die JSON-Form
    pub fn to_json_string(&self) -> String {
        let data = match &self.data {
            NetEventData::Null => Value::Null,
            NetEventData::ByteArray(bytes) => {
                Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
            }
            NetEventData::Utf16String(s) => Value::String(s.clone()),
        };
        serde_json::json!({
            "type": self.event_type as u8,
            "connectionId": self.connection_id,
            "data": data,
        })
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
