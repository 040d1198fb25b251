//! Fehlertypen fuer den Signaling-Service
//!
//! Kein Fehler eines einzelnen Peers erreicht den Prozess: Dekodierfehler
//! verwerfen nur das Frame, Socket- und Zeitlimit-Fehler beenden nur die
//! betroffene Verbindung.

use relais_protocol::DecodeError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP-Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket-Protokollfehler (Handshake, Frames)
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Ein einzelnes Frame konnte nicht dekodiert werden
    #[error("Dekodierfehler: {0}")]
    Dekodierung(#[from] DecodeError),

    /// Zeitlimit beim Schreiben ueberschritten
    #[error("Zeitlimit ueberschritten")]
    Zeitlimit,
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
