//! relais-signaling – Peer-Pool und Signaling-Zustandsmaschine
//!
//! Dieser Crate implementiert den Kern des Relais Signaling-Servers:
//! Peers melden sich unter einer symbolischen Adresse an, andere Peers
//! finden sie darueber und tauschen kurze Steuernachrichten aus (SDP-Offers,
//! ICE-Kandidaten) bis sie direkt miteinander sprechen koennen. Nutzdaten
//! oder Medien werden im Normalbetrieb nicht weitergeleitet.
//!
//! ## Architektur
//!
//! ```text
//! WsListener (Accept-Loop, Handshake, Pfad-Routing)
//!     |
//!     v
//! NetworkServer (AppName -> PeerPool)
//!     |
//!     v
//! PeerPool (poolweiter Lock: Registry, Adressen, Paarungen)
//!     |
//!     v
//! SignalingPeer (pro Verbindung ein Task: Lesen, Queue leeren, Pings)
//! ```
//!
//! Jede Verbindung gehoert zu genau einer App (ueber den HTTP-Pfad beim
//! Upgrade bestimmt); Apps mit `adress_sharing` bilden N-Wege-Raeume statt
//! Punkt-zu-Punkt-Verbindungen.

pub mod error;
pub mod listener;
pub mod peer;
pub mod pool;
pub mod server;

// Bequeme Re-Exporte
pub use error::{SignalingError, SignalingResult};
pub use listener::WsListener;
pub use peer::{PeerZustand, SignalingPeer};
pub use pool::PeerPool;
pub use server::{AppConfig, NetworkServer};
