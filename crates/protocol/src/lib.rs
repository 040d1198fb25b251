//! relais-protocol – Event-Modell und Wire-Format des Relais Signaling-Servers
//!
//! Dieser Crate definiert die einzige Einheit die zwischen Client und Server
//! ausgetauscht wird: das `NetworkEvent`. Dazu kommen die beiden
//! Serialisierungen (Binaerformat fuer Binaer-Frames, JSON-Form fuer
//! Text-Frames und Debugging) inklusive aller Dekodierfehler.

pub mod event;
pub mod wire;

// Bequeme Re-Exporte
pub use event::{ConnectionId, NetEventData, NetEventType, NetworkEvent};
pub use wire::DecodeError;
