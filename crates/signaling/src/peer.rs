//! Signaling-Peer – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt einen eigenen tokio-Task der eingehende Frames
//! liest, die Send-Queue leert und Keepalive-Pings verschickt. Alle
//! Zustandsaenderungen laufen ueber den `PeerPool`, der saemtliche
//! Mutationen serialisiert.
//!
//! ## State Machine
//! ```text
//! Uninitialisiert -> Verbindend -> Verbunden -> Trennend -> Getrennt
//! ```
//! Uebergaenge sind einbahnig; ein Peer kehrt nie in einen frueheren
//! Zustand zurueck.
//!
//! ## Keepalive
//! - Der Server sendet alle `PING_PERIOD` einen Ping
//! - Kommt innerhalb von `PONG_WAIT` kein Frame an (Pong zaehlt mit), wird
//!   die Verbindung aufgeraeumt
//! - Jeder Schreibvorgang steht unter dem `WRITE_WAIT`-Limit

use futures_util::{SinkExt, StreamExt};
use relais_protocol::{ConnectionId, NetworkEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{SignalingError, SignalingResult};
use crate::pool::PeerPool;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Zeitlimit pro Schreibvorgang
pub(crate) const WRITE_WAIT: Duration = Duration::from_secs(5);

/// Maximale Zeit ohne eingehendes Frame
pub(crate) const PONG_WAIT: Duration = Duration::from_secs(5);

/// Intervall fuer Keepalive-Pings
pub(crate) const PING_PERIOD: Duration = Duration::from_secs(3);

/// Maximale Frame-Groesse (1 MiB); groessere Frames sind ein fataler Lesefehler
pub(crate) const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Kapazitaet der Send-Queue pro Peer
pub(crate) const SEND_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand eines Signaling-Peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerZustand {
    /// Datensatz angelegt, noch nicht im Pool registriert
    Uninitialisiert,
    /// Im Pool registriert, Verbindungs-Task startet
    Verbindend,
    /// Voll funktionsfaehig; nur hier nimmt die Send-Queue Events an
    Verbunden,
    /// Aufraeumen laeuft
    Trennend,
    /// Endzustand
    Getrennt,
}

// ---------------------------------------------------------------------------
// PeerEintrag
// ---------------------------------------------------------------------------

/// Zustands-Datensatz eines Peers innerhalb des Pools
///
/// Wird ausschliesslich unter dem Pool-Lock mutiert. Die `verbindungen`-Map
/// bildet lokale ConnectionIds auf die `conn_info` des gepaarten Peers ab;
/// Identitaet und Gleichheit eines Peers haengen fuer seine gesamte
/// Lebensdauer an dieser `conn_info` (Remote-Adresse + Port).
pub(crate) struct PeerEintrag {
    /// Eindeutige Socket-Kennung, Identitaet des Peers
    pub(crate) conn_info: String,
    pub(crate) zustand: PeerZustand,
    /// Lokale ConnectionId -> conn_info des gepaarten Peers
    pub(crate) verbindungen: HashMap<i16, String>,
    /// Naechste serverseitig vergebene ConnectionId
    naechste_eingehende_id: i16,
    /// Adresse die dieser Peer gerade hostet, falls vorhanden
    pub(crate) server_adresse: Option<String>,
    /// Sender-Seite der Send-Queue; der Peer-Task leert die Empfaenger-Seite
    tx: mpsc::Sender<NetworkEvent>,
}

impl PeerEintrag {
    /// Start der serverseitig vergebenen IDs; clientseitig gewaehlte IDs
    /// liegen typisch darunter
    const ERSTE_EINGEHENDE_ID: i16 = 16384;

    pub(crate) fn neu(conn_info: String, tx: mpsc::Sender<NetworkEvent>) -> Self {
        Self {
            conn_info,
            zustand: PeerZustand::Uninitialisiert,
            verbindungen: HashMap::new(),
            naechste_eingehende_id: Self::ERSTE_EINGEHENDE_ID,
            server_adresse: None,
            tx,
        }
    }

    /// Reiht ein Event in die Send-Queue ein
    ///
    /// Nur im Zustand `Verbunden`; in allen anderen Zustaenden wird das
    /// Event stillschweigend verworfen. Eine volle Queue verwirft das Event
    /// mit Warnung.
    pub(crate) fn senden(&self, evt: NetworkEvent) -> bool {
        if self.zustand != PeerZustand::Verbunden {
            return false;
        }
        match self.tx.try_send(evt) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(evt)) => {
                tracing::warn!(peer = %self.conn_info, event = %evt, "Send-Queue voll – Event verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(peer = %self.conn_info, "Send-Queue geschlossen (Peer getrennt)");
                false
            }
        }
    }

    /// Vergibt die naechste serverseitige ConnectionId
    ///
    /// Streng aufsteigend; der int16-Ueberlauf wrappt (Verhalten bei 65k
    /// gleichzeitig vergebenen IDs pro Peer ist undefiniert).
    pub(crate) fn naechste_verbindungs_id(&mut self) -> ConnectionId {
        let id = self.naechste_eingehende_id;
        self.naechste_eingehende_id = self.naechste_eingehende_id.wrapping_add(1);
        ConnectionId::new(id)
    }

    /// Sucht die lokale ConnectionId unter der dieser Peer den anderen kennt
    pub(crate) fn verbindungs_id_von(&self, conn_info: &str) -> Option<i16> {
        self.verbindungen
            .iter()
            .find(|(_, ci)| ci.as_str() == conn_info)
            .map(|(id, _)| *id)
    }
}

// ---------------------------------------------------------------------------
// SignalingPeer
// ---------------------------------------------------------------------------

/// Treiber einer einzelnen WebSocket-Verbindung
///
/// Liest Frames, dekodiert Events und reicht sie an den Pool weiter; leert
/// die Send-Queue und verschickt Keepalive-Pings. Endet die Schleife aus
/// irgendeinem Grund (Lesefehler, Schreibfehler, Timeout, Close), raeumt
/// der Task den Peer genau einmal im Pool ab.
pub struct SignalingPeer {
    pool: Arc<PeerPool>,
    conn_info: String,
}

impl SignalingPeer {
    pub(crate) fn neu(pool: Arc<PeerPool>, conn_info: String) -> Self {
        Self { pool, conn_info }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    pub(crate) async fn verarbeiten(
        self,
        mut socket: WebSocketStream<TcpStream>,
        mut empfang: mpsc::Receiver<NetworkEvent>,
    ) {
        let conn_info = self.conn_info.clone();
        self.pool.als_verbunden_markieren(&conn_info);
        tracing::info!(peer = %conn_info, app = %self.pool.app_name(), "Peer verbunden");

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + PING_PERIOD;

        loop {
            let jetzt = Instant::now();

            // Pong-Frist pruefen
            if jetzt.duration_since(letzter_empfang) > PONG_WAIT {
                tracing::warn!(peer = %conn_info, "Keepalive-Timeout");
                break;
            }

            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehendes Frame vom Client
                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(peer = %conn_info, "Verbindung vom Client geschlossen");
                            break;
                        }
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            if let Some(evt) = Self::frame_dekodieren(&conn_info, nachricht) {
                                self.pool.ereignis_verarbeiten(&conn_info, evt);
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %conn_info, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %conn_info, "Verbindung beendet");
                            break;
                        }
                    }
                }

                // Ausgehendes Event aus der Send-Queue
                Some(evt) = empfang.recv() => {
                    tracing::trace!(peer = %conn_info, event = %evt, "OUT");
                    let frame = Message::Binary(evt.to_byte_array());
                    if let Err(e) = Self::frame_schreiben(&mut socket, frame).await {
                        tracing::warn!(peer = %conn_info, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if Instant::now() >= naechster_ping {
                        if let Err(e) = Self::frame_schreiben(&mut socket, Message::Ping(Vec::new())).await {
                            tracing::warn!(peer = %conn_info, fehler = %e, "Ping-Senden fehlgeschlagen");
                            break;
                        }
                        naechster_ping = Instant::now() + PING_PERIOD;
                    }
                }
            }
        }

        self.pool.aufraeumen(&conn_info);
        let _ = socket.close(None).await;
        tracing::info!(peer = %conn_info, "Verbindungs-Task beendet");
    }

    /// Dekodiert ein WebSocket-Frame zu einem Event
    ///
    /// Binaer-Frames tragen das Binaerformat, Text-Frames die JSON-Form.
    /// Dekodierfehler werden geloggt und das Frame verworfen; die Verbindung
    /// bleibt bestehen.
    fn frame_dekodieren(conn_info: &str, nachricht: Message) -> Option<NetworkEvent> {
        let ergebnis = match nachricht {
            Message::Binary(bytes) => NetworkEvent::from_byte_array(&bytes),
            Message::Text(text) => NetworkEvent::from_json_str(&text),
            // Pings beantwortet tungstenite selbst; Pongs zaehlen nur als
            // Lebenszeichen
            _ => return None,
        };
        match ergebnis {
            Ok(evt) => {
                tracing::trace!(peer = %conn_info, event = %evt, "INC");
                Some(evt)
            }
            Err(e) => {
                let fehler = SignalingError::from(e);
                tracing::warn!(peer = %conn_info, fehler = %fehler, "Frame nicht dekodierbar – verworfen");
                None
            }
        }
    }

    /// Schreibt ein Frame mit `WRITE_WAIT`-Limit auf den Socket
    async fn frame_schreiben(
        socket: &mut WebSocketStream<TcpStream>,
        nachricht: Message,
    ) -> SignalingResult<()> {
        match tokio::time::timeout(WRITE_WAIT, socket.send(nachricht)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SignalingError::WebSocket(e)),
            Err(_) => Err(SignalingError::Zeitlimit),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use relais_protocol::{NetEventData, NetEventType};

    fn test_eintrag(kapazitaet: usize) -> (PeerEintrag, mpsc::Receiver<NetworkEvent>) {
        let (tx, rx) = mpsc::channel(kapazitaet);
        (PeerEintrag::neu("127.0.0.1:4000".into(), tx), rx)
    }

    fn test_event(id: i16) -> NetworkEvent {
        NetworkEvent::new(
            NetEventType::NewConnection,
            ConnectionId::new(id),
            NetEventData::Null,
        )
    }

    #[test]
    fn neuer_eintrag_ist_uninitialisiert() {
        let (eintrag, _rx) = test_eintrag(4);
        assert_eq!(eintrag.zustand, PeerZustand::Uninitialisiert);
        assert!(eintrag.verbindungen.is_empty());
        assert!(eintrag.server_adresse.is_none());
    }

    #[test]
    fn id_vergabe_beginnt_bei_16384_und_steigt() {
        let (mut eintrag, _rx) = test_eintrag(4);
        assert_eq!(eintrag.naechste_verbindungs_id().id, 16384);
        assert_eq!(eintrag.naechste_verbindungs_id().id, 16385);
        assert_eq!(eintrag.naechste_verbindungs_id().id, 16386);
    }

    #[test]
    fn senden_nur_im_zustand_verbunden() {
        let (mut eintrag, mut rx) = test_eintrag(4);
        assert!(!eintrag.senden(test_event(1)), "Uninitialisiert darf nicht senden");

        eintrag.zustand = PeerZustand::Verbunden;
        assert!(eintrag.senden(test_event(2)));

        eintrag.zustand = PeerZustand::Trennend;
        assert!(!eintrag.senden(test_event(3)), "Trennend darf nicht senden");

        // Nur das eine Event im Zustand Verbunden kam durch
        assert_eq!(rx.try_recv().unwrap().connection_id.id, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn volle_queue_verwirft_event() {
        let (mut eintrag, mut rx) = test_eintrag(1);
        eintrag.zustand = PeerZustand::Verbunden;
        assert!(eintrag.senden(test_event(1)));
        assert!(!eintrag.senden(test_event(2)), "volle Queue muss verwerfen");
        assert_eq!(rx.try_recv().unwrap().connection_id.id, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn verbindungs_id_von_findet_gepaarte_peers() {
        let (mut eintrag, _rx) = test_eintrag(4);
        eintrag.verbindungen.insert(5, "10.0.0.1:1234".into());
        eintrag.verbindungen.insert(16384, "10.0.0.2:5678".into());

        assert_eq!(eintrag.verbindungs_id_von("10.0.0.2:5678"), Some(16384));
        assert_eq!(eintrag.verbindungs_id_von("10.0.0.1:1234"), Some(5));
        assert_eq!(eintrag.verbindungs_id_von("10.0.0.9:9999"), None);
    }
}
