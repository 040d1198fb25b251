//! Peer-Pool – Registry und Zustandsmaschine einer Anwendung
//!
//! Der Pool haelt alle verbundenen Peers einer App, bildet symbolische
//! Server-Adressen auf hostende Peers ab und fuehrt alle Operationen aus
//! die Peer-Zustand veraendern. Saemtliche Mutationen laufen unter einem
//! poolweiten Lock; die symmetrischen Paar-Eintraege zweier Peers sind
//! damit atomar gegenueber allen anderen Pool-Operationen.
//!
//! Events an andere Peers werden unter dem Lock lediglich in deren
//! Send-Queues eingereiht (`try_send`, niemals await); die Peer-Tasks
//! leeren die Queues ausserhalb des Locks.

use relais_protocol::{ConnectionId, NetEventData, NetEventType, NetworkEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;

use crate::peer::{PeerEintrag, PeerZustand, SignalingPeer, SEND_QUEUE_GROESSE};
use crate::server::AppConfig;

/// Maximale Laenge einer Server-Adresse in Bytes
const MAX_ADRESSLAENGE: usize = 256;

// ---------------------------------------------------------------------------
// PoolKern
// ---------------------------------------------------------------------------

/// Innerer, lock-geschuetzter Zustand des Pools
#[derive(Default)]
struct PoolKern {
    /// Alle registrierten Peers in Eintrittsreihenfolge
    verbindungen: Vec<PeerEintrag>,
    /// Adresse -> hostende Peers (conn_info) in Registrierungsreihenfolge
    server: HashMap<String, Vec<String>>,
}

impl PoolKern {
    fn eintrag(&self, conn_info: &str) -> Option<&PeerEintrag> {
        self.verbindungen.iter().find(|e| e.conn_info == conn_info)
    }

    fn eintrag_mut(&mut self, conn_info: &str) -> Option<&mut PeerEintrag> {
        self.verbindungen
            .iter_mut()
            .find(|e| e.conn_info == conn_info)
    }
}

// ---------------------------------------------------------------------------
// PeerPool
// ---------------------------------------------------------------------------

/// Peer-Registry einer Anwendung
///
/// Punkt-zu-Punkt-Apps erlauben genau einen Host pro Adresse; Apps mit
/// Adress-Sharing vermaschen alle Peers unter derselben Adresse zu einem
/// vollstaendigen Raum.
pub struct PeerPool {
    app_name: String,
    adress_sharing: bool,
    max_adresslaenge: usize,
    kern: Mutex<PoolKern>,
}

impl PeerPool {
    /// Erstellt einen neuen Pool fuer eine App-Konfiguration
    pub fn neu(config: &AppConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            adress_sharing: config.adress_sharing,
            max_adresslaenge: MAX_ADRESSLAENGE,
            kern: Mutex::new(PoolKern::default()),
        }
    }

    /// Name der App zu der dieser Pool gehoert
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Gibt zurueck ob dieser Pool N-Wege-Raeume bildet
    pub fn hat_adress_sharing(&self) -> bool {
        self.adress_sharing
    }

    /// Anzahl der registrierten Peers
    pub fn anzahl(&self) -> usize {
        self.kern().verbindungen.len()
    }

    /// Prueft ob eine Adresse gehostet werden darf
    pub fn ist_adresse_verfuegbar(&self, adresse: &str) -> bool {
        let kern = self.kern();
        self.adresse_verfuegbar(&kern, adresse)
    }

    /// Registriert einen neuen Peer und startet dessen Verbindungs-Task
    pub fn hinzufuegen(self: &Arc<Self>, socket: WebSocketStream<TcpStream>, conn_info: String) {
        let empfang = self.registrieren(&conn_info);
        let peer = SignalingPeer::neu(Arc::clone(self), conn_info);
        tokio::spawn(peer.verarbeiten(socket, empfang));
    }

    fn kern(&self) -> MutexGuard<'_, PoolKern> {
        self.kern.lock().expect("Pool-Lock vergiftet")
    }

    /// Legt den Pool-Eintrag fuer einen Peer an (Uninitialisiert -> Verbindend)
    fn registrieren(&self, conn_info: &str) -> mpsc::Receiver<NetworkEvent> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let mut eintrag = PeerEintrag::neu(conn_info.to_string(), tx);
        eintrag.zustand = PeerZustand::Verbindend;
        self.kern().verbindungen.push(eintrag);
        rx
    }

    /// Markiert einen Peer als verbunden; ab jetzt nimmt seine Send-Queue
    /// Events an
    pub(crate) fn als_verbunden_markieren(&self, conn_info: &str) {
        let mut kern = self.kern();
        if let Some(eintrag) = kern.eintrag_mut(conn_info) {
            if eintrag.zustand == PeerZustand::Verbindend {
                eintrag.zustand = PeerZustand::Verbunden;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event-Dispatch
    // -----------------------------------------------------------------------

    /// Verarbeitet ein vom Client eingehendes Event
    ///
    /// `ConnectionFailed`, `ServerInitFailed` und alle uebrigen Typen sind
    /// Server-zu-Client und werden eingehend ignoriert.
    pub(crate) fn ereignis_verarbeiten(&self, conn_info: &str, evt: NetworkEvent) {
        let NetworkEvent {
            event_type,
            connection_id,
            data,
        } = evt;

        let mut kern = self.kern();
        match event_type {
            NetEventType::NewConnection => {
                if let NetEventData::Utf16String(adresse) = data {
                    self.verbinden(&mut kern, conn_info, &adresse, connection_id);
                }
            }
            NetEventType::Disconnected => self.trennen(&mut kern, conn_info, connection_id),
            NetEventType::ServerInitialized => {
                if let NetEventData::Utf16String(adresse) = data {
                    self.server_starten(&mut kern, conn_info, &adresse);
                }
            }
            NetEventType::ServerClosed => self.server_stoppen(&mut kern, conn_info),
            NetEventType::ReliableMessageReceived => {
                self.daten_weiterleiten(&kern, conn_info, connection_id, data, true);
            }
            NetEventType::UnreliableMessageReceived => {
                self.daten_weiterleiten(&kern, conn_info, connection_id, data, false);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau und -abbau
    // -----------------------------------------------------------------------

    /// Baut eine Punkt-zu-Punkt-Verbindung zu einem hostenden Peer auf
    ///
    /// Genau ein fremder Host: beide Seiten tragen die Paarung ein und
    /// melden `NewConnection` mit ihrer jeweils eigenen ID (Host:
    /// serverseitig vergeben, Anfragender: vom Client gewaehlt; ein
    /// bestehender Eintrag unter dieser ID wird ueberschrieben). Sonst geht
    /// `ConnectionFailed` mit der Client-ID zurueck; Sharing-Raeume werden
    /// ausschliesslich ueber `server_starten` betreten.
    fn verbinden(&self, kern: &mut PoolKern, conn_info: &str, adresse: &str, id: ConnectionId) {
        let hosts = kern.server.get(adresse).cloned().unwrap_or_default();
        if hosts.len() == 1 && hosts[0] != conn_info {
            let host_ci = hosts[0].clone();
            let gepaart = kern.eintrag_mut(&host_ci).map(|host| {
                let host_id = host.naechste_verbindungs_id();
                host.verbindungen.insert(host_id.id, conn_info.to_string());
                host.senden(NetworkEvent::new(
                    NetEventType::NewConnection,
                    host_id,
                    NetEventData::Null,
                ));
            });
            if gepaart.is_some() {
                if let Some(peer) = kern.eintrag_mut(conn_info) {
                    peer.verbindungen.insert(id.id, host_ci);
                    peer.senden(NetworkEvent::new(
                        NetEventType::NewConnection,
                        id,
                        NetEventData::Null,
                    ));
                }
                return;
            }
        }
        if let Some(peer) = kern.eintrag(conn_info) {
            peer.senden(NetworkEvent::new(
                NetEventType::ConnectionFailed,
                id,
                NetEventData::Null,
            ));
        }
    }

    /// Adress-Sharing: vermascht den Peer symmetrisch mit allen bisherigen
    /// Hosts der Adresse (sich selbst ausgenommen)
    fn beitreten(&self, kern: &mut PoolKern, conn_info: &str, adresse: &str) {
        let hosts = kern.server.get(adresse).cloned().unwrap_or_default();
        for host_ci in hosts {
            if host_ci == conn_info {
                continue;
            }
            Self::eingehenden_peer_eintragen(kern, &host_ci, conn_info);
            Self::eingehenden_peer_eintragen(kern, conn_info, &host_ci);
        }
    }

    /// Traegt beim Ziel-Peer eine frische serverseitige Paarung ein und
    /// meldet sie dessen Client
    fn eingehenden_peer_eintragen(kern: &mut PoolKern, ziel: &str, partner: &str) {
        if let Some(eintrag) = kern.eintrag_mut(ziel) {
            let id = eintrag.naechste_verbindungs_id();
            eintrag.verbindungen.insert(id.id, partner.to_string());
            eintrag.senden(NetworkEvent::new(
                NetEventType::NewConnection,
                id,
                NetEventData::Null,
            ));
        }
    }

    /// Loest eine Paarung beidseitig; jede Seite erhaelt `Disconnected`
    /// unter ihrer eigenen ID. Unbekannte IDs werden still verworfen
    /// (verspaeteter oder doppelter Abbau ist legal).
    fn trennen(&self, kern: &mut PoolKern, conn_info: &str, id: ConnectionId) {
        let Some(anderer_ci) = kern
            .eintrag(conn_info)
            .and_then(|e| e.verbindungen.get(&id.id).cloned())
        else {
            return;
        };
        let id_des_anderen = kern
            .eintrag(&anderer_ci)
            .and_then(|e| e.verbindungs_id_von(conn_info));

        Self::peer_austragen(kern, conn_info, id.id);
        if let Some(fremde_id) = id_des_anderen {
            Self::peer_austragen(kern, &anderer_ci, fremde_id);
        }
    }

    /// Entfernt einen Paarungs-Eintrag und meldet `Disconnected`
    fn peer_austragen(kern: &mut PoolKern, ziel: &str, id: i16) {
        if let Some(eintrag) = kern.eintrag_mut(ziel) {
            eintrag.verbindungen.remove(&id);
            eintrag.senden(NetworkEvent::new(
                NetEventType::Disconnected,
                ConnectionId::new(id),
                NetEventData::Null,
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Server-Adressen
    // -----------------------------------------------------------------------

    /// Laenge eingehalten und entweder frei oder im Sharing-Modus teilbar
    fn adresse_verfuegbar(&self, kern: &PoolKern, adresse: &str) -> bool {
        if adresse.len() > self.max_adresslaenge {
            return false;
        }
        !kern.server.contains_key(adresse) || self.adress_sharing
    }

    /// Startet das Hosting einer Adresse
    ///
    /// Hostet der Peer bereits eine Adresse, wird diese zuerst freigegeben.
    /// Verfuegbare Adresse: Registrierung + `ServerInitialized`, im
    /// Sharing-Modus anschliessend Vermaschung mit den bisherigen Hosts.
    /// Nicht verfuegbar: `ServerInitFailed`.
    fn server_starten(&self, kern: &mut PoolKern, conn_info: &str, adresse: &str) {
        if kern
            .eintrag(conn_info)
            .is_some_and(|e| e.server_adresse.is_some())
        {
            self.server_stoppen(kern, conn_info);
        }

        if self.adresse_verfuegbar(kern, adresse) {
            let Some(eintrag) = kern.eintrag_mut(conn_info) else {
                return;
            };
            eintrag.server_adresse = Some(adresse.to_string());
            eintrag.senden(NetworkEvent::with_string(
                NetEventType::ServerInitialized,
                ConnectionId::INVALID,
                adresse,
            ));

            let slot = kern.server.entry(adresse.to_string()).or_default();
            if !slot.iter().any(|ci| ci == conn_info) {
                slot.push(conn_info.to_string());
            }

            if self.adress_sharing {
                self.beitreten(kern, conn_info, adresse);
            }
        } else if let Some(eintrag) = kern.eintrag(conn_info) {
            eintrag.senden(NetworkEvent::with_string(
                NetEventType::ServerInitFailed,
                ConnectionId::INVALID,
                adresse,
            ));
        }
    }

    /// Gibt die gehostete Adresse frei (`ServerClosed`); bestehende
    /// Paarungen bleiben unberuehrt. Ohne gehostete Adresse ein No-op.
    fn server_stoppen(&self, kern: &mut PoolKern, conn_info: &str) {
        let Some(adresse) = kern
            .eintrag_mut(conn_info)
            .and_then(|e| e.server_adresse.take())
        else {
            return;
        };
        Self::server_austragen(kern, conn_info, &adresse);
        if let Some(eintrag) = kern.eintrag(conn_info) {
            eintrag.senden(NetworkEvent::new(
                NetEventType::ServerClosed,
                ConnectionId::INVALID,
                NetEventData::Null,
            ));
        }
    }

    /// Entfernt einen Host aus einem servers-Slot; leere Slots werden
    /// geloescht
    fn server_austragen(kern: &mut PoolKern, conn_info: &str, adresse: &str) {
        if let Some(hosts) = kern.server.get_mut(adresse) {
            if let Some(pos) = hosts.iter().position(|ci| ci == conn_info) {
                hosts.remove(pos);
            }
            if hosts.is_empty() {
                kern.server.remove(adresse);
                tracing::info!(adresse = %adresse, "Adresse freigegeben");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Nachrichten-Weiterleitung
    // -----------------------------------------------------------------------

    /// Leitet Nutzdaten an den gepaarten Peer weiter; dieser erhaelt sie
    /// unter der ID unter der er den Absender kennt. Nutzdaten werden nicht
    /// validiert; fehlende Paarungen werden still verworfen.
    fn daten_weiterleiten(
        &self,
        kern: &PoolKern,
        conn_info: &str,
        id: ConnectionId,
        daten: NetEventData,
        zuverlaessig: bool,
    ) {
        let Some(ziel_ci) = kern
            .eintrag(conn_info)
            .and_then(|e| e.verbindungen.get(&id.id).cloned())
        else {
            return;
        };
        let Some(ziel) = kern.eintrag(&ziel_ci) else {
            return;
        };
        let Some(ziel_id) = ziel.verbindungs_id_von(conn_info) else {
            return;
        };
        let typ = if zuverlaessig {
            NetEventType::ReliableMessageReceived
        } else {
            NetEventType::UnreliableMessageReceived
        };
        ziel.senden(NetworkEvent::new(typ, ConnectionId::new(ziel_id), daten));
    }

    // -----------------------------------------------------------------------
    // Aufraeumen
    // -----------------------------------------------------------------------

    /// Raeumt einen Peer vollstaendig ab (idempotent)
    ///
    /// Ablauf:
    /// 1. Uebergang nach Trennend und Entfernen aus der Pool-Liste
    /// 2. Beidseitiges Loesen aller Paarungen; jede Gegenseite erhaelt genau
    ///    ein `Disconnected` unter ihrer eigenen ID
    /// 3. Freigeben der gehosteten Adresse
    /// 4. Uebergang nach Getrennt
    ///
    /// Der Socket selbst wird vom Peer-Task geschlossen. Aufrufe fuer
    /// bereits trennende oder unbekannte Peers kehren sofort zurueck.
    pub(crate) fn aufraeumen(&self, conn_info: &str) {
        let mut kern = self.kern();
        let Some(pos) = kern
            .verbindungen
            .iter()
            .position(|e| e.conn_info == conn_info)
        else {
            return;
        };
        if matches!(
            kern.verbindungen[pos].zustand,
            PeerZustand::Trennend | PeerZustand::Getrennt
        ) {
            return;
        }

        tracing::info!(peer = %conn_info, "Peer wird getrennt");
        let mut eintrag = kern.verbindungen.remove(pos);
        eintrag.zustand = PeerZustand::Trennend;

        // Alle Paarungen beidseitig loesen; die eigene Seite ist bereits
        // ausgehaengt und bekommt keine Events mehr
        for (_, anderer_ci) in eintrag.verbindungen.drain() {
            let fremde_id = kern
                .eintrag(&anderer_ci)
                .and_then(|e| e.verbindungs_id_von(conn_info));
            if let Some(fremde_id) = fremde_id {
                Self::peer_austragen(&mut kern, &anderer_ci, fremde_id);
            }
        }

        if let Some(adresse) = eintrag.server_adresse.take() {
            Self::server_austragen(&mut kern, conn_info, &adresse);
        }

        eintrag.zustand = PeerZustand::Getrennt;
        tracing::info!(
            peer = %conn_info,
            verbleibend = kern.verbindungen.len(),
            "Peer entfernt"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(sharing: bool) -> Arc<PeerPool> {
        Arc::new(PeerPool::neu(&AppConfig {
            pfad: "/test".into(),
            app_name: "UnitTests".into(),
            adress_sharing: sharing,
        }))
    }

    /// Registriert einen Peer ohne Socket und markiert ihn als verbunden
    fn test_peer(pool: &PeerPool, conn_info: &str) -> mpsc::Receiver<NetworkEvent> {
        let rx = pool.registrieren(conn_info);
        pool.als_verbunden_markieren(conn_info);
        rx
    }

    fn server_init(adresse: &str) -> NetworkEvent {
        NetworkEvent::with_string(
            NetEventType::ServerInitialized,
            ConnectionId::INVALID,
            adresse,
        )
    }

    fn neue_verbindung(id: i16, adresse: &str) -> NetworkEvent {
        NetworkEvent::with_string(NetEventType::NewConnection, ConnectionId::new(id), adresse)
    }

    fn alle_events(rx: &mut mpsc::Receiver<NetworkEvent>) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        while let Ok(evt) = rx.try_recv() {
            events.push(evt);
        }
        events
    }

    #[test]
    fn server_start_meldet_initialized() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");

        pool.ereignis_verarbeiten("a", server_init("raum1"));

        let evt = a.try_recv().unwrap();
        assert_eq!(evt.event_type, NetEventType::ServerInitialized);
        assert_eq!(evt.connection_id, ConnectionId::INVALID);
        assert_eq!(evt.data.as_str(), Some("raum1"));
    }

    #[test]
    fn adresse_nach_start_nicht_mehr_verfuegbar() {
        let pool = test_pool(false);
        let _a = test_peer(&pool, "a");

        assert!(pool.ist_adresse_verfuegbar("x"));
        pool.ereignis_verarbeiten("a", server_init("x"));
        assert!(!pool.ist_adresse_verfuegbar("x"));
    }

    #[test]
    fn adresse_mit_sharing_bleibt_verfuegbar() {
        let pool = test_pool(true);
        let _a = test_peer(&pool, "a");

        pool.ereignis_verarbeiten("a", server_init("x"));
        assert!(pool.ist_adresse_verfuegbar("x"));
    }

    #[test]
    fn zweiter_host_erhaelt_init_failed() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("x"));
        pool.ereignis_verarbeiten("b", server_init("x"));

        assert_eq!(
            a.try_recv().unwrap().event_type,
            NetEventType::ServerInitialized
        );
        let evt = b.try_recv().unwrap();
        assert_eq!(evt.event_type, NetEventType::ServerInitFailed);
        assert_eq!(evt.data.as_str(), Some("x"));
    }

    #[test]
    fn zu_lange_adresse_schlaegt_fehl() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");

        let adresse = "x".repeat(257);
        assert!(!pool.ist_adresse_verfuegbar(&adresse));
        pool.ereignis_verarbeiten("a", server_init(&adresse));
        assert_eq!(
            a.try_recv().unwrap().event_type,
            NetEventType::ServerInitFailed
        );

        // 256 Bytes sind noch erlaubt
        assert!(pool.ist_adresse_verfuegbar(&"y".repeat(256)));
    }

    #[test]
    fn erneuter_start_gibt_alte_adresse_frei() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");

        pool.ereignis_verarbeiten("a", server_init("alt"));
        pool.ereignis_verarbeiten("a", server_init("neu"));

        assert!(pool.ist_adresse_verfuegbar("alt"));
        assert!(!pool.ist_adresse_verfuegbar("neu"));

        let events = alle_events(&mut a);
        let typen: Vec<NetEventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            typen,
            vec![
                NetEventType::ServerInitialized,
                NetEventType::ServerClosed,
                NetEventType::ServerInitialized,
            ]
        );
    }

    #[test]
    fn punkt_zu_punkt_verbindung_ist_symmetrisch() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("raum1"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "raum1"));

        // B bekommt die eigene (clientseitige) ID, A die serverseitige
        let evt_a = alle_events(&mut a);
        assert_eq!(evt_a[0].event_type, NetEventType::ServerInitialized);
        assert_eq!(evt_a[1].event_type, NetEventType::NewConnection);
        assert_eq!(evt_a[1].connection_id.id, 16384);

        let evt_b = b.try_recv().unwrap();
        assert_eq!(evt_b.event_type, NetEventType::NewConnection);
        assert_eq!(evt_b.connection_id.id, 5);

        // Paarung ist in beiden Maps eingetragen
        let kern = pool.kern();
        assert_eq!(
            kern.eintrag("a").unwrap().verbindungen.get(&16384),
            Some(&"b".to_string())
        );
        assert_eq!(
            kern.eintrag("b").unwrap().verbindungen.get(&5),
            Some(&"a".to_string())
        );
    }

    #[test]
    fn verbindung_zu_unbekannter_adresse_schlaegt_fehl() {
        let pool = test_pool(false);
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("b", neue_verbindung(5, "nirgendwo"));

        let evt = b.try_recv().unwrap();
        assert_eq!(evt.event_type, NetEventType::ConnectionFailed);
        assert_eq!(evt.connection_id.id, 5);
    }

    #[test]
    fn keine_paarung_mit_sich_selbst() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");

        pool.ereignis_verarbeiten("a", server_init("x"));
        pool.ereignis_verarbeiten("a", neue_verbindung(5, "x"));

        let events = alle_events(&mut a);
        assert_eq!(events[0].event_type, NetEventType::ServerInitialized);
        assert_eq!(events[1].event_type, NetEventType::ConnectionFailed);
        assert!(pool.kern().eintrag("a").unwrap().verbindungen.is_empty());
    }

    #[test]
    fn nachricht_kommt_mit_fremder_id_an() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("raum1"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "raum1"));
        alle_events(&mut a);
        alle_events(&mut b);

        pool.ereignis_verarbeiten(
            "b",
            NetworkEvent::new(
                NetEventType::ReliableMessageReceived,
                ConnectionId::new(5),
                NetEventData::ByteArray(vec![10, 20]),
            ),
        );

        let evt = a.try_recv().unwrap();
        assert_eq!(evt.event_type, NetEventType::ReliableMessageReceived);
        assert_eq!(evt.connection_id.id, 16384);
        assert_eq!(evt.data, NetEventData::ByteArray(vec![10, 20]));
        assert!(b.try_recv().is_err(), "Absender erhaelt keine Kopie");
    }

    #[test]
    fn nachricht_an_unbekannte_id_wird_verworfen() {
        let pool = test_pool(false);
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten(
            "b",
            NetworkEvent::new(
                NetEventType::UnreliableMessageReceived,
                ConnectionId::new(99),
                NetEventData::ByteArray(vec![1]),
            ),
        );
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn trennen_loest_beide_seiten() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("raum1"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "raum1"));
        alle_events(&mut a);
        alle_events(&mut b);

        pool.ereignis_verarbeiten(
            "b",
            NetworkEvent::new(
                NetEventType::Disconnected,
                ConnectionId::new(5),
                NetEventData::Null,
            ),
        );

        let evt_b = b.try_recv().unwrap();
        assert_eq!(evt_b.event_type, NetEventType::Disconnected);
        assert_eq!(evt_b.connection_id.id, 5);

        let evt_a = a.try_recv().unwrap();
        assert_eq!(evt_a.event_type, NetEventType::Disconnected);
        assert_eq!(evt_a.connection_id.id, 16384);

        let kern = pool.kern();
        assert!(kern.eintrag("a").unwrap().verbindungen.is_empty());
        assert!(kern.eintrag("b").unwrap().verbindungen.is_empty());
    }

    #[test]
    fn doppeltes_trennen_ist_wirkungslos() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("raum1"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "raum1"));
        alle_events(&mut a);
        alle_events(&mut b);

        let trennung = NetworkEvent::new(
            NetEventType::Disconnected,
            ConnectionId::new(5),
            NetEventData::Null,
        );
        pool.ereignis_verarbeiten("b", trennung.clone());
        alle_events(&mut a);
        alle_events(&mut b);

        pool.ereignis_verarbeiten("b", trennung);
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn konferenz_bildet_vollmaschiges_netz() {
        let pool = test_pool(true);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");
        let mut c = test_peer(&pool, "c");

        pool.ereignis_verarbeiten("a", server_init("raum"));
        pool.ereignis_verarbeiten("b", server_init("raum"));
        pool.ereignis_verarbeiten("c", server_init("raum"));

        // A: Init + je ein NewConnection fuer B und C
        let evt_a = alle_events(&mut a);
        assert_eq!(evt_a[0].event_type, NetEventType::ServerInitialized);
        assert_eq!(
            evt_a[1..]
                .iter()
                .filter(|e| e.event_type == NetEventType::NewConnection)
                .count(),
            2
        );

        // B: Init + NewConnection fuer A und C
        let evt_b = alle_events(&mut b);
        assert_eq!(evt_b[0].event_type, NetEventType::ServerInitialized);
        assert_eq!(evt_b.len(), 3);

        // C: Init + NewConnection fuer A und B, serverseitige IDs aufsteigend
        let evt_c = alle_events(&mut c);
        assert_eq!(evt_c[0].event_type, NetEventType::ServerInitialized);
        assert_eq!(evt_c[1].connection_id.id, 16384);
        assert_eq!(evt_c[2].connection_id.id, 16385);

        // Jedes Paar ist in beide Richtungen eingetragen
        let kern = pool.kern();
        for (links, rechts) in [("a", "b"), ("a", "c"), ("b", "c")] {
            let id_links = kern.eintrag(links).unwrap().verbindungs_id_von(rechts);
            let id_rechts = kern.eintrag(rechts).unwrap().verbindungs_id_von(links);
            assert!(id_links.is_some(), "{links} kennt {rechts} nicht");
            assert!(id_rechts.is_some(), "{rechts} kennt {links} nicht");
        }
    }

    #[test]
    fn aufraeumen_benachrichtigt_gegenseiten_und_gibt_adresse_frei() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("x"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "x"));
        alle_events(&mut a);
        alle_events(&mut b);

        pool.aufraeumen("a");

        let evt_b = b.try_recv().unwrap();
        assert_eq!(evt_b.event_type, NetEventType::Disconnected);
        assert_eq!(evt_b.connection_id.id, 5);

        assert_eq!(pool.anzahl(), 1);
        assert!(pool.ist_adresse_verfuegbar("x"));
        assert!(a.try_recv().is_err(), "getrennter Peer erhaelt nichts mehr");
    }

    #[test]
    fn aufraeumen_ist_idempotent() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("x"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "x"));
        alle_events(&mut a);
        alle_events(&mut b);

        pool.aufraeumen("a");
        pool.aufraeumen("a");

        // Genau ein Disconnected bei B, kein zweites
        assert_eq!(
            b.try_recv().unwrap().event_type,
            NetEventType::Disconnected
        );
        assert!(b.try_recv().is_err());
        assert_eq!(pool.anzahl(), 1);
    }

    #[test]
    fn aufraeumen_unbekannter_peer_ist_noop() {
        let pool = test_pool(false);
        let _a = test_peer(&pool, "a");
        pool.aufraeumen("geist");
        assert_eq!(pool.anzahl(), 1);
    }

    #[test]
    fn server_stoppen_laesst_paarungen_stehen() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");
        let mut b = test_peer(&pool, "b");

        pool.ereignis_verarbeiten("a", server_init("x"));
        pool.ereignis_verarbeiten("b", neue_verbindung(5, "x"));
        alle_events(&mut a);
        alle_events(&mut b);

        pool.ereignis_verarbeiten(
            "a",
            NetworkEvent::new(
                NetEventType::ServerClosed,
                ConnectionId::INVALID,
                NetEventData::Null,
            ),
        );

        assert_eq!(
            a.try_recv().unwrap().event_type,
            NetEventType::ServerClosed
        );
        assert!(pool.ist_adresse_verfuegbar("x"));

        let kern = pool.kern();
        assert_eq!(kern.eintrag("a").unwrap().verbindungen.len(), 1);
        assert_eq!(kern.eintrag("b").unwrap().verbindungen.len(), 1);
    }

    #[test]
    fn eingehende_server_events_werden_ignoriert() {
        let pool = test_pool(false);
        let mut a = test_peer(&pool, "a");

        for typ in [
            NetEventType::ConnectionFailed,
            NetEventType::ServerInitFailed,
            NetEventType::Invalid,
            NetEventType::FatalError,
        ] {
            pool.ereignis_verarbeiten(
                "a",
                NetworkEvent::new(typ, ConnectionId::new(1), NetEventData::Null),
            );
        }
        assert!(a.try_recv().is_err());
        assert_eq!(pool.anzahl(), 1);
    }

    #[test]
    fn events_vor_verbunden_werden_verworfen() {
        let pool = test_pool(false);
        // Registriert, aber nie als verbunden markiert
        let mut rx = pool.registrieren("a");

        pool.ereignis_verarbeiten("a", server_init("x"));

        // Adresse ist registriert, das Bestaetigungs-Event aber verworfen
        assert!(!pool.ist_adresse_verfuegbar("x"));
        assert!(rx.try_recv().is_err());
    }
}
