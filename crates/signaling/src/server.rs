//! Netzwerk-Server – Multiplexer von (App-Name, Socket) auf den richtigen Pool
//!
//! Haelt pro App-Name genau einen `PeerPool` und legt ihn beim ersten
//! Socket fuer diese App an. Abgesehen von dieser Map ist der Server
//! zustandslos.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;

use crate::pool::PeerPool;

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Konfiguration einer Anwendung
///
/// Jeder `pfad` wird beim WebSocket-Upgrade zum Routing-Schluessel; der
/// `app_name` waehlt den Peer-Pool. Alle Registrierungen eines App-Namens
/// sollten dieselbe Sharing-Politik tragen; massgeblich ist die erste.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP-Pfad unter dem die App erreichbar ist
    pub pfad: String,
    /// Name der App; Schluessel fuer den Peer-Pool
    pub app_name: String,
    /// Aktiviert N-Wege-Raum-Semantik unter einer geteilten Adresse
    #[serde(default)]
    pub adress_sharing: bool,
}

// ---------------------------------------------------------------------------
// NetworkServer
// ---------------------------------------------------------------------------

/// Multiplexer: waehlt (oder erstellt) den Pool fuer eine App und
/// registriert neue Peers
///
/// Thread-safe via DashMap; `bei_verbindung` kann aus beliebig vielen
/// Accept-Tasks gleichzeitig aufgerufen werden.
pub struct NetworkServer {
    pools: DashMap<String, Arc<PeerPool>>,
}

impl NetworkServer {
    /// Erstellt einen neuen Netzwerk-Server ohne Pools
    pub fn neu() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Nimmt einen frisch akzeptierten Socket entgegen
    pub fn bei_verbindung(
        &self,
        socket: WebSocketStream<TcpStream>,
        config: &AppConfig,
        conn_info: String,
    ) {
        let pool = self
            .pools
            .entry(config.app_name.clone())
            .or_insert_with(|| {
                tracing::info!(
                    app = %config.app_name,
                    adress_sharing = config.adress_sharing,
                    "Peer-Pool angelegt"
                );
                Arc::new(PeerPool::neu(config))
            })
            .clone();
        pool.hinzufuegen(socket, conn_info);
    }

    /// Pool einer App, falls bereits angelegt
    pub fn pool(&self, app_name: &str) -> Option<Arc<PeerPool>> {
        self.pools.get(app_name).map(|eintrag| eintrag.value().clone())
    }

    /// Gesamtzahl der registrierten Peers ueber alle Pools
    pub fn gesamt_anzahl(&self) -> usize {
        self.pools.iter().map(|eintrag| eintrag.value().anzahl()).sum()
    }
}

impl Default for NetworkServer {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leerer_server_hat_keine_pools() {
        let server = NetworkServer::neu();
        assert_eq!(server.gesamt_anzahl(), 0);
        assert!(server.pool("ChatApp").is_none());
    }

    #[test]
    fn app_config_toml_form() {
        let config: AppConfig = toml::from_str(
            r#"
            pfad = "/conferenceapp"
            app_name = "ConferenceApp"
            adress_sharing = true
        "#,
        )
        .unwrap();
        assert_eq!(config.pfad, "/conferenceapp");
        assert_eq!(config.app_name, "ConferenceApp");
        assert!(config.adress_sharing);
    }

    #[test]
    fn adress_sharing_ist_standardmaessig_aus() {
        let config: AppConfig = toml::from_str(
            r#"
            pfad = "/chatapp"
            app_name = "ChatApp"
        "#,
        )
        .unwrap();
        assert!(!config.adress_sharing);
    }
}
