//! WebSocket-Listener – Bindet den Socket, akzeptiert und routet Upgrades
//!
//! Der Listener nimmt TCP-Verbindungen an, fuehrt den WebSocket-Handshake
//! aus und waehlt anhand des HTTP-Pfads die App-Konfiguration. Unbekannte
//! Pfade werden im Handshake mit 404 abgewiesen. Der akzeptierte Socket
//! geht an den `NetworkServer`.
//!
//! Binaer-Frames tragen binaer kodierte Events, Text-Frames die JSON-Form;
//! ein Frame entspricht genau einem Event. Lese- und Schreiblimit liegen
//! bei 1 MiB pro Frame.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::SignalingResult;
use crate::peer::MAX_MESSAGE_SIZE;
use crate::server::{AppConfig, NetworkServer};

/// WebSocket-Acceptor fuer den Signaling-Dienst
///
/// Binden und Starten sind getrennt, damit der Aufrufer die tatsaechlich
/// gebundene Adresse (Port 0) erfragen kann.
pub struct WsListener {
    listener: TcpListener,
    netzwerk: Arc<NetworkServer>,
    apps: Vec<AppConfig>,
}

impl WsListener {
    /// Bindet den TCP-Socket
    pub async fn binden(
        adresse: &str,
        netzwerk: Arc<NetworkServer>,
        apps: Vec<AppConfig>,
    ) -> SignalingResult<Self> {
        let listener = TcpListener::bind(adresse).await?;
        Ok(Self {
            listener,
            netzwerk,
            apps,
        })
    }

    /// Gibt die tatsaechlich gebundene Adresse zurueck
    pub fn lokale_adresse(&self) -> SignalingResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept-Schleife; laeuft bis `shutdown_rx` ein `true` liefert
    ///
    /// Jeder Handshake laeuft in einem eigenen Task, damit ein langsamer
    /// Client den Accept nicht blockiert.
    pub async fn starten(
        self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let lokale_adresse = self.lokale_adresse()?;
        tracing::info!(
            adresse = %lokale_adresse,
            apps = self.apps.len(),
            "WebSocket-Listener gestartet"
        );
        let apps = Arc::new(self.apps);

        loop {
            tokio::select! {
                ergebnis = self.listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer_adresse)) => {
                            tracing::debug!(peer = %peer_adresse, "Verbindung akzeptiert");
                            let netzwerk = Arc::clone(&self.netzwerk);
                            let apps = Arc::clone(&apps);
                            tokio::spawn(async move {
                                if let Err(e) =
                                    upgrade_verarbeiten(stream, peer_adresse, netzwerk, &apps).await
                                {
                                    tracing::warn!(
                                        peer = %peer_adresse,
                                        fehler = %e,
                                        "WebSocket-Handshake fehlgeschlagen"
                                    );
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Listener: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("WebSocket-Listener gestoppt");
        Ok(())
    }
}

/// Fuehrt den Handshake aus und uebergibt den Socket an den Netzwerk-Server
async fn upgrade_verarbeiten(
    stream: TcpStream,
    peer_adresse: SocketAddr,
    netzwerk: Arc<NetworkServer>,
    apps: &[AppConfig],
) -> SignalingResult<()> {
    let mut gewaehlt: Option<AppConfig> = None;
    let rueckruf = |req: &Request, antwort: Response| {
        let pfad = req.uri().path();
        match apps.iter().find(|app| app.pfad == pfad) {
            Some(app) => {
                gewaehlt = Some(app.clone());
                Ok(antwort)
            }
            None => {
                tracing::warn!(pfad = %pfad, "Unbekannter Pfad abgewiesen");
                let mut ablehnung = ErrorResponse::new(Some("not found".into()));
                *ablehnung.status_mut() = StatusCode::NOT_FOUND;
                Err(ablehnung)
            }
        }
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);

    let socket =
        tokio_tungstenite::accept_hdr_async_with_config(stream, rueckruf, Some(ws_config)).await?;

    // Nur erreichbar wenn der Rueckruf eine App gewaehlt hat
    if let Some(app) = gewaehlt {
        netzwerk.bei_verbindung(socket, &app, peer_adresse.to_string());
    }
    Ok(())
}
