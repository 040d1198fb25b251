//! relais-server – Bibliotheks-Root
//!
//! Baut Listener und Netzwerk-Server zusammen und verwaltet den
//! Lebenszyklus: Start, Signalbehandlung und den Drain beim Shutdown.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config::ServerConfig;
use relais_signaling::{NetworkServer, WsListener};

/// Maximale Wartezeit auf das Leerlaufen der Pools beim Shutdown
const DRAIN_ZEITLIMIT: Duration = Duration::from_secs(5);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Listener und laeuft bis zum Shutdown-Signal
    ///
    /// Nach SIGINT/SIGTERM nimmt der Listener keine Verbindungen mehr an;
    /// laufende Peers bekommen bis zu 5 Sekunden zum Austrudeln, danach
    /// endet der Prozess. Persistiert wird nichts.
    pub async fn starten(self) -> Result<()> {
        let netzwerk = Arc::new(NetworkServer::neu());
        let listener = WsListener::binden(
            &self.config.netzwerk.bind_adresse,
            Arc::clone(&netzwerk),
            self.config.apps.clone(),
        )
        .await?;

        tracing::info!(
            adresse = %listener.lokale_adresse()?,
            apps = self.config.apps.len(),
            "Relais Server startet"
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let listener_task = tokio::spawn(listener.starten(shutdown_rx));

        auf_shutdown_signal_warten().await?;
        tracing::info!("Shutdown-Signal empfangen, Listener wird gestoppt");
        let _ = shutdown_tx.send(true);
        listener_task
            .await
            .map_err(|e| anyhow::anyhow!("Listener-Task abgebrochen: {e}"))??;

        // Drain: laufende Peers bis zum Zeitlimit austrudeln lassen
        let frist = tokio::time::Instant::now() + DRAIN_ZEITLIMIT;
        while netzwerk.gesamt_anzahl() > 0 && tokio::time::Instant::now() < frist {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::info!(
            verbleibend = netzwerk.gesamt_anzahl(),
            "Server beendet"
        );
        Ok(())
    }
}

/// Wartet auf SIGINT oder SIGTERM
async fn auf_shutdown_signal_warten() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            ergebnis = tokio::signal::ctrl_c() => ergebnis?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
