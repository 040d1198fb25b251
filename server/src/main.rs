//! Relais Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, parst die Kommandozeile, initialisiert das
//! Logging und startet den Server. Exit-Code ist ungleich null wenn der
//! Listener nicht binden kann.

use anyhow::Result;
use relais_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("RELAIS_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let mut config = ServerConfig::laden(&config_pfad)?;

    // Einziges Kommandozeilen-Flag: -addr host:port
    if let Some(adresse) = addr_flag_parsen(std::env::args().skip(1))? {
        config.netzwerk.bind_adresse = adresse;
    }

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        adresse = %config.netzwerk.bind_adresse,
        "Relais Server wird initialisiert"
    );

    let server = Server::neu(config);
    server.starten().await?;

    Ok(())
}

/// Parst `-addr host:port` (auch `--addr` und `-addr=host:port`)
fn addr_flag_parsen(mut args: impl Iterator<Item = String>) -> Result<Option<String>> {
    while let Some(arg) = args.next() {
        if !arg.starts_with('-') {
            return Err(anyhow::anyhow!("unerwartetes Argument: {arg}"));
        }
        let flag = arg.trim_start_matches('-');
        if flag == "addr" {
            return match args.next() {
                Some(wert) => Ok(Some(wert)),
                None => Err(anyhow::anyhow!("-addr erwartet ein Argument host:port")),
            };
        }
        if let Some(wert) = flag.strip_prefix("addr=") {
            return Ok(Some(wert.to_string()));
        }
        return Err(anyhow::anyhow!("unbekanntes Flag: {arg}"));
    }
    Ok(None)
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
