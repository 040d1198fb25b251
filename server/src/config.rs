//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass der Server ohne Konfigurationsdatei lauffaehig
//! ist. Die Bind-Adresse laesst sich zusaetzlich per `-addr`-Flag
//! ueberschreiben.

use relais_signaling::AppConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Anwendungen (HTTP-Pfad -> Peer-Pool)
    #[serde(default = "standard_apps")]
    pub apps: Vec<AppConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            netzwerk: NetzwerkEinstellungen::default(),
            logging: LoggingEinstellungen::default(),
            apps: standard_apps(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse inklusive Port
    pub bind_adresse: String,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0:8000".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Standard-App-Tabelle des Referenz-Deployments
fn standard_apps() -> Vec<AppConfig> {
    let eintrag = |pfad: &str, app_name: &str, adress_sharing: bool| AppConfig {
        pfad: pfad.into(),
        app_name: app_name.into(),
        adress_sharing,
    };
    vec![
        eintrag("/", "Test", false),
        eintrag("/chatapp", "ChatApp", false),
        eintrag("/callapp", "CallApp", false),
        eintrag("/conferenceapp", "ConferenceApp", true),
        eintrag("/test", "UnitTests", false),
        eintrag("/testshared", "UnitTestsAddressSharing", true),
    ]
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0:8000");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.apps.len(), 6);
        assert_eq!(cfg.apps[0].pfad, "/");
    }

    #[test]
    fn standard_apps_sharing_politik() {
        let cfg = ServerConfig::default();
        let sharing: Vec<&str> = cfg
            .apps
            .iter()
            .filter(|a| a.adress_sharing)
            .map(|a| a.pfad.as_str())
            .collect();
        assert_eq!(sharing, vec!["/conferenceapp", "/testshared"]);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            bind_adresse = "127.0.0.1:9000"

            [[apps]]
            pfad = "/meineapp"
            app_name = "MeineApp"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.bind_adresse, "127.0.0.1:9000");
        // Explizite App-Tabelle ersetzt die Standardtabelle
        assert_eq!(cfg.apps.len(), 1);
        assert_eq!(cfg.apps[0].app_name, "MeineApp");
        assert!(!cfg.apps[0].adress_sharing);
        // Nicht angegebene Abschnitte behalten Standardwerte
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn fehlende_app_tabelle_ergibt_standardtabelle() {
        let cfg: ServerConfig = toml::from_str("[logging]\nlevel = \"debug\"").unwrap();
        assert_eq!(cfg.apps.len(), 6);
        assert_eq!(cfg.logging.level, "debug");
    }
}
