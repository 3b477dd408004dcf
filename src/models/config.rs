use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::error::{AppError, AppResult};
use crate::utils::path::get_database_path;

/// Verbindungsdaten der Netzwerkdatenbank (MySQL)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            database: String::new(),
        }
    }
}

impl RemoteConfig {
    /// Anzeigeform ohne Passwort, z.B. "mhf@db.local:3306/fragebogen"
    pub fn display(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub use_recovery_points: bool,
    pub use_question_answer_limit: bool,
    pub question_answer_limit: i64,
    pub show_tutorial_dialog: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            use_recovery_points: true,
            use_question_answer_limit: false,
            question_answer_limit: -1,
            show_tutorial_dialog: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub local_database: PathBuf,
    pub use_network_database: bool,
    pub network: RemoteConfig,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            local_database: get_database_path(),
            use_network_database: false,
            network: RemoteConfig::default(),
        }
    }
}

/// Intervalle der Verbindungsüberwachung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationSettings {
    pub probe_interval_ms: u64,
    pub reconnect_interval_ms: u64,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1000,
            reconnect_interval_ms: 5000,
        }
    }
}

impl ReplicationSettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub log_file_max_count: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file_max_count: 5,
        }
    }
}

impl LoggingSettings {
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

/// Programmkonfiguration (config.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralSettings,
    pub database: DatabaseSettings,
    pub replication: ReplicationSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Lade Konfiguration; legt die Datei mit Standardwerten an, falls sie fehlt
    pub fn load_or_create(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            AppError::validation(format!(
                "Konfiguration {} ist ungültig: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::other(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Netzwerkdatenbank, sofern aktiviert
    pub fn remote(&self) -> Option<&RemoteConfig> {
        if self.database.use_network_database {
            Some(&self.database.network)
        } else {
            None
        }
    }
}
