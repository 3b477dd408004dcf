use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Datenbankfehler: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Fehler der Netzwerkdatenbank: {0}")]
    Remote(#[from] sqlx::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation auf einer getrennten Sekundärdatenbank
    #[error("Nicht verbunden: {0}")]
    NotConnected(String),

    /// Eindeutigkeitsverletzung (Kürzel, Kategoriename, Mitgliedschaft)
    #[error("Eindeutigkeit verletzt: {0}")]
    Constraint(String),

    /// Datenbank beim Start nicht erreichbar
    #[error("Datenbank nicht erreichbar: {0}")]
    Unreachable(String),

    #[error("Die Standardkategorie (ID {0}) kann weder umbenannt noch gelöscht werden")]
    ProtectedCategory(i64),

    #[error("Abhängige Frage mit Kürzel '{0}' existiert nicht")]
    UnresolvedDependency(String),

    #[error("Validierungsfehler: {0}")]
    Validation(String),

    #[error("Nicht gefunden: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::NotConnected(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Ordnet SQLite-Fehler ein: Constraint-Verletzungen werden zu `Constraint`.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref msg)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(msg.clone().unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Database(other),
        }
    }

    /// Ordnet MySQL-Fehler ein: doppelte Schlüssel werden zu `Constraint`.
    pub fn from_remote(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::Constraint(db.message().to_string())
            }
            other => Self::Remote(other),
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
