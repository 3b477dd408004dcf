//! MHF Desktop - Datenhaltung für medizinische Fragebögen
//!
//! Lokale SQLite-Datenbank als Primärspeicher, optional gespiegelt in eine
//! MySQL-Netzwerkdatenbank.

pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-exports
pub use db::{MySqlStore, SqliteStore, Store};
pub use models::*;
pub use services::{DataAccess, QuestionnaireEditor};
pub use utils::{AppError, AppResult};
