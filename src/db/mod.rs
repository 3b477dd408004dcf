//! Speicherschicht: eine Schnittstelle, zwei Backends.
//!
//! `SqliteStore` ist die lokale Primärdatenbank, `MySqlStore` das optionale
//! Replikationsziel im Netzwerk. Fassade und Replikation kennen nur `Store`.

pub mod migrations;
pub mod mysql;
pub mod rows;
pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use mysql::MySqlStore;
pub use rows::{
    CategoryRow, CollectionRow, QuestionRow, QuestionTypeRow, QuestionnaireRow, Table, TableRows,
};
pub use sqlite::SqliteStore;

use crate::models::CategoryKind;
use crate::utils::error::AppResult;

/// Tabellenweiser Zugriff plus Verbindungsstatus.
///
/// Jede Operation ist eine einzelne Anweisung; nur `replace_table` läuft
/// in einer Transaktion. Fehler werden nicht wiederholt.
pub trait Store: Send + Sync {
    /// Kurzname des Backends für Logmeldungen ("sqlite", "mysql")
    fn backend(&self) -> &'static str;

    // Antworttypen
    fn add_type(&self, row: &QuestionTypeRow) -> AppResult<i64>;
    fn types(&self) -> AppResult<Vec<QuestionTypeRow>>;

    // Kategorien
    fn add_category(&self, kind: CategoryKind, name: &str, description: &str) -> AppResult<i64>;
    fn change_category(&self, kind: CategoryKind, row: &CategoryRow) -> AppResult<()>;
    fn remove_category(&self, kind: CategoryKind, id: i64) -> AppResult<()>;
    fn categories(&self, kind: CategoryKind) -> AppResult<Vec<CategoryRow>>;

    // Fragen
    fn add_question(&self, row: &QuestionRow) -> AppResult<i64>;
    fn change_question(&self, row: &QuestionRow) -> AppResult<()>;
    fn remove_question(&self, id: i64) -> AppResult<()>;
    /// Alle Fragen in Einfügereihenfolge
    fn questions(&self) -> AppResult<Vec<QuestionRow>>;

    // Fragebögen
    fn add_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<i64>;
    /// Aktualisiert Kopfdaten und setzt `last_changed` auf jetzt
    fn change_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<()>;
    fn remove_questionnaire(&self, id: i64) -> AppResult<()>;
    fn questionnaires(&self) -> AppResult<Vec<QuestionnaireRow>>;

    // Mitgliedschaften
    fn add_collection(&self, row: &CollectionRow) -> AppResult<()>;
    fn remove_collection(&self, question_id: i64, questionnaire_id: i64) -> AppResult<()>;
    fn clear_collections(&self, questionnaire_id: i64) -> AppResult<()>;
    /// Anzahl der Fragebögen, die diese Frage enthalten
    fn count_memberships(&self, question_id: i64) -> AppResult<i64>;
    fn collections(&self) -> AppResult<Vec<CollectionRow>>;

    /// Vollständiger Inhalt einer Tabelle
    fn snapshot(&self, table: Table) -> AppResult<TableRows> {
        Ok(match table {
            Table::QuestionTypes => TableRows::QuestionTypes(self.types()?),
            Table::QuestionCategories => {
                TableRows::QuestionCategories(self.categories(CategoryKind::Question)?)
            }
            Table::QuestionnaireCategories => {
                TableRows::QuestionnaireCategories(self.categories(CategoryKind::Questionnaire)?)
            }
            Table::Questions => TableRows::Questions(self.questions()?),
            Table::Questionnaires => TableRows::Questionnaires(self.questionnaires()?),
            Table::Collections => TableRows::Collections(self.collections()?),
        })
    }

    /// Leert die Tabelle und fügt alle Zeilen mit ihren Primärschlüsseln
    /// wieder ein (eine Transaktion).
    fn replace_table(&self, rows: &TableRows) -> AppResult<()>;

    /// Letzter bekannter Verbindungsstatus
    fn is_connected(&self) -> bool {
        true
    }

    /// Triviale Leseanfrage; setzt bei Fehler den Status auf getrennt
    fn probe(&self) -> AppResult<()>;

    /// Neuer Verbindungsversuch nach einer Trennung
    fn reconnect(&self) -> AppResult<()> {
        self.probe()
    }
}
