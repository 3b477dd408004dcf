use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::migrations;
use super::rows::{
    CategoryRow, CollectionRow, QuestionRow, QuestionTypeRow, QuestionnaireRow, Table, TableRows,
};
use super::Store;
use crate::models::CategoryKind;
use crate::utils::error::{AppError, AppResult};

const QUESTION_COLUMNS: &str = "id, text, type_id, options, required, dependent_on_id,
     expected_answer, abbreviation, score, comment, category_id";

/// Lokale Primärdatenbank mit thread-sicherem Zugriff
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Öffne oder erstelle die Datenbankdatei
    pub fn open(path: &Path) -> AppResult<Self> {
        // Verzeichnis anlegen, falls es fehlt
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Unreachable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Unreachable(format!("{}: {}", path.display(), e)))?;

        // Fremdschlüssel bleiben aus: -1 ist ein gültiger Platzhalter
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = OFF;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(AppError::from_sqlite)?;

        migrations::run_migrations(&conn)?;
        info!("Lokale Datenbank geöffnet: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-Memory-Datenbank (für Tests)
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from_sqlite)?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")
            .map_err(AppError::from_sqlite)?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AppError::other("SQLite-Verbindung nach Panik gesperrt"))?;
        f(&mut conn).map_err(AppError::from_sqlite)
    }

    fn expect_row(affected: usize, what: &str, id: i64) -> AppResult<()> {
        if affected == 0 {
            return Err(AppError::not_found(format!("{} mit ID {}", what, id)));
        }
        Ok(())
    }

    fn type_from_row(row: &Row) -> rusqlite::Result<QuestionTypeRow> {
        Ok(QuestionTypeRow {
            id: row.get(0)?,
            type_name: row.get(1)?,
            display_name: row.get(2)?,
            allows_options: row.get(3)?,
        })
    }

    fn category_from_row(row: &Row) -> rusqlite::Result<CategoryRow> {
        Ok(CategoryRow {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    }

    fn question_from_row(row: &Row) -> rusqlite::Result<QuestionRow> {
        Ok(QuestionRow {
            id: row.get(0)?,
            text: row.get(1)?,
            type_id: row.get(2)?,
            options_json: row.get(3)?,
            required: row.get(4)?,
            dependent_on_id: row.get(5)?,
            expected_answer: row.get(6)?,
            abbreviation: row.get(7)?,
            score: row.get(8)?,
            comment: row.get(9)?,
            category_id: row.get(10)?,
        })
    }

    fn questionnaire_from_row(row: &Row) -> rusqlite::Result<QuestionnaireRow> {
        Ok(QuestionnaireRow {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            category_id: row.get(3)?,
            created: row.get(4)?,
            last_changed: row.get(5)?,
        })
    }

    fn collection_from_row(row: &Row) -> rusqlite::Result<CollectionRow> {
        Ok(CollectionRow {
            question_id: row.get(0)?,
            questionnaire_id: row.get(1)?,
            position: row.get(2)?,
            required: row.get(3)?,
        })
    }

    fn query_all<T>(
        conn: &Connection,
        sql: &str,
        map: fn(&Row) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<T>>>();
        rows
    }
}

impl Clone for SqliteStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn add_type(&self, row: &QuestionTypeRow) -> AppResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO question_types (type_name, display_name, allows_options)
                 VALUES (?1, ?2, ?3)",
                params![row.type_name, row.display_name, row.allows_options],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn types(&self) -> AppResult<Vec<QuestionTypeRow>> {
        self.with_conn(|conn| {
            Self::query_all(
                conn,
                "SELECT id, type_name, display_name, allows_options FROM question_types ORDER BY id",
                Self::type_from_row,
            )
        })
    }

    fn add_category(&self, kind: CategoryKind, name: &str, description: &str) -> AppResult<i64> {
        let table = Table::for_categories(kind);
        let id = self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO {} (name, description) VALUES (?1, ?2)", table),
                params![name, description],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!("{} '{}' angelegt (ID {})", kind.display_name(), name, id);
        Ok(id)
    }

    fn change_category(&self, kind: CategoryKind, row: &CategoryRow) -> AppResult<()> {
        let table = Table::for_categories(kind);
        let affected = self.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE {} SET name = ?1, description = ?2 WHERE id = ?3", table),
                params![row.name, row.description, row.id],
            )
        })?;
        Self::expect_row(affected, kind.display_name(), row.id)
    }

    fn remove_category(&self, kind: CategoryKind, id: i64) -> AppResult<()> {
        let table = Table::for_categories(kind);
        let affected = self.with_conn(|conn| {
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])
        })?;
        Self::expect_row(affected, kind.display_name(), id)
    }

    fn categories(&self, kind: CategoryKind) -> AppResult<Vec<CategoryRow>> {
        let table = Table::for_categories(kind);
        self.with_conn(|conn| {
            Self::query_all(
                conn,
                &format!("SELECT id, name, description FROM {} ORDER BY id", table),
                Self::category_from_row,
            )
        })
    }

    fn add_question(&self, row: &QuestionRow) -> AppResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO questions (text, type_id, options, required, dependent_on_id,
                     expected_answer, abbreviation, score, comment, category_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.text,
                    row.type_id,
                    row.options_json,
                    row.required,
                    row.dependent_on_id,
                    row.expected_answer,
                    row.abbreviation,
                    row.score,
                    row.comment,
                    row.category_id,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn change_question(&self, row: &QuestionRow) -> AppResult<()> {
        let affected = self.with_conn(|conn| {
            conn.execute(
                "UPDATE questions SET text = ?1, type_id = ?2, options = ?3, required = ?4,
                     dependent_on_id = ?5, expected_answer = ?6, abbreviation = ?7,
                     score = ?8, comment = ?9, category_id = ?10
                 WHERE id = ?11",
                params![
                    row.text,
                    row.type_id,
                    row.options_json,
                    row.required,
                    row.dependent_on_id,
                    row.expected_answer,
                    row.abbreviation,
                    row.score,
                    row.comment,
                    row.category_id,
                    row.id,
                ],
            )
        })?;
        Self::expect_row(affected, "Frage", row.id)
    }

    fn remove_question(&self, id: i64) -> AppResult<()> {
        let affected =
            self.with_conn(|conn| conn.execute("DELETE FROM questions WHERE id = ?1", [id]))?;
        Self::expect_row(affected, "Frage", id)
    }

    fn questions(&self) -> AppResult<Vec<QuestionRow>> {
        self.with_conn(|conn| {
            Self::query_all(
                conn,
                &format!("SELECT {} FROM questions ORDER BY id", QUESTION_COLUMNS),
                Self::question_from_row,
            )
        })
    }

    fn add_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO questionnaires (name, description, category_id, created, last_changed)
                 VALUES (?1, ?2, ?3,
                         COALESCE(?4, datetime('now', 'localtime')),
                         COALESCE(?5, datetime('now', 'localtime')))",
                params![
                    row.name,
                    row.description,
                    row.category_id,
                    row.created,
                    row.last_changed,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn change_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<()> {
        let affected = self.with_conn(|conn| {
            conn.execute(
                "UPDATE questionnaires
                 SET name = ?1, description = ?2, category_id = ?3,
                     last_changed = datetime('now', 'localtime')
                 WHERE id = ?4",
                params![row.name, row.description, row.category_id, row.id],
            )
        })?;
        Self::expect_row(affected, "Fragebogen", row.id)
    }

    fn remove_questionnaire(&self, id: i64) -> AppResult<()> {
        let affected = self
            .with_conn(|conn| conn.execute("DELETE FROM questionnaires WHERE id = ?1", [id]))?;
        Self::expect_row(affected, "Fragebogen", id)
    }

    fn questionnaires(&self) -> AppResult<Vec<QuestionnaireRow>> {
        self.with_conn(|conn| {
            Self::query_all(
                conn,
                "SELECT id, name, description, category_id, created, last_changed
                 FROM questionnaires ORDER BY id",
                Self::questionnaire_from_row,
            )
        })
    }

    fn add_collection(&self, row: &CollectionRow) -> AppResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (question_id, questionnaire_id, position, required)
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.question_id, row.questionnaire_id, row.position, row.required],
            )
        })?;
        Ok(())
    }

    fn remove_collection(&self, question_id: i64, questionnaire_id: i64) -> AppResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM collections WHERE question_id = ?1 AND questionnaire_id = ?2",
                [question_id, questionnaire_id],
            )
        })?;
        Ok(())
    }

    fn clear_collections(&self, questionnaire_id: i64) -> AppResult<()> {
        let removed = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM collections WHERE questionnaire_id = ?1",
                [questionnaire_id],
            )
        })?;
        debug!("{} Mitgliedschaften von Fragebogen {} entfernt", removed, questionnaire_id);
        Ok(())
    }

    fn count_memberships(&self, question_id: i64) -> AppResult<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM collections WHERE question_id = ?1",
                [question_id],
                |row| row.get(0),
            )
        })
    }

    fn collections(&self) -> AppResult<Vec<CollectionRow>> {
        self.with_conn(|conn| {
            Self::query_all(
                conn,
                "SELECT question_id, questionnaire_id, position, required
                 FROM collections ORDER BY questionnaire_id, position",
                Self::collection_from_row,
            )
        })
    }

    fn replace_table(&self, rows: &TableRows) -> AppResult<()> {
        self.with_conn(|conn| {
            let table = rows.table();
            let tx = conn.transaction()?;
            tx.execute(&format!("DELETE FROM {}", table), [])?;

            match rows {
                TableRows::QuestionTypes(rows) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO question_types (id, type_name, display_name, allows_options)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for r in rows {
                        stmt.execute(params![r.id, r.type_name, r.display_name, r.allows_options])?;
                    }
                }
                TableRows::QuestionCategories(rows) | TableRows::QuestionnaireCategories(rows) => {
                    let mut stmt = tx.prepare(&format!(
                        "INSERT INTO {} (id, name, description) VALUES (?1, ?2, ?3)",
                        table
                    ))?;
                    for r in rows {
                        stmt.execute(params![r.id, r.name, r.description])?;
                    }
                }
                TableRows::Questions(rows) => {
                    let mut stmt = tx.prepare(&format!(
                        "INSERT INTO questions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        QUESTION_COLUMNS
                    ))?;
                    for r in rows {
                        stmt.execute(params![
                            r.id,
                            r.text,
                            r.type_id,
                            r.options_json,
                            r.required,
                            r.dependent_on_id,
                            r.expected_answer,
                            r.abbreviation,
                            r.score,
                            r.comment,
                            r.category_id,
                        ])?;
                    }
                }
                TableRows::Questionnaires(rows) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO questionnaires (id, name, description, category_id, created, last_changed)
                         VALUES (?1, ?2, ?3, ?4,
                                 COALESCE(?5, datetime('now', 'localtime')),
                                 COALESCE(?6, datetime('now', 'localtime')))",
                    )?;
                    for r in rows {
                        stmt.execute(params![
                            r.id,
                            r.name,
                            r.description,
                            r.category_id,
                            r.created,
                            r.last_changed,
                        ])?;
                    }
                }
                TableRows::Collections(rows) => {
                    let mut stmt = tx.prepare(
                        "INSERT INTO collections (question_id, questionnaire_id, position, required)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for r in rows {
                        stmt.execute(params![r.question_id, r.questionnaire_id, r.position, r.required])?;
                    }
                }
            }

            tx.commit()
        })?;

        debug!("Tabelle {} ersetzt ({} Zeilen)", rows.table(), rows.len());
        Ok(())
    }

    fn probe(&self) -> AppResult<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))?;
        Ok(())
    }
}
