use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::schema::{CREATE_TABLES, SCHEMA_VERSION};
use crate::models::{BUILTIN_QUESTION_TYPES, DEFAULT_CATEGORY_ID, DEFAULT_CATEGORY_NAME};
use crate::utils::error::{AppError, AppResult};

/// Lege Tabellen an und ergänze fehlende Stammdaten
pub fn run_migrations(conn: &Connection) -> AppResult<()> {
    let current_version = get_current_version(conn)?;

    if current_version == 0 {
        info!("Lege neue Datenbank mit Schemaversion {} an", SCHEMA_VERSION);
        conn.execute_batch(CREATE_TABLES).map_err(AppError::from_sqlite)?;
        conn.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )
        .map_err(AppError::from_sqlite)?;
    } else {
        info!("Datenbank ist aktuell (Version {})", current_version);
    }

    // Stammdaten bei jedem Öffnen prüfen, falls jemand Zeilen gelöscht hat
    seed_question_types(conn)?;
    seed_default_categories(conn)?;

    Ok(())
}

fn get_current_version(conn: &Connection) -> AppResult<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
            [],
            |row| row.get(0),
        )
        .map_err(AppError::from_sqlite)?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()
        .map_err(AppError::from_sqlite)?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Die sieben Antworttypen, abgeglichen über `type_name`
fn seed_question_types(conn: &Connection) -> AppResult<()> {
    let mut stmt = conn
        .prepare(
            "INSERT OR IGNORE INTO question_types (type_name, display_name, allows_options)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(AppError::from_sqlite)?;

    let mut added = 0;
    for (type_name, display_name, allows_options) in BUILTIN_QUESTION_TYPES {
        added += stmt
            .execute(params![type_name, display_name, allows_options])
            .map_err(AppError::from_sqlite)?;
    }

    if added > 0 {
        info!("{} Antworttypen angelegt", added);
    }
    Ok(())
}

/// Standardkategorie (ID 1) in beiden Kategorietabellen
fn seed_default_categories(conn: &Connection) -> AppResult<()> {
    for table in ["question_categories", "questionnaire_categories"] {
        let added = conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (id, name, description) VALUES (?1, ?2, '')",
                    table
                ),
                params![DEFAULT_CATEGORY_ID, DEFAULT_CATEGORY_NAME],
            )
            .map_err(AppError::from_sqlite)?;

        if added > 0 {
            info!("Standardkategorie in {} angelegt", table);
        }
    }
    Ok(())
}
