/// Aktuelle Schemaversion der lokalen Datenbank
pub const SCHEMA_VERSION: i32 = 1;

/// SQL-Schema der lokalen Datenbank (SQLite)
///
/// Fremdschlüssel sind deklariert, werden aber nicht erzwungen
/// (`PRAGMA foreign_keys = OFF`): `dependent_on_id = -1` ist ein gültiger
/// Platzhalter und die referenzielle Integrität pflegt die Zugriffsschicht.
pub const CREATE_TABLES: &str = r#"
-- Schemaversionen
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
);

-- Antworttypen (fester Katalog)
CREATE TABLE IF NOT EXISTS question_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type_name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    allows_options INTEGER NOT NULL
);

-- Fragenkategorien (id=1 ist "Allgemein")
CREATE TABLE IF NOT EXISTS question_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

-- Fragebogenkategorien (id=1 ist "Allgemein")
CREATE TABLE IF NOT EXISTS questionnaire_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
);

-- Fragen
CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    type_id INTEGER NOT NULL,
    options TEXT NOT NULL DEFAULT '[]',
    required INTEGER NOT NULL,
    dependent_on_id INTEGER NOT NULL DEFAULT -1,
    expected_answer TEXT NOT NULL,
    abbreviation TEXT NOT NULL UNIQUE,
    score INTEGER NOT NULL,
    comment INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    FOREIGN KEY (type_id) REFERENCES question_types(id),
    FOREIGN KEY (dependent_on_id) REFERENCES questions(id),
    FOREIGN KEY (category_id) REFERENCES question_categories(id)
);

-- Fragebögen
CREATE TABLE IF NOT EXISTS questionnaires (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category_id INTEGER NOT NULL,
    created TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
    last_changed TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
    FOREIGN KEY (category_id) REFERENCES questionnaire_categories(id)
);

-- Mitgliedschaften Frage <-> Fragebogen
CREATE TABLE IF NOT EXISTS collections (
    question_id INTEGER NOT NULL,
    questionnaire_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    required INTEGER NOT NULL,
    PRIMARY KEY (question_id, questionnaire_id),
    FOREIGN KEY (question_id) REFERENCES questions(id),
    FOREIGN KEY (questionnaire_id) REFERENCES questionnaires(id)
);

CREATE INDEX IF NOT EXISTS idx_collections_questionnaire ON collections(questionnaire_id);
"#;

/// SQL-Schema der Netzwerkdatenbank (MySQL), eine Anweisung je Eintrag
pub const MYSQL_CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS question_types (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        type_name VARCHAR(255) NOT NULL UNIQUE,
        display_name VARCHAR(255) NOT NULL,
        allows_options BOOLEAN NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS question_categories (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        `name` VARCHAR(255) NOT NULL UNIQUE,
        `description` VARCHAR(255) NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS questionnaire_categories (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        `name` VARCHAR(255) NOT NULL UNIQUE,
        `description` VARCHAR(255) NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS questions (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        `text` LONGTEXT NOT NULL,
        type_id BIGINT NOT NULL,
        `options` TEXT NOT NULL,
        `required` BOOLEAN NOT NULL,
        dependent_on_id BIGINT NOT NULL DEFAULT -1,
        expected_answer VARCHAR(255) NOT NULL,
        abbreviation VARCHAR(255) NOT NULL UNIQUE,
        score BOOLEAN NOT NULL,
        `comment` BOOLEAN NOT NULL,
        category_id BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS questionnaires (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        `name` VARCHAR(255) NOT NULL,
        `description` VARCHAR(255) NOT NULL DEFAULT '',
        category_id BIGINT NOT NULL,
        created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_changed TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS collections (
        question_id BIGINT NOT NULL,
        questionnaire_id BIGINT NOT NULL,
        `position` BIGINT NOT NULL,
        `required` BOOLEAN NOT NULL,
        PRIMARY KEY (question_id, questionnaire_id)
    )",
];
