//! Netzwerkdatenbank (MySQL) als Replikationsziel.
//!
//! sqlx ist asynchron, die Speicherschnittstelle synchron: jeder Aufruf
//! läuft per `block_on` auf einer eigenen kleinen Tokio-Runtime. Aufrufer
//! sind ausschließlich Hintergrund-Threads (Replikation, Verbindungsprüfung).

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::rows::{
    CategoryRow, CollectionRow, QuestionRow, QuestionTypeRow, QuestionnaireRow, Table, TableRows,
};
use super::schema::MYSQL_CREATE_TABLES;
use super::Store;
use crate::models::{CategoryKind, RemoteConfig};
use crate::utils::error::{AppError, AppResult};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

const QUESTION_SELECT: &str = "SELECT id, `text`, type_id, `options`, `required`, dependent_on_id,
        expected_answer, abbreviation, score, `comment`, category_id
     FROM questions ORDER BY id";

type QuestionTuple = (i64, String, i64, String, bool, i64, String, String, bool, bool, i64);

pub struct MySqlStore {
    runtime: Runtime,
    pool: Mutex<Option<MySqlPool>>,
    connected: AtomicBool,
    config: RemoteConfig,
}

impl MySqlStore {
    /// Ein Verbindungsversuch; schlägt er fehl, gibt es keinen Store.
    pub fn connect(config: &RemoteConfig) -> AppResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mhf-mysql")
            .enable_all()
            .build()?;

        let pool = runtime
            .block_on(Self::open_pool(config))
            .map_err(|e| AppError::Unreachable(format!("{}: {}", config.display(), e)))?;

        info!("Verbunden mit Netzwerkdatenbank {}", config.display());

        Ok(Self {
            runtime,
            pool: Mutex::new(Some(pool)),
            connected: AtomicBool::new(true),
            config: config.clone(),
        })
    }

    async fn open_pool(config: &RemoteConfig) -> Result<MySqlPool, sqlx::Error> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .min_connections(1)
            .max_connections(2)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        for statement in MYSQL_CREATE_TABLES {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(pool)
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn pool(&self) -> AppResult<MySqlPool> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AppError::not_connected(self.config.display()));
        }

        let guard = self
            .pool
            .lock()
            .map_err(|_| AppError::other("MySQL-Pool nach Panik gesperrt"))?;
        guard
            .clone()
            .ok_or_else(|| AppError::not_connected(self.config.display()))
    }

    fn mark_disconnected(&self, err: &sqlx::Error) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!("Verbindung zu {} verloren: {}", self.config.display(), err);
        }
    }

    /// Führe eine Anfrage synchron aus
    fn run<T, F, Fut>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(MySqlPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let pool = self.pool()?;
        self.runtime.block_on(f(pool)).map_err(|e| {
            if is_connection_error(&e) {
                self.mark_disconnected(&e);
            }
            AppError::from_remote(e)
        })
    }

    fn expect_row(&self, affected: u64, what: &str, id: i64) -> AppResult<()> {
        if affected == 0 {
            return Err(AppError::not_found(format!("{} mit ID {} ({})", what, id, self.backend())));
        }
        Ok(())
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn question_from_tuple(t: QuestionTuple) -> QuestionRow {
    QuestionRow {
        id: t.0,
        text: t.1,
        type_id: t.2,
        options_json: t.3,
        required: t.4,
        dependent_on_id: t.5,
        expected_answer: t.6,
        abbreviation: t.7,
        score: t.8,
        comment: t.9,
        category_id: t.10,
    }
}

impl Store for MySqlStore {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    fn add_type(&self, row: &QuestionTypeRow) -> AppResult<i64> {
        self.run(|pool| async move {
            let result = sqlx::query(
                "INSERT INTO question_types (type_name, display_name, allows_options) VALUES (?, ?, ?)",
            )
            .bind(row.type_name.as_str())
            .bind(row.display_name.as_str())
            .bind(row.allows_options)
            .execute(&pool)
            .await?;
            Ok::<_, sqlx::Error>(result.last_insert_id() as i64)
        })
    }

    fn types(&self) -> AppResult<Vec<QuestionTypeRow>> {
        let rows: Vec<(i64, String, String, bool)> = self.run(|pool| async move {
            sqlx::query_as(
                "SELECT id, type_name, display_name, allows_options FROM question_types ORDER BY id",
            )
            .fetch_all(&pool)
            .await
        })?;

        Ok(rows
            .into_iter()
            .map(|(id, type_name, display_name, allows_options)| QuestionTypeRow {
                id,
                type_name,
                display_name,
                allows_options,
            })
            .collect())
    }

    fn add_category(&self, kind: CategoryKind, name: &str, description: &str) -> AppResult<i64> {
        let sql = format!(
            "INSERT INTO {} (`name`, `description`) VALUES (?, ?)",
            Table::for_categories(kind)
        );
        self.run(|pool| async move {
            let result = sqlx::query(&sql)
                .bind(name)
                .bind(description)
                .execute(&pool)
                .await?;
            Ok::<_, sqlx::Error>(result.last_insert_id() as i64)
        })
    }

    fn change_category(&self, kind: CategoryKind, row: &CategoryRow) -> AppResult<()> {
        let sql = format!(
            "UPDATE {} SET `name` = ?, `description` = ? WHERE id = ?",
            Table::for_categories(kind)
        );
        let affected = self.run(|pool| async move {
            let result = sqlx::query(&sql)
                .bind(row.name.as_str())
                .bind(row.description.as_str())
                .bind(row.id)
                .execute(&pool)
                .await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })?;
        // MySQL zählt unveränderte Zeilen nicht als betroffen, daher kein NotFound
        debug!("{} {} aktualisiert ({} Zeilen)", kind.display_name(), row.id, affected);
        Ok(())
    }

    fn remove_category(&self, kind: CategoryKind, id: i64) -> AppResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", Table::for_categories(kind));
        let affected = self.run(|pool| async move {
            let result = sqlx::query(&sql).bind(id).execute(&pool).await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })?;
        self.expect_row(affected, kind.display_name(), id)
    }

    fn categories(&self, kind: CategoryKind) -> AppResult<Vec<CategoryRow>> {
        let sql = format!(
            "SELECT id, `name`, `description` FROM {} ORDER BY id",
            Table::for_categories(kind)
        );
        let rows: Vec<(i64, String, String)> = self.run(|pool| async move {
            sqlx::query_as(&sql).fetch_all(&pool).await
        })?;

        Ok(rows
            .into_iter()
            .map(|(id, name, description)| CategoryRow {
                id,
                name,
                description,
            })
            .collect())
    }

    fn add_question(&self, row: &QuestionRow) -> AppResult<i64> {
        self.run(|pool| async move {
            let result = sqlx::query(
                "INSERT INTO questions (`text`, type_id, `options`, `required`, dependent_on_id,
                     expected_answer, abbreviation, score, `comment`, category_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.text.as_str())
            .bind(row.type_id)
            .bind(row.options_json.as_str())
            .bind(row.required)
            .bind(row.dependent_on_id)
            .bind(row.expected_answer.as_str())
            .bind(row.abbreviation.as_str())
            .bind(row.score)
            .bind(row.comment)
            .bind(row.category_id)
            .execute(&pool)
            .await?;
            Ok::<_, sqlx::Error>(result.last_insert_id() as i64)
        })
    }

    fn change_question(&self, row: &QuestionRow) -> AppResult<()> {
        let affected = self.run(|pool| async move {
            let result = sqlx::query(
                "UPDATE questions SET `text` = ?, type_id = ?, `options` = ?, `required` = ?,
                     dependent_on_id = ?, expected_answer = ?, abbreviation = ?, score = ?,
                     `comment` = ?, category_id = ?
                 WHERE id = ?",
            )
            .bind(row.text.as_str())
            .bind(row.type_id)
            .bind(row.options_json.as_str())
            .bind(row.required)
            .bind(row.dependent_on_id)
            .bind(row.expected_answer.as_str())
            .bind(row.abbreviation.as_str())
            .bind(row.score)
            .bind(row.comment)
            .bind(row.category_id)
            .bind(row.id)
            .execute(&pool)
            .await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })?;
        debug!("Frage {} aktualisiert ({} Zeilen)", row.id, affected);
        Ok(())
    }

    fn remove_question(&self, id: i64) -> AppResult<()> {
        let affected = self.run(|pool| async move {
            let result = sqlx::query("DELETE FROM questions WHERE id = ?")
                .bind(id)
                .execute(&pool)
                .await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })?;
        self.expect_row(affected, "Frage", id)
    }

    fn questions(&self) -> AppResult<Vec<QuestionRow>> {
        let rows: Vec<QuestionTuple> = self.run(|pool| async move {
            sqlx::query_as(QUESTION_SELECT).fetch_all(&pool).await
        })?;
        Ok(rows.into_iter().map(question_from_tuple).collect())
    }

    fn add_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<i64> {
        self.run(|pool| async move {
            let result = sqlx::query(
                "INSERT INTO questionnaires (`name`, `description`, category_id, created, last_changed)
                 VALUES (?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP), COALESCE(?, CURRENT_TIMESTAMP))",
            )
            .bind(row.name.as_str())
            .bind(row.description.as_str())
            .bind(row.category_id)
            .bind(row.created.as_deref())
            .bind(row.last_changed.as_deref())
            .execute(&pool)
            .await?;
            Ok::<_, sqlx::Error>(result.last_insert_id() as i64)
        })
    }

    fn change_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<()> {
        let affected = self.run(|pool| async move {
            let result = sqlx::query(
                "UPDATE questionnaires
                 SET `name` = ?, `description` = ?, category_id = ?, last_changed = CURRENT_TIMESTAMP
                 WHERE id = ?",
            )
            .bind(row.name.as_str())
            .bind(row.description.as_str())
            .bind(row.category_id)
            .bind(row.id)
            .execute(&pool)
            .await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })?;
        debug!("Fragebogen {} aktualisiert ({} Zeilen)", row.id, affected);
        Ok(())
    }

    fn remove_questionnaire(&self, id: i64) -> AppResult<()> {
        let affected = self.run(|pool| async move {
            let result = sqlx::query("DELETE FROM questionnaires WHERE id = ?")
                .bind(id)
                .execute(&pool)
                .await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })?;
        self.expect_row(affected, "Fragebogen", id)
    }

    fn questionnaires(&self) -> AppResult<Vec<QuestionnaireRow>> {
        let rows: Vec<(i64, String, String, i64, Option<String>, Option<String>)> =
            self.run(|pool| async move {
                sqlx::query_as(
                    "SELECT id, `name`, `description`, category_id,
                            DATE_FORMAT(created, '%Y-%m-%d %H:%i:%s'),
                            DATE_FORMAT(last_changed, '%Y-%m-%d %H:%i:%s')
                     FROM questionnaires ORDER BY id",
                )
                .fetch_all(&pool)
                .await
            })?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, description, category_id, created, last_changed)| QuestionnaireRow {
                    id,
                    name,
                    description,
                    category_id,
                    created,
                    last_changed,
                },
            )
            .collect())
    }

    fn add_collection(&self, row: &CollectionRow) -> AppResult<()> {
        self.run(|pool| async move {
            sqlx::query(
                "INSERT INTO collections (question_id, questionnaire_id, `position`, `required`)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(row.question_id)
            .bind(row.questionnaire_id)
            .bind(row.position)
            .bind(row.required)
            .execute(&pool)
            .await?;
            Ok::<_, sqlx::Error>(())
        })
    }

    fn remove_collection(&self, question_id: i64, questionnaire_id: i64) -> AppResult<()> {
        self.run(|pool| async move {
            sqlx::query("DELETE FROM collections WHERE question_id = ? AND questionnaire_id = ?")
                .bind(question_id)
                .bind(questionnaire_id)
                .execute(&pool)
                .await?;
            Ok::<_, sqlx::Error>(())
        })
    }

    fn clear_collections(&self, questionnaire_id: i64) -> AppResult<()> {
        self.run(|pool| async move {
            sqlx::query("DELETE FROM collections WHERE questionnaire_id = ?")
                .bind(questionnaire_id)
                .execute(&pool)
                .await?;
            Ok::<_, sqlx::Error>(())
        })
    }

    fn count_memberships(&self, question_id: i64) -> AppResult<i64> {
        self.run(|pool| async move {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM collections WHERE question_id = ?")
                    .bind(question_id)
                    .fetch_one(&pool)
                    .await?;
            Ok::<_, sqlx::Error>(count)
        })
    }

    fn collections(&self) -> AppResult<Vec<CollectionRow>> {
        let rows: Vec<(i64, i64, i64, bool)> = self.run(|pool| async move {
            sqlx::query_as(
                "SELECT question_id, questionnaire_id, `position`, `required`
                 FROM collections ORDER BY questionnaire_id, `position`",
            )
            .fetch_all(&pool)
            .await
        })?;

        Ok(rows
            .into_iter()
            .map(|(question_id, questionnaire_id, position, required)| CollectionRow {
                question_id,
                questionnaire_id,
                position,
                required,
            })
            .collect())
    }

    fn replace_table(&self, rows: &TableRows) -> AppResult<()> {
        let table = rows.table();
        self.run(|pool| async move {
            let mut tx = pool.begin().await?;
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;

            match rows {
                TableRows::QuestionTypes(rows) => {
                    for r in rows {
                        sqlx::query(
                            "INSERT INTO question_types (id, type_name, display_name, allows_options)
                             VALUES (?, ?, ?, ?)",
                        )
                        .bind(r.id)
                        .bind(r.type_name.as_str())
                        .bind(r.display_name.as_str())
                        .bind(r.allows_options)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
                TableRows::QuestionCategories(rows) | TableRows::QuestionnaireCategories(rows) => {
                    let sql = format!(
                        "INSERT INTO {} (id, `name`, `description`) VALUES (?, ?, ?)",
                        table
                    );
                    for r in rows {
                        sqlx::query(&sql)
                            .bind(r.id)
                            .bind(r.name.as_str())
                            .bind(r.description.as_str())
                            .execute(&mut *tx)
                            .await?;
                    }
                }
                TableRows::Questions(rows) => {
                    for r in rows {
                        sqlx::query(
                            "INSERT INTO questions (id, `text`, type_id, `options`, `required`,
                                 dependent_on_id, expected_answer, abbreviation, score, `comment`,
                                 category_id)
                             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        )
                        .bind(r.id)
                        .bind(r.text.as_str())
                        .bind(r.type_id)
                        .bind(r.options_json.as_str())
                        .bind(r.required)
                        .bind(r.dependent_on_id)
                        .bind(r.expected_answer.as_str())
                        .bind(r.abbreviation.as_str())
                        .bind(r.score)
                        .bind(r.comment)
                        .bind(r.category_id)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
                TableRows::Questionnaires(rows) => {
                    for r in rows {
                        sqlx::query(
                            "INSERT INTO questionnaires (id, `name`, `description`, category_id,
                                 created, last_changed)
                             VALUES (?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP),
                                     COALESCE(?, CURRENT_TIMESTAMP))",
                        )
                        .bind(r.id)
                        .bind(r.name.as_str())
                        .bind(r.description.as_str())
                        .bind(r.category_id)
                        .bind(r.created.as_deref())
                        .bind(r.last_changed.as_deref())
                        .execute(&mut *tx)
                        .await?;
                    }
                }
                TableRows::Collections(rows) => {
                    for r in rows {
                        sqlx::query(
                            "INSERT INTO collections (question_id, questionnaire_id, `position`, `required`)
                             VALUES (?, ?, ?, ?)",
                        )
                        .bind(r.question_id)
                        .bind(r.questionnaire_id)
                        .bind(r.position)
                        .bind(r.required)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }

            tx.commit().await
        })?;

        debug!("Tabelle {} in MySQL ersetzt ({} Zeilen)", table, rows.len());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn probe(&self) -> AppResult<()> {
        let result = self.run(|pool| async move {
            sqlx::query("SELECT 1").execute(&pool).await?;
            Ok::<_, sqlx::Error>(())
        });

        if let Err(ref e) = result {
            if !e.is_not_connected() && self.connected.swap(false, Ordering::SeqCst) {
                warn!("Verbindungsprüfung zu {} fehlgeschlagen: {}", self.config.display(), e);
            }
        }
        result
    }

    fn reconnect(&self) -> AppResult<()> {
        let pool = self
            .runtime
            .block_on(Self::open_pool(&self.config))
            .map_err(|e| AppError::Unreachable(format!("{}: {}", self.config.display(), e)))?;

        let mut guard = self
            .pool
            .lock()
            .map_err(|_| AppError::other("MySQL-Pool nach Panik gesperrt"))?;
        *guard = Some(pool);
        self.connected.store(true, Ordering::SeqCst);

        info!("Wieder verbunden mit {}", self.config.display());
        Ok(())
    }
}
