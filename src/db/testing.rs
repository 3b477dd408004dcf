//! Replikationsziel für Tests: eine In-Memory-SQLite-Datenbank hinter einem
//! abschaltbaren "Netzwerk".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::rows::{
    CategoryRow, CollectionRow, QuestionRow, QuestionTypeRow, QuestionnaireRow, Table, TableRows,
};
use super::{SqliteStore, Store};
use crate::models::CategoryKind;
use crate::utils::error::{AppError, AppResult};

pub struct FlakyStore {
    inner: SqliteStore,
    network_up: AtomicBool,
    connected: AtomicBool,
    replaced: Mutex<BTreeMap<Table, usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            network_up: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            replaced: Mutex::new(BTreeMap::new()),
        }
    }

    /// Direkter Zugriff auf die Daten, unabhängig vom Netzwerk
    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    pub fn set_network(&self, up: bool) {
        self.network_up.store(up, Ordering::SeqCst);
    }

    /// Anzahl erfolgreicher `replace_table`-Aufrufe je Tabelle
    pub fn replace_count(&self, table: Table) -> usize {
        self.replaced.lock().unwrap().get(&table).copied().unwrap_or(0)
    }

    pub fn replace_counts(&self) -> BTreeMap<Table, usize> {
        self.replaced.lock().unwrap().clone()
    }

    fn online(&self) -> AppResult<()> {
        if !self.network_up.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(AppError::not_connected("flaky"));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AppError::not_connected("flaky"));
        }
        Ok(())
    }
}

impl Store for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    fn add_type(&self, row: &QuestionTypeRow) -> AppResult<i64> {
        self.online()?;
        self.inner.add_type(row)
    }

    fn types(&self) -> AppResult<Vec<QuestionTypeRow>> {
        self.online()?;
        self.inner.types()
    }

    fn add_category(&self, kind: CategoryKind, name: &str, description: &str) -> AppResult<i64> {
        self.online()?;
        self.inner.add_category(kind, name, description)
    }

    fn change_category(&self, kind: CategoryKind, row: &CategoryRow) -> AppResult<()> {
        self.online()?;
        self.inner.change_category(kind, row)
    }

    fn remove_category(&self, kind: CategoryKind, id: i64) -> AppResult<()> {
        self.online()?;
        self.inner.remove_category(kind, id)
    }

    fn categories(&self, kind: CategoryKind) -> AppResult<Vec<CategoryRow>> {
        self.online()?;
        self.inner.categories(kind)
    }

    fn add_question(&self, row: &QuestionRow) -> AppResult<i64> {
        self.online()?;
        self.inner.add_question(row)
    }

    fn change_question(&self, row: &QuestionRow) -> AppResult<()> {
        self.online()?;
        self.inner.change_question(row)
    }

    fn remove_question(&self, id: i64) -> AppResult<()> {
        self.online()?;
        self.inner.remove_question(id)
    }

    fn questions(&self) -> AppResult<Vec<QuestionRow>> {
        self.online()?;
        self.inner.questions()
    }

    fn add_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<i64> {
        self.online()?;
        self.inner.add_questionnaire(row)
    }

    fn change_questionnaire(&self, row: &QuestionnaireRow) -> AppResult<()> {
        self.online()?;
        self.inner.change_questionnaire(row)
    }

    fn remove_questionnaire(&self, id: i64) -> AppResult<()> {
        self.online()?;
        self.inner.remove_questionnaire(id)
    }

    fn questionnaires(&self) -> AppResult<Vec<QuestionnaireRow>> {
        self.online()?;
        self.inner.questionnaires()
    }

    fn add_collection(&self, row: &CollectionRow) -> AppResult<()> {
        self.online()?;
        self.inner.add_collection(row)
    }

    fn remove_collection(&self, question_id: i64, questionnaire_id: i64) -> AppResult<()> {
        self.online()?;
        self.inner.remove_collection(question_id, questionnaire_id)
    }

    fn clear_collections(&self, questionnaire_id: i64) -> AppResult<()> {
        self.online()?;
        self.inner.clear_collections(questionnaire_id)
    }

    fn count_memberships(&self, question_id: i64) -> AppResult<i64> {
        self.online()?;
        self.inner.count_memberships(question_id)
    }

    fn collections(&self) -> AppResult<Vec<CollectionRow>> {
        self.online()?;
        self.inner.collections()
    }

    fn replace_table(&self, rows: &TableRows) -> AppResult<()> {
        self.online()?;
        self.inner.replace_table(rows)?;
        *self.replaced.lock().unwrap().entry(rows.table()).or_insert(0) += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn probe(&self) -> AppResult<()> {
        self.online()
    }

    fn reconnect(&self) -> AppResult<()> {
        if !self.network_up.load(Ordering::SeqCst) {
            return Err(AppError::Unreachable("flaky".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
