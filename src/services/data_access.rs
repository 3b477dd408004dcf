//! Zentrale Zugriffsschicht für Fragen, Fragebögen und Kategorien.
//!
//! Alle Schreibwege laufen hier durch. Die Fassade hält die
//! Mitgliedschaftszeilen konsistent (Positionen lückenlos 1..N), löst
//! Abhängigkeiten über Kürzel auf und markiert geänderte Tabellen für die
//! Replikation.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::cache::Lookups;
use super::events::{ChangeBus, ChangeEvent};
use super::replication::Replication;
use crate::db::{
    CategoryRow, CollectionRow, MySqlStore, QuestionRow, QuestionnaireRow, SqliteStore, Store,
    Table,
};
use crate::models::{
    CategoryKind, Question, QuestionCategory, QuestionType, Questionnaire, QuestionnaireCategory,
    RemoteConfig, ReplicationSettings, DEFAULT_CATEGORY_ID, DEFAULT_CATEGORY_NAME, NO_DEPENDENCY,
};
use crate::utils::date::now_timestamp;
use crate::utils::error::{AppError, AppResult};

/// Fremdschlüssel für "keine Abhängigkeit"
const NO_DEPENDENCY_ID: i64 = -1;

const QUESTIONNAIRE_TABLES: &[Table] = &[Table::Questionnaires, Table::Questions, Table::Collections];

/// Zustand der Replikation für Statusanzeigen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationStatus {
    pub backend: &'static str,
    pub connected: bool,
    pub pending: Vec<Table>,
}

pub struct DataAccess {
    store: Arc<dyn Store>,
    lookups: RwLock<Arc<Lookups>>,
    events: ChangeBus,
    replication: Mutex<Option<Replication>>,
}

impl DataAccess {
    pub fn new(store: Arc<dyn Store>) -> AppResult<Self> {
        let lookups = Lookups::load(store.as_ref())?;
        debug!(
            "{} Antworttypen, {} Fragen- und {} Fragebogenkategorien geladen",
            lookups.types().len(),
            lookups.question_categories().len(),
            lookups.questionnaire_categories().len()
        );

        Ok(Self {
            store,
            lookups: RwLock::new(Arc::new(lookups)),
            events: ChangeBus::new(),
            replication: Mutex::new(None),
        })
    }

    /// Öffne die lokale Datenbank unter `path`
    pub fn open(path: &Path) -> AppResult<Self> {
        Self::new(Arc::new(SqliteStore::open(path)?))
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Self::new(Arc::new(SqliteStore::open_in_memory()?))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Aktuelle Nachschlagetabellen (Typen, Kategorien)
    pub fn lookups(&self) -> Arc<Lookups> {
        Arc::clone(&self.lookups.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn refresh_lookups(&self) -> AppResult<()> {
        let fresh = Lookups::load(self.store.as_ref())?;
        *self.lookups.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(fresh);
        Ok(())
    }

    /// Kanal mit allen erfolgreichen Änderungen ab jetzt
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Replikation
    // ------------------------------------------------------------------

    fn replication(&self) -> MutexGuard<'_, Option<Replication>> {
        self.replication.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_dirty(&self, tables: &[Table]) {
        if let Some(replication) = self.replication().as_ref() {
            replication.mark(tables);
        }
    }

    /// Registriere ein Replikationsziel; ein vorhandenes wird ersetzt
    pub fn connect_secondary(
        &self,
        replica: Arc<dyn Store>,
        settings: &ReplicationSettings,
    ) -> AppResult<()> {
        self.disconnect_secondary();
        let replication = Replication::start(Arc::clone(&self.store), replica, settings)?;
        *self.replication() = Some(replication);
        Ok(())
    }

    /// Verbinde mit der Netzwerkdatenbank; scheitert der Versuch, bleibt
    /// die Anwendung rein lokal.
    pub fn connect_remote(
        &self,
        config: &RemoteConfig,
        settings: &ReplicationSettings,
    ) -> AppResult<()> {
        let remote = MySqlStore::connect(config)?;
        self.connect_secondary(Arc::new(remote), settings)
    }

    pub fn disconnect_secondary(&self) -> bool {
        let previous = self.replication().take();
        match previous {
            Some(mut replication) => {
                replication.stop();
                true
            }
            None => false,
        }
    }

    pub fn replication_status(&self) -> Option<ReplicationStatus> {
        self.replication().as_ref().map(|r| ReplicationStatus {
            backend: r.replica().backend(),
            connected: r.replica().is_connected(),
            pending: r.pending(),
        })
    }

    /// Warte, bis alle markierten Tabellen abgeglichen sind.
    /// Ohne Replikationsziel sofort `true`.
    pub fn wait_for_replication(&self, timeout: Duration) -> bool {
        let dirty = match self.replication().as_ref() {
            Some(replication) => replication.dirty_tables(),
            None => return true,
        };
        dirty.wait_idle(timeout)
    }

    // ------------------------------------------------------------------
    // Fragen
    // ------------------------------------------------------------------

    pub fn types(&self) -> Vec<QuestionType> {
        self.lookups().types().to_vec()
    }

    /// Alle Fragen in Einfügereihenfolge
    pub fn questions(&self) -> AppResult<Vec<Question>> {
        let rows = self.store.questions()?;
        let lookups = self.lookups();
        rows.iter()
            .map(|row| build_question(row, &rows, &lookups))
            .collect()
    }

    pub fn question_by_id(&self, id: i64) -> AppResult<Option<Question>> {
        let rows = self.store.questions()?;
        let lookups = self.lookups();
        rows.iter()
            .find(|row| row.id == id)
            .map(|row| build_question(row, &rows, &lookups))
            .transpose()
    }

    /// Fragen, deren Text `keyword` enthält (ohne Groß-/Kleinschreibung),
    /// optional nur aus einer Kategorie. Leeres Stichwort liefert alle.
    pub fn find_questions(
        &self,
        keyword: &str,
        category: Option<&QuestionCategory>,
    ) -> AppResult<Vec<Question>> {
        let keyword = keyword.to_lowercase();
        Ok(self
            .questions()?
            .into_iter()
            .filter(|q| category.map_or(true, |c| q.category.id == c.id))
            .filter(|q| keyword.is_empty() || q.text.to_lowercase().contains(&keyword))
            .collect())
    }

    /// Fragen, die von `question` abhängen
    pub fn dependents(&self, question: &Question) -> AppResult<Vec<Question>> {
        Ok(self
            .questions()?
            .into_iter()
            .filter(|q| q.dependent_on == question.abbreviation)
            .collect())
    }

    pub fn has_dependents(&self, question: &Question) -> AppResult<bool> {
        Ok(!self.dependents(question)?.is_empty())
    }

    /// Die Frage, von der `question` abhängt
    pub fn dependency_of(&self, question: &Question) -> AppResult<Option<Question>> {
        if !question.has_dependency() {
            return Ok(None);
        }
        Ok(self
            .questions()?
            .into_iter()
            .find(|q| q.abbreviation == question.dependent_on))
    }

    fn insert_question(&self, question: &Question, rows: &[QuestionRow]) -> AppResult<QuestionRow> {
        question.validate()?;
        let dependent_on_id = resolve_dependency(question, rows)?;
        let mut row = question_row(question, dependent_on_id)?;
        row.id = self.store.add_question(&row)?;
        Ok(row)
    }

    /// Speichere eine neue Frage und vergib ihre ID
    pub fn add_question(&self, question: Question) -> AppResult<Question> {
        let rows = self.store.questions()?;
        let row = self.insert_question(&question, &rows).map_err(|e| {
            error!("Frage '{}' nicht gespeichert: {}", question.abbreviation, e);
            e
        })?;

        let mut saved = question;
        saved.id = row.id;
        info!("Frage '{}' gespeichert (ID {})", saved.abbreviation, saved.id);

        self.mark_dirty(&[Table::Questions]);
        self.events.publish(ChangeEvent::QuestionSaved(saved.clone()));
        Ok(saved)
    }

    pub fn edit_question(&self, question: Question) -> AppResult<Question> {
        if !question.is_persisted() {
            return Err(AppError::validation(format!(
                "Frage '{}' ist noch nicht gespeichert",
                question.abbreviation
            )));
        }
        question.validate()?;

        let rows = self.store.questions()?;
        let dependent_on_id = resolve_dependency(&question, &rows)?;
        self.store
            .change_question(&question_row(&question, dependent_on_id)?)
            .map_err(|e| {
                error!("Frage {} nicht geändert: {}", question.id, e);
                e
            })?;
        info!("Frage '{}' geändert (ID {})", question.abbreviation, question.id);

        self.mark_dirty(&[Table::Questions]);
        self.events.publish(ChangeEvent::QuestionSaved(question.clone()));
        Ok(question)
    }

    /// Lösche eine Frage. Mitgliedschaften bleiben unberührt; das ist Sache
    /// der Fragebogen-Operationen. `false`, wenn die Datenbank ablehnt.
    pub fn remove_question(&self, question: &Question) -> bool {
        match self.store.remove_question(question.id) {
            Ok(()) => {
                info!("Frage '{}' gelöscht (ID {})", question.abbreviation, question.id);
                self.mark_dirty(&[Table::Questions]);
                self.events.publish(ChangeEvent::QuestionRemoved(question.id));
                true
            }
            Err(e) => {
                error!("Frage {} nicht gelöscht: {}", question.id, e);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Fragebögen
    // ------------------------------------------------------------------

    pub fn questionnaires(&self) -> AppResult<Vec<Questionnaire>> {
        let lookups = self.lookups();
        let rows = self.store.questions()?;
        let questions = rows
            .iter()
            .map(|row| -> AppResult<(i64, Question)> {
                Ok((row.id, build_question(row, &rows, &lookups)?))
            })
            .collect::<AppResult<HashMap<i64, Question>>>()?;

        let mut memberships = self.store.collections()?;
        memberships.sort_by_key(|m| (m.questionnaire_id, m.position));

        let mut result = Vec::new();
        for header in self.store.questionnaires()? {
            let mut questionnaire = Questionnaire {
                id: header.id,
                name: header.name,
                description: header.description,
                questions: Vec::new(),
                category: lookups.questionnaire_category(header.category_id),
                creation_date: header.created,
                last_edited: header.last_changed,
            };

            for membership in memberships.iter().filter(|m| m.questionnaire_id == header.id) {
                match questions.get(&membership.question_id) {
                    Some(question) => {
                        let mut question = question.clone();
                        question.required = membership.required;
                        questionnaire.questions.push(question);
                    }
                    None => warn!(
                        "Fragebogen {} verweist auf fehlende Frage {}",
                        header.id, membership.question_id
                    ),
                }
            }

            result.push(questionnaire);
        }

        Ok(result)
    }

    pub fn questionnaire_by_id(&self, id: i64) -> AppResult<Option<Questionnaire>> {
        Ok(self.questionnaires()?.into_iter().find(|q| q.id == id))
    }

    /// Schreibe die Mitgliedschaften eines Fragebogens neu.
    ///
    /// Ungespeicherte Fragen werden angelegt. Abgelehnte Fragen (doppeltes
    /// Kürzel, Datenbankfehler) landen in der Rückgabe; die übrigen erhalten
    /// lückenlose Positionen ab 1.
    fn write_memberships(
        &self,
        target: &mut Questionnaire,
        questions: Vec<Question>,
    ) -> AppResult<Vec<Question>> {
        let mut rows = self.store.questions()?;
        let mut seen = HashSet::new();
        let mut rejected = Vec::new();
        let mut position = 1;

        for mut question in questions {
            if !seen.insert(question.abbreviation.clone()) {
                warn!("Kürzel '{}' doppelt im Fragebogen", question.abbreviation);
                rejected.push(question);
                continue;
            }

            if question.is_persisted() {
                if !rows.iter().any(|r| r.id == question.id) {
                    warn!(
                        "Frage '{}' (ID {}) existiert nicht mehr",
                        question.abbreviation, question.id
                    );
                    rejected.push(question);
                    continue;
                }
                let collides = rows
                    .iter()
                    .any(|r| r.abbreviation == question.abbreviation && r.id != question.id);
                if collides {
                    warn!(
                        "Kürzel '{}' gehört bereits zu einer anderen Frage",
                        question.abbreviation
                    );
                    rejected.push(question);
                    continue;
                }
            } else {
                match self.insert_question(&question, &rows) {
                    Ok(row) => {
                        question.id = row.id;
                        rows.push(row);
                        self.events.publish(ChangeEvent::QuestionSaved(question.clone()));
                    }
                    Err(e) => {
                        warn!("Frage '{}' abgelehnt: {}", question.abbreviation, e);
                        rejected.push(question);
                        continue;
                    }
                }
            }

            let membership = CollectionRow {
                question_id: question.id,
                questionnaire_id: target.id,
                position,
                required: question.required,
            };
            match self.store.add_collection(&membership) {
                Ok(()) => {
                    position += 1;
                    target.questions.push(question);
                }
                Err(e) => {
                    warn!("Frage '{}' nicht zugeordnet: {}", question.abbreviation, e);
                    rejected.push(question);
                }
            }
        }

        Ok(rejected)
    }

    /// Lösche Fragen, die nur in diesem Fragebogen stecken und nicht in
    /// `keep` stehen
    fn purge_orphans(&self, memberships: &[CollectionRow], keep: &HashSet<i64>) -> AppResult<usize> {
        let mut removed = 0;
        for membership in memberships {
            if keep.contains(&membership.question_id) {
                continue;
            }
            if self.store.count_memberships(membership.question_id)? == 1 {
                self.store.remove_question(membership.question_id)?;
                self.events
                    .publish(ChangeEvent::QuestionRemoved(membership.question_id));
                removed += 1;
            }
        }
        if removed > 0 {
            info!("{} verwaiste Fragen gelöscht", removed);
        }
        Ok(removed)
    }

    fn memberships_of(&self, questionnaire_id: i64) -> AppResult<Vec<CollectionRow>> {
        Ok(self
            .store
            .collections()?
            .into_iter()
            .filter(|m| m.questionnaire_id == questionnaire_id)
            .collect())
    }

    /// Speichere einen neuen Fragebogen samt Fragen.
    ///
    /// Teilweiser Erfolg ist gewollt: abgelehnte Fragen kommen als zweiter
    /// Wert zurück, der Fragebogen enthält nur die übernommenen.
    pub fn add_questionnaire(
        &self,
        questionnaire: Questionnaire,
    ) -> AppResult<(Questionnaire, Vec<Question>)> {
        let mut saved = questionnaire;
        let questions = std::mem::take(&mut saved.questions);

        saved.id = self
            .store
            .add_questionnaire(&questionnaire_row(&saved))
            .map_err(|e| {
                error!("Fragebogen '{}' nicht gespeichert: {}", saved.name, e);
                e
            })?;

        let result = self.write_memberships(&mut saved, questions);
        self.mark_dirty(QUESTIONNAIRE_TABLES);
        let rejected = result?;

        info!(
            "Fragebogen '{}' gespeichert (ID {}, {} Fragen, {} abgelehnt)",
            saved.name,
            saved.id,
            saved.questions.len(),
            rejected.len()
        );
        self.events.publish(ChangeEvent::QuestionnaireSaved(saved.clone()));
        Ok((saved, rejected))
    }

    /// Schreibe einen gespeicherten Fragebogen neu.
    ///
    /// Mitgliedschaften werden komplett ersetzt. Mit `purge` werden Fragen
    /// gelöscht, die nur hier vorkamen und in der neuen Liste fehlen.
    pub fn edit_questionnaire(
        &self,
        questionnaire: Questionnaire,
        purge: bool,
    ) -> AppResult<(Questionnaire, Vec<Question>)> {
        if !questionnaire.is_persisted() {
            return Err(AppError::validation(format!(
                "Fragebogen '{}' ist noch nicht gespeichert",
                questionnaire.name
            )));
        }

        let result = self.rebuild_questionnaire(questionnaire, purge);
        self.mark_dirty(QUESTIONNAIRE_TABLES);

        let (saved, rejected) = result.map_err(|e| {
            error!("Fragebogen nicht geändert: {}", e);
            e
        })?;
        info!(
            "Fragebogen '{}' geändert (ID {}, {} Fragen, {} abgelehnt)",
            saved.name,
            saved.id,
            saved.questions.len(),
            rejected.len()
        );
        self.events.publish(ChangeEvent::QuestionnaireSaved(saved.clone()));
        Ok((saved, rejected))
    }

    fn rebuild_questionnaire(
        &self,
        questionnaire: Questionnaire,
        purge: bool,
    ) -> AppResult<(Questionnaire, Vec<Question>)> {
        if purge {
            let memberships = self.memberships_of(questionnaire.id)?;
            let keep: HashSet<i64> = questionnaire
                .questions
                .iter()
                .filter(|q| q.is_persisted())
                .map(|q| q.id)
                .collect();
            self.purge_orphans(&memberships, &keep)?;
        }

        self.store.clear_collections(questionnaire.id)?;
        self.store.change_questionnaire(&questionnaire_row(&questionnaire))?;

        let mut saved = questionnaire;
        saved.last_edited = Some(now_timestamp());
        let questions = std::mem::take(&mut saved.questions);
        let rejected = self.write_memberships(&mut saved, questions)?;
        Ok((saved, rejected))
    }

    /// Neu anlegen oder ändern, je nach ID
    pub fn save_questionnaire(
        &self,
        questionnaire: Questionnaire,
        purge: bool,
    ) -> AppResult<(Questionnaire, Vec<Question>)> {
        if questionnaire.is_persisted() {
            self.edit_questionnaire(questionnaire, purge)
        } else {
            self.add_questionnaire(questionnaire)
        }
    }

    /// Lösche einen Fragebogen samt Mitgliedschaften; mit `purge` auch
    /// Fragen, die in keinem anderen Fragebogen vorkommen.
    pub fn remove_questionnaire(&self, questionnaire: &Questionnaire, purge: bool) -> bool {
        if !questionnaire.is_persisted() {
            warn!("Ungespeicherter Fragebogen '{}' kann nicht gelöscht werden", questionnaire.name);
            return false;
        }

        let result = (|| -> AppResult<()> {
            if purge {
                let memberships = self.memberships_of(questionnaire.id)?;
                self.purge_orphans(&memberships, &HashSet::new())?;
            }
            self.store.clear_collections(questionnaire.id)?;
            self.store.remove_questionnaire(questionnaire.id)
        })();
        self.mark_dirty(QUESTIONNAIRE_TABLES);

        match result {
            Ok(()) => {
                info!("Fragebogen '{}' gelöscht (ID {})", questionnaire.name, questionnaire.id);
                self.events
                    .publish(ChangeEvent::QuestionnaireRemoved(questionnaire.id));
                true
            }
            Err(e) => {
                error!("Fragebogen {} nicht gelöscht: {}", questionnaire.id, e);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Kategorien
    // ------------------------------------------------------------------

    pub fn question_categories(&self) -> Vec<QuestionCategory> {
        self.lookups().question_categories().to_vec()
    }

    pub fn questionnaire_categories(&self) -> Vec<QuestionnaireCategory> {
        self.lookups().questionnaire_categories().to_vec()
    }

    pub fn default_question_category(&self) -> QuestionCategory {
        self.lookups().default_question_category()
    }

    pub fn default_questionnaire_category(&self) -> QuestionnaireCategory {
        self.lookups().default_questionnaire_category()
    }

    fn categories_changed(&self, kind: CategoryKind) {
        if let Err(e) = self.refresh_lookups() {
            error!("Kategorien konnten nicht neu geladen werden: {}", e);
        }
        self.mark_dirty(&[Table::for_categories(kind)]);
        self.events.publish(ChangeEvent::CategoriesChanged(kind));
    }

    fn add_category(&self, kind: CategoryKind, name: &str, description: &str) -> AppResult<i64> {
        let id = self.store.add_category(kind, name, description).map_err(|e| {
            error!("{} '{}' nicht gespeichert: {}", kind.display_name(), name, e);
            e
        })?;
        info!("{} '{}' gespeichert (ID {})", kind.display_name(), name, id);
        self.categories_changed(kind);
        Ok(id)
    }

    fn edit_category(
        &self,
        kind: CategoryKind,
        id: i64,
        name: &str,
        description: &str,
    ) -> AppResult<()> {
        // Beschreibung der Standardkategorie darf sich ändern, der Name nicht
        if id == DEFAULT_CATEGORY_ID && name != DEFAULT_CATEGORY_NAME {
            return Err(AppError::ProtectedCategory(id));
        }

        let row = CategoryRow {
            id,
            name: name.to_string(),
            description: description.to_string(),
        };
        self.store.change_category(kind, &row).map_err(|e| {
            error!("{} {} nicht geändert: {}", kind.display_name(), id, e);
            e
        })?;
        self.categories_changed(kind);
        Ok(())
    }

    fn remove_category(&self, kind: CategoryKind, id: i64) -> AppResult<bool> {
        if id == DEFAULT_CATEGORY_ID {
            return Err(AppError::ProtectedCategory(id));
        }

        match self.store.remove_category(kind, id) {
            Ok(()) => {
                info!("{} {} gelöscht", kind.display_name(), id);
                self.categories_changed(kind);
                Ok(true)
            }
            Err(e) => {
                error!("{} {} nicht gelöscht: {}", kind.display_name(), id, e);
                Ok(false)
            }
        }
    }

    pub fn add_question_category(&self, category: QuestionCategory) -> AppResult<QuestionCategory> {
        let id = self.add_category(CategoryKind::Question, &category.category, &category.description)?;
        Ok(QuestionCategory { id, ..category })
    }

    pub fn edit_question_category(&self, category: &QuestionCategory) -> AppResult<()> {
        self.edit_category(
            CategoryKind::Question,
            category.id,
            &category.category,
            &category.description,
        )
    }

    pub fn remove_question_category(&self, category: &QuestionCategory) -> AppResult<bool> {
        self.remove_category(CategoryKind::Question, category.id)
    }

    pub fn add_questionnaire_category(
        &self,
        category: QuestionnaireCategory,
    ) -> AppResult<QuestionnaireCategory> {
        let id = self.add_category(
            CategoryKind::Questionnaire,
            &category.category,
            &category.description,
        )?;
        Ok(QuestionnaireCategory { id, ..category })
    }

    pub fn edit_questionnaire_category(&self, category: &QuestionnaireCategory) -> AppResult<()> {
        self.edit_category(
            CategoryKind::Questionnaire,
            category.id,
            &category.category,
            &category.description,
        )
    }

    pub fn remove_questionnaire_category(&self, category: &QuestionnaireCategory) -> AppResult<bool> {
        self.remove_category(CategoryKind::Questionnaire, category.id)
    }
}

impl Drop for DataAccess {
    fn drop(&mut self) {
        self.disconnect_secondary();
    }
}

/// Kürzel der abhängigen Frage in ihre ID übersetzen (erster Treffer)
fn resolve_dependency(question: &Question, rows: &[QuestionRow]) -> AppResult<i64> {
    if !question.has_dependency() {
        return Ok(NO_DEPENDENCY_ID);
    }
    rows.iter()
        .find(|r| r.abbreviation == question.dependent_on)
        .map(|r| r.id)
        .ok_or_else(|| AppError::UnresolvedDependency(question.dependent_on.clone()))
}

fn question_row(question: &Question, dependent_on_id: i64) -> AppResult<QuestionRow> {
    Ok(QuestionRow {
        id: question.id,
        text: question.text.clone(),
        type_id: question.question_type.id,
        options_json: serde_json::to_string(&question.options)?,
        required: question.required,
        dependent_on_id,
        expected_answer: question.expected_answer.clone(),
        abbreviation: question.abbreviation.clone(),
        score: question.score,
        comment: question.comment,
        category_id: question.category.id,
    })
}

fn build_question(row: &QuestionRow, rows: &[QuestionRow], lookups: &Lookups) -> AppResult<Question> {
    let question_type = lookups.type_by_id(row.type_id).cloned().ok_or_else(|| {
        AppError::not_found(format!("Antworttyp {} (Frage {})", row.type_id, row.id))
    })?;

    let dependent_on = if row.dependent_on_id == NO_DEPENDENCY_ID {
        NO_DEPENDENCY.to_string()
    } else {
        rows.iter()
            .find(|r| r.id == row.dependent_on_id)
            .map(|r| r.abbreviation.clone())
            .unwrap_or_else(|| NO_DEPENDENCY.to_string())
    };

    Ok(Question {
        id: row.id,
        text: row.text.clone(),
        question_type,
        options: serde_json::from_str(&row.options_json)?,
        required: row.required,
        dependent_on,
        expected_answer: row.expected_answer.clone(),
        abbreviation: row.abbreviation.clone(),
        score: row.score,
        comment: row.comment,
        category: lookups.question_category(row.category_id),
    })
}

fn questionnaire_row(questionnaire: &Questionnaire) -> QuestionnaireRow {
    QuestionnaireRow {
        id: questionnaire.id,
        name: questionnaire.name.clone(),
        description: questionnaire.description.clone(),
        category_id: questionnaire.category.id,
        created: questionnaire.creation_date.clone(),
        last_changed: questionnaire.last_edited.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::FlakyStore;

    fn access() -> DataAccess {
        DataAccess::open_in_memory().unwrap()
    }

    fn question_type(access: &DataAccess, type_name: &str) -> QuestionType {
        access.lookups().type_by_name(type_name).unwrap().clone()
    }

    fn text_question(access: &DataAccess, abbreviation: &str) -> Question {
        Question::new(
            format!("Frage {}", abbreviation),
            question_type(access, "text"),
            abbreviation,
            access.default_question_category(),
        )
    }

    fn positions(access: &DataAccess, questionnaire_id: i64) -> Vec<i64> {
        let mut positions: Vec<i64> = access
            .store()
            .collections()
            .unwrap()
            .into_iter()
            .filter(|m| m.questionnaire_id == questionnaire_id)
            .map(|m| m.position)
            .collect();
        positions.sort();
        positions
    }

    #[test]
    fn test_example_scenario() {
        let access = access();

        let orthopedics = access
            .add_question_category(QuestionCategory::new("Orthopädie", ""))
            .unwrap();
        assert_eq!(orthopedics.id, 2);

        let pain = Question::new("Schmerzskala", question_type(&access, "radio"), "SCHM", orthopedics.clone())
            .with_options(["1", "2", "3"]);
        let pain = access.add_question(pain).unwrap();
        assert_eq!(pain.id, 1);

        let follow_up = Question::new(
            "Wo genau?",
            question_type(&access, "text"),
            "SCHM2",
            orthopedics,
        )
        .depending_on("SCHM", "2");
        let follow_up = access.add_question(follow_up).unwrap();
        assert_eq!(follow_up.id, 2);

        let fetched = access.question_by_id(2).unwrap().unwrap();
        assert_eq!(fetched.dependent_on, "SCHM");
        assert_eq!(fetched.expected_answer, "2");

        let mut intake = Questionnaire::named("Aufnahme", access.default_questionnaire_category());
        intake.questions = vec![pain.clone(), follow_up.clone()];
        let (saved, rejected) = access.add_questionnaire(intake).unwrap();
        assert_eq!(saved.id, 1);
        assert!(rejected.is_empty());

        let all = access.questionnaires().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Aufnahme");
        assert_eq!(all[0].questions, vec![pain, follow_up]);
    }

    #[test]
    fn test_question_roundtrip_keeps_fields() {
        let access = access();
        let mut question = Question::new(
            "Geburtsdatum",
            question_type(&access, "date"),
            "GEB",
            access.default_question_category(),
        );
        question.required = true;
        question.score = true;
        question.comment = true;

        let saved = access.add_question(question.clone()).unwrap();
        let fetched = access.question_by_id(saved.id).unwrap().unwrap();

        assert_eq!(fetched, Question { id: saved.id, ..question });
        // ID bleibt bei weiteren Abfragen stabil
        assert_eq!(access.questions().unwrap()[0].id, saved.id);
    }

    #[test]
    fn test_duplicate_abbreviation_rejected_directly() {
        let access = access();
        access.add_question(text_question(&access, "DUP")).unwrap();

        let err = access.add_question(text_question(&access, "DUP")).unwrap_err();
        assert!(err.is_constraint());
        assert_eq!(access.questions().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_abbreviation_collected_in_bulk_save() {
        let access = access();
        let stored = access.add_question(text_question(&access, "A")).unwrap();

        let mut questionnaire = Questionnaire::named("Bulk", access.default_questionnaire_category());
        questionnaire.questions = vec![
            stored.clone(),
            text_question(&access, "A"),
            text_question(&access, "B"),
            text_question(&access, "B"),
        ];

        let (saved, rejected) = access.add_questionnaire(questionnaire).unwrap();

        assert_eq!(saved.abbreviations(), vec!["A", "B"]);
        assert_eq!(rejected.len(), 2);
        assert_eq!(positions(&access, saved.id), vec![1, 2]);
        // Die gespeicherte Frage "A" wurde nicht überschrieben
        assert_eq!(access.question_by_id(stored.id).unwrap().unwrap(), stored);
    }

    #[test]
    fn test_persisted_question_with_foreign_abbreviation_rejected() {
        let access = access();
        access.add_question(text_question(&access, "X")).unwrap();
        let mut renamed = access.add_question(text_question(&access, "Y")).unwrap();
        renamed.abbreviation = "X".to_string();

        let mut questionnaire = Questionnaire::named("Konflikt", access.default_questionnaire_category());
        questionnaire.questions = vec![renamed];

        let (saved, rejected) = access.add_questionnaire(questionnaire).unwrap();
        assert!(saved.questions.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_deleted_question_is_rejected() {
        let access = access();
        let kept = access.add_question(text_question(&access, "A")).unwrap();
        let deleted = access.add_question(text_question(&access, "B")).unwrap();
        assert!(access.remove_question(&deleted));

        let mut questionnaire = Questionnaire::named("Veraltet", access.default_questionnaire_category());
        questionnaire.questions = vec![kept.clone(), deleted.clone()];
        let (saved, rejected) = access.add_questionnaire(questionnaire).unwrap();

        assert_eq!(saved.questions, vec![kept]);
        assert_eq!(rejected, vec![deleted]);
        let fetched = access.questionnaire_by_id(saved.id).unwrap().unwrap();
        assert_eq!(fetched.questions.len(), 2 - rejected.len());
        assert_eq!(positions(&access, saved.id), vec![1]);
    }

    #[test]
    fn test_default_category_is_protected() {
        let access = access();

        let mut renamed = access.default_question_category();
        renamed.category = "Sonstiges".to_string();
        assert!(matches!(
            access.edit_question_category(&renamed),
            Err(AppError::ProtectedCategory(1))
        ));
        assert!(matches!(
            access.remove_question_category(&access.default_question_category()),
            Err(AppError::ProtectedCategory(1))
        ));

        let mut renamed = access.default_questionnaire_category();
        renamed.category = "Sonstiges".to_string();
        assert!(access.edit_questionnaire_category(&renamed).is_err());
        assert!(access
            .remove_questionnaire_category(&access.default_questionnaire_category())
            .is_err());

        assert_eq!(access.default_question_category().category, "Allgemein");
        assert_eq!(access.default_questionnaire_category().category, "Allgemein");

        // Beschreibung darf sich ändern
        let mut described = access.default_question_category();
        described.description = "Alles ohne eigene Kategorie".to_string();
        access.edit_question_category(&described).unwrap();
        assert_eq!(access.default_question_category(), described);
    }

    #[test]
    fn test_category_crud_refreshes_lookups() {
        let access = access();
        let events = access.subscribe();

        let category = access
            .add_questionnaire_category(QuestionnaireCategory::new("Nachsorge", "Kontrolltermine"))
            .unwrap();
        assert_eq!(access.questionnaire_categories().len(), 2);

        let renamed = QuestionnaireCategory {
            category: "Nachkontrolle".to_string(),
            ..category.clone()
        };
        access.edit_questionnaire_category(&renamed).unwrap();
        assert!(access
            .lookups()
            .questionnaire_category_by_name("Nachkontrolle")
            .is_some());

        assert!(access.remove_questionnaire_category(&renamed).unwrap());
        assert_eq!(access.questionnaire_categories().len(), 1);
        // Zweites Löschen scheitert in der Datenbank
        assert!(!access.remove_questionnaire_category(&renamed).unwrap());

        let received: Vec<ChangeEvent> = events.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(received
            .iter()
            .all(|e| *e == ChangeEvent::CategoriesChanged(CategoryKind::Questionnaire)));
    }

    #[test]
    fn test_edit_questionnaire_keeps_supplied_order() {
        let access = access();
        let mut questionnaire = Questionnaire::named("Reihenfolge", access.default_questionnaire_category());
        questionnaire.questions = ["A", "B", "C"]
            .iter()
            .map(|a| text_question(&access, a))
            .collect();
        let (mut saved, _) = access.add_questionnaire(questionnaire).unwrap();

        saved.questions.reverse();
        saved.questions.push(text_question(&access, "D"));
        let (edited, rejected) = access.edit_questionnaire(saved, false).unwrap();
        assert!(rejected.is_empty());

        let fetched = access.questionnaire_by_id(edited.id).unwrap().unwrap();
        assert_eq!(fetched.abbreviations(), vec!["C", "B", "A", "D"]);
        assert_eq!(fetched.questions, edited.questions);
        assert_eq!(positions(&access, edited.id), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_positions_stay_dense() {
        let access = access();
        let mut questionnaire = Questionnaire::named("Dicht", access.default_questionnaire_category());
        questionnaire.questions = ["A", "B", "C", "D"]
            .iter()
            .map(|a| text_question(&access, a))
            .collect();
        let (mut saved, _) = access.add_questionnaire(questionnaire).unwrap();
        assert_eq!(positions(&access, saved.id), vec![1, 2, 3, 4]);

        // Mittlere Frage entfernen, Dublette anhängen
        saved.questions.remove(1);
        saved.questions.push(text_question(&access, "A"));
        let (saved, rejected) = access.edit_questionnaire(saved, false).unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(positions(&access, saved.id), vec![1, 2, 3]);

        let (saved, _) = access.edit_questionnaire(saved, true).unwrap();
        assert_eq!(positions(&access, saved.id), vec![1, 2, 3]);
    }

    #[test]
    fn test_purge_removes_only_exclusive_questions() {
        let access = access();
        let shared = access.add_question(text_question(&access, "SHARED")).unwrap();

        let mut first = Questionnaire::named("Erster", access.default_questionnaire_category());
        first.questions = vec![shared.clone(), text_question(&access, "ONLY")];
        let (first, _) = access.add_questionnaire(first).unwrap();
        let only = first.questions[1].clone();

        let mut second = Questionnaire::named("Zweiter", access.default_questionnaire_category());
        second.questions = vec![shared.clone()];
        let (second, _) = access.add_questionnaire(second).unwrap();

        assert!(access.remove_questionnaire(&first, true));

        assert!(access.question_by_id(only.id).unwrap().is_none());
        assert!(access.question_by_id(shared.id).unwrap().is_some());
        let remaining = access.questionnaires().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert_eq!(remaining[0].questions, vec![shared]);
    }

    #[test]
    fn test_remove_without_purge_keeps_questions() {
        let access = access();
        let mut questionnaire = Questionnaire::named("Weg", access.default_questionnaire_category());
        questionnaire.questions = vec![text_question(&access, "BLEIBT")];
        let (saved, _) = access.add_questionnaire(questionnaire).unwrap();

        assert!(access.remove_questionnaire(&saved, false));

        assert_eq!(access.questions().unwrap().len(), 1);
        assert!(access.store().collections().unwrap().is_empty());
        assert!(!access.remove_questionnaire(&saved, false));
    }

    #[test]
    fn test_edit_purge_spares_questions_still_listed() {
        let access = access();
        let mut questionnaire = Questionnaire::named("Purge", access.default_questionnaire_category());
        questionnaire.questions = vec![text_question(&access, "KEEP"), text_question(&access, "DROP")];
        let (mut saved, _) = access.add_questionnaire(questionnaire).unwrap();
        let dropped = saved.questions.pop().unwrap();

        let (saved, _) = access.edit_questionnaire(saved, true).unwrap();

        assert_eq!(saved.abbreviations(), vec!["KEEP"]);
        assert!(access.question_by_id(dropped.id).unwrap().is_none());
        assert!(access.question_by_id(saved.questions[0].id).unwrap().is_some());
    }

    #[test]
    fn test_unresolved_dependency_fails() {
        let access = access();
        let orphan = text_question(&access, "KIND").depending_on("FEHLT", "ja");

        let err = access.add_question(orphan).unwrap_err();
        assert!(matches!(err, AppError::UnresolvedDependency(ref a) if a == "FEHLT"));
        assert!(access.questions().unwrap().is_empty());
    }

    #[test]
    fn test_new_questions_may_depend_on_earlier_new_ones() {
        let access = access();
        let parent = Question::new("Raucher?", question_type(&access, "radio"), "RAUCH", access.default_question_category())
            .with_options(["ja", "nein"]);
        let child = text_question(&access, "MENGE").depending_on("RAUCH", "ja");

        let mut questionnaire = Questionnaire::named("Anamnese", access.default_questionnaire_category());
        questionnaire.questions = vec![parent, child];
        let (saved, rejected) = access.add_questionnaire(questionnaire).unwrap();

        assert!(rejected.is_empty());
        let child = access.question_by_id(saved.questions[1].id).unwrap().unwrap();
        assert_eq!(child.dependent_on, "RAUCH");
        let parent = access.dependency_of(&child).unwrap().unwrap();
        assert_eq!(parent.abbreviation, "RAUCH");
        assert!(access.has_dependents(&parent).unwrap());
        assert!(!access.has_dependents(&child).unwrap());
    }

    #[test]
    fn test_required_override_is_per_questionnaire() {
        let access = access();
        let question = access.add_question(text_question(&access, "OPT")).unwrap();
        assert!(!question.required);

        let mut strict = Questionnaire::named("Streng", access.default_questionnaire_category());
        let mut required = question.clone();
        required.required = true;
        strict.questions = vec![required];
        access.add_questionnaire(strict).unwrap();

        let mut lax = Questionnaire::named("Locker", access.default_questionnaire_category());
        lax.questions = vec![question.clone()];
        access.add_questionnaire(lax).unwrap();

        let all = access.questionnaires().unwrap();
        assert!(all[0].questions[0].required);
        assert!(!all[1].questions[0].required);
        // Die Frage selbst bleibt unverändert
        assert!(!access.question_by_id(question.id).unwrap().unwrap().required);
    }

    #[test]
    fn test_remove_question_reports_failure() {
        let access = access();
        let saved = access.add_question(text_question(&access, "DEL")).unwrap();

        assert!(access.remove_question(&saved));
        assert!(!access.remove_question(&saved));
    }

    #[test]
    fn test_edit_question_updates_in_place() {
        let access = access();
        let mut saved = access.add_question(text_question(&access, "EDIT")).unwrap();
        saved.text = "Neuer Text".to_string();

        let edited = access.edit_question(saved.clone()).unwrap();

        assert_eq!(edited.id, saved.id);
        assert_eq!(access.question_by_id(saved.id).unwrap().unwrap().text, "Neuer Text");
        assert!(access.edit_question(text_question(&access, "NEU")).is_err());
    }

    #[test]
    fn test_find_questions_by_keyword_and_category() {
        let access = access();
        let cardio = access
            .add_question_category(QuestionCategory::new("Kardiologie", ""))
            .unwrap();
        access
            .add_question(Question::new("Haben Sie Brustschmerzen?", question_type(&access, "text"), "BS", cardio.clone()))
            .unwrap();
        access
            .add_question(Question::new("Haben Sie Rückenschmerzen?", question_type(&access, "text"), "RS", access.default_question_category()))
            .unwrap();

        assert_eq!(access.find_questions("SCHMERZEN", None).unwrap().len(), 2);
        let cardio_only = access.find_questions("schmerzen", Some(&cardio)).unwrap();
        assert_eq!(cardio_only.len(), 1);
        assert_eq!(cardio_only[0].abbreviation, "BS");
        assert_eq!(access.find_questions("", Some(&cardio)).unwrap().len(), 1);
        assert_eq!(access.find_questions("", None).unwrap().len(), 2);
    }

    #[test]
    fn test_save_questionnaire_dispatches_on_id() {
        let access = access();
        let mut questionnaire = Questionnaire::named("Speichern", access.default_questionnaire_category());
        questionnaire.questions = vec![text_question(&access, "S1")];

        let (saved, _) = access.save_questionnaire(questionnaire, false).unwrap();
        assert!(saved.is_persisted());

        let mut renamed = saved.clone();
        renamed.name = "Umbenannt".to_string();
        let (resaved, _) = access.save_questionnaire(renamed, false).unwrap();

        assert_eq!(resaved.id, saved.id);
        let all = access.questionnaires().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Umbenannt");
    }

    #[test]
    fn test_events_follow_mutations() {
        let access = access();
        let events = access.subscribe();

        let saved = access.add_question(text_question(&access, "EV")).unwrap();
        access.remove_question(&saved);

        assert_eq!(events.try_recv().unwrap(), ChangeEvent::QuestionSaved(saved.clone()));
        assert_eq!(events.try_recv().unwrap(), ChangeEvent::QuestionRemoved(saved.id));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_replica_converges_after_mutations() {
        let access = access();
        let replica = Arc::new(FlakyStore::new());
        let settings = ReplicationSettings {
            probe_interval_ms: 10,
            reconnect_interval_ms: 20,
        };
        access.connect_secondary(replica.clone(), &settings).unwrap();
        assert!(access.wait_for_replication(Duration::from_secs(5)));

        let category = access
            .add_question_category(QuestionCategory::new("Neurologie", ""))
            .unwrap();
        let mut questionnaire = Questionnaire::named("Sync", access.default_questionnaire_category());
        questionnaire.questions = vec![Question::new(
            "Kopfschmerzen?",
            question_type(&access, "text"),
            "KS",
            category,
        )];
        access.add_questionnaire(questionnaire).unwrap();
        assert!(access.wait_for_replication(Duration::from_secs(5)));

        for table in Table::ALL {
            assert_eq!(
                replica.inner().snapshot(*table).unwrap().sorted(),
                access.store().snapshot(*table).unwrap().sorted(),
                "{}",
                table
            );
        }

        let status = access.replication_status().unwrap();
        assert_eq!(status.backend, "flaky");
        assert!(status.connected);
        assert!(status.pending.is_empty());

        assert!(access.disconnect_secondary());
        assert!(access.replication_status().is_none());
        assert!(access.wait_for_replication(Duration::from_millis(1)));
    }
}
