//! Arbeitskopie des aktiven Fragebogens.
//!
//! Der Editor verändert nur seine Kopie; erst [`QuestionnaireEditor::save`]
//! schreibt über die Fassade. Jede strukturelle Änderung landet als
//! Schnappschuss in der Sitzungsdatei, sofern eine gesetzt ist.

use std::path::Path;
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use super::cache::Lookups;
use super::data_access::DataAccess;
use super::events::ChangeEvent;
use super::exchange;
use super::session::SessionFile;
use crate::models::{Question, Questionnaire, QuestionnaireCategory, UNSAVED_ID};
use crate::utils::error::AppResult;

pub struct QuestionnaireEditor {
    questionnaire: Questionnaire,
    session: Option<SessionFile>,
    events: Option<Receiver<ChangeEvent>>,
}

impl QuestionnaireEditor {
    pub fn new(questionnaire: Questionnaire) -> Self {
        Self {
            questionnaire,
            session: None,
            events: None,
        }
    }

    pub fn with_session(mut self, session: SessionFile) -> Self {
        self.session = Some(session);
        self
    }

    /// Änderungen der Fassade verfolgen, siehe [`apply_changes`](Self::apply_changes)
    pub fn subscribe_to(&mut self, access: &DataAccess) {
        self.events = Some(access.subscribe());
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    pub fn set_questionnaire(&mut self, questionnaire: Questionnaire) {
        self.questionnaire = questionnaire;
        self.changed();
    }

    fn changed(&self) {
        if let Some(session) = &self.session {
            if let Err(e) = session.write(&self.questionnaire) {
                warn!("Sitzung konnte nicht gesichert werden: {}", e);
            }
        }
    }

    /// Frage anhängen. `false`, wenn ID oder Kürzel schon vorkommen.
    pub fn add_question(&mut self, question: Question) -> bool {
        let duplicate = self.questionnaire.questions.iter().any(|q| {
            (question.is_persisted() && q.id == question.id) || q.abbreviation == question.abbreviation
        });
        if duplicate {
            debug!("Frage '{}' ist bereits enthalten", question.abbreviation);
            return false;
        }
        self.questionnaire.questions.push(question);
        self.changed();
        true
    }

    pub fn remove_question(&mut self, abbreviation: &str) -> bool {
        let before = self.questionnaire.questions.len();
        self.questionnaire
            .questions
            .retain(|q| q.abbreviation != abbreviation);
        let removed = self.questionnaire.questions.len() != before;
        if removed {
            self.changed();
        }
        removed
    }

    /// Tausche die Frage `abbreviation` mit der Frage an `index`
    pub fn swap_position(&mut self, abbreviation: &str, index: usize) -> bool {
        let Some(current) = self.questionnaire.position_of(abbreviation) else {
            return false;
        };
        if index >= self.questionnaire.questions.len() {
            return false;
        }
        self.questionnaire.questions.swap(current, index);
        self.changed();
        true
    }

    /// Ersetze die Frage an `index`. Das Kürzel darf nicht mit einer
    /// anderen Frage kollidieren.
    pub fn replace_question(&mut self, index: usize, question: Question) -> bool {
        if index >= self.questionnaire.questions.len() {
            return false;
        }
        let collides = self
            .questionnaire
            .questions
            .iter()
            .enumerate()
            .any(|(i, q)| i != index && q.abbreviation == question.abbreviation);
        if collides {
            return false;
        }
        self.questionnaire.questions[index] = question;
        self.changed();
        true
    }

    /// Pflichtfeld nur für diesen Fragebogen umschalten; liefert den neuen Wert
    pub fn toggle_required(&mut self, abbreviation: &str) -> Option<bool> {
        let question = self
            .questionnaire
            .questions
            .iter_mut()
            .find(|q| q.abbreviation == abbreviation)?;
        question.required = !question.required;
        let required = question.required;
        self.changed();
        Some(required)
    }

    pub fn set_category(&mut self, category: QuestionnaireCategory) {
        self.questionnaire.category = category;
        self.changed();
    }

    /// Fragen dieses Fragebogens, die von `abbreviation` abhängen
    pub fn dependents_of(&self, abbreviation: &str) -> Vec<&Question> {
        self.questionnaire
            .questions
            .iter()
            .filter(|q| q.dependent_on == abbreviation)
            .collect()
    }

    /// Übernimm gemeldete Änderungen: gespeicherte Fragen werden ersetzt
    /// (Pflichtfeld bleibt), gelöschte entfernt. Liefert die Anzahl der
    /// betroffenen Fragen.
    pub fn apply_changes(&mut self) -> usize {
        let Some(events) = &self.events else {
            return 0;
        };
        let pending: Vec<ChangeEvent> = events.try_iter().collect();

        let mut touched = 0;
        for event in pending {
            match event {
                ChangeEvent::QuestionSaved(saved) => {
                    if let Some(entry) = self
                        .questionnaire
                        .questions
                        .iter_mut()
                        .find(|q| q.is_persisted() && q.id == saved.id)
                    {
                        let required = entry.required;
                        *entry = saved;
                        entry.required = required;
                        touched += 1;
                    }
                }
                ChangeEvent::QuestionRemoved(id) => {
                    let before = self.questionnaire.questions.len();
                    self.questionnaire.questions.retain(|q| q.id != id);
                    touched += before - self.questionnaire.questions.len();
                }
                ChangeEvent::QuestionnaireRemoved(id) if id == self.questionnaire.id => {
                    info!("Aktiver Fragebogen wurde gelöscht, ID verworfen");
                    self.questionnaire.id = UNSAVED_ID;
                }
                _ => {}
            }
        }

        if touched > 0 {
            self.changed();
        }
        touched
    }

    /// Speichere über die Fassade; liefert die abgelehnten Fragen
    pub fn save(&mut self, access: &DataAccess, purge: bool) -> AppResult<Vec<Question>> {
        let (saved, rejected) = access.save_questionnaire(self.questionnaire.clone(), purge)?;
        self.questionnaire = saved;
        // Eigene Meldungen bringen nichts Neues
        if let Some(events) = &self.events {
            events.try_iter().for_each(drop);
        }
        self.changed();
        Ok(rejected)
    }

    pub fn export(&self, path: &Path) -> AppResult<()> {
        exchange::export_questionnaire(path, &self.questionnaire)
    }

    /// Ersetze die Arbeitskopie durch einen importierten Fragebogen
    pub fn import(&mut self, path: &Path, lookups: &Lookups) -> AppResult<()> {
        let imported = exchange::import_questionnaire(path, lookups).map_err(|e| {
            warn!("Import aus {} fehlgeschlagen: {}", path.display(), e);
            e
        })?;
        self.set_questionnaire(imported);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn access() -> DataAccess {
        DataAccess::open_in_memory().unwrap()
    }

    fn question(access: &DataAccess, abbreviation: &str) -> Question {
        Question::new(
            format!("Frage {}", abbreviation),
            access.lookups().type_by_name("text").unwrap().clone(),
            abbreviation,
            access.default_question_category(),
        )
    }

    fn editor(access: &DataAccess, abbreviations: &[&str]) -> QuestionnaireEditor {
        let mut questionnaire = Questionnaire::named("Entwurf", access.default_questionnaire_category());
        questionnaire.questions = abbreviations.iter().map(|a| question(access, a)).collect();
        QuestionnaireEditor::new(questionnaire)
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let access = access();
        let mut editor = editor(&access, &["A"]);

        assert!(!editor.add_question(question(&access, "A")));
        assert!(editor.add_question(question(&access, "B")));

        let stored = access.add_question(question(&access, "C")).unwrap();
        assert!(editor.add_question(stored.clone()));
        let mut same_id = stored;
        same_id.abbreviation = "C2".to_string();
        assert!(!editor.add_question(same_id));

        assert_eq!(editor.questionnaire().abbreviations(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_reorder_and_remove() {
        let access = access();
        let mut editor = editor(&access, &["A", "B", "C"]);

        assert!(editor.swap_position("C", 0));
        assert_eq!(editor.questionnaire().abbreviations(), vec!["C", "B", "A"]);
        assert!(!editor.swap_position("C", 3));
        assert!(!editor.swap_position("X", 0));

        assert!(editor.remove_question("B"));
        assert!(!editor.remove_question("B"));
        assert_eq!(editor.questionnaire().abbreviations(), vec!["C", "A"]);
    }

    #[test]
    fn test_replace_and_toggle() {
        let access = access();
        let mut editor = editor(&access, &["A", "B"]);

        assert!(!editor.replace_question(0, question(&access, "B")));
        assert!(editor.replace_question(0, question(&access, "Z")));
        assert!(!editor.replace_question(5, question(&access, "Y")));
        assert_eq!(editor.questionnaire().abbreviations(), vec!["Z", "B"]);

        assert_eq!(editor.toggle_required("B"), Some(true));
        assert_eq!(editor.toggle_required("B"), Some(false));
        assert_eq!(editor.toggle_required("X"), None);
    }

    #[test]
    fn test_dependents_of() {
        let access = access();
        let mut editor = editor(&access, &["A"]);
        editor.add_question(question(&access, "B").depending_on("A", "ja"));
        editor.add_question(question(&access, "C"));

        let dependents = editor.dependents_of("A");
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].abbreviation, "B");
    }

    #[test]
    fn test_changes_are_snapshotted() {
        let access = access();
        let dir = TempDir::new().unwrap();
        let session = SessionFile::new(dir.path().join("session.lock"));
        let mut editor = editor(&access, &["A"]).with_session(session.clone());

        editor.add_question(question(&access, "B"));
        assert_eq!(session.read().unwrap().unwrap().abbreviations(), vec!["A", "B"]);

        editor.swap_position("B", 0);
        assert_eq!(session.read().unwrap().unwrap().abbreviations(), vec!["B", "A"]);

        let category = access
            .add_questionnaire_category(QuestionnaireCategory::new("Nachsorge", ""))
            .unwrap();
        editor.set_category(category.clone());
        assert_eq!(session.read().unwrap().unwrap().category, category);
    }

    #[test]
    fn test_save_then_follow_external_changes() {
        let access = access();
        let mut editor = editor(&access, &["A", "B"]);
        editor.subscribe_to(&access);
        editor.toggle_required("A");

        let rejected = editor.save(&access, false).unwrap();
        assert!(rejected.is_empty());
        assert!(editor.questionnaire().is_persisted());
        assert_eq!(editor.apply_changes(), 0);

        let mut edited = editor.questionnaire().questions[0].clone();
        edited.text = "Neu formuliert".to_string();
        edited.required = false;
        access.edit_question(edited).unwrap();
        let removed = editor.questionnaire().questions[1].clone();
        access.remove_question(&removed);

        assert_eq!(editor.apply_changes(), 2);
        let questions = &editor.questionnaire().questions;
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Neu formuliert");
        assert!(questions[0].required);
    }

    #[test]
    fn test_removed_questionnaire_becomes_unsaved() {
        let access = access();
        let mut editor = editor(&access, &["A"]);
        editor.subscribe_to(&access);
        editor.save(&access, false).unwrap();

        let saved = editor.questionnaire().clone();
        assert!(access.remove_questionnaire(&saved, false));
        editor.apply_changes();

        assert!(!editor.questionnaire().is_persisted());
        assert_eq!(editor.questionnaire().abbreviations(), vec!["A"]);
    }

    #[test]
    fn test_export_and_import() {
        let access = access();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Knie.json");
        let source = editor(&access, &["A", "B"]);
        source.export(&path).unwrap();

        let mut target = editor(&access, &[]);
        target.import(&path, &access.lookups()).unwrap();

        assert_eq!(target.questionnaire().name, "Knie");
        assert_eq!(target.questionnaire().abbreviations(), vec!["A", "B"]);
        assert!(target.import(&dir.path().join("fehlt.json"), &access.lookups()).is_err());
    }
}
