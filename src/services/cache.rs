//! Nachschlagetabellen für Antworttypen und Kategorien.
//!
//! Die Fassade lädt sie beim Start und nach jeder Kategorieänderung neu;
//! Mitarbeiter bekommen einen `Arc<Lookups>` statt globaler Listen.

use crate::db::Store;
use crate::models::{
    CategoryKind, QuestionCategory, QuestionType, QuestionnaireCategory, DEFAULT_CATEGORY_ID,
};
use crate::utils::error::AppResult;

#[derive(Debug, Clone, Default)]
pub struct Lookups {
    types: Vec<QuestionType>,
    question_categories: Vec<QuestionCategory>,
    questionnaire_categories: Vec<QuestionnaireCategory>,
}

impl Lookups {
    pub fn load(store: &dyn Store) -> AppResult<Self> {
        let types = store
            .types()?
            .into_iter()
            .map(|r| QuestionType::new(r.id, r.type_name, r.display_name, r.allows_options))
            .collect();

        let question_categories = store
            .categories(CategoryKind::Question)?
            .into_iter()
            .map(|r| QuestionCategory {
                id: r.id,
                category: r.name,
                description: r.description,
            })
            .collect();

        let questionnaire_categories = store
            .categories(CategoryKind::Questionnaire)?
            .into_iter()
            .map(|r| QuestionnaireCategory {
                id: r.id,
                category: r.name,
                description: r.description,
            })
            .collect();

        Ok(Self {
            types,
            question_categories,
            questionnaire_categories,
        })
    }

    pub fn types(&self) -> &[QuestionType] {
        &self.types
    }

    pub fn type_by_id(&self, id: i64) -> Option<&QuestionType> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn type_by_name(&self, type_name: &str) -> Option<&QuestionType> {
        self.types.iter().find(|t| t.type_name == type_name)
    }

    pub fn question_categories(&self) -> &[QuestionCategory] {
        &self.question_categories
    }

    pub fn questionnaire_categories(&self) -> &[QuestionnaireCategory] {
        &self.questionnaire_categories
    }

    /// Kategorie nach ID; unbekannte IDs fallen auf die Standardkategorie zurück
    pub fn question_category(&self, id: i64) -> QuestionCategory {
        self.question_categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .unwrap_or_else(|| self.default_question_category())
    }

    pub fn questionnaire_category(&self, id: i64) -> QuestionnaireCategory {
        self.questionnaire_categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .unwrap_or_else(|| self.default_questionnaire_category())
    }

    pub fn question_category_by_name(&self, name: &str) -> Option<&QuestionCategory> {
        self.question_categories.iter().find(|c| c.category == name)
    }

    pub fn questionnaire_category_by_name(&self, name: &str) -> Option<&QuestionnaireCategory> {
        self.questionnaire_categories.iter().find(|c| c.category == name)
    }

    pub fn default_question_category(&self) -> QuestionCategory {
        self.question_categories
            .iter()
            .find(|c| c.id == DEFAULT_CATEGORY_ID)
            .cloned()
            .unwrap_or_else(QuestionCategory::default_category)
    }

    pub fn default_questionnaire_category(&self) -> QuestionnaireCategory {
        self.questionnaire_categories
            .iter()
            .find(|c| c.id == DEFAULT_CATEGORY_ID)
            .cloned()
            .unwrap_or_else(QuestionnaireCategory::default_category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;

    #[test]
    fn test_load_from_fresh_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        let lookups = Lookups::load(&store).unwrap();

        assert_eq!(lookups.types().len(), 7);
        assert_eq!(lookups.type_by_name("heading").unwrap().display_name, "Überschrift");
        assert!(lookups.type_by_name("slider").is_none());
        assert!(lookups.default_question_category().is_default());
        assert_eq!(lookups.default_questionnaire_category().category, "Allgemein");
    }

    #[test]
    fn test_unknown_category_falls_back_to_default() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .add_category(CategoryKind::Question, "Orthopädie", "")
            .unwrap();
        let lookups = Lookups::load(&store).unwrap();

        assert_eq!(lookups.question_category(2).category, "Orthopädie");
        assert_eq!(lookups.question_category(99).id, DEFAULT_CATEGORY_ID);
        assert_eq!(lookups.questionnaire_category(2).id, DEFAULT_CATEGORY_ID);
        assert_eq!(lookups.question_category_by_name("Orthopädie").unwrap().id, 2);
    }
}
