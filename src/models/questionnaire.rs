use serde::{Deserialize, Serialize};

use super::question::UNSAVED_ID;
use super::{Question, QuestionnaireCategory};
use crate::utils::date::now_timestamp;

/// Geordnete Sammlung von Fragen. Die Reihenfolge in `questions` ist die
/// Darstellungsreihenfolge und wird als Position je Mitgliedschaft gespeichert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub category: QuestionnaireCategory,
    pub creation_date: Option<String>,
    pub last_edited: Option<String>,
}

impl Questionnaire {
    /// Neuer, leerer Fragebogen ("NEU")
    pub fn new(category: QuestionnaireCategory) -> Self {
        let now = now_timestamp();
        Self {
            id: UNSAVED_ID,
            name: "NEU".to_string(),
            description: String::new(),
            questions: Vec::new(),
            category,
            creation_date: Some(now.clone()),
            last_edited: Some(now),
        }
    }

    pub fn named(name: impl Into<String>, category: QuestionnaireCategory) -> Self {
        Self {
            name: name.into(),
            ..Self::new(category)
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn contains_abbreviation(&self, abbreviation: &str) -> bool {
        self.questions.iter().any(|q| q.abbreviation == abbreviation)
    }

    pub fn position_of(&self, abbreviation: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.abbreviation == abbreviation)
    }

    pub fn abbreviations(&self) -> Vec<&str> {
        self.questions.iter().map(|q| q.abbreviation.as_str()).collect()
    }
}
