use serde::{Deserialize, Serialize};

use super::{QuestionCategory, QuestionType};
use crate::utils::error::{AppError, AppResult};

/// ID einer noch nicht gespeicherten Frage bzw. eines Fragebogens
pub const UNSAVED_ID: i64 = -1;

/// Platzhalter für "keine Abhängigkeit" / "keine erwartete Antwort"
pub const NO_DEPENDENCY: &str = "none";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub required: bool,
    /// Kürzel der Frage, von deren Antwort diese Frage abhängt
    pub dependent_on: String,
    /// Antwort der abhängigen Frage, bei der diese Frage angezeigt wird
    pub expected_answer: String,
    pub abbreviation: String,
    pub score: bool,
    pub comment: bool,
    pub category: QuestionCategory,
}

impl Question {
    pub fn new(
        text: impl Into<String>,
        question_type: QuestionType,
        abbreviation: impl Into<String>,
        category: QuestionCategory,
    ) -> Self {
        Self {
            id: UNSAVED_ID,
            text: text.into(),
            question_type,
            options: Vec::new(),
            required: false,
            dependent_on: NO_DEPENDENCY.to_string(),
            expected_answer: NO_DEPENDENCY.to_string(),
            abbreviation: abbreviation.into(),
            score: false,
            comment: false,
            category,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn depending_on(mut self, abbreviation: impl Into<String>, expected_answer: impl Into<String>) -> Self {
        self.dependent_on = abbreviation.into();
        self.expected_answer = expected_answer.into();
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn has_dependency(&self) -> bool {
        self.dependent_on != NO_DEPENDENCY
    }

    /// Prüft die Invarianten vor dem Speichern
    pub fn validate(&self) -> AppResult<()> {
        if self.abbreviation.trim().is_empty() {
            return Err(AppError::validation("Kürzel darf nicht leer sein"));
        }
        if !self.options.is_empty() && !self.question_type.allows_options {
            return Err(AppError::validation(format!(
                "Typ '{}' erlaubt keine Antwortoptionen",
                self.question_type.type_name
            )));
        }
        Ok(())
    }
}
