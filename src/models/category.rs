use serde::{Deserialize, Serialize};

/// Reservierte ID der Standardkategorie ("Allgemein")
pub const DEFAULT_CATEGORY_ID: i64 = 1;
pub const DEFAULT_CATEGORY_NAME: &str = "Allgemein";

/// Namensraum einer Kategorie. Fragen- und Fragebogenkategorien sind
/// strukturell gleich, liegen aber in getrennten Tabellen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryKind {
    Question,
    Questionnaire,
}

impl CategoryKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Question => "Fragenkategorie",
            Self::Questionnaire => "Fragebogenkategorie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCategory {
    pub id: i64,
    pub category: String,
    pub description: String,
}

impl QuestionCategory {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: -1,
            category: category.into(),
            description: description.into(),
        }
    }

    pub fn default_category() -> Self {
        Self {
            id: DEFAULT_CATEGORY_ID,
            category: DEFAULT_CATEGORY_NAME.to_string(),
            description: String::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_CATEGORY_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireCategory {
    pub id: i64,
    pub category: String,
    pub description: String,
}

impl QuestionnaireCategory {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: -1,
            category: category.into(),
            description: description.into(),
        }
    }

    pub fn default_category() -> Self {
        Self {
            id: DEFAULT_CATEGORY_ID,
            category: DEFAULT_CATEGORY_NAME.to_string(),
            description: String::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_CATEGORY_ID
    }
}
