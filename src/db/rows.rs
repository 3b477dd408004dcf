//! Tabellenzeilen, wie sie beide Datenbanken speichern.
//!
//! Die Zugriffsschicht übersetzt zwischen diesen Zeilen und den
//! Domänenobjekten; die Replikation kopiert sie unverändert.

use std::fmt;

use crate::models::CategoryKind;

/// Alle replizierten Tabellen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    QuestionTypes,
    QuestionCategories,
    QuestionnaireCategories,
    Questions,
    Questionnaires,
    Collections,
}

impl Table {
    pub const ALL: &'static [Self] = &[
        Self::QuestionTypes,
        Self::QuestionCategories,
        Self::QuestionnaireCategories,
        Self::Questions,
        Self::Questionnaires,
        Self::Collections,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::QuestionTypes => "question_types",
            Self::QuestionCategories => "question_categories",
            Self::QuestionnaireCategories => "questionnaire_categories",
            Self::Questions => "questions",
            Self::Questionnaires => "questionnaires",
            Self::Collections => "collections",
        }
    }

    pub fn for_categories(kind: CategoryKind) -> Self {
        match kind {
            CategoryKind::Question => Self::QuestionCategories,
            CategoryKind::Questionnaire => Self::QuestionnaireCategories,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionTypeRow {
    pub id: i64,
    pub type_name: String,
    pub display_name: String,
    pub allows_options: bool,
}

/// Zeile beider Kategorietabellen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRow {
    pub id: i64,
    pub text: String,
    pub type_id: i64,
    /// Antwortoptionen als JSON-Liste
    pub options_json: String,
    pub required: bool,
    /// ID der abhängigen Frage oder -1
    pub dependent_on_id: i64,
    pub expected_answer: String,
    pub abbreviation: String,
    pub score: bool,
    pub comment: bool,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionnaireRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category_id: i64,
    pub created: Option<String>,
    pub last_changed: Option<String>,
}

/// Mitgliedschaft einer Frage in einem Fragebogen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRow {
    pub question_id: i64,
    pub questionnaire_id: i64,
    /// 1-basierte, lückenlose Position innerhalb des Fragebogens
    pub position: i64,
    /// Fragebogenspezifische Pflichtangabe
    pub required: bool,
}

/// Vollständiger Inhalt einer Tabelle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRows {
    QuestionTypes(Vec<QuestionTypeRow>),
    QuestionCategories(Vec<CategoryRow>),
    QuestionnaireCategories(Vec<CategoryRow>),
    Questions(Vec<QuestionRow>),
    Questionnaires(Vec<QuestionnaireRow>),
    Collections(Vec<CollectionRow>),
}

impl TableRows {
    pub fn table(&self) -> Table {
        match self {
            Self::QuestionTypes(_) => Table::QuestionTypes,
            Self::QuestionCategories(_) => Table::QuestionCategories,
            Self::QuestionnaireCategories(_) => Table::QuestionnaireCategories,
            Self::Questions(_) => Table::Questions,
            Self::Questionnaires(_) => Table::Questionnaires,
            Self::Collections(_) => Table::Collections,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::QuestionTypes(rows) => rows.len(),
            Self::QuestionCategories(rows) | Self::QuestionnaireCategories(rows) => rows.len(),
            Self::Questions(rows) => rows.len(),
            Self::Questionnaires(rows) => rows.len(),
            Self::Collections(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zeilen in kanonischer Reihenfolge (nach Primärschlüssel), für Vergleiche
    #[cfg(test)]
    pub(crate) fn sorted(mut self) -> Self {
        match &mut self {
            Self::QuestionTypes(rows) => rows.sort_by_key(|r| r.id),
            Self::QuestionCategories(rows) | Self::QuestionnaireCategories(rows) => {
                rows.sort_by_key(|r| r.id)
            }
            Self::Questions(rows) => rows.sort_by_key(|r| r.id),
            Self::Questionnaires(rows) => rows.sort_by_key(|r| r.id),
            Self::Collections(rows) => rows.sort_by_key(|r| (r.questionnaire_id, r.question_id)),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_and_names() {
        assert_eq!(Table::ALL.len(), 6);
        assert_eq!(Table::Collections.to_string(), "collections");
        assert!(Table::QuestionTypes < Table::Collections);
        assert_eq!(
            Table::for_categories(CategoryKind::Questionnaire),
            Table::QuestionnaireCategories
        );
    }

    #[test]
    fn test_sorted_orders_collections_by_key() {
        let rows = TableRows::Collections(vec![
            CollectionRow { question_id: 2, questionnaire_id: 1, position: 2, required: false },
            CollectionRow { question_id: 5, questionnaire_id: 0, position: 1, required: true },
            CollectionRow { question_id: 1, questionnaire_id: 1, position: 1, required: false },
        ]);

        match rows.sorted() {
            TableRows::Collections(sorted) => {
                let keys: Vec<_> = sorted.iter().map(|r| (r.questionnaire_id, r.question_id)).collect();
                assert_eq!(keys, vec![(0, 5), (1, 1), (1, 2)]);
            }
            other => panic!("unerwartete Tabelle: {:?}", other.table()),
        }
    }
}
