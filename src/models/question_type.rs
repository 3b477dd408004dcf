use serde::{Deserialize, Serialize};

/// Katalogeintrag für einen Antworttyp (z.B. "radio").
///
/// Die sieben Typen werden beim ersten Öffnen der Datenbank angelegt und
/// danach nie verändert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionType {
    pub id: i64,
    pub type_name: String,
    pub display_name: String,
    pub allows_options: bool,
}

impl QuestionType {
    pub fn new(id: i64, type_name: impl Into<String>, display_name: impl Into<String>, allows_options: bool) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            display_name: display_name.into(),
            allows_options,
        }
    }
}

/// Eingebaute Typen: (type_name, display_name, allows_options)
pub const BUILTIN_QUESTION_TYPES: &[(&str, &str, bool)] = &[
    ("radio", "Auswahl", true),
    ("select", "Dropdown", true),
    ("text", "Freitext", false),
    ("textarea", "Mehrzeiliger Freitext", false),
    ("number", "Zahl", false),
    ("date", "Datum", false),
    ("heading", "Überschrift", false),
];
