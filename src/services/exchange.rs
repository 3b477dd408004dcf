//! Austauschformat für Fragebögen als JSON-Datei.
//!
//! ```json
//! {
//!   "question": [
//!     {
//!       "number": "1",
//!       "text": "...",
//!       "type": "radio",
//!       "options": { "ja": "ja", "nein": "nein" },
//!       "required": "true",
//!       ...
//!     }
//!   ]
//! }
//! ```
//!
//! Alle Werte sind Zeichenketten; Fragen ohne Optionen tragen `"none"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::cache::Lookups;
use crate::models::{Question, Questionnaire, NO_DEPENDENCY};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
struct ExchangeFile {
    question: Vec<ExchangeQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExchangeQuestion {
    number: String,
    text: String,
    #[serde(rename = "type")]
    question_type: String,
    options: Value,
    required: String,
    dependent_on: String,
    expected_answer: String,
    abbrv: String,
    score: String,
    comment: String,
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn parse_flag(value: &str) -> bool {
    value == "true"
}

impl ExchangeQuestion {
    fn from_question(number: usize, question: &Question) -> Self {
        let options = if question.options.is_empty() {
            Value::String(NO_DEPENDENCY.to_string())
        } else {
            let map: Map<String, Value> = question
                .options
                .iter()
                .map(|o| (o.clone(), Value::String(o.clone())))
                .collect();
            Value::Object(map)
        };

        Self {
            number: number.to_string(),
            text: question.text.clone(),
            question_type: question.question_type.type_name.clone(),
            options,
            required: flag(question.required),
            dependent_on: question.dependent_on.clone(),
            expected_answer: question.expected_answer.clone(),
            abbrv: question.abbreviation.clone(),
            score: flag(question.score),
            comment: flag(question.comment),
        }
    }

    fn options(&self) -> AppResult<Vec<String>> {
        match &self.options {
            Value::String(s) if s == NO_DEPENDENCY => Ok(Vec::new()),
            Value::Object(map) => map
                .values()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        AppError::validation(format!("Ungültige Option bei '{}'", self.abbrv))
                    })
                })
                .collect(),
            other => Err(AppError::validation(format!(
                "Ungültige Optionen bei '{}': {}",
                self.abbrv, other
            ))),
        }
    }

    fn into_question(self, lookups: &Lookups) -> AppResult<Question> {
        let question_type = lookups
            .type_by_name(&self.question_type)
            .cloned()
            .ok_or_else(|| {
                AppError::validation(format!("Unbekannter Antworttyp '{}'", self.question_type))
            })?;
        let options = self.options()?;

        let mut question = Question::new(
            self.text,
            question_type,
            self.abbrv,
            lookups.default_question_category(),
        )
        .with_options(options)
        .depending_on(self.dependent_on, self.expected_answer);
        question.required = parse_flag(&self.required);
        question.score = parse_flag(&self.score);
        question.comment = parse_flag(&self.comment);
        Ok(question)
    }
}

/// Fragebogen als JSON-Text (2 Leerzeichen Einrückung)
pub fn to_json_string(questionnaire: &Questionnaire) -> AppResult<String> {
    if questionnaire.questions.is_empty() {
        return Err(AppError::validation("Fragebogen enthält keine Fragen"));
    }

    let file = ExchangeFile {
        question: questionnaire
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| ExchangeQuestion::from_question(i + 1, q))
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

pub fn export_questionnaire(path: &Path, questionnaire: &Questionnaire) -> AppResult<()> {
    let json = to_json_string(questionnaire)?;
    fs::write(path, json)?;
    info!(
        "Fragebogen '{}' nach {} exportiert ({} Fragen)",
        questionnaire.name,
        path.display(),
        questionnaire.questions.len()
    );
    Ok(())
}

/// Lies einen Fragebogen aus JSON-Text. Fragen landen in der
/// Standardkategorie, der Fragebogen heißt `name`.
pub fn from_json_str(json: &str, name: &str, lookups: &Lookups) -> AppResult<Questionnaire> {
    let file: ExchangeFile = serde_json::from_str(json)?;

    let mut numbered = file
        .question
        .into_iter()
        .map(|q| -> AppResult<(usize, ExchangeQuestion)> {
            let number = q.number.trim().parse::<usize>().map_err(|_| {
                AppError::validation(format!("Ungültige Nummer '{}' bei '{}'", q.number, q.abbrv))
            })?;
            Ok((number, q))
        })
        .collect::<AppResult<Vec<(usize, ExchangeQuestion)>>>()?;
    numbered.sort_by_key(|(number, _)| *number);

    let mut questionnaire = Questionnaire::named(name, lookups.default_questionnaire_category());
    for (_, q) in numbered {
        questionnaire.questions.push(q.into_question(lookups)?);
    }
    debug!("{} Fragen eingelesen", questionnaire.questions.len());
    Ok(questionnaire)
}

/// Importiere eine Datei; der Dateiname ohne Endung wird zum Namen
pub fn import_questionnaire(path: &Path, lookups: &Lookups) -> AppResult<Questionnaire> {
    if !path.exists() {
        return Err(AppError::not_found(format!("Datei {}", path.display())));
    }
    let json = fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let questionnaire = from_json_str(&json, &name, lookups)?;
    info!(
        "Fragebogen '{}' aus {} importiert ({} Fragen)",
        questionnaire.name,
        path.display(),
        questionnaire.questions.len()
    );
    Ok(questionnaire)
}
