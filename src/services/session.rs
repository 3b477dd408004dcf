//! Wiederherstellungspunkt (`session.lock`).
//!
//! Existiert die Datei beim Start, wurde die letzte Sitzung nicht sauber
//! beendet. Der Editor schreibt nach jeder strukturellen Änderung einen
//! Schnappschuss des aktiven Fragebogens hinein.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::cache::Lookups;
use crate::models::Questionnaire;
use crate::utils::error::AppResult;

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Lege die Datei an. `true`, wenn bereits eine offene Sitzung vorlag;
    /// die Datei bleibt dann unverändert.
    pub fn create(&self) -> AppResult<bool> {
        if self.exists() {
            info!("Offene Sitzung gefunden: {}", self.path.display());
            return Ok(true);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::File::create(&self.path)?;
        debug!("Sitzungsdatei angelegt: {}", self.path.display());
        Ok(false)
    }

    pub fn write(&self, questionnaire: &Questionnaire) -> AppResult<()> {
        let json = serde_json::to_string_pretty(questionnaire)?;
        fs::write(&self.path, json)?;
        debug!("Sitzung gesichert ({} Fragen)", questionnaire.questions.len());
        Ok(())
    }

    /// Lies den letzten Schnappschuss. Leere oder beschädigte Dateien
    /// werden verworfen und neu angelegt.
    pub fn read(&self) -> AppResult<Option<Questionnaire>> {
        if !self.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            debug!("Sitzungsdatei ist leer");
            return Ok(None);
        }

        match serde_json::from_str(&content) {
            Ok(questionnaire) => Ok(Some(questionnaire)),
            Err(e) => {
                warn!("Sitzungsdatei unlesbar, wird verworfen: {}", e);
                fs::remove_file(&self.path)?;
                self.create()?;
                Ok(None)
            }
        }
    }

    /// Entferne die Datei beim sauberen Beenden. `false`, wenn keine da war.
    pub fn remove(&self) -> AppResult<bool> {
        if !self.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        debug!("Sitzungsdatei entfernt");
        Ok(true)
    }

    /// Wie [`read`](Self::read), bindet Antworttypen und Kategorien aber an
    /// die aktuellen Nachschlagetabellen. Fragen mit unbekanntem Typ
    /// fallen heraus.
    pub fn recover(&self, lookups: &Lookups) -> AppResult<Option<Questionnaire>> {
        let mut questionnaire = match self.read()? {
            Some(q) => q,
            None => return Ok(None),
        };

        questionnaire.category = lookups.questionnaire_category(questionnaire.category.id);
        let mut recovered = Vec::with_capacity(questionnaire.questions.len());
        for mut question in questionnaire.questions {
            match lookups.type_by_name(&question.question_type.type_name) {
                Some(question_type) => {
                    question.question_type = question_type.clone();
                    question.category = lookups.question_category(question.category.id);
                    recovered.push(question);
                }
                None => warn!(
                    "Frage '{}' verworfen: Antworttyp '{}' unbekannt",
                    question.abbreviation, question.question_type.type_name
                ),
            }
        }
        questionnaire.questions = recovered;

        info!(
            "Sitzung wiederhergestellt: '{}' ({} Fragen)",
            questionnaire.name,
            questionnaire.questions.len()
        );
        Ok(Some(questionnaire))
    }
}
