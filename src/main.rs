//! MHF Desktop - Kommandozeile
//!
//! Verwaltungsbefehle für die Fragebogen-Datenbank.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use mhf_desktop::models::{AppConfig, Questionnaire};
use mhf_desktop::services::{exchange, DataAccess, QuestionnaireEditor, SessionFile};
use mhf_desktop::utils::date::display_date;
use mhf_desktop::utils::path::{get_config_path, get_session_path, sanitize_filename};

#[derive(Parser, Debug)]
#[command(author, version, about = "Datenhaltung für medizinische Fragebögen")]
struct Cli {
    /// Pfad zur Konfigurationsdatei
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Überblick über Datenbank, Sitzung und Replikation
    Status,

    /// Fragebogen als JSON-Datei exportieren
    Export {
        /// ID des Fragebogens
        #[arg(long)]
        id: i64,

        /// Zieldatei, sonst "<Name>.json"
        file: Option<PathBuf>,
    },

    /// Fragebogen aus einer JSON-Datei einlesen und speichern
    Import { file: PathBuf },

    /// Netzwerkdatenbank vollständig abgleichen
    Sync {
        /// Maximale Wartezeit in Sekunden
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(get_config_path);
    let config = AppConfig::load_or_create(&config_path)
        .with_context(|| format!("Konfiguration {} nicht lesbar", config_path.display()))?;

    // Logging initialisieren
    tracing_subscriber::fmt()
        .with_max_level(config.logging.tracing_level())
        .with_target(false)
        .init();

    info!("Starte MHF v{}", env!("CARGO_PKG_VERSION"));

    let access = DataAccess::open(&config.database.local_database).with_context(|| {
        format!(
            "Lokale Datenbank {} nicht erreichbar",
            config.database.local_database.display()
        )
    })?;

    match cli.command {
        Command::Status => status(&access, &config),
        Command::Export { id, file } => export(&access, id, file),
        Command::Import { file } => import(&access, &config, &file),
        Command::Sync { timeout } => sync(&access, &config, Duration::from_secs(timeout)),
    }
}

/// Verbinde die konfigurierte Netzwerkdatenbank. Fehler sind nie fatal.
fn connect_remote(access: &DataAccess, config: &AppConfig) -> bool {
    let Some(remote) = config.remote() else {
        return false;
    };
    match access.connect_remote(remote, &config.replication) {
        Ok(()) => {
            info!("Netzwerkdatenbank {} verbunden", remote.display());
            true
        }
        Err(e) => {
            warn!("Netzwerkdatenbank nicht verfügbar, arbeite lokal weiter: {}", e);
            false
        }
    }
}

fn status(access: &DataAccess, config: &AppConfig) -> Result<()> {
    let questionnaires = access.questionnaires()?;
    println!("Lokale Datenbank: {}", config.database.local_database.display());
    println!("Fragen:           {}", access.questions()?.len());
    println!("Fragebögen:       {}", questionnaires.len());
    println!(
        "Kategorien:       {} Fragen, {} Fragebögen",
        access.question_categories().len(),
        access.questionnaire_categories().len()
    );

    for questionnaire in &questionnaires {
        println!(
            "  [{}] {} ({} Fragen, {}, geändert {})",
            questionnaire.id,
            questionnaire.name,
            questionnaire.questions.len(),
            questionnaire.category.category,
            display_date(questionnaire.last_edited.as_deref())
        );
    }

    let session = SessionFile::new(get_session_path());
    match session.recover(&access.lookups())? {
        Some(pending) => println!("Offene Sitzung:   '{}'", pending.name),
        None if session.exists() => println!("Offene Sitzung:   leer"),
        None => println!("Offene Sitzung:   keine"),
    }

    if connect_remote(access, config) {
        if let Some(status) = access.replication_status() {
            println!(
                "Replikation:      {} ({}), {} Tabellen ausstehend",
                status.backend,
                if status.connected { "verbunden" } else { "getrennt" },
                status.pending.len()
            );
        }
    } else {
        println!("Replikation:      aus");
    }
    Ok(())
}

fn export(access: &DataAccess, id: i64, file: Option<PathBuf>) -> Result<()> {
    let Some(questionnaire) = access.questionnaire_by_id(id)? else {
        bail!("Fragebogen {} existiert nicht", id);
    };
    let path = file
        .unwrap_or_else(|| PathBuf::from(format!("{}.json", sanitize_filename(&questionnaire.name))));

    exchange::export_questionnaire(&path, &questionnaire)
        .with_context(|| format!("Export nach {} fehlgeschlagen", path.display()))?;
    println!("Exportiert: {}", path.display());
    Ok(())
}

fn import(access: &DataAccess, config: &AppConfig, file: &Path) -> Result<()> {
    let replicating = connect_remote(access, config);

    let mut editor = QuestionnaireEditor::new(Questionnaire::new(
        access.default_questionnaire_category(),
    ));
    let session = SessionFile::new(get_session_path());
    let use_session = config.general.use_recovery_points && !session.create()?;
    if use_session {
        editor = editor.with_session(session.clone());
    }

    editor
        .import(file, &access.lookups())
        .with_context(|| format!("Import aus {} fehlgeschlagen", file.display()))?;
    let rejected = editor.save(access, false)?;

    let saved = editor.questionnaire();
    println!(
        "Fragebogen '{}' gespeichert (ID {}, {} Fragen)",
        saved.name,
        saved.id,
        saved.questions.len()
    );
    for question in &rejected {
        println!("  abgelehnt: {} ({})", question.abbreviation, question.text);
    }

    if use_session {
        session.remove()?;
    }
    if replicating && !access.wait_for_replication(Duration::from_secs(30)) {
        warn!("Replikation nicht abgeschlossen, wird beim nächsten Start nachgeholt");
    }
    Ok(())
}

fn sync(access: &DataAccess, config: &AppConfig, timeout: Duration) -> Result<()> {
    if config.remote().is_none() {
        bail!("Keine Netzwerkdatenbank konfiguriert (database.use_network_database)");
    }
    if !connect_remote(access, config) {
        return Ok(());
    }

    if access.wait_for_replication(timeout) {
        println!("Abgleich abgeschlossen");
    } else {
        let pending = access
            .replication_status()
            .map(|s| s.pending)
            .unwrap_or_default();
        warn!("Abgleich nach {:?} unvollständig: {:?}", timeout, pending);
    }
    Ok(())
}
