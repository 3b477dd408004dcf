use std::path::PathBuf;

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("de", "mhf", "MHF")
}

/// Hole den Pfad der lokalen Datenbank
pub fn get_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("mhf.db"))
        .unwrap_or_else(|| PathBuf::from("data/mhf.db"))
}

/// Hole den Pfad der Konfigurationsdatei
pub fn get_config_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config/config.toml"))
}

/// Hole den Pfad der Sitzungsdatei (Wiederherstellungspunkt)
pub fn get_session_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("session.lock"))
        .unwrap_or_else(|| PathBuf::from("session.lock"))
}

/// Erzeuge einen sicheren Dateinamen aus einem Fragebogennamen
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
