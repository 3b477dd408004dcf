use chrono::{Local, NaiveDateTime};

/// Zeitstempelformat beider Datenbanken ("2024-01-15 08:30:00")
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Aktueller lokaler Zeitstempel im Datenbankformat
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse einen Zeitstempel aus der Datenbank
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

/// Formatiere einen Zeitstempel für die Anzeige (TT.MM.JJJJ)
pub fn display_date(timestamp: Option<&str>) -> String {
    timestamp
        .and_then(parse_timestamp)
        .map(|dt| dt.format("%d.%m.%Y").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_parses() {
        assert!(parse_timestamp(&now_timestamp()).is_some());
    }

    #[test]
    fn test_display_date() {
        assert_eq!(display_date(Some("2024-01-15 08:30:00")), "15.01.2024");
        assert_eq!(display_date(Some("kaputt")), "");
        assert_eq!(display_date(None), "");
    }
}
