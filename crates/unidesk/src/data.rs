use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::db;
use crate::types::{CalendarEvent, EventDraft};

/// Outcome of importing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub read: usize,
    pub skipped: usize,
    pub inserted: usize,
}

/// Read a JSON array of events. Entries that fail validation are skipped with a warning.
pub fn load_events_file(path: &Path) -> Result<(Vec<CalendarEvent>, usize)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let drafts: Vec<EventDraft> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse events JSON in {}", path.display()))?;

    let mut events = Vec::with_capacity(drafts.len());
    let mut skipped = 0;
    for (index, draft) in drafts.into_iter().enumerate() {
        match draft.validate() {
            Ok(fields) => events.push(fields.into_event()),
            Err(e) => {
                warn!(index, error = %e, "Skipping invalid event");
                skipped += 1;
            }
        }
    }

    debug!(count = events.len(), skipped, "Loaded events file");
    Ok((events, skipped))
}

/// Load a JSON events file into the store, skipping duplicates
pub fn import_file(conn: &Connection, path: &Path) -> Result<ImportSummary> {
    let (events, skipped) = load_events_file(path)?;
    let inserted = db::import_events(conn, &events)?;

    info!(
        file = %path.display(),
        read = events.len(),
        inserted,
        "Events imported"
    );

    Ok(ImportSummary {
        read: events.len(),
        skipped,
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use tempfile::TempDir;

    const EVENTS_JSON: &str = r#"[
        {"title": "Algebra midterm", "type": "exam", "start_date": "2024-02-15T09:00", "department": "Mathematics"},
        {"title": "Spring break", "event_type": "holiday", "start_date": "2024-03-25"},
        {"title": "", "type": "exam", "start_date": "2024-02-16"},
        {"title": "Mystery", "type": "party", "start_date": "2024-02-16"},
        {"title": "Algebra midterm", "type": "exam", "start_date": "2024-02-15 09:00:00"}
    ]"#;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_events_file_skips_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "events.json", EVENTS_JSON);

        let (events, skipped) = load_events_file(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(skipped, 2);
        assert_eq!(events[0].event_type, EventType::Exam);
        assert_eq!(events[0].department.as_deref(), Some("Mathematics"));
        assert_eq!(events[1].event_type, EventType::Holiday);
    }

    #[test]
    fn test_load_events_file_missing() {
        let result = load_events_file(Path::new("/nonexistent/events.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_events_file_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "events.json", "not valid json");
        assert!(load_events_file(&path).is_err());
    }

    #[test]
    fn test_import_file_deduplicates() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(&temp_dir, "events.json", EVENTS_JSON);
        let conn = db::init_db(&temp_dir.path().join("test.db")).unwrap();

        let summary = import_file(&conn, &path).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                read: 3,
                skipped: 2,
                inserted: 2
            }
        );

        // Importing the same file again adds nothing
        let summary = import_file(&conn, &path).unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(db::count_events(&conn).unwrap(), 2);
    }
}
