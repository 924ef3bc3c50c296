//! SQLite storage for calendar events
//!
//! This module handles:
//! - Database initialization and embedded migrations
//! - CRUD operations for calendar events
//! - The month query behind the calendar view, with type/department/search filters

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use tracing::{debug, info};

use crate::calendar;
use crate::types::{CalendarEvent, EventFields, EventType};

/// Migrations compiled into the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_calendar_events",
    include_str!("../db/migrations/001_calendar_events.sql"),
)];

const EVENT_COLUMNS: &str = "id, title, event_type, start_date, description, department, location, course_id, status, created_at, updated_at";

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Open the database at the given path, running any pending migrations
pub fn init_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let count = run_migrations(&conn)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }

    Ok(conn)
}

/// Apply embedded migrations not yet recorded in `schema_migrations`
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version TEXT PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )?;

    let mut applied = 0;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration: {}", version))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        event_type: row.get(2)?,
        start_date: row.get(3)?,
        description: row.get(4)?,
        department: row.get(5)?,
        location: row.get(6)?,
        course_id: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Optional narrowing of the month query. `None` means no filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub department: Option<String>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
}

/// All events starting within the month, ordered by start date then insertion order
pub fn list_events_for_month(
    conn: &Connection,
    year: i32,
    month: u32,
    filter: &EventFilter,
) -> Result<Vec<CalendarEvent>> {
    let (start, end) = calendar::month_bounds(year, month)?;

    let mut clauses = vec!["start_date >= ?", "start_date < ?"];
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(start), Box::new(end)];

    if let Some(event_type) = filter.event_type {
        clauses.push("event_type = ?");
        params_vec.push(Box::new(event_type));
    }
    if let Some(ref department) = filter.department {
        clauses.push("department = ?");
        params_vec.push(Box::new(department.clone()));
    }

    let sql = format!(
        "SELECT {} FROM calendar_events WHERE {} ORDER BY start_date ASC, rowid ASC",
        EVENT_COLUMNS,
        clauses.join(" AND ")
    );

    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let mut events = stmt
        .query_map(params_refs.as_slice(), event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    // Literal substring match, case folded for any script
    if let Some(ref search) = filter.search {
        let needle = search.to_lowercase();
        events.retain(|event| event.title.to_lowercase().contains(&needle));
    }

    debug!(year, month, count = events.len(), "Loaded month events");
    Ok(events)
}

/// Distinct departments that have events, for the filter dropdown
pub fn list_departments(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT department FROM calendar_events
         WHERE department IS NOT NULL AND department != ''
         ORDER BY department ASC",
    )?;
    let departments = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(departments)
}

/// Get a single event by ID
pub fn get_event(conn: &Connection, id: &str) -> Result<Option<CalendarEvent>> {
    let sql = format!("SELECT {} FROM calendar_events WHERE id = ?1", EVENT_COLUMNS);
    let event = conn.query_row(&sql, [id], event_from_row).optional()?;
    Ok(event)
}

/// Insert a new event
pub fn insert_event(conn: &Connection, event: &CalendarEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO calendar_events (id, title, event_type, start_date, description, department, location, course_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            event.id,
            event.title,
            event.event_type,
            event.start_date,
            event.description,
            event.department,
            event.location,
            event.course_id,
            event.status,
            event.created_at,
            event.updated_at,
        ],
    )
    .with_context(|| format!("Failed to insert event {}", event.id))?;
    Ok(())
}

/// Whether another event shares this start date, type and title.
/// `exclude_id` skips the event being edited.
pub fn has_duplicate(
    conn: &Connection,
    start_date: NaiveDateTime,
    event_type: EventType,
    title: &str,
    exclude_id: Option<&str>,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM calendar_events
         WHERE start_date = ?1 AND event_type = ?2 AND title = ?3 AND id IS NOT ?4",
        params![start_date, event_type, title, exclude_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert an event unless one with the same start date, type and title exists.
/// Returns whether the event was inserted.
pub fn insert_event_if_not_exists(conn: &Connection, event: &CalendarEvent) -> Result<bool> {
    if has_duplicate(conn, event.start_date, event.event_type, &event.title, None)? {
        debug!(key = %event.dedup_key(), "Skipping duplicate event");
        return Ok(false);
    }

    insert_event(conn, event)?;
    Ok(true)
}

/// Import multiple events, skipping duplicates. Returns the number actually inserted.
pub fn import_events(conn: &Connection, events: &[CalendarEvent]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    for event in events {
        if insert_event_if_not_exists(&tx, event)? {
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Partial event update; `None` leaves a column untouched.
/// For nullable columns `Some(None)` clears the value.
#[derive(Debug, Default)]
pub struct EventUpdate {
    pub title: Option<String>,
    pub event_type: Option<EventType>,
    pub start_date: Option<NaiveDateTime>,
    pub description: Option<Option<String>>,
    pub department: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub course_id: Option<Option<String>>,
    pub status: Option<Option<String>>,
}

impl From<EventFields> for EventUpdate {
    /// A full replacement of every editable field
    fn from(fields: EventFields) -> Self {
        Self {
            title: Some(fields.title),
            event_type: Some(fields.event_type),
            start_date: Some(fields.start_date),
            description: Some(fields.description),
            department: Some(fields.department),
            location: Some(fields.location),
            course_id: Some(fields.course_id),
            status: Some(fields.status),
        }
    }
}

/// Update an existing event. Returns false when no event has this ID.
pub fn update_event(conn: &Connection, id: &str, updates: &EventUpdate) -> Result<bool> {
    let mut set_clauses = vec!["updated_at = ?"];
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(chrono::Utc::now().to_rfc3339())];

    if let Some(ref title) = updates.title {
        set_clauses.push("title = ?");
        params_vec.push(Box::new(title.clone()));
    }
    if let Some(event_type) = updates.event_type {
        set_clauses.push("event_type = ?");
        params_vec.push(Box::new(event_type));
    }
    if let Some(start_date) = updates.start_date {
        set_clauses.push("start_date = ?");
        params_vec.push(Box::new(start_date));
    }

    let nullable = [
        ("description = ?", &updates.description),
        ("department = ?", &updates.department),
        ("location = ?", &updates.location),
        ("course_id = ?", &updates.course_id),
        ("status = ?", &updates.status),
    ];
    for (clause, value) in nullable {
        if let Some(value) = value {
            set_clauses.push(clause);
            params_vec.push(Box::new(value.clone()));
        }
    }

    params_vec.push(Box::new(id.to_string()));

    let sql = format!(
        "UPDATE calendar_events SET {} WHERE id = ?",
        set_clauses.join(", ")
    );

    let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let affected = conn.execute(&sql, params_refs.as_slice())?;
    Ok(affected > 0)
}

/// Delete an event by ID. Returns false when no event has this ID.
pub fn delete_event(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM calendar_events WHERE id = ?1", [id])?;
    Ok(affected > 0)
}

/// Count all events in the database
pub fn count_events(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM calendar_events", [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_db() -> (TempDir, Connection) {
        let temp_dir = TempDir::new().unwrap();
        let conn = init_db(&temp_dir.path().join("test.db")).unwrap();
        (temp_dir, conn)
    }

    fn make_event(title: &str, event_type: EventType, start: &str) -> CalendarEvent {
        let start = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap();
        CalendarEvent::new(title.to_string(), event_type, start)
    }

    fn titles(events: &[CalendarEvent]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    // ========== init_db tests ==========

    #[test]
    fn test_init_db_creates_tables() {
        let (_temp_dir, conn) = setup_test_db();

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='calendar_events'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(table_exists);
    }

    #[test]
    fn test_init_db_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn1 = init_db(&db_path).unwrap();
        insert_event(&conn1, &make_event("Midterm", EventType::Exam, "2024-02-15 10:00")).unwrap();
        drop(conn1);

        let conn2 = init_db(&db_path).unwrap();
        assert_eq!(run_migrations(&conn2).unwrap(), 0);
        assert_eq!(count_events(&conn2).unwrap(), 1);
    }

    // ========== CRUD tests ==========

    #[test]
    fn test_insert_and_get_event() {
        let (_temp_dir, conn) = setup_test_db();
        let mut event = make_event("Midterm", EventType::Exam, "2024-02-15 10:30");
        event.department = Some("Mathematics".to_string());
        event.location = Some("Room 101".to_string());

        insert_event(&conn, &event).unwrap();

        let retrieved = get_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(retrieved, event);
    }

    #[test]
    fn test_get_nonexistent_event() {
        let (_temp_dir, conn) = setup_test_db();
        assert!(get_event(&conn, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_id_fails() {
        let (_temp_dir, conn) = setup_test_db();
        let event = make_event("Midterm", EventType::Exam, "2024-02-15 10:30");
        insert_event(&conn, &event).unwrap();
        assert!(insert_event(&conn, &event).is_err());
    }

    #[test]
    fn test_insert_event_if_not_exists() {
        let (_temp_dir, conn) = setup_test_db();
        let event = make_event("Midterm", EventType::Exam, "2024-02-15 10:00");
        let same_content = make_event("Midterm", EventType::Exam, "2024-02-15 10:00");
        let other_type = make_event("Midterm", EventType::Meeting, "2024-02-15 10:00");

        assert!(insert_event_if_not_exists(&conn, &event).unwrap());
        assert!(!insert_event_if_not_exists(&conn, &same_content).unwrap());
        assert!(insert_event_if_not_exists(&conn, &other_type).unwrap());
        assert_eq!(count_events(&conn).unwrap(), 2);
    }

    #[test]
    fn test_import_events_counts_inserted() {
        let (_temp_dir, conn) = setup_test_db();
        let events = vec![
            make_event("Midterm", EventType::Exam, "2024-02-15 10:00"),
            make_event("Midterm", EventType::Exam, "2024-02-15 10:00"),
            make_event("Spring break", EventType::Holiday, "2024-03-25 00:00"),
        ];

        assert_eq!(import_events(&conn, &events).unwrap(), 2);
        assert_eq!(import_events(&conn, &events).unwrap(), 0);
        assert_eq!(count_events(&conn).unwrap(), 2);
    }

    #[test]
    fn test_update_event_partial() {
        let (_temp_dir, conn) = setup_test_db();
        let mut event = make_event("Midterm", EventType::Exam, "2024-02-15 10:00");
        event.location = Some("Room 101".to_string());
        insert_event(&conn, &event).unwrap();

        let updates = EventUpdate {
            title: Some("Midterm (moved)".to_string()),
            start_date: Some(
                NaiveDateTime::parse_from_str("2024-02-16 14:00", "%Y-%m-%d %H:%M").unwrap(),
            ),
            ..Default::default()
        };
        assert!(update_event(&conn, &event.id, &updates).unwrap());

        let retrieved = get_event(&conn, &event.id).unwrap().unwrap();
        assert_eq!(retrieved.title, "Midterm (moved)");
        assert_eq!(retrieved.start_date.to_string(), "2024-02-16 14:00:00");
        assert_eq!(retrieved.event_type, EventType::Exam);
        assert_eq!(retrieved.location.as_deref(), Some("Room 101"));
        assert_eq!(retrieved.created_at, event.created_at);
    }

    #[test]
    fn test_update_event_clears_nullable_fields() {
        let (_temp_dir, conn) = setup_test_db();
        let mut event = make_event("Midterm", EventType::Exam, "2024-02-15 10:00");
        event.location = Some("Room 101".to_string());
        insert_event(&conn, &event).unwrap();

        let updates = EventUpdate {
            location: Some(None),
            ..Default::default()
        };
        assert!(update_event(&conn, &event.id, &updates).unwrap());

        let retrieved = get_event(&conn, &event.id).unwrap().unwrap();
        assert!(retrieved.location.is_none());
        assert_eq!(retrieved.status, event.status);
    }

    #[test]
    fn test_update_nonexistent_event() {
        let (_temp_dir, conn) = setup_test_db();
        let updates = EventUpdate {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!update_event(&conn, "nonexistent", &updates).unwrap());
    }

    #[test]
    fn test_delete_event() {
        let (_temp_dir, conn) = setup_test_db();
        let event = make_event("Midterm", EventType::Exam, "2024-02-15 10:00");
        insert_event(&conn, &event).unwrap();

        assert!(delete_event(&conn, &event.id).unwrap());
        assert!(get_event(&conn, &event.id).unwrap().is_none());
        assert!(!delete_event(&conn, &event.id).unwrap());
    }

    // ========== month query tests ==========

    #[test]
    fn test_list_events_for_month_bounds() {
        let (_temp_dir, conn) = setup_test_db();
        for event in [
            make_event("Jan last", EventType::Other, "2024-01-31 23:59"),
            make_event("Feb first", EventType::Other, "2024-02-01 00:00"),
            make_event("Feb leap", EventType::Other, "2024-02-29 23:59"),
            make_event("Mar first", EventType::Other, "2024-03-01 00:00"),
        ] {
            insert_event(&conn, &event).unwrap();
        }

        let events = list_events_for_month(&conn, 2024, 2, &EventFilter::default()).unwrap();
        assert_eq!(titles(&events), vec!["Feb first", "Feb leap"]);
    }

    #[test]
    fn test_list_events_for_december_spans_year_end() {
        let (_temp_dir, conn) = setup_test_db();
        insert_event(&conn, &make_event("Party", EventType::UniversityEvent, "2024-12-31 20:00")).unwrap();
        insert_event(&conn, &make_event("New year", EventType::Holiday, "2025-01-01 00:00")).unwrap();

        let events = list_events_for_month(&conn, 2024, 12, &EventFilter::default()).unwrap();
        assert_eq!(titles(&events), vec!["Party"]);
    }

    #[test]
    fn test_list_events_ordered_by_start_then_insertion() {
        let (_temp_dir, conn) = setup_test_db();
        for event in [
            make_event("Late", EventType::Other, "2024-02-10 18:00"),
            make_event("Same A", EventType::Other, "2024-02-10 09:00"),
            make_event("Same B", EventType::Other, "2024-02-10 09:00"),
            make_event("Early", EventType::Other, "2024-02-02 09:00"),
        ] {
            insert_event(&conn, &event).unwrap();
        }

        let events = list_events_for_month(&conn, 2024, 2, &EventFilter::default()).unwrap();
        assert_eq!(titles(&events), vec!["Early", "Same A", "Same B", "Late"]);
    }

    #[test]
    fn test_list_events_filters() {
        let (_temp_dir, conn) = setup_test_db();
        let mut algebra = make_event("Algebra midterm", EventType::Exam, "2024-02-10 09:00");
        algebra.department = Some("Mathematics".to_string());
        let mut physics = make_event("Physics midterm", EventType::Exam, "2024-02-11 09:00");
        physics.department = Some("Physics".to_string());
        let mut council = make_event("Council", EventType::Meeting, "2024-02-12 09:00");
        council.department = Some("Mathematics".to_string());
        for event in [&algebra, &physics, &council] {
            insert_event(&conn, event).unwrap();
        }

        let by_type = EventFilter {
            event_type: Some(EventType::Exam),
            ..Default::default()
        };
        let events = list_events_for_month(&conn, 2024, 2, &by_type).unwrap();
        assert_eq!(titles(&events), vec!["Algebra midterm", "Physics midterm"]);

        let by_department = EventFilter {
            department: Some("Mathematics".to_string()),
            ..Default::default()
        };
        let events = list_events_for_month(&conn, 2024, 2, &by_department).unwrap();
        assert_eq!(titles(&events), vec!["Algebra midterm", "Council"]);

        let combined = EventFilter {
            event_type: Some(EventType::Exam),
            department: Some("Mathematics".to_string()),
            search: None,
        };
        let events = list_events_for_month(&conn, 2024, 2, &combined).unwrap();
        assert_eq!(titles(&events), vec!["Algebra midterm"]);

        let search = EventFilter {
            search: Some("MIDTERM".to_string()),
            ..Default::default()
        };
        let events = list_events_for_month(&conn, 2024, 2, &search).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_search_is_literal_and_unicode_aware() {
        let (_temp_dir, conn) = setup_test_db();
        for title in ["A_B review", "AxB review", "École day"] {
            insert_event(&conn, &make_event(title, EventType::Other, "2024-02-10 09:00")).unwrap();
        }

        let search = |text: &str| {
            let filter = EventFilter {
                search: Some(text.to_string()),
                ..Default::default()
            };
            list_events_for_month(&conn, 2024, 2, &filter)
                .unwrap()
                .into_iter()
                .map(|event| event.title)
                .collect::<Vec<_>>()
        };

        assert_eq!(search("A_B"), vec!["A_B review"]);
        assert!(search("%").is_empty());
        assert_eq!(search("école"), vec!["École day"]);
        assert_eq!(search("REVIEW").len(), 2);
    }

    #[test]
    fn test_has_duplicate_excludes_own_id() {
        let (_temp_dir, conn) = setup_test_db();
        let event = make_event("Algebra midterm", EventType::Exam, "2024-02-10 09:00");
        insert_event(&conn, &event).unwrap();

        assert!(has_duplicate(&conn, event.start_date, event.event_type, &event.title, None).unwrap());
        assert!(!has_duplicate(&conn, event.start_date, event.event_type, &event.title, Some(event.id.as_str())).unwrap());
        assert!(!has_duplicate(&conn, event.start_date, EventType::Meeting, &event.title, None).unwrap());
    }

    #[test]
    fn test_list_events_rejects_invalid_month() {
        let (_temp_dir, conn) = setup_test_db();
        assert!(list_events_for_month(&conn, 2024, 13, &EventFilter::default()).is_err());
    }

    #[test]
    fn test_list_departments() {
        let (_temp_dir, conn) = setup_test_db();
        let mut a = make_event("A", EventType::Other, "2024-02-10 09:00");
        a.department = Some("Physics".to_string());
        let mut b = make_event("B", EventType::Other, "2024-03-10 09:00");
        b.department = Some("Mathematics".to_string());
        let mut c = make_event("C", EventType::Other, "2024-04-10 09:00");
        c.department = Some("Physics".to_string());
        let d = make_event("D", EventType::Other, "2024-04-11 09:00");
        for event in [&a, &b, &c, &d] {
            insert_event(&conn, event).unwrap();
        }

        assert_eq!(
            list_departments(&conn).unwrap(),
            vec!["Mathematics".to_string(), "Physics".to_string()]
        );
    }

    #[test]
    fn test_unknown_event_type_in_db_is_an_error() {
        let (_temp_dir, conn) = setup_test_db();
        let event = make_event("Midterm", EventType::Exam, "2024-02-15 10:00");
        insert_event(&conn, &event).unwrap();
        conn.execute(
            "UPDATE calendar_events SET event_type = 'lecture' WHERE id = ?1",
            [&event.id],
        )
        .unwrap();

        assert!(get_event(&conn, &event.id).is_err());
    }
}
