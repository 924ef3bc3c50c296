use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::calendar::{truncate_title, TITLE_DISPLAY_CHARS};

/// Status given to events created without one
pub const DEFAULT_STATUS: &str = "scheduled";

/// Input formats accepted for an event start date, tried in order.
/// The first one is what an HTML `datetime-local` input submits.
const START_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Kind of calendar event; drives the color and icon shown in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Exam,
    Assignment,
    Holiday,
    Meeting,
    UniversityEvent,
    Other,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Exam,
        EventType::Assignment,
        EventType::Holiday,
        EventType::Meeting,
        EventType::UniversityEvent,
        EventType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Exam => "exam",
            EventType::Assignment => "assignment",
            EventType::Holiday => "holiday",
            EventType::Meeting => "meeting",
            EventType::UniversityEvent => "university_event",
            EventType::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventType::Exam => "Exam",
            EventType::Assignment => "Assignment",
            EventType::Holiday => "Holiday",
            EventType::Meeting => "Meeting",
            EventType::UniversityEvent => "University Event",
            EventType::Other => "Other",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            EventType::Exam => "#ef4444",
            EventType::Assignment => "#f59e0b",
            EventType::Holiday => "#10b981",
            EventType::Meeting => "#3b82f6",
            EventType::UniversityEvent => "#8b5cf6",
            EventType::Other => "#6b7280",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            EventType::Exam => "📝",
            EventType::Assignment => "📚",
            EventType::Holiday => "🌴",
            EventType::Meeting => "👥",
            EventType::UniversityEvent => "🎓",
            EventType::Other => "📌",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// A single calendar event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,

    pub title: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub start_date: NaiveDateTime,

    pub description: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub course_id: Option<String>,
    pub status: Option<String>,

    /// RFC 3339 timestamps
    pub created_at: String,
    pub updated_at: String,
}

impl CalendarEvent {
    pub fn new(title: String, event_type: EventType, start_date: NaiveDateTime) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            event_type,
            start_date,
            description: None,
            department: None,
            location: None,
            course_id: None,
            status: Some(DEFAULT_STATUS.to_string()),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Two events are duplicates when they start at the same moment with the same type and title
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.start_date.format("%Y-%m-%d %H:%M:%S"),
            self.event_type,
            self.title
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.start_date.date()
    }

    /// Title as shown inside a grid cell
    pub fn display_title(&self) -> String {
        truncate_title(&self.title, TITLE_DISPLAY_CHARS)
    }

    /// Whether the event starts within the given month
    pub fn falls_in(&self, year: i32, month: u32) -> bool {
        self.start_date.year() == year && self.start_date.month() == month
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("title is required")]
    MissingTitle,
    #[error(transparent)]
    UnknownEventType(#[from] UnknownEventType),
    #[error("invalid start date: {0:?}")]
    InvalidStartDate(String),
}

/// Unvalidated event fields as submitted by a form or read from an import file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "type")]
    pub event_type: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Validated event fields, ready to create or update an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
    pub title: String,
    pub event_type: EventType,
    pub start_date: NaiveDateTime,
    pub description: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub course_id: Option<String>,
    pub status: Option<String>,
}

impl EventDraft {
    pub fn validate(self) -> Result<EventFields, DraftError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DraftError::MissingTitle);
        }
        let event_type: EventType = self.event_type.parse()?;
        let start_date = parse_start_date(&self.start_date)?;

        Ok(EventFields {
            title: title.to_string(),
            event_type,
            start_date,
            description: non_blank(self.description),
            department: non_blank(self.department),
            location: non_blank(self.location),
            course_id: non_blank(self.course_id),
            status: non_blank(self.status),
        })
    }
}

impl EventFields {
    pub fn into_event(self) -> CalendarEvent {
        let mut event = CalendarEvent::new(self.title, self.event_type, self.start_date);
        event.description = self.description;
        event.department = self.department;
        event.location = self.location;
        event.course_id = self.course_id;
        if self.status.is_some() {
            event.status = self.status;
        }
        event
    }
}

/// Parse a start date in any of the accepted formats; a bare date means midnight
pub fn parse_start_date(input: &str) -> Result<NaiveDateTime, DraftError> {
    let input = input.trim();
    for format in START_DATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| DraftError::InvalidStartDate(input.to_string()))
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
