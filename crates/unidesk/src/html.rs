use anyhow::{Context, Result};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::calendar::{GridCell, MonthGrid, WEEKDAY_NAMES};
use crate::db::EventFilter;
use crate::stats::TypeBreakdown;
use crate::types::EventType;

/// Status values offered by the event form
const STATUS_OPTIONS: &[&str] = &["scheduled", "postponed", "cancelled", "completed"];

/// Everything the calendar page shows for one month
pub struct CalendarView<'a> {
    pub grid: &'a MonthGrid,
    pub breakdown: &'a TypeBreakdown,
    pub filter: &'a EventFilter,
    pub departments: &'a [String],
}

/// Write the calendar page to a standalone HTML file
pub fn generate_html(view: &CalendarView<'_>, path: &Path) -> Result<()> {
    let html = render_page(view);
    fs::write(path, html.into_string())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn render_page(view: &CalendarView<'_>) -> Markup {
    let grid = view.grid;
    let (prev_year, prev_month) = grid.previous();
    let (next_year, next_month) = grid.next();

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Academic Calendar · " (grid.month_name()) " " (grid.year) }
                style { (PreEscaped(CSS)) }
            }
            body {
                div.container {
                    header.calendar-header {
                        (render_month_nav(prev_year, prev_month, view.filter, "‹", "Previous month"))
                        h1 { (grid.month_name()) " " (grid.year) }
                        (render_month_nav(next_year, next_month, view.filter, "›", "Next month"))
                        button.btn-primary #"add-event-btn" type="button" { "+ Add event" }
                    }
                    (render_filters(view))
                    div.calendar-layout {
                        div.calendar-grid {
                            @for name in WEEKDAY_NAMES {
                                div.weekday { (name) }
                            }
                            @for cell in grid.cells() {
                                (render_cell(cell))
                            }
                        }
                        aside.calendar-sidebar {
                            (render_legend())
                            (render_breakdown(view.breakdown))
                        }
                    }
                }
                (render_event_form(grid))
                (render_detail_modal())
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

/// Previous/next links are GET forms so active filters survive navigation
fn render_month_nav(
    year: i32,
    month: u32,
    filter: &EventFilter,
    label: &str,
    aria_label: &str,
) -> Markup {
    html! {
        form.month-nav method="get" action="/calendar" {
            input type="hidden" name="month" value=(month);
            input type="hidden" name="year" value=(year);
            (render_filter_fields(filter))
            button type="submit" aria-label=(aria_label) { (label) }
        }
    }
}

fn render_filter_fields(filter: &EventFilter) -> Markup {
    html! {
        @if let Some(event_type) = filter.event_type {
            input type="hidden" name="type" value=(event_type.as_str());
        }
        @if let Some(department) = &filter.department {
            input type="hidden" name="department" value=(department);
        }
        @if let Some(search) = &filter.search {
            input type="hidden" name="search" value=(search);
        }
    }
}

fn render_filters(view: &CalendarView<'_>) -> Markup {
    let grid = view.grid;
    let filter = view.filter;

    html! {
        form.filters method="get" action="/calendar" {
            input type="hidden" name="month" value=(grid.month);
            input type="hidden" name="year" value=(grid.year);
            select name="type" aria-label="Event type" {
                option value="" { "All types" }
                @for event_type in EventType::ALL {
                    option value=(event_type.as_str()) selected[filter.event_type == Some(event_type)] {
                        (event_type.label())
                    }
                }
            }
            select name="department" aria-label="Department" {
                option value="" { "All departments" }
                @for department in view.departments {
                    option value=(department) selected[filter.department.as_deref() == Some(department.as_str())] {
                        (department)
                    }
                }
            }
            input type="search" name="search" placeholder="Search titles"
                value=(filter.search.as_deref().unwrap_or(""));
            button type="submit" { "Filter" }
            a.reset href={ "/calendar?month=" (grid.month) "&year=" (grid.year) } { "Reset" }
        }
    }
}

fn render_cell(cell: GridCell<'_>) -> Markup {
    match cell {
        GridCell::Blank => html! { div.calendar-day.empty {} },
        GridCell::Day(day) => html! {
            div.calendar-day.today[day.is_today] data-day=(day.day) {
                div.day-number { (day.day) }
                div.day-events {
                    @for event in &day.visible_events {
                        button.event-chip type="button"
                            data-event-id=(event.id)
                            title=(event.title)
                            style={ "--event-color: " (event.event_type.color()) } {
                            span.event-icon { (event.event_type.icon()) }
                            span.event-title { (event.display_title()) }
                        }
                    }
                    @if day.overflow_count > 0 {
                        div.more-events title={ (day.total_events()) " events" } { "+" (day.overflow_count) " more" }
                    }
                }
            }
        },
    }
}

fn render_legend() -> Markup {
    html! {
        section.legend {
            h2 { "Legend" }
            ul {
                @for event_type in EventType::ALL {
                    li {
                        span.swatch style={ "background: " (event_type.color()) } {}
                        (event_type.icon()) " " (event_type.label())
                    }
                }
            }
        }
    }
}

fn render_breakdown(breakdown: &TypeBreakdown) -> Markup {
    html! {
        section.breakdown {
            h2 { "This month" }
            @if breakdown.is_empty() {
                p.empty-state { "No events this month." }
            } @else {
                div.pie role="img" aria-label="Events by type" style={ "background: " (breakdown.conic_gradient()) } {}
                ul.breakdown-list {
                    @for share in &breakdown.shares {
                        li {
                            span.swatch style={ "background: " (share.event_type.color()) } {}
                            (share.event_type.label())
                            span.share { (share.count) " · " (format!("{:.1}%", share.percentage)) }
                        }
                    }
                }
            }
            p.total { (breakdown.total) " events" }
        }
    }
}

/// Default start for a new event: today if it is in view, else the 1st, at 09:00
fn default_start(grid: &MonthGrid) -> String {
    let day = grid
        .days
        .iter()
        .find(|d| d.is_today)
        .map(|d| d.day)
        .unwrap_or(1);
    format!("{:04}-{:02}-{:02}T09:00", grid.year, grid.month, day)
}

fn render_event_form(grid: &MonthGrid) -> Markup {
    html! {
        div.modal #"event-modal" {
            div.modal-content {
                h2 #"event-modal-title" { "Add event" }
                form #"event-form" method="post" action="/calendar" {
                    input type="hidden" name="action" value="create";
                    input type="hidden" name="id" value="";
                    label {
                        "Title"
                        input type="text" name="title" required maxlength="255";
                    }
                    label {
                        "Type"
                        select name="event_type" required {
                            @for event_type in EventType::ALL {
                                option value=(event_type.as_str()) { (event_type.label()) }
                            }
                        }
                    }
                    label {
                        "Start"
                        input type="datetime-local" name="start_date" required value=(default_start(grid));
                    }
                    label {
                        "Department"
                        input type="text" name="department";
                    }
                    label {
                        "Location"
                        input type="text" name="location";
                    }
                    label {
                        "Course"
                        input type="text" name="course_id";
                    }
                    label {
                        "Status"
                        select name="status" {
                            @for status in STATUS_OPTIONS {
                                option value=(status) { (status) }
                            }
                        }
                    }
                    label {
                        "Description"
                        textarea name="description" rows="3" {}
                    }
                    div.modal-actions {
                        button.modal-close type="button" { "Cancel" }
                        button.btn-primary type="submit" { "Save" }
                    }
                }
            }
        }
    }
}

fn render_detail_modal() -> Markup {
    html! {
        div.modal #"detail-modal" {
            div.modal-content {
                h2 #"detail-title" { "Event" }
                dl #"detail-body" {}
                p.error-message #"detail-error" {}
                div.modal-actions {
                    button #"detail-edit" type="button" { "Edit" }
                    form #"delete-form" method="post" action="/calendar" {
                        input type="hidden" name="action" value="delete";
                        input #"delete-id" type="hidden" name="id" value="";
                        button.btn-danger type="submit" { "Delete" }
                    }
                    button.modal-close type="button" { "Close" }
                }
            }
        }
    }
}

const CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    background: #f3f4f6;
    color: #111827;
    line-height: 1.4;
}

.container {
    max-width: 1200px;
    margin: 0 auto;
    padding: 32px 24px 48px;
}

.calendar-header {
    display: flex;
    align-items: center;
    gap: 16px;
    margin-bottom: 20px;
}

.calendar-header h1 {
    font-size: 1.8em;
    min-width: 260px;
    text-align: center;
}

.month-nav button {
    border: 1px solid #d1d5db;
    background: #fff;
    border-radius: 6px;
    width: 36px;
    height: 36px;
    font-size: 1.2em;
    cursor: pointer;
}

button {
    font: inherit;
}

.btn-primary {
    margin-left: auto;
    background: #2563eb;
    color: #fff;
    border: none;
    border-radius: 6px;
    padding: 8px 16px;
    cursor: pointer;
}

.btn-danger {
    background: #dc2626;
    color: #fff;
    border: none;
    border-radius: 6px;
    padding: 8px 16px;
    cursor: pointer;
}

.filters {
    display: flex;
    flex-wrap: wrap;
    gap: 8px;
    margin-bottom: 20px;
}

.filters select,
.filters input,
.filters button {
    padding: 6px 10px;
    border: 1px solid #d1d5db;
    border-radius: 6px;
    background: #fff;
}

.filters .reset {
    align-self: center;
    color: #6b7280;
}

.calendar-layout {
    display: grid;
    grid-template-columns: 1fr 260px;
    gap: 24px;
}

.calendar-grid {
    display: grid;
    grid-template-columns: repeat(7, 1fr);
    gap: 1px;
    background: #e5e7eb;
    border: 1px solid #e5e7eb;
    border-radius: 8px;
    overflow: hidden;
}

.weekday {
    background: #f9fafb;
    padding: 8px;
    text-align: center;
    font-weight: 600;
    font-size: 0.85em;
    color: #6b7280;
}

.calendar-day {
    background: #fff;
    min-height: 110px;
    padding: 6px;
    display: flex;
    flex-direction: column;
    gap: 4px;
}

.calendar-day.empty {
    background: #f9fafb;
}

.calendar-day.today .day-number {
    background: #2563eb;
    color: #fff;
    border-radius: 50%;
}

.day-number {
    width: 26px;
    height: 26px;
    line-height: 26px;
    text-align: center;
    font-weight: 600;
    font-size: 0.9em;
}

.day-events {
    display: flex;
    flex-direction: column;
    gap: 2px;
}

.event-chip {
    display: flex;
    align-items: center;
    gap: 4px;
    width: 100%;
    border: none;
    border-left: 3px solid var(--event-color);
    background: #f3f4f6;
    border-radius: 4px;
    padding: 2px 4px;
    font-size: 0.75em;
    text-align: left;
    cursor: pointer;
    white-space: nowrap;
    overflow: hidden;
}

.event-chip:hover {
    background: #e5e7eb;
}

.more-events {
    font-size: 0.75em;
    color: #6b7280;
    padding-left: 4px;
}

.calendar-sidebar section {
    background: #fff;
    border-radius: 8px;
    padding: 16px;
    margin-bottom: 16px;
}

.calendar-sidebar h2 {
    font-size: 1em;
    margin-bottom: 12px;
}

.calendar-sidebar ul {
    list-style: none;
    display: grid;
    gap: 6px;
    font-size: 0.9em;
}

.swatch {
    display: inline-block;
    width: 10px;
    height: 10px;
    border-radius: 2px;
    margin-right: 6px;
}

.pie {
    width: 160px;
    height: 160px;
    border-radius: 50%;
    margin: 0 auto 16px;
}

.share {
    float: right;
    color: #6b7280;
}

.total,
.empty-state {
    margin-top: 12px;
    color: #6b7280;
    font-size: 0.85em;
}

.modal {
    display: none;
    position: fixed;
    inset: 0;
    background: rgba(17, 24, 39, 0.5);
    align-items: center;
    justify-content: center;
    z-index: 10;
}

.modal.open {
    display: flex;
}

.modal-content {
    background: #fff;
    border-radius: 8px;
    padding: 24px;
    width: min(480px, 92vw);
    max-height: 90vh;
    overflow-y: auto;
}

.modal-content h2 {
    margin-bottom: 16px;
}

.modal-content label {
    display: grid;
    gap: 4px;
    margin-bottom: 12px;
    font-size: 0.9em;
    font-weight: 600;
}

.modal-content input,
.modal-content select,
.modal-content textarea {
    font: inherit;
    font-weight: 400;
    padding: 6px 8px;
    border: 1px solid #d1d5db;
    border-radius: 6px;
}

.modal-actions {
    display: flex;
    justify-content: flex-end;
    gap: 8px;
    margin-top: 16px;
}

.modal-actions .btn-primary {
    margin-left: 0;
}

#detail-body dt {
    font-weight: 600;
    font-size: 0.8em;
    color: #6b7280;
    margin-top: 8px;
}

.error-message {
    color: #dc2626;
    font-size: 0.9em;
}

@media (max-width: 900px) {
    .calendar-layout {
        grid-template-columns: 1fr;
    }
}
"#;

const JAVASCRIPT: &str = r#"
const eventModal = document.getElementById('event-modal');
const detailModal = document.getElementById('detail-modal');
const eventForm = document.getElementById('event-form');
let currentEvent = null;

function openModal(modal) {
    modal.classList.add('open');
}

function closeModal(modal) {
    modal.classList.remove('open');
}

document.querySelectorAll('.modal').forEach(modal => {
    modal.addEventListener('click', e => {
        if (e.target === modal || e.target.classList.contains('modal-close')) {
            closeModal(modal);
        }
    });
});

document.getElementById('add-event-btn').addEventListener('click', () => {
    eventForm.reset();
    eventForm.elements['action'].value = 'create';
    eventForm.elements['id'].value = '';
    document.getElementById('event-modal-title').textContent = 'Add event';
    openModal(eventModal);
});

function addDetail(list, label, value) {
    if (!value) return;
    const dt = document.createElement('dt');
    dt.textContent = label;
    const dd = document.createElement('dd');
    dd.textContent = value;
    list.append(dt, dd);
}

function showEventDetails(id) {
    const body = document.getElementById('detail-body');
    const error = document.getElementById('detail-error');
    body.replaceChildren();
    error.textContent = '';
    currentEvent = null;
    document.getElementById('detail-title').textContent = 'Loading...';
    document.getElementById('delete-id').value = id;
    openModal(detailModal);

    fetch(`/api/events/${encodeURIComponent(id)}`)
        .then(response => response.json())
        .then(result => {
            if (!result.success) {
                document.getElementById('detail-title').textContent = 'Event';
                error.textContent = result.message || 'An error occurred';
                return;
            }
            const event = result.data;
            currentEvent = event;
            document.getElementById('detail-title').textContent = event.title;
            addDetail(body, 'Type', event.type.replace('_', ' '));
            addDetail(body, 'Starts', event.start_date.replace('T', ' ').slice(0, 16));
            addDetail(body, 'Department', event.department);
            addDetail(body, 'Location', event.location);
            addDetail(body, 'Course', event.course_id);
            addDetail(body, 'Status', event.status);
            addDetail(body, 'Description', event.description);
        })
        .catch(() => {
            document.getElementById('detail-title').textContent = 'Event';
            error.textContent = 'An error occurred while loading the event';
        });
}

document.querySelectorAll('.event-chip').forEach(chip => {
    chip.addEventListener('click', () => showEventDetails(chip.dataset.eventId));
});

document.getElementById('detail-edit').addEventListener('click', () => {
    if (!currentEvent) return;
    const fields = eventForm.elements;
    fields['action'].value = 'update';
    fields['id'].value = currentEvent.id;
    fields['title'].value = currentEvent.title;
    fields['event_type'].value = currentEvent.type;
    fields['start_date'].value = currentEvent.start_date.slice(0, 16);
    fields['department'].value = currentEvent.department || '';
    fields['location'].value = currentEvent.location || '';
    fields['course_id'].value = currentEvent.course_id || '';
    fields['status'].value = currentEvent.status || 'scheduled';
    fields['description'].value = currentEvent.description || '';
    document.getElementById('event-modal-title').textContent = 'Edit event';
    closeModal(detailModal);
    openModal(eventModal);
});

document.getElementById('delete-form').addEventListener('submit', e => {
    if (!confirm('Delete this event?')) {
        e.preventDefault();
    }
});
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::build_month_grid;
    use crate::types::CalendarEvent;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
    }

    fn event(title: &str, event_type: EventType, start: &str) -> CalendarEvent {
        let start = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap();
        CalendarEvent::new(title.to_string(), event_type, start)
    }

    fn render(events: &[CalendarEvent], filter: &EventFilter, departments: &[String]) -> String {
        let grid = build_month_grid(2024, 2, events, today()).unwrap();
        let breakdown = TypeBreakdown::from_events(events);
        let view = CalendarView {
            grid: &grid,
            breakdown: &breakdown,
            filter,
            departments,
        };
        render_page(&view).into_string()
    }

    #[test]
    fn test_render_page_grid_structure() {
        let html = render(&[], &EventFilter::default(), &[]);

        assert!(html.contains("<h1>February 2024</h1>"));
        assert_eq!(html.matches("class=\"calendar-day empty\"").count(), 6);
        assert_eq!(html.matches("data-day=").count(), 29);
        assert_eq!(html.matches("class=\"calendar-day today\"").count(), 1);
        assert_eq!(html.matches("class=\"weekday\"").count(), 7);
        assert!(html.contains("No events this month."));
    }

    #[test]
    fn test_render_page_events_and_overflow() {
        let events: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|t| event(t, EventType::Exam, "2024-02-10 09:00"))
            .collect();
        let html = render(&events, &EventFilter::default(), &[]);

        assert_eq!(html.matches("class=\"event-chip\"").count(), 3);
        assert!(html.contains("+2 more"));
        assert!(html.contains("--event-color: #ef4444"));
        assert!(html.contains("conic-gradient(#ef4444 0.0deg 360.0deg)"));
        assert!(html.contains("100.0%"));
    }

    #[test]
    fn test_render_page_truncates_and_escapes_titles() {
        let events = vec![event(
            "<b>Graduation</b> ceremony & reception",
            EventType::UniversityEvent,
            "2024-02-20 17:00",
        )];
        let html = render(&events, &EventFilter::default(), &[]);

        assert!(!html.contains("<b>Graduation"));
        assert!(html.contains("title=\"&lt;b&gt;Graduation&lt;/b&gt; ceremony &amp; reception\""));
        assert!(html.contains("&lt;b&gt;Graduation&lt;/b&gt; ce..."));
    }

    #[test]
    fn test_render_page_keeps_filters_in_navigation() {
        let filter = EventFilter {
            event_type: Some(EventType::Holiday),
            department: Some("Physics".to_string()),
            search: None,
        };
        let departments = vec!["Mathematics".to_string(), "Physics".to_string()];
        let html = render(&[], &filter, &departments);

        // previous and next month forms both carry the filters
        assert_eq!(html.matches("name=\"type\" value=\"holiday\"").count(), 2);
        assert_eq!(html.matches("name=\"department\" value=\"Physics\"").count(), 2);
        assert!(html.contains("name=\"month\" value=\"1\""));
        assert!(html.contains("name=\"month\" value=\"3\""));
        assert!(html.contains("<option value=\"holiday\" selected>"));
        assert!(html.contains("<option value=\"Physics\" selected>"));
        assert!(html.contains("<option value=\"Mathematics\">"));
    }

    #[test]
    fn test_default_start_uses_today_in_view() {
        let grid = build_month_grid(2024, 2, &[], today()).unwrap();
        assert_eq!(default_start(&grid), "2024-02-15T09:00");

        let grid = build_month_grid(2024, 3, &[], today()).unwrap();
        assert_eq!(default_start(&grid), "2024-03-01T09:00");
    }

    #[test]
    fn test_generate_html_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("calendar.html");
        let grid = build_month_grid(2024, 2, &[], today()).unwrap();
        let breakdown = TypeBreakdown::from_events(&[]);
        let filter = EventFilter::default();
        let view = CalendarView {
            grid: &grid,
            breakdown: &breakdown,
            filter: &filter,
            departments: &[],
        };

        generate_html(&view, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("<!DOCTYPE html>"));
    }
}
