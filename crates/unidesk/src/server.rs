use anyhow::Context;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::{Form, Json, Router};
use chrono::{Datelike, Local, NaiveDate};
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::calendar::{self, MonthGrid};
use crate::config::Settings;
use crate::db::{self, EventFilter, EventUpdate};
use crate::error::{ApiResponse, AppError, AppResult};
use crate::html::{self, CalendarView};
use crate::stats::TypeBreakdown;
use crate::types::{non_blank, CalendarEvent, EventDraft};

/// Application state shared across requests
pub struct AppState {
    pub db: Mutex<Connection>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(conn: Connection) -> SharedState {
        Arc::new(Self {
            db: Mutex::new(conn),
        })
    }
}

/// Start the web server
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let conn = db::init_db(&settings.database_path)?;
    info!(
        path = %settings.database_path.display(),
        events = db::count_events(&conn)?,
        "Event store ready"
    );

    let app = router(AppState::new(conn));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(url = %format!("http://{}", addr), "Server running");

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/calendar") }))
        .route("/calendar", get(calendar_page).post(calendar_action))
        .route("/api/calendar", get(month_grid_handler))
        .route("/api/events", get(list_events_handler))
        .route("/api/events/{id}", get(get_event_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Month and filter query parameters shared by the calendar routes
#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub department: Option<String>,
    pub search: Option<String>,
}

impl CalendarQuery {
    /// Fill in the current month where missing and validate; blank filters mean no filter
    fn resolve(self, today: NaiveDate) -> AppResult<(i32, u32, EventFilter)> {
        let year = self.year.unwrap_or(today.year());
        let month = self.month.unwrap_or(today.month());
        calendar::first_of_month(year, month)?;

        let event_type = match non_blank(self.event_type) {
            Some(value) => Some(value.parse()?),
            None => None,
        };

        Ok((
            year,
            month,
            EventFilter {
                event_type,
                department: non_blank(self.department),
                search: non_blank(self.search),
            },
        ))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Events, grid and breakdown for one month, as the page needs them
struct MonthData {
    grid: MonthGrid,
    events: Vec<CalendarEvent>,
    departments: Vec<String>,
    filter: EventFilter,
}

async fn load_month(state: &AppState, query: CalendarQuery) -> AppResult<MonthData> {
    let today = today();
    let (year, month, filter) = query.resolve(today)?;

    let (events, departments) = {
        let conn = state.db.lock().await;
        (
            db::list_events_for_month(&conn, year, month, &filter)?,
            db::list_departments(&conn)?,
        )
    };

    let grid = calendar::build_month_grid(year, month, &events, today)?;

    Ok(MonthData {
        grid,
        events,
        departments,
        filter,
    })
}

/// Serve the calendar page
async fn calendar_page(
    State(state): State<SharedState>,
    query: Result<Query<CalendarQuery>, QueryRejection>,
) -> AppResult<Html<String>> {
    let Query(query) = query?;
    let data = load_month(&state, query).await?;
    let breakdown = TypeBreakdown::from_events(&data.events);

    let view = CalendarView {
        grid: &data.grid,
        breakdown: &breakdown,
        filter: &data.filter,
        departments: &data.departments,
    };
    Ok(Html(html::render_page(&view).into_string()))
}

/// Return the laid-out month as JSON
async fn month_grid_handler(
    State(state): State<SharedState>,
    query: Result<Query<CalendarQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<MonthGrid>>> {
    let Query(query) = query?;
    let data = load_month(&state, query).await?;
    Ok(Json(ApiResponse::ok(data.grid)))
}

/// Return the month's events as JSON
async fn list_events_handler(
    State(state): State<SharedState>,
    query: Result<Query<CalendarQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Vec<CalendarEvent>>>> {
    let Query(query) = query?;
    let (year, month, filter) = query.resolve(today())?;
    let conn = state.db.lock().await;
    let events = db::list_events_for_month(&conn, year, month, &filter)?;
    Ok(Json(ApiResponse::ok(events)))
}

/// Return one event as JSON, for the detail modal
async fn get_event_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<CalendarEvent>>> {
    let conn = state.db.lock().await;
    let event = db::get_event(&conn, &id)?
        .ok_or_else(|| AppError::NotFound(format!("event {} not found", id)))?;
    Ok(Json(ApiResponse::ok(event)))
}

/// Form post from the calendar page
#[derive(Debug, Default, Deserialize)]
pub struct CalendarForm {
    pub action: String,
    #[serde(default)]
    pub id: Option<String>,
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

impl CalendarForm {
    fn required_id(&self) -> AppResult<String> {
        non_blank(self.id.clone()).ok_or_else(|| AppError::Validation("event id is required".into()))
    }

    fn into_draft(self) -> EventDraft {
        EventDraft {
            title: self.title,
            event_type: self.event_type,
            start_date: self.start_date,
            description: self.description,
            department: self.department,
            location: self.location,
            course_id: self.course_id,
            status: self.status,
        }
    }
}

fn month_redirect(date: NaiveDate) -> Redirect {
    Redirect::to(&format!(
        "/calendar?month={}&year={}",
        date.month(),
        date.year()
    ))
}

/// Create, update or delete an event, then go back to its month
async fn calendar_action(
    State(state): State<SharedState>,
    form: Result<Form<CalendarForm>, FormRejection>,
) -> AppResult<Redirect> {
    let Form(form) = form?;
    let action = form.action.clone();
    match action.as_str() {
        "create" => {
            let event = form.into_draft().validate()?.into_event();
            let conn = state.db.lock().await;
            if !db::insert_event_if_not_exists(&conn, &event)? {
                return Err(AppError::Conflict(format!(
                    "an identical event \"{}\" already exists",
                    event.title
                )));
            }
            info!(id = %event.id, title = %event.title, "Event created");
            Ok(month_redirect(event.date()))
        }
        "update" => {
            let id = form.required_id()?;
            let fields = form.into_draft().validate()?;
            let date = fields.start_date.date();
            let conn = state.db.lock().await;
            let duplicate = db::has_duplicate(
                &conn,
                fields.start_date,
                fields.event_type,
                &fields.title,
                Some(id.as_str()),
            )?;
            if duplicate {
                return Err(AppError::Conflict(format!(
                    "an identical event \"{}\" already exists",
                    fields.title
                )));
            }
            if !db::update_event(&conn, &id, &EventUpdate::from(fields))? {
                return Err(AppError::NotFound(format!("event {} not found", id)));
            }
            info!(id = %id, "Event updated");
            Ok(month_redirect(date))
        }
        "delete" => {
            let id = form.required_id()?;
            let conn = state.db.lock().await;
            let event = db::get_event(&conn, &id)?
                .ok_or_else(|| AppError::NotFound(format!("event {} not found", id)))?;
            db::delete_event(&conn, &id)?;
            info!(id = %id, "Event deleted");
            Ok(month_redirect(event.date()))
        }
        other => Err(AppError::Validation(format!("unknown action: {:?}", other))),
    }
}
