use anyhow::Result;
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod calendar;
mod config;
mod data;
mod db;
mod error;
mod html;
mod server;
mod stats;
mod types;

use config::Settings;
use db::EventFilter;
use html::CalendarView;
use stats::TypeBreakdown;

#[derive(Parser, Debug)]
#[command(name = "unidesk")]
#[command(about = "University portal calendar: month grid, event store and web view")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// SQLite database file (overrides UNIDESK_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Address to bind (overrides UNIDESK_HOST)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides UNIDESK_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render one month to a static HTML file (no server)
    Render {
        /// Year to render, defaults to the current one
        #[arg(long)]
        year: Option<i32>,

        /// Month to render (1-12), defaults to the current one
        #[arg(long)]
        month: Option<u32>,

        /// Output file
        #[arg(short, long, default_value = "calendar.html")]
        output: PathBuf,
    },

    /// Print one month as a text grid
    Show {
        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        month: Option<u32>,
    },

    /// Import events from a JSON file
    Import {
        /// Path to a JSON array of events
        file: PathBuf,
    },
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=warn".parse()?);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    let mut settings = Settings::from_env()?;
    if let Some(db) = args.db {
        settings.database_path = db;
    }

    let today = Local::now().date_naive();

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(&settings).await?;
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            server::serve(&settings).await?;
        }
        Some(Commands::Render {
            year,
            month,
            output,
        }) => {
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            let conn = db::init_db(&settings.database_path)?;
            let filter = EventFilter::default();
            let events = db::list_events_for_month(&conn, year, month, &filter)?;
            let departments = db::list_departments(&conn)?;
            let grid = calendar::build_month_grid(year, month, &events, today)?;
            let breakdown = TypeBreakdown::from_events(&events);

            let view = CalendarView {
                grid: &grid,
                breakdown: &breakdown,
                filter: &filter,
                departments: &departments,
            };
            html::generate_html(&view, &output)?;
            info!(path = %output.display(), events = events.len(), "HTML saved");
        }
        Some(Commands::Show { year, month }) => {
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            let conn = db::init_db(&settings.database_path)?;
            let events = db::list_events_for_month(&conn, year, month, &EventFilter::default())?;
            let grid = calendar::build_month_grid(year, month, &events, today)?;

            print!("{}", grid);
            for event in &events {
                info!(
                    date = %event.start_date,
                    event_type = %event.event_type,
                    title = %event.title,
                    "Event"
                );
            }
        }
        Some(Commands::Import { file }) => {
            let conn = db::init_db(&settings.database_path)?;
            let summary = data::import_file(&conn, &file)?;
            info!(
                read = summary.read,
                skipped = summary.skipped,
                inserted = summary.inserted,
                total = db::count_events(&conn)?,
                "Import finished"
            );
        }
    }

    Ok(())
}
