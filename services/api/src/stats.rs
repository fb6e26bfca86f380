use admissions::error::AppError;
use admissions::workflows::applications::{
    ApplicationRepository, ApplicationStats, SqliteApplicationRepository,
};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Args;
use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct StatsArgs {
    /// SQLite database file written by the service
    #[arg(long)]
    pub(crate) database: PathBuf,
    /// Date whose year scopes the monthly counts (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the counts as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_stats(args: StatsArgs) -> Result<(), AppError> {
    let StatsArgs {
        database,
        today,
        json,
    } = args;

    if !database.is_file() {
        return Err(AppError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("database '{}' does not exist", database.display()),
        )));
    }

    let today = today.unwrap_or_else(|| Utc::now().date_naive());
    let repository = SqliteApplicationRepository::open(&database)?;
    let stats = repository.stats(today.year())?;

    if json {
        let rendered = serde_json::to_string_pretty(&stats)
            .map_err(|err| AppError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))?;
        println!("{rendered}");
    } else {
        print!("{}", render_stats(&stats, today.year()));
    }
    Ok(())
}

pub(crate) fn render_stats(stats: &ApplicationStats, year: i32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Admissions overview");
    let _ = writeln!(out, "  Total applications: {}", stats.total);
    for (label, count) in [
        ("Submitted", stats.submitted),
        ("Under review", stats.under_review),
        ("Accepted", stats.accepted),
        ("Rejected", stats.rejected),
        ("Waiting list", stats.waiting_list),
    ] {
        let _ = writeln!(out, "  {label}: {count}");
    }

    let _ = writeln!(out, "\nBy grade");
    if stats.by_grade.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for entry in &stats.by_grade {
        let _ = writeln!(out, "  {}: {}", entry.grade_level.label(), entry.count);
    }

    let _ = writeln!(out, "\nSubmissions in {year}");
    if stats.monthly.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for entry in &stats.monthly {
        let _ = writeln!(out, "  {year}-{:02}: {}", entry.month, entry.count);
    }
    out
}
