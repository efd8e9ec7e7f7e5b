//! Report rendering: rows are flattened into a [`ReportTable`] and written
//! as CSV or as a paginated PDF into the reports directory.

pub mod csv_writer;
pub mod pdf;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::model::leave_request::leave_days;
use crate::model::report::{ReportFormat, ReportType};

#[derive(Debug, Clone)]
pub struct ReportTable {
    pub title: String,
    pub subtitle: Option<String>,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceReportRow {
    pub full_name: String,
    pub email: String,
    pub date: NaiveDate,
    pub clock_in: NaiveDateTime,
    pub clock_out: Option<NaiveDateTime>,
    pub status: String,
    pub work_minutes: Option<i64>,
    pub clock_in_distance_m: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveReportRow {
    pub full_name: String,
    pub email: String,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub reason: String,
}

/// Parameters echoed into the `reports.parameters` column.
#[derive(Debug, Clone, Serialize)]
pub struct ReportParams {
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub user_id: Option<u64>,
}

impl ReportParams {
    pub fn display_name(&self) -> String {
        let kind = match self.report_type {
            ReportType::Attendance => "Attendance",
            ReportType::Leave => "Leave",
        };
        format!("{kind} {} to {}", self.start_date, self.end_date)
    }

    pub fn file_name(&self, unique: &str) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.report_type,
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d"),
            unique,
            self.format.extension()
        )
    }
}

fn hhmm(minutes: Option<i64>) -> String {
    minutes
        .map(|m| format!("{}:{:02}", m / 60, m % 60))
        .unwrap_or_default()
}

pub fn attendance_table(company: &str, params: &ReportParams, rows: &[AttendanceReportRow]) -> ReportTable {
    ReportTable {
        title: format!("{company} - attendance report"),
        subtitle: Some(format!("{} to {}, {} records", params.start_date, params.end_date, rows.len())),
        headers: vec!["Name", "Email", "Date", "Clock in", "Clock out", "Status", "Worked", "Distance (m)"],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    r.full_name.clone(),
                    r.email.clone(),
                    r.date.to_string(),
                    r.clock_in.format("%H:%M").to_string(),
                    r.clock_out.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
                    r.status.replace('_', " "),
                    hhmm(r.work_minutes),
                    format!("{:.0}", r.clock_in_distance_m),
                ]
            })
            .collect(),
    }
}

pub fn leave_table(company: &str, params: &ReportParams, rows: &[LeaveReportRow]) -> ReportTable {
    ReportTable {
        title: format!("{company} - leave report"),
        subtitle: Some(format!("{} to {}, {} requests", params.start_date, params.end_date, rows.len())),
        headers: vec!["Name", "Email", "Type", "From", "To", "Days", "Status", "Reason"],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    r.full_name.clone(),
                    r.email.clone(),
                    r.leave_type.clone(),
                    r.start_date.to_string(),
                    r.end_date.to_string(),
                    leave_days(r.start_date, r.end_date).to_string(),
                    r.status.clone(),
                    r.reason.clone(),
                ]
            })
            .collect(),
    }
}

pub fn render(table: &ReportTable, format: ReportFormat) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Csv => csv_writer::render(table),
        ReportFormat::Pdf => Ok(pdf::render(table)),
    }
}

/// Rejects anything that could escape the reports directory.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.starts_with('.')
}

pub fn resolve(dir: &Path, file_name: &str) -> Result<PathBuf> {
    if !is_safe_file_name(file_name) {
        bail!("invalid report file name: {file_name}");
    }
    Ok(dir.join(file_name))
}

/// Renders and writes the table; returns the full path written.
pub fn write_report(dir: &Path, file_name: &str, table: &ReportTable, format: ReportFormat) -> Result<PathBuf> {
    let path = resolve(dir, file_name)?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating reports dir {}", dir.display()))?;
    let bytes = render(table, format)?;
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Removes a written report; a file that is already gone is fine.
pub fn discard_report(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
