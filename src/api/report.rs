use actix_web::{HttpResponse, http::header, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    api::setting::load_snapshot,
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult},
    model::report::{REPORT_COLUMNS, Report, ReportFormat, ReportType},
    models::{Paging, ReportPage},
    reports::{self, AttendanceReportRow, LeaveReportRow, ReportParams, ReportTable},
};

#[derive(Deserialize, ToSchema)]
pub struct GenerateReport {
    #[schema(value_type = String, example = "attendance")]
    pub report_type: ReportType,
    #[schema(value_type = String, example = "pdf")]
    pub format: ReportFormat,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-31", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    /// Restrict to one user; omit for everyone
    pub user_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct ReportQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Longest range a single report may cover.
const MAX_REPORT_DAYS: i64 = 366;

fn validate(req: &GenerateReport) -> ApiResult<ReportParams> {
    if req.start_date > req.end_date {
        return Err(ApiError::bad_request("start_date cannot be after end_date"));
    }
    if (req.end_date - req.start_date).num_days() >= MAX_REPORT_DAYS {
        return Err(ApiError::bad_request(format!(
            "A report may cover at most {MAX_REPORT_DAYS} days"
        )));
    }
    Ok(ReportParams {
        report_type: req.report_type,
        format: req.format,
        start_date: req.start_date,
        end_date: req.end_date,
        user_id: req.user_id,
    })
}

async fn attendance_rows(pool: &MySqlPool, params: &ReportParams) -> ApiResult<Vec<AttendanceReportRow>> {
    let mut sql = String::from(
        "SELECT u.full_name, u.email, a.date, a.clock_in, a.clock_out, a.status, \
         a.work_minutes, a.clock_in_distance_m \
         FROM attendance a JOIN users u ON u.id = a.user_id \
         WHERE a.date BETWEEN ? AND ?",
    );
    if params.user_id.is_some() {
        sql.push_str(" AND a.user_id = ?");
    }
    sql.push_str(" ORDER BY a.date, u.full_name");

    let mut q = sqlx::query_as::<_, AttendanceReportRow>(&sql)
        .bind(params.start_date)
        .bind(params.end_date);
    if let Some(user_id) = params.user_id {
        q = q.bind(user_id);
    }
    Ok(q.fetch_all(pool).await?)
}

async fn leave_rows(pool: &MySqlPool, params: &ReportParams) -> ApiResult<Vec<LeaveReportRow>> {
    let mut sql = String::from(
        "SELECT u.full_name, u.email, l.leave_type, l.start_date, l.end_date, l.status, l.reason \
         FROM leave_requests l JOIN users u ON u.id = l.user_id \
         WHERE l.start_date <= ? AND l.end_date >= ?",
    );
    if params.user_id.is_some() {
        sql.push_str(" AND l.user_id = ?");
    }
    sql.push_str(" ORDER BY l.start_date, u.full_name");

    let mut q = sqlx::query_as::<_, LeaveReportRow>(&sql)
        .bind(params.end_date)
        .bind(params.start_date);
    if let Some(user_id) = params.user_id {
        q = q.bind(user_id);
    }
    Ok(q.fetch_all(pool).await?)
}

async fn fetch_report(pool: &MySqlPool, id: u64) -> ApiResult<Option<Report>> {
    Ok(sqlx::query_as::<_, Report>(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

/// Generate a report file (admin/manager)
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = GenerateReport,
    responses(
        (status = 201, description = "Report generated", body = Report),
        (status = 400, description = "Invalid range or parameters"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn create_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<GenerateReport>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let params = validate(&payload)?;
    let settings = load_snapshot(pool.get_ref()).await?;

    let table: ReportTable = match params.report_type {
        ReportType::Attendance => {
            let rows = attendance_rows(pool.get_ref(), &params).await?;
            reports::attendance_table(&settings.company_name, &params, &rows)
        }
        ReportType::Leave => {
            let rows = leave_rows(pool.get_ref(), &params).await?;
            reports::leave_table(&settings.company_name, &params, &rows)
        }
    };

    let parameters = serde_json::to_string(&params).map_err(|_| ApiError::Internal)?;
    let file_name = params.file_name(&Uuid::new_v4().to_simple().to_string());
    let dir = config.reports_dir.clone();
    let format = params.format;
    let target = file_name.clone();
    let written = web::block(move || reports::write_report(&dir, &target, &table, format))
        .await?
        .map_err(|e| {
            error!(error = %e, "Failed to write report");
            ApiError::Internal
        })?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO reports (name, report_type, format, file_name, parameters, generated_by)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(params.display_name())
    .bind(params.report_type.as_ref())
    .bind(params.format.as_ref())
    .bind(&file_name)
    .bind(parameters)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await;
    let result = match inserted {
        Ok(result) => result,
        Err(e) => {
            // no row will ever point at the file
            remove_report_file(written).await;
            return Err(e.into());
        }
    };

    let report = fetch_report(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or(ApiError::Internal)?;

    info!(user_id = auth.user_id, report_id = report.id, file = %file_name, "Report generated");
    Ok(HttpResponse::Created().json(report))
}

async fn remove_report_file(path: PathBuf) {
    let file = path.display().to_string();
    match web::block(move || reports::discard_report(&path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, %file, "Failed to remove report file"),
        Err(e) => warn!(error = %e, %file, "Failed to remove report file"),
    }
}

/// List generated reports (admin/manager)
#[utoipa::path(
    get,
    path = "/api/reports",
    params(ReportQuery),
    responses(
        (status = 200, description = "Reports, newest first", body = ReportPage),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn list_reports(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let paging = Paging::new(query.page, query.per_page);

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reports")
        .fetch_one(pool.get_ref())
        .await?;
    let reports = sqlx::query_as::<_, Report>(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    ))
    .bind(paging.per_page)
    .bind(paging.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(paging.wrap(reports, total)))
}

/// Download a generated report (admin/manager)
#[utoipa::path(
    get,
    path = "/api/reports/download/{file_name}",
    params(("file_name" = String, Path, description = "File name as returned on generation")),
    responses(
        (status = 200, description = "File contents as an attachment"),
        (status = 400, description = "Invalid file name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Report not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn download_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let file_name = path.into_inner();
    let full_path = reports::resolve(&config.reports_dir, &file_name)
        .map_err(|_| ApiError::bad_request("Invalid file name"))?;

    let format = sqlx::query_scalar::<_, String>("SELECT format FROM reports WHERE file_name = ?")
        .bind(&file_name)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Report not found"))?;
    let format = format
        .parse::<ReportFormat>()
        .map_err(|_| ApiError::Internal)?;

    let bytes = match web::block(move || std::fs::read(full_path)).await? {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(file = %file_name, "Report row exists but file is missing");
            return Err(ApiError::not_found("Report file not found"));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ))
        .body(bytes))
}

/// Delete a report and its file (admin/manager)
#[utoipa::path(
    delete,
    path = "/api/reports/{id}",
    params(("id" = u64, Path, description = "Report id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Report not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn delete_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_staff()?;
    let report = fetch_report(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Report not found"))?;

    sqlx::query("DELETE FROM reports WHERE id = ?")
        .bind(report.id)
        .execute(pool.get_ref())
        .await?;

    // the row is gone either way; a stale file is only logged
    if let Ok(full_path) = reports::resolve(&config.reports_dir, &report.file_name) {
        remove_report_file(full_path).await;
    }

    info!(user_id = auth.user_id, report_id = report.id, "Report deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: (u32, u32), end: (u32, u32)) -> GenerateReport {
        GenerateReport {
            report_type: ReportType::Leave,
            format: ReportFormat::Csv,
            start_date: NaiveDate::from_ymd_opt(2026, start.0, start.1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, end.0, end.1).unwrap(),
            user_id: Some(3),
        }
    }

    #[test]
    fn valid_request_becomes_params() {
        let params = validate(&request((1, 1), (1, 31))).unwrap();
        assert_eq!(params.report_type, ReportType::Leave);
        assert_eq!(params.user_id, Some(3));
        assert!(params.file_name("x").ends_with(".csv"));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = validate(&request((2, 1), (1, 1))).err().unwrap();
        assert_eq!(err.to_string(), "start_date cannot be after end_date");
    }

    #[test]
    fn range_longer_than_a_year_is_rejected() {
        let mut req = request((1, 1), (1, 1));
        req.end_date = NaiveDate::from_ymd_opt(2027, 1, 2).unwrap();
        assert!(validate(&req).is_err());
    }

    #[test]
    fn parameters_are_serialized_lowercase() {
        let params = validate(&request((1, 1), (1, 31))).unwrap();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["report_type"], "leave");
        assert_eq!(json["format"], "csv");
        assert_eq!(json["start_date"], "2026-01-01");
    }

    #[actix_web::test]
    async fn unrecorded_report_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leave_20260101_20260131_x.csv");
        std::fs::write(&path, "Name\n").unwrap();

        remove_report_file(path.clone()).await;
        assert!(!path.exists());
        // already gone: only logged
        remove_report_file(path).await;
    }
}
