use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::{
    AttendanceRecord, Department, LecturerStat, Report, ReportBreakdownEntry, ReportFilters,
    ReportHighlights, ReportSummary,
};

/// Read-only access to the data a report is built from.
pub trait AttendanceStore {
    async fn find_department(&self, id: Uuid) -> anyhow::Result<Option<Department>>;

    /// Verified records taught by lecturers whose home department is
    /// `department_id`, with `from <= recorded_at <= to`.
    async fn fetch_verified_records(
        &self,
        department_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<AttendanceRecord>>;
}

struct ValidFilters {
    start_date: NaiveDate,
    end_date: NaiveDate,
    department_id: Uuid,
}

pub async fn compute_report<S: AttendanceStore>(
    store: &S,
    filters: &ReportFilters,
) -> Result<Report, ReportError> {
    let filters = validate_filters(filters)?;

    let department = store
        .find_department(filters.department_id)
        .await?
        .ok_or_else(|| ReportError::DepartmentNotFound(filters.department_id.to_string()))?;

    let (from, to) = day_bounds(filters.start_date, filters.end_date);
    let records = store
        .fetch_verified_records(department.id, from, to)
        .await?;
    info!(
        department = %department.name,
        records = records.len(),
        "building attendance report"
    );

    Ok(build_report(
        &department,
        filters.start_date,
        filters.end_date,
        &records,
    ))
}

fn validate_filters(filters: &ReportFilters) -> Result<ValidFilters, ReportError> {
    let start = required(&filters.start_date);
    let end = required(&filters.end_date);
    let department = required(&filters.department_id);

    let (Some(start), Some(end), Some(department)) = (start, end, department) else {
        return Err(ReportError::MissingFilter);
    };

    Ok(ValidFilters {
        start_date: parse_date("start_date", start)?,
        end_date: parse_date("end_date", end)?,
        // An id that cannot be parsed cannot resolve to a department either.
        department_id: Uuid::parse_str(department)
            .map_err(|_| ReportError::DepartmentNotFound(department.to_string()))?,
    })
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ReportError::InvalidFilter {
        field,
        value: value.to_string(),
    })
}

/// Start of `start` through the last microsecond of `end`.
pub fn day_bounds(start: NaiveDate, end: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let from = start.and_time(NaiveTime::MIN);
    let to = end.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::microseconds(1);
    (from, to)
}

pub fn build_report(
    department: &Department,
    start_date: NaiveDate,
    end_date: NaiveDate,
    records: &[AttendanceRecord],
) -> Report {
    let eligible: Vec<&AttendanceRecord> = records.iter().filter(|r| r.verified).collect();
    let total_classes = eligible.len();
    let total_present = eligible.iter().filter(|r| r.present).count();

    // Lecturers stay in first-seen order; highlight ties depend on it.
    let mut order: Vec<Uuid> = Vec::new();
    let mut stats: HashMap<Uuid, LecturerStat> = HashMap::new();

    for record in &eligible {
        let entry = stats.entry(record.lecturer_id).or_insert_with(|| {
            order.push(record.lecturer_id);
            LecturerStat {
                lecturer_name: record.lecturer_name.clone(),
                total_classes: 0,
                classes_attended: 0,
            }
        });

        entry.total_classes += 1;
        if record.present {
            entry.classes_attended += 1;
        }
    }

    let mut breakdown: Vec<ReportBreakdownEntry> = order
        .iter()
        .filter_map(|id| stats.remove(id))
        .map(|stat| {
            debug!(
                lecturer = %stat.lecturer_name,
                total = stat.total_classes,
                attended = stat.classes_attended,
                "lecturer tally"
            );
            ReportBreakdownEntry {
                classes_missed: stat.total_classes - stat.classes_attended,
                attendance_rate: percentage(stat.classes_attended, stat.total_classes),
                lecturer_name: stat.lecturer_name,
                total_classes: stat.total_classes,
                classes_attended: stat.classes_attended,
            }
        })
        .collect();

    let highlights = pick_highlights(&breakdown);
    breakdown.sort_by(|a, b| a.lecturer_name.cmp(&b.lecturer_name));

    Report {
        summary: ReportSummary {
            department_name: department.name.clone(),
            period: format!("{start_date} to {end_date}"),
            total_classes_recorded: total_classes,
            overall_attendance_rate: percentage(total_present, total_classes),
        },
        breakdown,
        highlights,
    }
}

fn pick_highlights(entries: &[ReportBreakdownEntry]) -> ReportHighlights {
    let most_present = first_max_by(entries, |e| e.classes_attended as f64);
    let highest_absence = first_max_by(entries, missed_fraction);

    ReportHighlights {
        most_present_lecturer: most_present
            .map(|e| format!("{} ({} classes)", e.lecturer_name, e.classes_attended)),
        highest_absence_lecturer: highest_absence
            .map(|e| format!("{} ({} missed)", e.lecturer_name, e.classes_missed)),
    }
}

/// Largest element by `key`; on equal keys the earliest element wins.
fn first_max_by<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        let value = key(item);
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((item, value)),
        }
    }
    best.map(|(item, _)| item)
}

fn missed_fraction(entry: &ReportBreakdownEntry) -> f64 {
    if entry.total_classes == 0 {
        0.0
    } else {
        entry.classes_missed as f64 / entry.total_classes as f64
    }
}

pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

/// Rounds the exact binary value to 2 places, ties to even: 3.125 becomes 3.12.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}
