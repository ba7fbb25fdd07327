use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

/// A single attendance mark, already resolved to the lecturer who taught the
/// scheduled class.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub present: bool,
    pub recorded_at: NaiveDateTime,
    pub verified: bool,
    pub lecturer_id: Uuid,
    pub lecturer_name: String,
}

#[derive(Debug, Clone)]
pub struct LecturerStat {
    pub lecturer_name: String,
    pub total_classes: usize,
    pub classes_attended: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBreakdownEntry {
    pub lecturer_name: String,
    pub total_classes: usize,
    pub classes_attended: usize,
    pub classes_missed: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub department_name: String,
    pub period: String,
    pub total_classes_recorded: usize,
    pub overall_attendance_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportHighlights {
    pub most_present_lecturer: Option<String>,
    pub highest_absence_lecturer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub breakdown: Vec<ReportBreakdownEntry>,
    pub highlights: ReportHighlights,
}

/// Report request as received from the caller. Fields stay raw so that
/// validation can tell "missing" apart from "malformed".
#[derive(Debug, Clone)]
pub struct ReportFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub department_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PendingAttendance {
    pub id: Uuid,
    pub subject_name: String,
    pub lecturer_name: String,
    pub present: bool,
    pub recorded_at: NaiveDateTime,
}
