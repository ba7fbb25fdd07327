use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Missing required report filters")]
    MissingFilter,
    #[error("Invalid {field} filter: {value:?}")]
    InvalidFilter { field: &'static str, value: String },
    #[error("Department not found: {0}")]
    DepartmentNotFound(String),
    #[error("failed to read attendance data")]
    Store(#[from] anyhow::Error),
}
