use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AttendanceRecord, Department, PendingAttendance};
use crate::report::AttendanceStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

impl AttendanceStore for PgPool {
    async fn find_department(&self, id: Uuid) -> anyhow::Result<Option<Department>> {
        let row = sqlx::query("SELECT id, name FROM attendance_tracking.departments WHERE id = $1")
            .bind(id)
            .fetch_optional(self)
            .await?;

        Ok(row.map(|row| Department {
            id: row.get("id"),
            name: row.get("name"),
        }))
    }

    // Scoped by the lecturer's home department, not the subject's.
    async fn fetch_verified_records(
        &self,
        department_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT a.present, a.recorded_at, a.verified,
                   u.id AS lecturer_id, u.full_name AS lecturer_name
            FROM attendance_tracking.attendance a
            JOIN attendance_tracking.class_schedules cs ON cs.id = a.class_schedule_id
            JOIN attendance_tracking.users u ON u.id = cs.lecturer_id
            WHERE u.department_id = $1
              AND a.verified = TRUE
              AND a.recorded_at >= $2
              AND a.recorded_at <= $3
            ORDER BY a.recorded_at, a.id
            "#,
        )
        .bind(department_id)
        .bind(from)
        .bind(to)
        .fetch_all(self)
        .await
        .context("failed to fetch verified attendance")?;

        Ok(rows
            .into_iter()
            .map(|row| AttendanceRecord {
                present: row.get("present"),
                recorded_at: row.get("recorded_at"),
                verified: row.get("verified"),
                lecturer_id: row.get("lecturer_id"),
                lecturer_name: row.get("lecturer_name"),
            })
            .collect())
    }
}

/// Unverified records for subjects owned by `department_id`, newest first.
pub async fn fetch_pending(
    pool: &PgPool,
    department_id: Uuid,
) -> anyhow::Result<Vec<PendingAttendance>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, s.name AS subject_name, u.full_name AS lecturer_name,
               a.present, a.recorded_at
        FROM attendance_tracking.attendance a
        JOIN attendance_tracking.class_schedules cs ON cs.id = a.class_schedule_id
        JOIN attendance_tracking.subjects s ON s.id = cs.subject_id
        JOIN attendance_tracking.users u ON u.id = cs.lecturer_id
        WHERE a.verified = FALSE
          AND s.department_id = $1
        ORDER BY a.recorded_at DESC
        "#,
    )
    .bind(department_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PendingAttendance {
            id: row.get("id"),
            subject_name: row.get("subject_name"),
            lecturer_name: row.get("lecturer_name"),
            present: row.get("present"),
            recorded_at: row.get("recorded_at"),
        })
        .collect())
}

/// Marks a record verified on behalf of the HOD of `department_id`, which must
/// own the record's subject.
pub async fn verify_attendance(
    pool: &PgPool,
    attendance_id: Uuid,
    department_id: Uuid,
) -> anyhow::Result<()> {
    let owner: Option<Uuid> = sqlx::query(
        r#"
        SELECT s.department_id
        FROM attendance_tracking.attendance a
        JOIN attendance_tracking.class_schedules cs ON cs.id = a.class_schedule_id
        JOIN attendance_tracking.subjects s ON s.id = cs.subject_id
        WHERE a.id = $1
        "#,
    )
    .bind(attendance_id)
    .fetch_optional(pool)
    .await?
    .map(|row| row.get("department_id"));

    ensure_verifiable(attendance_id, owner, department_id)?;

    sqlx::query(
        r#"
        UPDATE attendance_tracking.attendance a
        SET verified = TRUE
        FROM attendance_tracking.class_schedules cs
        JOIN attendance_tracking.subjects s ON s.id = cs.subject_id
        WHERE a.id = $1
          AND cs.id = a.class_schedule_id
          AND s.department_id = $2
        "#,
    )
    .bind(attendance_id)
    .bind(department_id)
    .execute(pool)
    .await?;
    Ok(())
}

fn ensure_verifiable(
    attendance_id: Uuid,
    owner: Option<Uuid>,
    department_id: Uuid,
) -> anyhow::Result<()> {
    match owner {
        None => anyhow::bail!("Attendance record not found: {attendance_id}"),
        Some(owner) if owner != department_id => anyhow::bail!(
            "Attendance record {attendance_id} belongs to another department"
        ),
        Some(_) => Ok(()),
    }
}

async fn upsert_department(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO attendance_tracking.departments (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_lecturer(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    department_id: Uuid,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO attendance_tracking.users (id, full_name, email, role, department_id)
        VALUES ($1, $2, $3, 'Lecturer', $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, department_id = EXCLUDED.department_id
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(department_id)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_subject(
    pool: &PgPool,
    code: &str,
    name: &str,
    department_id: Uuid,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO attendance_tracking.subjects (id, code, name, department_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(name)
    .bind(department_id)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_schedule(
    pool: &PgPool,
    subject_id: Uuid,
    lecturer_id: Uuid,
    day_of_week: &str,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO attendance_tracking.class_schedules
        (id, subject_id, lecturer_id, day_of_week, start_time, end_time)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (subject_id, lecturer_id, day_of_week, start_time) DO UPDATE
        SET end_time = EXCLUDED.end_time
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subject_id)
    .bind(lecturer_id)
    .bind(day_of_week)
    .bind(start_time)
    .bind(end_time)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Returns false when the key was already imported or the class already has
/// a mark for that day.
async fn insert_attendance(
    pool: &PgPool,
    schedule_id: Uuid,
    present: bool,
    verified: bool,
    recorded_at: NaiveDateTime,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_tracking.attendance
        (id, class_schedule_id, present, recorded_at, verified, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(schedule_id)
    .bind(present)
    .bind(recorded_at)
    .bind(verified)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn at(date: NaiveDate, hour: u32) -> anyhow::Result<NaiveDateTime> {
    date.and_hms_opt(hour, 0, 0).context("invalid time")
}

fn class_time(hour: u32) -> anyhow::Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, 0, 0).context("invalid time")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let computing = upsert_department(pool, "Computer Science").await?;
    let maths = upsert_department(pool, "Mathematics").await?;

    let amina = upsert_lecturer(pool, "Amina Said", "amina.said@campus.ac.tz", computing).await?;
    let brian =
        upsert_lecturer(pool, "Brian Otieno", "brian.otieno@campus.ac.tz", computing).await?;
    let grace = upsert_lecturer(pool, "Grace Mollel", "grace.mollel@campus.ac.tz", maths).await?;

    let databases = upsert_subject(pool, "CS210", "Database Systems", computing).await?;
    let networks = upsert_subject(pool, "CS230", "Computer Networks", computing).await?;
    // A maths lecturer teaching a computing subject still reports under Mathematics.
    let discrete = upsert_subject(pool, "CS150", "Discrete Structures", computing).await?;

    let monday = NaiveDate::from_ymd_opt(2026, 3, 2).context("invalid date")?;
    let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).context("invalid date")?;
    let thursday = NaiveDate::from_ymd_opt(2026, 3, 5).context("invalid date")?;

    let schedules = [
        (
            upsert_schedule(pool, databases, amina, "Monday", class_time(8)?, class_time(10)?)
                .await?,
            monday,
            8,
        ),
        (
            upsert_schedule(pool, networks, brian, "Tuesday", class_time(10)?, class_time(12)?)
                .await?,
            tuesday,
            10,
        ),
        (
            upsert_schedule(pool, discrete, grace, "Thursday", class_time(14)?, class_time(16)?)
                .await?,
            thursday,
            14,
        ),
    ];

    // (schedule index, week offset, present, verified)
    let marks = [
        (0, 0, true, true),
        (0, 1, true, true),
        (0, 2, false, true),
        (0, 3, true, false),
        (1, 0, false, true),
        (1, 1, false, true),
        (1, 2, true, false),
        (2, 0, true, true),
        (2, 1, true, true),
    ];

    let mut inserted = 0usize;
    for (index, (schedule, week, present, verified)) in marks.into_iter().enumerate() {
        let (schedule_id, first_day, start_hour) = schedules[schedule];
        let day = first_day + chrono::Duration::weeks(week);
        let source_key = format!("seed-{:03}", index + 1);
        if insert_attendance(
            pool,
            schedule_id,
            present,
            verified,
            at(day, start_hour)?,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    info!(inserted, "seeded attendance records");
    Ok(())
}

#[derive(serde::Deserialize)]
struct CsvRow {
    department: String,
    lecturer_name: String,
    lecturer_email: String,
    subject_code: String,
    subject_name: String,
    /// Owner of the subject when it differs from the lecturer's department.
    #[serde(default)]
    subject_department: Option<String>,
    day_of_week: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    present: bool,
    verified: bool,
    recorded_at: NaiveDateTime,
    source_key: Option<String>,
}

impl CsvRow {
    fn subject_department(&self) -> &str {
        self.subject_department
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.department.as_str())
    }
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 1))?;

        let department_id = upsert_department(pool, &row.department).await?;
        let lecturer_id =
            upsert_lecturer(pool, &row.lecturer_name, &row.lecturer_email, department_id).await?;
        let subject_department_id = if row.subject_department() == row.department {
            department_id
        } else {
            upsert_department(pool, row.subject_department()).await?
        };
        let subject_id = upsert_subject(
            pool,
            &row.subject_code,
            &row.subject_name,
            subject_department_id,
        )
        .await?;
        let schedule_id = upsert_schedule(
            pool,
            subject_id,
            lecturer_id,
            &row.day_of_week,
            row.start_time,
            row.end_time,
        )
        .await?;

        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_attendance(
            pool,
            schedule_id,
            row.present,
            row.verified,
            row.recorded_at,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        } else {
            debug!(source_key = %source_key, "skipped duplicate attendance row");
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "department,lecturer_name,lecturer_email,subject_code,subject_name,\
        subject_department,day_of_week,start_time,end_time,present,verified,recorded_at,source_key";

    fn parse_rows(body: &str) -> Vec<CsvRow> {
        let data = format!("{HEADER}\n{body}");
        csv::Reader::from_reader(data.as_bytes())
            .deserialize()
            .collect::<Result<Vec<CsvRow>, _>>()
            .unwrap()
    }

    #[test]
    fn subject_department_defaults_to_lecturer_department() {
        let rows = parse_rows(
            "Mathematics,Grace Mollel,grace@campus.ac.tz,MA101,Calculus I,,Monday,\
             08:00:00,10:00:00,true,true,2026-03-02T08:00:00,k-1\n\
             Mathematics,Grace Mollel,grace@campus.ac.tz,CS150,Discrete Structures,\
             Computer Science,Thursday,14:00:00,16:00:00,true,false,2026-03-05T14:00:00,",
        );

        assert_eq!(rows[0].subject_department(), "Mathematics");
        assert_eq!(rows[1].subject_department(), "Computer Science");
        assert_eq!(rows[1].department, "Mathematics");
        assert!(rows[1].source_key.is_none());
    }

    #[test]
    fn subject_department_column_is_optional() {
        let data = "department,lecturer_name,lecturer_email,subject_code,subject_name,\
            day_of_week,start_time,end_time,present,verified,recorded_at\n\
            Physics,Juma Hassan,juma@campus.ac.tz,PH110,Mechanics,Friday,\
            09:00:00,11:00:00,false,true,2026-03-06T09:00:00\n";
        let rows: Vec<CsvRow> = csv::Reader::from_reader(data.as_bytes())
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows[0].subject_department(), "Physics");
    }

    #[test]
    fn verify_requires_matching_department() {
        let record = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(ensure_verifiable(record, Some(owner), owner).is_ok());

        let err = ensure_verifiable(record, Some(owner), other).unwrap_err();
        assert!(err.to_string().contains("belongs to another department"));

        let err = ensure_verifiable(record, None, owner).unwrap_err();
        assert!(err.to_string().starts_with("Attendance record not found"));
    }
}
