use anyhow::Context;

use crate::models::Report;

const NOT_AVAILABLE: &str = "N/A";

pub fn render_json(report: &Report) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report")
}

pub fn render_csv(report: &Report) -> anyhow::Result<Vec<u8>> {
    let summary = &report.summary;
    let highlights = &report.highlights;
    let mut output = Vec::new();

    {
        let mut writer = section_writer(&mut output);
        writer.write_record(["Lecturer Attendance Report"])?;
        writer.write_record(["Department:", summary.department_name.as_str()])?;
        writer.write_record(["Period:", summary.period.as_str()])?;
        writer.flush()?;
    }
    blank_row(&mut output);

    {
        let mut writer = section_writer(&mut output);
        writer.write_record(["STATISTICAL HIGHLIGHTS"])?;
        writer.write_record([
            "Most Present:",
            highlights
                .most_present_lecturer
                .as_deref()
                .unwrap_or(NOT_AVAILABLE),
        ])?;
        writer.write_record([
            "Most Absences:",
            highlights
                .highest_absence_lecturer
                .as_deref()
                .unwrap_or(NOT_AVAILABLE),
        ])?;
        writer.flush()?;
    }
    blank_row(&mut output);

    {
        let mut writer = section_writer(&mut output);
        writer.write_record(["DETAILED BREAKDOWN"])?;
        writer.write_record([
            "Lecturer Name",
            "Attended",
            "Missed",
            "Total Classes",
            "Attendance Rate (%)",
        ])?;

        for entry in &report.breakdown {
            writer.write_record([
                entry.lecturer_name.clone(),
                entry.classes_attended.to_string(),
                entry.classes_missed.to_string(),
                entry.total_classes.to_string(),
                format_rate(entry.attendance_rate),
            ])?;
        }
        writer.flush().context("failed to finish CSV output")?;
    }

    Ok(output)
}

// Sections have 1, 2 or 5 columns.
fn section_writer(output: &mut Vec<u8>) -> csv::Writer<&mut Vec<u8>> {
    csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .from_writer(output)
}

// csv writes `""` for an empty record, so blank separators bypass the encoder.
fn blank_row(output: &mut Vec<u8>) {
    output.extend_from_slice(b"\r\n");
}

/// Whole rates keep one decimal place: `100.0`, `0.0`, `66.67`.
pub fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{rate:.1}")
    } else {
        rate.to_string()
    }
}

pub fn suggested_filename(report: &Report) -> String {
    format!(
        "attendance_report_{}.csv",
        report.summary.department_name.replace(' ', "_")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AttendanceRecord, Department, ReportBreakdownEntry, ReportHighlights, ReportSummary,
    };
    use crate::report::build_report;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn scenario_report() -> Report {
        Report {
            summary: ReportSummary {
                department_name: "Computer Science".to_string(),
                period: "2026-03-01 to 2026-03-31".to_string(),
                total_classes_recorded: 5,
                overall_attendance_rate: 40.0,
            },
            breakdown: vec![
                ReportBreakdownEntry {
                    lecturer_name: "Amina Said".to_string(),
                    total_classes: 3,
                    classes_attended: 2,
                    classes_missed: 1,
                    attendance_rate: 66.67,
                },
                ReportBreakdownEntry {
                    lecturer_name: "Brian Otieno".to_string(),
                    total_classes: 2,
                    classes_attended: 0,
                    classes_missed: 2,
                    attendance_rate: 0.0,
                },
            ],
            highlights: ReportHighlights {
                most_present_lecturer: Some("Amina Said (2 classes)".to_string()),
                highest_absence_lecturer: Some("Brian Otieno (2 missed)".to_string()),
            },
        }
    }

    #[test]
    fn csv_follows_section_layout() {
        let bytes = render_csv(&scenario_report()).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        let expected = "Lecturer Attendance Report\r\n\
            Department:,Computer Science\r\n\
            Period:,2026-03-01 to 2026-03-31\r\n\
            \r\n\
            STATISTICAL HIGHLIGHTS\r\n\
            Most Present:,Amina Said (2 classes)\r\n\
            Most Absences:,Brian Otieno (2 missed)\r\n\
            \r\n\
            DETAILED BREAKDOWN\r\n\
            Lecturer Name,Attended,Missed,Total Classes,Attendance Rate (%)\r\n\
            Amina Said,2,1,3,66.67\r\n\
            Brian Otieno,0,2,2,0.0\r\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn aggregated_records_render_to_expected_csv() {
        let amina = Uuid::new_v4();
        let brian = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let mark = |lecturer_id, name: &str, present| AttendanceRecord {
            present,
            recorded_at: day.and_hms_opt(9, 0, 0).unwrap(),
            verified: true,
            lecturer_id,
            lecturer_name: name.to_string(),
        };
        let records = vec![
            mark(brian, "Brian Otieno", false),
            mark(amina, "Amina Said", true),
            mark(amina, "Amina Said", false),
            mark(brian, "Brian Otieno", false),
            mark(amina, "Amina Said", true),
        ];
        let department = Department {
            id: Uuid::new_v4(),
            name: "Computer Science".to_string(),
        };

        let report = build_report(
            &department,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            &records,
        );
        let text = String::from_utf8(render_csv(&report).unwrap()).unwrap();
        let expected = String::from_utf8(render_csv(&scenario_report()).unwrap()).unwrap();

        assert_eq!(text, expected);
        assert_eq!(
            suggested_filename(&report),
            "attendance_report_Computer_Science.csv"
        );
    }

    #[test]
    fn missing_highlights_render_as_not_available() {
        let mut report = scenario_report();
        report.breakdown.clear();
        report.highlights = ReportHighlights::default();

        let text = String::from_utf8(render_csv(&report).unwrap()).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();

        assert_eq!(lines[5], "Most Present:,N/A");
        assert_eq!(lines[6], "Most Absences:,N/A");
        assert_eq!(
            lines[9],
            "Lecturer Name,Attended,Missed,Total Classes,Attendance Rate (%)"
        );
        assert_eq!(lines[10], "");
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let mut report = scenario_report();
        report.breakdown[0].lecturer_name = "Said, Amina".to_string();

        let text = String::from_utf8(render_csv(&report).unwrap()).unwrap();
        assert!(text.contains("\"Said, Amina\",2,1,3,66.67\r\n"));
    }

    #[test]
    fn filename_replaces_every_space() {
        let mut report = scenario_report();
        report.summary.department_name = "Electrical and Computer Engineering".to_string();
        assert_eq!(
            suggested_filename(&report),
            "attendance_report_Electrical_and_Computer_Engineering.csv"
        );
    }

    #[test]
    fn rates_keep_a_decimal_place() {
        assert_eq!(format_rate(100.0), "100.0");
        assert_eq!(format_rate(0.0), "0.0");
        assert_eq!(format_rate(66.67), "66.67");
        assert_eq!(format_rate(12.5), "12.5");
    }

    #[test]
    fn json_keeps_null_highlights() {
        let mut report = scenario_report();
        report.highlights = ReportHighlights::default();

        let json: serde_json::Value =
            serde_json::from_str(&render_json(&report).unwrap()).unwrap();
        assert!(json["highlights"]["most_present_lecturer"].is_null());
        assert_eq!(json["summary"]["total_classes_recorded"], 5);
        assert_eq!(json["breakdown"][0]["attendance_rate"], 66.67);
    }
}
