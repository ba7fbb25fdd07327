use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod db;
mod error;
mod export;
mod models;
mod report;

use models::ReportFilters;

#[derive(Parser)]
#[command(name = "attendance-report")]
#[command(about = "Lecturer class attendance tracking and reporting", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "ATTENDANCE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List attendance awaiting HOD verification
    Pending {
        #[arg(long)]
        department_id: Uuid,
    },
    /// Mark an attendance record as verified
    Verify {
        #[arg(long)]
        attendance_id: Uuid,
        /// Department of the verifying HOD; must own the record's subject
        #[arg(long)]
        department_id: Uuid,
    },
    /// Generate a lecturer attendance report for a department
    Report {
        #[arg(long)]
        department_id: Option<String>,
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        /// Defaults to stdout for JSON and the suggested filename for CSV
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} attendance records from {}.", csv.display());
        }
        Commands::Pending { department_id } => {
            let pending = db::fetch_pending(&pool, department_id).await?;

            if pending.is_empty() {
                println!("No attendance awaiting verification.");
                return Ok(());
            }

            println!("Attendance awaiting verification:");
            for record in &pending {
                println!(
                    "- {} {} / {} on {} ({})",
                    record.id,
                    record.subject_name,
                    record.lecturer_name,
                    record.recorded_at.format("%Y-%m-%d %H:%M"),
                    if record.present { "present" } else { "absent" }
                );
            }
        }
        Commands::Verify {
            attendance_id,
            department_id,
        } => {
            db::verify_attendance(&pool, attendance_id, department_id).await?;
            info!(%attendance_id, "attendance verified");
            println!("Attendance verified.");
        }
        Commands::Report {
            department_id,
            start_date,
            end_date,
            format,
            out,
        } => {
            let filters = ReportFilters {
                start_date,
                end_date,
                department_id,
            };
            let report = report::compute_report(&pool, &filters)
                .await
                .inspect_err(|err| warn!(error = %err, "report rejected"))?;

            match format {
                ReportFormat::Json => {
                    let json = export::render_json(&report)?;
                    match out {
                        Some(path) => {
                            std::fs::write(&path, json)?;
                            println!("Report written to {}.", path.display());
                        }
                        None => println!("{json}"),
                    }
                }
                ReportFormat::Csv => {
                    let bytes = export::render_csv(&report)?;
                    let path =
                        out.unwrap_or_else(|| PathBuf::from(export::suggested_filename(&report)));
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
            }
        }
    }

    Ok(())
}
