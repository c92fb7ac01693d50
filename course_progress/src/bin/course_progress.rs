use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use course_progress::api::ErrorBody;
use course_progress::catalog::{SyncOptions, load_catalog_path, sync_catalog};
use course_progress::db::migrate;
use course_progress::progress::ProgressAggregator;
use course_progress::store::SqliteStore;
use shared_utils::env::{get_env_var, get_env_var_or};
use shared_utils::logging::init_tracing;

#[derive(Parser)]
#[command(version, about = "Course progress CLI")]
struct Cli {
    /// SQLite database (path or `sqlite:` URL); falls back to DATABASE_URL.
    #[arg(long, global = true, value_name = "URL")]
    database: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    Catalog(CatalogCmd),
    Student(StudentCmd),
    /// Enroll a student in a course (idempotent).
    Enroll {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        course: i64,
    },
    Progress(ProgressCmd),
}

#[derive(Args)]
struct CatalogCmd {
    #[command(subcommand)]
    sub: CatalogSub,
}

#[derive(Subcommand)]
enum CatalogSub {
    /// Upsert courses, chapters, and lessons from a TOML file.
    Sync {
        #[arg(long, value_name = "FILE")]
        file: String,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct StudentCmd {
    #[command(subcommand)]
    sub: StudentSub,
}

#[derive(Subcommand)]
enum StudentSub {
    /// Register a student.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

#[derive(Args)]
struct ProgressCmd {
    #[command(subcommand)]
    sub: ProgressSub,
}

#[derive(Subcommand)]
enum ProgressSub {
    /// Report watch state for a lesson.
    Report {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        lesson: i64,
        #[arg(long, allow_negative_numbers = true)]
        watch_time: i64,
        #[arg(long)]
        completed: bool,
    },
    /// Recompute a student's course progress from stored lesson rows.
    Recompute {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        course: i64,
    },
    /// List a student's lesson progress in a course.
    Show {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        course: i64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the structured error body, then hand the error back for the exit code.
fn reject<E>(body: ErrorBody, err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let Err(e) = print_json(&body) {
        tracing::warn!(error = %e, "could not print error body");
    }
    anyhow::Error::new(err)
}

fn main() -> Result<()> {
    init_tracing(&get_env_var_or("COURSE_PROGRESS_LOG", "info"))?;
    let cli = Cli::parse();

    let db_url = match cli.database {
        Some(url) => url,
        None => get_env_var("DATABASE_URL")?,
    };

    match cli.cmd {
        Cmd::Migrate => {
            migrate::run_all(&db_url).context("run migrations")?;
            info!("migrations applied");
        }
        Cmd::Catalog(CatalogCmd {
            sub: CatalogSub::Sync { file, dry_run },
        }) => {
            let cat = load_catalog_path(&file)?;
            let store = SqliteStore::open(&db_url)?;
            let summary = sync_catalog(&mut store.lock(), cat, SyncOptions { dry_run })?;
            print_json(&summary)?;
        }
        Cmd::Student(StudentCmd {
            sub: StudentSub::Add { name, email },
        }) => {
            let store = SqliteStore::open(&db_url)?;
            let id = store
                .add_student(&name, &email)
                .map_err(|e| reject(ErrorBody::from(&e), e))?;
            print_json(&serde_json::json!({ "id": id, "name": name, "email": email }))?;
        }
        Cmd::Enroll { student, course } => {
            let store = SqliteStore::open(&db_url)?;
            let agg = ProgressAggregator::new(&store, &store);
            let enrollment = agg
                .enroll(student, course)
                .map_err(|e| reject(ErrorBody::from(&e), e))?;
            print_json(&enrollment)?;
        }
        Cmd::Progress(ProgressCmd { sub }) => {
            let store = SqliteStore::open(&db_url)?;
            let agg = ProgressAggregator::new(&store, &store);
            match sub {
                ProgressSub::Report {
                    student,
                    lesson,
                    watch_time,
                    completed,
                } => {
                    let report = agg
                        .report_lesson_progress(student, lesson, watch_time, completed)
                        .map_err(|e| reject(ErrorBody::from(&e), e))?;
                    print_json(&report)?;
                }
                ProgressSub::Recompute { student, course } => {
                    let enrollment = agg
                        .recompute_course_progress(student, course)
                        .map_err(|e| reject(ErrorBody::from(&e), e))?;
                    print_json(&enrollment)?;
                }
                ProgressSub::Show { student, course } => {
                    let rows = agg
                        .course_progress(student, course)
                        .map_err(|e| reject(ErrorBody::from(&e), e))?;
                    print_json(&rows)?;
                }
            }
        }
    }

    Ok(())
}
