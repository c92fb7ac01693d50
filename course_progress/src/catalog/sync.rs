//! Catalog synchronization (courses, chapters, lessons).
//!
//! ## What this does
//! - Normalizes a [`Catalog`] (see [`normalize_catalog`]).
//! - Compares every course, chapter, and lesson against the stored row at the
//!   same key: course by slug, chapter by (course, position), lesson by
//!   (chapter, position).
//! - UPSERTs whatever is new or changed. Running the same catalog twice is a
//!   no-op the second time.
//!
//! ## Transactions
//! Everything runs inside one `BEGIN IMMEDIATE` transaction via
//! `SqliteConnection::immediate_transaction`; either the whole catalog lands or
//! none of it does.
//!
//! ## Dry-run
//! With `SyncOptions::dry_run` the same comparison runs and the returned
//! [`SyncSummary`] reports what would change, but nothing is written.
//!
//! ## No pruning
//! Rows absent from the TOML are left alone. Deleting a lesson would cascade
//! into students' progress rows.

use anyhow::Context;
use diesel::SqliteConnection;
use diesel::insert_into;
use diesel::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::config::{Catalog, ChapterCfg, CourseCfg, normalize_catalog};
use crate::models::{CourseRow, NewChapter, NewCourse, NewLesson};
use crate::schema::{chapter, course, lesson};

/// Options for catalog synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// If true, compute the summary only and write nothing.
    pub dry_run: bool,
}

/// Per-entity outcome counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    /// Rows that did not exist yet.
    pub created: usize,
    /// Rows whose stored values differ from the catalog.
    pub updated: usize,
    /// Rows already matching the catalog.
    pub unchanged: usize,
}

impl SyncCounts {
    fn record(&mut self, change: Change) {
        match change {
            Change::Created => self.created += 1,
            Change::Updated => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }

    fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0
    }
}

/// What a sync did (or, on dry run, would do).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Course outcomes.
    pub courses: SyncCounts,
    /// Chapter outcomes.
    pub chapters: SyncCounts,
    /// Lesson outcomes.
    pub lessons: SyncCounts,
}

impl SyncSummary {
    /// True when nothing was (or would be) created or updated.
    pub fn is_noop(&self) -> bool {
        self.courses.is_noop() && self.chapters.is_noop() && self.lessons.is_noop()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Created,
    Updated,
    Unchanged,
}

fn position_at(index: usize) -> anyhow::Result<i32> {
    i32::try_from(index + 1).context("position does not fit in i32")
}

/// Upsert a course by slug; returns its id.
pub fn upsert_course(conn: &mut SqliteConnection, row: &NewCourse<'_>) -> QueryResult<i64> {
    insert_into(course::table)
        .values(row)
        .on_conflict(course::slug)
        .do_update()
        .set(row)
        .returning(course::id)
        .get_result(conn)
}

/// Upsert a chapter by (course_id, position); returns its id.
pub fn upsert_chapter(conn: &mut SqliteConnection, row: &NewChapter<'_>) -> QueryResult<i64> {
    insert_into(chapter::table)
        .values(row)
        .on_conflict((chapter::course_id, chapter::position))
        .do_update()
        .set(row)
        .returning(chapter::id)
        .get_result(conn)
}

/// Upsert a lesson by (chapter_id, position); returns its id.
pub fn upsert_lesson(conn: &mut SqliteConnection, row: &NewLesson<'_>) -> QueryResult<i64> {
    insert_into(lesson::table)
        .values(row)
        .on_conflict((lesson::chapter_id, lesson::position))
        .do_update()
        .set(row)
        .returning(lesson::id)
        .get_result(conn)
}

/// Sync the course catalog into SQLite.
///
/// Errors: normalization failures, and any database error (the transaction is
/// rolled back).
pub fn sync_catalog(
    conn: &mut SqliteConnection,
    mut cat: Catalog,
    opt: SyncOptions,
) -> anyhow::Result<SyncSummary> {
    normalize_catalog(&mut cat).context("normalize_catalog failed")?;

    let summary = conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let mut summary = SyncSummary {
            dry_run: opt.dry_run,
            ..SyncSummary::default()
        };
        for (slug, cfg) in &cat.courses {
            sync_course(conn, slug, cfg, opt, &mut summary)
                .with_context(|| format!("sync course {slug}"))?;
        }
        Ok(summary)
    })?;

    info!(
        dry_run = summary.dry_run,
        courses_created = summary.courses.created,
        courses_updated = summary.courses.updated,
        chapters_created = summary.chapters.created,
        chapters_updated = summary.chapters.updated,
        lessons_created = summary.lessons.created,
        lessons_updated = summary.lessons.updated,
        "catalog sync finished"
    );
    Ok(summary)
}

fn sync_course(
    conn: &mut SqliteConnection,
    slug: &str,
    cfg: &CourseCfg,
    opt: SyncOptions,
    summary: &mut SyncSummary,
) -> anyhow::Result<()> {
    let existing: Option<CourseRow> = course::table
        .filter(course::slug.eq(slug))
        .select(CourseRow::as_select())
        .first(conn)
        .optional()?;

    let change = match &existing {
        None => Change::Created,
        Some(c)
            if c.title == cfg.title
                && c.teacher_name == cfg.teacher
                && c.published == cfg.published =>
        {
            Change::Unchanged
        }
        Some(_) => Change::Updated,
    };
    summary.courses.record(change);

    let course_id = if opt.dry_run || change == Change::Unchanged {
        existing.map(|c| c.id)
    } else {
        let row = NewCourse {
            slug,
            title: &cfg.title,
            teacher_name: &cfg.teacher,
            published: cfg.published,
        };
        Some(upsert_course(conn, &row)?)
    };
    debug!(slug, ?change, "course compared");

    for (i, ch) in cfg.chapters.iter().enumerate() {
        sync_chapter(conn, course_id, position_at(i)?, ch, opt, summary)?;
    }
    Ok(())
}

fn sync_chapter(
    conn: &mut SqliteConnection,
    course_id: Option<i64>,
    position: i32,
    cfg: &ChapterCfg,
    opt: SyncOptions,
    summary: &mut SyncSummary,
) -> anyhow::Result<()> {
    // course_id is None only on a dry run for a course that does not exist yet.
    let existing: Option<(i64, String)> = match course_id {
        Some(course_id) => chapter::table
            .filter(chapter::course_id.eq(course_id))
            .filter(chapter::position.eq(position))
            .select((chapter::id, chapter::title))
            .first(conn)
            .optional()?,
        None => None,
    };

    let change = match &existing {
        None => Change::Created,
        Some((_, title)) if *title == cfg.title => Change::Unchanged,
        Some(_) => Change::Updated,
    };
    summary.chapters.record(change);

    let chapter_id = match (course_id, opt.dry_run || change == Change::Unchanged) {
        (Some(course_id), false) => Some(upsert_chapter(
            conn,
            &NewChapter {
                course_id,
                title: &cfg.title,
                position,
            },
        )?),
        _ => existing.map(|(id, _)| id),
    };

    for (i, l) in cfg.lessons.iter().enumerate() {
        let position = position_at(i)?;
        let duration_seconds = l.duration_seconds.unwrap_or(0);

        let existing: Option<(i64, String, i64)> = match chapter_id {
            Some(chapter_id) => lesson::table
                .filter(lesson::chapter_id.eq(chapter_id))
                .filter(lesson::position.eq(position))
                .select((lesson::id, lesson::title, lesson::duration_seconds))
                .first(conn)
                .optional()?,
            None => None,
        };
        let change = match &existing {
            None => Change::Created,
            Some((_, title, d)) if *title == l.title && *d == duration_seconds => {
                Change::Unchanged
            }
            Some(_) => Change::Updated,
        };
        summary.lessons.record(change);

        if let (Some(chapter_id), false) = (chapter_id, opt.dry_run || change == Change::Unchanged)
        {
            upsert_lesson(
                conn,
                &NewLesson {
                    chapter_id,
                    title: &l.title,
                    position,
                    duration_seconds,
                },
            )?;
        }
    }
    Ok(())
}
