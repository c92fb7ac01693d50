//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::course`], [`crate::schema::chapter`], [`crate::schema::lesson`]: the catalog
//! - [`crate::schema::student`]: registered students
//! - [`crate::schema::enrollment`]: per-course registration plus cached progress
//! - [`crate::schema::lesson_progress`]: per-lesson watch state
//!
//! Timestamps are RFC-3339 TEXT; conversion into the domain types in
//! [`crate::progress`] goes through [`crate::tz`] and fails with
//! `DataIntegrity` on malformed values.

use diesel::prelude::*;

use crate::error::ProgressError;
use crate::progress::{Enrollment, LessonProgress, LessonProgressView};
use crate::schema::*;
use crate::tz;

/// A row in [`crate::schema::course`].
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = course, check_for_backend(diesel::sqlite::Sqlite))]
pub struct CourseRow {
    /// Primary key.
    pub id: i64,
    /// Unique lowercase slug (e.g., "rust-101").
    pub slug: String,
    /// Display title.
    pub title: String,
    /// Publishing teacher's display name.
    pub teacher_name: String,
    /// Visible in the marketplace.
    pub published: bool,
}

/// Insertable/changeset form of [`CourseRow`], keyed by slug on conflict.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = course)]
pub struct NewCourse<'a> {
    /// Unique slug.
    pub slug: &'a str,
    /// Display title.
    pub title: &'a str,
    /// Teacher display name.
    pub teacher_name: &'a str,
    /// Visible in the marketplace.
    pub published: bool,
}

/// Insertable/changeset form of a chapter, keyed by (course_id, position) on conflict.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = chapter)]
pub struct NewChapter<'a> {
    /// FK to [`CourseRow::id`].
    pub course_id: i64,
    /// Display title.
    pub title: &'a str,
    /// 1-based position within the course.
    pub position: i32,
}

/// Insertable/changeset form of a lesson, keyed by (chapter_id, position) on conflict.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = lesson)]
pub struct NewLesson<'a> {
    /// FK to the chapter.
    pub chapter_id: i64,
    /// Display title.
    pub title: &'a str,
    /// 1-based position within the chapter.
    pub position: i32,
    /// Nominal length in seconds.
    pub duration_seconds: i64,
}

/// Insertable form of a student.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = student)]
pub struct NewStudent<'a> {
    /// Display name.
    pub name: &'a str,
    /// Unique e-mail address.
    pub email: &'a str,
}

/// A row in [`crate::schema::enrollment`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = enrollment, check_for_backend(diesel::sqlite::Sqlite))]
pub struct EnrollmentRow {
    /// Primary key.
    pub id: i64,
    /// FK to the student.
    pub student_id: i64,
    /// FK to the course.
    pub course_id: i64,
    /// Cached completion percentage (0..=100).
    pub progress: f64,
    /// RFC-3339 UTC.
    pub enrolled_at: String,
    /// RFC-3339 UTC; NULL until the course is completed.
    pub completed_at: Option<String>,
}

/// Insertable form of [`EnrollmentRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = enrollment)]
pub struct NewEnrollment<'a> {
    /// FK to the student.
    pub student_id: i64,
    /// FK to the course.
    pub course_id: i64,
    /// Initial progress (0).
    pub progress: f64,
    /// RFC-3339 UTC.
    pub enrolled_at: &'a str,
}

/// A row in [`crate::schema::lesson_progress`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = lesson_progress, check_for_backend(diesel::sqlite::Sqlite))]
pub struct LessonProgressRow {
    /// Primary key.
    pub id: i64,
    /// FK to the student.
    pub student_id: i64,
    /// FK to the lesson.
    pub lesson_id: i64,
    /// Seconds watched.
    pub watch_time: i64,
    /// Completion flag.
    pub completed: bool,
    /// RFC-3339 UTC; set iff `completed`.
    pub completed_at: Option<String>,
    /// RFC-3339 UTC of the last report.
    pub updated_at: String,
}

/// Insert/changeset form of [`LessonProgressRow`] used by the upsert.
///
/// `completed_at: None` must overwrite a previous value, hence `treat_none_as_null`.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = lesson_progress, treat_none_as_null = true)]
pub struct LessonProgressChange<'a> {
    /// FK to the student.
    pub student_id: i64,
    /// FK to the lesson.
    pub lesson_id: i64,
    /// Seconds watched.
    pub watch_time: i64,
    /// Completion flag.
    pub completed: bool,
    /// RFC-3339 UTC or NULL.
    pub completed_at: Option<&'a str>,
    /// RFC-3339 UTC.
    pub updated_at: &'a str,
}

/// Projection of lesson_progress ⨝ lesson ⨝ chapter for the read side.
#[derive(Debug, Clone, Queryable)]
pub struct LessonProgressViewRow {
    /// Lesson id.
    pub lesson_id: i64,
    /// Lesson title.
    pub lesson_title: String,
    /// Lesson position.
    pub lesson_position: i32,
    /// Lesson length.
    pub duration_seconds: i64,
    /// Chapter id.
    pub chapter_id: i64,
    /// Chapter title.
    pub chapter_title: String,
    /// Chapter position.
    pub chapter_position: i32,
    /// Seconds watched.
    pub watch_time: i64,
    /// Completion flag.
    pub completed: bool,
    /// RFC-3339 UTC or NULL.
    pub completed_at: Option<String>,
    /// RFC-3339 UTC.
    pub updated_at: String,
}

fn integrity(e: anyhow::Error) -> ProgressError {
    ProgressError::DataIntegrity(format!("{e:#}"))
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = ProgressError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        Ok(Enrollment {
            student_id: row.student_id,
            course_id: row.course_id,
            progress: row.progress,
            enrolled_at: tz::parse_ts_to_utc(&row.enrolled_at).map_err(integrity)?,
            completed_at: tz::parse_opt_ts_to_utc(row.completed_at.as_deref())
                .map_err(integrity)?,
        })
    }
}

impl TryFrom<LessonProgressRow> for LessonProgress {
    type Error = ProgressError;

    fn try_from(row: LessonProgressRow) -> Result<Self, Self::Error> {
        Ok(LessonProgress {
            student_id: row.student_id,
            lesson_id: row.lesson_id,
            watch_time: row.watch_time,
            completed: row.completed,
            completed_at: tz::parse_opt_ts_to_utc(row.completed_at.as_deref())
                .map_err(integrity)?,
            updated_at: tz::parse_ts_to_utc(&row.updated_at).map_err(integrity)?,
        })
    }
}

impl TryFrom<LessonProgressViewRow> for LessonProgressView {
    type Error = ProgressError;

    fn try_from(row: LessonProgressViewRow) -> Result<Self, Self::Error> {
        Ok(LessonProgressView {
            lesson_id: row.lesson_id,
            lesson_title: row.lesson_title,
            lesson_position: row.lesson_position,
            duration_seconds: row.duration_seconds,
            chapter_id: row.chapter_id,
            chapter_title: row.chapter_title,
            chapter_position: row.chapter_position,
            watch_time: row.watch_time,
            completed: row.completed,
            completed_at: tz::parse_opt_ts_to_utc(row.completed_at.as_deref())
                .map_err(integrity)?,
            updated_at: tz::parse_ts_to_utc(&row.updated_at).map_err(integrity)?,
        })
    }
}
