//! SQLite implementation of [`CourseCatalog`] and [`ProgressStore`].
//!
//! One connection guarded by a mutex: each trait call runs its statements
//! while holding the lock, so a call never interleaves with another on the
//! same store. Cross-process writers are arbitrated by SQLite itself (WAL +
//! busy_timeout). The lesson upsert is a single
//! `INSERT .. ON CONFLICT (student_id, lesson_id) DO UPDATE .. RETURNING`,
//! and the enrollment refresh a single `UPDATE .. RETURNING`, so both are
//! atomic per row and resolve concurrent writers last-write-wins.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::{SqliteConnection, dsl::exists, insert_into, select};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::db::connection::connect_sqlite;
use crate::error::{ProgressError, StoreResult};
use crate::models::{
    EnrollmentRow, LessonProgressChange, LessonProgressRow, LessonProgressViewRow, NewEnrollment,
    NewStudent,
};
use crate::progress::{
    CourseCatalog, CourseId, Enrollment, LessonId, LessonProgress, LessonProgressUpdate,
    LessonProgressView, ProgressStore, StudentId, check_progress_range,
};
use crate::schema::{chapter, course, enrollment, lesson, lesson_progress, student};
use crate::tz;

/// Diesel-backed store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<SqliteConnection>,
}

impl SqliteStore {
    /// Connect (see [`connect_sqlite`]) to an already-migrated database.
    pub fn open(database_url: &str) -> StoreResult<Self> {
        let conn = connect_sqlite(database_url).map_err(ProgressError::Dependency)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection. The caller is responsible for PRAGMAs.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Exclusive access to the underlying connection (e.g. for catalog sync).
    pub fn lock(&self) -> MutexGuard<'_, SqliteConnection> {
        self.conn.lock()
    }

    /// Register a student; returns its id.
    ///
    /// Errors: `Conflict` when the e-mail is already registered.
    pub fn add_student(&self, name: &str, email: &str) -> StoreResult<StudentId> {
        let mut conn = self.lock();
        let id = insert_into(student::table)
            .values(&NewStudent { name, email })
            .returning(student::id)
            .get_result(&mut *conn)?;
        Ok(id)
    }
}

fn course_exists(conn: &mut SqliteConnection, course_id: CourseId) -> StoreResult<bool> {
    Ok(select(exists(course::table.find(course_id))).get_result(conn)?)
}

fn student_exists(conn: &mut SqliteConnection, student_id: StudentId) -> StoreResult<bool> {
    Ok(select(exists(student::table.find(student_id))).get_result(conn)?)
}

fn find_enrollment(
    conn: &mut SqliteConnection,
    student_id: StudentId,
    course_id: CourseId,
) -> StoreResult<Option<Enrollment>> {
    enrollment::table
        .filter(enrollment::student_id.eq(student_id))
        .filter(enrollment::course_id.eq(course_id))
        .select(EnrollmentRow::as_select())
        .first(conn)
        .optional()?
        .map(Enrollment::try_from)
        .transpose()
}

impl CourseCatalog for SqliteStore {
    fn course_of_lesson(&self, lesson_id: LessonId) -> StoreResult<CourseId> {
        let mut conn = self.lock();
        let conn = &mut *conn;

        let chapter_id: i64 = lesson::table
            .find(lesson_id)
            .select(lesson::chapter_id)
            .first(conn)
            .optional()?
            .ok_or(ProgressError::LessonNotFound { lesson_id })?;

        let course_id: i64 = chapter::table
            .find(chapter_id)
            .select(chapter::course_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| {
                ProgressError::DataIntegrity(format!(
                    "lesson {lesson_id} references missing chapter {chapter_id}"
                ))
            })?;

        if !course_exists(conn, course_id)? {
            return Err(ProgressError::DataIntegrity(format!(
                "chapter {chapter_id} references missing course {course_id}"
            )));
        }
        Ok(course_id)
    }

    fn lessons_of_course(&self, course_id: CourseId) -> StoreResult<Vec<LessonId>> {
        let mut conn = self.lock();
        let conn = &mut *conn;

        if !course_exists(conn, course_id)? {
            return Err(ProgressError::CourseNotFound { course_id });
        }
        let ids = lesson::table
            .inner_join(chapter::table)
            .filter(chapter::course_id.eq(course_id))
            .order((chapter::position.asc(), lesson::position.asc()))
            .select(lesson::id)
            .load::<i64>(conn)?;
        Ok(ids)
    }
}

impl ProgressStore for SqliteStore {
    fn upsert_lesson_progress(&self, update: &LessonProgressUpdate) -> StoreResult<LessonProgress> {
        if update.watch_time < 0 {
            return Err(ProgressError::Validation(format!(
                "watch_time must be non-negative, got {}",
                update.watch_time
            )));
        }
        let at = tz::to_rfc3339_millis(update.at);
        let row = LessonProgressChange {
            student_id: update.student_id,
            lesson_id: update.lesson_id,
            watch_time: update.watch_time,
            completed: update.completed,
            completed_at: update.completed.then_some(at.as_str()),
            updated_at: &at,
        };

        let mut conn = self.lock();
        // INSERT .. ON CONFLICT (student_id, lesson_id) DO UPDATE .. RETURNING (SQLite 3.35+)
        let saved: LessonProgressRow = insert_into(lesson_progress::table)
            .values(&row)
            .on_conflict((lesson_progress::student_id, lesson_progress::lesson_id))
            .do_update()
            .set(&row)
            .returning(LessonProgressRow::as_returning())
            .get_result(&mut *conn)?;
        debug!(row_id = saved.id, "lesson_progress upserted");
        saved.try_into()
    }

    fn completed_lessons(
        &self,
        student_id: StudentId,
        lesson_ids: &[LessonId],
    ) -> StoreResult<Vec<LessonId>> {
        if lesson_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.lock();
        let ids = lesson_progress::table
            .filter(lesson_progress::student_id.eq(student_id))
            .filter(lesson_progress::completed.eq(true))
            .filter(lesson_progress::lesson_id.eq_any(lesson_ids))
            .select(lesson_progress::lesson_id)
            .load::<i64>(&mut *conn)?;
        Ok(ids)
    }

    fn enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        let mut conn = self.lock();
        find_enrollment(&mut conn, student_id, course_id)
    }

    fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        let mut conn = self.lock();
        let conn = &mut *conn;

        if !student_exists(conn, student_id)? {
            return Err(ProgressError::StudentNotFound { student_id });
        }
        if !course_exists(conn, course_id)? {
            return Err(ProgressError::CourseNotFound { course_id });
        }

        let enrolled_at = tz::to_rfc3339_millis(at);
        insert_into(enrollment::table)
            .values(&NewEnrollment {
                student_id,
                course_id,
                progress: 0.0,
                enrolled_at: &enrolled_at,
            })
            .on_conflict((enrollment::student_id, enrollment::course_id))
            .do_nothing()
            .execute(conn)?;

        let missing = ProgressError::EnrollmentNotFound {
            student_id,
            course_id,
        };
        find_enrollment(conn, student_id, course_id)?.ok_or(missing)
    }

    fn update_enrollment_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        progress: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Enrollment> {
        check_progress_range(progress)?;

        let mut conn = self.lock();
        let conn = &mut *conn;
        let target = enrollment::table
            .filter(enrollment::student_id.eq(student_id))
            .filter(enrollment::course_id.eq(course_id));

        let updated: Option<EnrollmentRow> = match completed_at {
            Some(ts) => diesel::update(target)
                .set((
                    enrollment::progress.eq(progress),
                    enrollment::completed_at.eq(Some(tz::to_rfc3339_millis(ts))),
                ))
                .returning(EnrollmentRow::as_returning())
                .get_result(conn)
                .optional()?,
            None => diesel::update(target)
                .set(enrollment::progress.eq(progress))
                .returning(EnrollmentRow::as_returning())
                .get_result(conn)
                .optional()?,
        };

        updated
            .ok_or(ProgressError::EnrollmentNotFound {
                student_id,
                course_id,
            })?
            .try_into()
    }

    fn lesson_progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Vec<LessonProgressView>> {
        let mut conn = self.lock();
        let conn = &mut *conn;

        if !course_exists(conn, course_id)? {
            return Err(ProgressError::CourseNotFound { course_id });
        }

        let rows: Vec<LessonProgressViewRow> = lesson_progress::table
            .inner_join(lesson::table.inner_join(chapter::table))
            .filter(lesson_progress::student_id.eq(student_id))
            .filter(chapter::course_id.eq(course_id))
            .order((chapter::position.asc(), lesson::position.asc()))
            .select((
                lesson::id,
                lesson::title,
                lesson::position,
                lesson::duration_seconds,
                chapter::id,
                chapter::title,
                chapter::position,
                lesson_progress::watch_time,
                lesson_progress::completed,
                lesson_progress::completed_at,
                lesson_progress::updated_at,
            ))
            .load(conn)?;

        rows.into_iter().map(LessonProgressView::try_from).collect()
    }
}
