//! Progress aggregation: lesson watch state rolled up into enrollment progress.
//!
//! The aggregator ([`ProgressAggregator`]) talks to two collaborators:
//! - [`CourseCatalog`]: read-only course -> chapter -> lesson structure.
//! - [`ProgressStore`]: lesson progress rows and the enrollment snapshot.
//!
//! `Enrollment::progress` is a materialized view over the student's completed
//! [`LessonProgress`] rows. It is refreshed explicitly by
//! [`ProgressAggregator::recompute_course_progress`]; the ratio itself is the
//! pure [`completion_percentage`].
//!
//! Concurrency: stores apply per-row atomic upserts/updates and nothing more.
//! Two reports for the same (student, lesson) resolve last-write-wins, and so
//! do two recomputes racing on one enrollment. There is no version column.

mod aggregator;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreResult;

pub use aggregator::{ProgressAggregator, ProgressReport};

/// Student identifier (supplied by the identity layer).
pub type StudentId = i64;
/// Course identifier.
pub type CourseId = i64;
/// Chapter identifier.
pub type ChapterId = i64;
/// Lesson identifier.
pub type LessonId = i64;

/// Progress value at which a course counts as completed.
pub const COMPLETE_PERCENT: f64 = 100.0;

/// One student's watch state for one lesson. Unique per (student, lesson).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonProgress {
    /// Owning student.
    pub student_id: StudentId,
    /// Watched lesson.
    pub lesson_id: LessonId,
    /// Seconds watched as last reported (not necessarily monotonic).
    pub watch_time: i64,
    /// Whether the lesson is marked completed.
    pub completed: bool,
    /// Set iff `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Instant of the last report.
    pub updated_at: DateTime<Utc>,
}

/// Values written by one progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonProgressUpdate {
    /// Reporting student.
    pub student_id: StudentId,
    /// Reported lesson.
    pub lesson_id: LessonId,
    /// Seconds watched; must be non-negative.
    pub watch_time: i64,
    /// Completion flag of this report.
    pub completed: bool,
    /// Report instant; becomes `completed_at` when `completed`.
    pub at: DateTime<Utc>,
}

impl LessonProgressUpdate {
    /// The row this update produces, ignoring any previous state.
    pub fn to_progress(&self) -> LessonProgress {
        LessonProgress {
            student_id: self.student_id,
            lesson_id: self.lesson_id,
            watch_time: self.watch_time,
            completed: self.completed,
            completed_at: self.completed.then_some(self.at),
            updated_at: self.at,
        }
    }
}

/// A student's registration in a course plus the cached aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrollment {
    /// Enrolled student.
    pub student_id: StudentId,
    /// Course enrolled in.
    pub course_id: CourseId,
    /// Percentage of the course's lessons completed, 0..=100, unrounded.
    pub progress: f64,
    /// When the enrollment was created.
    pub enrolled_at: DateTime<Utc>,
    /// Set when a recompute reaches 100; never cleared by the aggregator.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lesson progress joined with lesson and chapter metadata (the read side).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonProgressView {
    /// Lesson id.
    pub lesson_id: LessonId,
    /// Lesson title.
    pub lesson_title: String,
    /// 1-based position within the chapter.
    pub lesson_position: i32,
    /// Nominal lesson length.
    pub duration_seconds: i64,
    /// Chapter id.
    pub chapter_id: ChapterId,
    /// Chapter title.
    pub chapter_title: String,
    /// 1-based position within the course.
    pub chapter_position: i32,
    /// Seconds watched as last reported.
    pub watch_time: i64,
    /// Completion flag.
    pub completed: bool,
    /// Completion instant.
    pub completed_at: Option<DateTime<Utc>>,
    /// Instant of the last report.
    pub updated_at: DateTime<Utc>,
}

/// `completed / total * 100` without rounding; 0 for a course with no lessons.
pub fn completion_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Result of the recompute ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    /// `completed / total * 100`, or 0 for an empty course.
    pub percentage: f64,
    /// Whether `percentage` reached [`COMPLETE_PERCENT`].
    pub complete: bool,
}

impl Completion {
    /// Map completed/total lesson counts to a percentage. An empty course is 0%,
    /// never complete, and never divides by zero.
    pub fn from_counts(completed: usize, total: usize) -> Self {
        debug_assert!(completed <= total, "completed {completed} > total {total}");
        let percentage = completion_percentage(completed, total);
        Completion {
            percentage,
            complete: percentage >= COMPLETE_PERCENT,
        }
    }
}

/// Read-only view of the course structure.
pub trait CourseCatalog {
    /// Course owning the lesson.
    ///
    /// Errors: `LessonNotFound` for an unknown lesson, `DataIntegrity` when the
    /// lesson's chapter or the chapter's course is missing.
    fn course_of_lesson(&self, lesson_id: LessonId) -> StoreResult<CourseId>;

    /// Every lesson id under the course, across all of its chapters.
    ///
    /// Errors: `CourseNotFound` for an unknown course. A course without lessons
    /// yields an empty list.
    fn lessons_of_course(&self, course_id: CourseId) -> StoreResult<Vec<LessonId>>;
}

/// Persistence for lesson progress rows and enrollments.
pub trait ProgressStore {
    /// Insert or overwrite the row keyed by (student, lesson); returns the stored row.
    ///
    /// Errors: `Validation` for a negative watch time, `DataIntegrity` when the
    /// student or lesson does not exist.
    fn upsert_lesson_progress(&self, update: &LessonProgressUpdate) -> StoreResult<LessonProgress>;

    /// Subset of `lesson_ids` the student has completed.
    fn completed_lessons(
        &self,
        student_id: StudentId,
        lesson_ids: &[LessonId],
    ) -> StoreResult<Vec<LessonId>>;

    /// Enrollment row, if any.
    fn enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>>;

    /// Create the enrollment with progress 0 if missing; existing rows are
    /// returned unchanged.
    ///
    /// Errors: `StudentNotFound`, `CourseNotFound`.
    fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment>;

    /// Overwrite the enrollment's progress. `completed_at` of `Some` replaces the
    /// stored completion instant; `None` leaves it untouched.
    ///
    /// Errors: `EnrollmentNotFound` when no row matches (nothing is written),
    /// `Validation` when `progress` is outside 0..=100.
    fn update_enrollment_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        progress: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Enrollment>;

    /// The student's progress rows under the course joined with lesson and
    /// chapter metadata, ordered by chapter then lesson position.
    ///
    /// Errors: `CourseNotFound`.
    fn lesson_progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Vec<LessonProgressView>>;
}

pub(crate) fn check_progress_range(progress: f64) -> StoreResult<()> {
    if (0.0..=COMPLETE_PERCENT).contains(&progress) {
        Ok(())
    } else {
        Err(crate::error::ProgressError::Validation(format!(
            "progress {progress} outside 0..=100"
        )))
    }
}

impl<T: CourseCatalog + ?Sized> CourseCatalog for &T {
    fn course_of_lesson(&self, lesson_id: LessonId) -> StoreResult<CourseId> {
        (**self).course_of_lesson(lesson_id)
    }

    fn lessons_of_course(&self, course_id: CourseId) -> StoreResult<Vec<LessonId>> {
        (**self).lessons_of_course(course_id)
    }
}

impl<T: CourseCatalog + ?Sized> CourseCatalog for Arc<T> {
    fn course_of_lesson(&self, lesson_id: LessonId) -> StoreResult<CourseId> {
        (**self).course_of_lesson(lesson_id)
    }

    fn lessons_of_course(&self, course_id: CourseId) -> StoreResult<Vec<LessonId>> {
        (**self).lessons_of_course(course_id)
    }
}

impl<T: ProgressStore + ?Sized> ProgressStore for &T {
    fn upsert_lesson_progress(&self, update: &LessonProgressUpdate) -> StoreResult<LessonProgress> {
        (**self).upsert_lesson_progress(update)
    }

    fn completed_lessons(
        &self,
        student_id: StudentId,
        lesson_ids: &[LessonId],
    ) -> StoreResult<Vec<LessonId>> {
        (**self).completed_lessons(student_id, lesson_ids)
    }

    fn enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        (**self).enrollment(student_id, course_id)
    }

    fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        (**self).enroll(student_id, course_id, at)
    }

    fn update_enrollment_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        progress: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Enrollment> {
        (**self).update_enrollment_progress(student_id, course_id, progress, completed_at)
    }

    fn lesson_progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Vec<LessonProgressView>> {
        (**self).lesson_progress_for_course(student_id, course_id)
    }
}

impl<T: ProgressStore + ?Sized> ProgressStore for Arc<T> {
    fn upsert_lesson_progress(&self, update: &LessonProgressUpdate) -> StoreResult<LessonProgress> {
        (**self).upsert_lesson_progress(update)
    }

    fn completed_lessons(
        &self,
        student_id: StudentId,
        lesson_ids: &[LessonId],
    ) -> StoreResult<Vec<LessonId>> {
        (**self).completed_lessons(student_id, lesson_ids)
    }

    fn enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        (**self).enrollment(student_id, course_id)
    }

    fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        (**self).enroll(student_id, course_id, at)
    }

    fn update_enrollment_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        progress: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Enrollment> {
        (**self).update_enrollment_progress(student_id, course_id, progress, completed_at)
    }

    fn lesson_progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Vec<LessonProgressView>> {
        (**self).lesson_progress_for_course(student_id, course_id)
    }
}
