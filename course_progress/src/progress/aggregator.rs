use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProgressError, ReportError};

use super::{
    Completion, CourseCatalog, CourseId, Enrollment, LessonId, LessonProgress, LessonProgressUpdate,
    LessonProgressView, ProgressStore, StudentId,
};

/// Outcome of a successful progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    /// The lesson row as stored after the upsert.
    pub lesson_progress: LessonProgress,
    /// The refreshed enrollment when the report completed the lesson; `None`
    /// for non-completing reports, which never trigger a recompute.
    pub enrollment: Option<Enrollment>,
}

/// Applies lesson progress reports and keeps enrollment progress in sync.
pub struct ProgressAggregator<C, S> {
    catalog: C,
    store: S,
}

impl<C, S> ProgressAggregator<C, S>
where
    C: CourseCatalog,
    S: ProgressStore,
{
    /// Wire the aggregator to its collaborators.
    pub fn new(catalog: C, store: S) -> Self {
        Self { catalog, store }
    }

    /// [`Self::report_lesson_progress_at`] stamped with the current time.
    pub fn report_lesson_progress(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        watch_time_seconds: i64,
        completed: bool,
    ) -> Result<ProgressReport, ReportError> {
        self.report_lesson_progress_at(
            student_id,
            lesson_id,
            watch_time_seconds,
            completed,
            Utc::now(),
        )
    }

    /// Record a student's watch state for a lesson.
    ///
    /// The (student, lesson) row is upserted with the reported values, so a
    /// lower watch time overwrites a higher one and `completed = false` clears
    /// a previous completion. Only completing reports recompute the course;
    /// de-completing a lesson therefore leaves the enrollment progress as it
    /// was.
    ///
    /// Errors:
    /// - `Validation` for a negative watch time; nothing is written.
    /// - `LessonNotFound` / `DataIntegrity` when the lesson cannot be placed
    ///   in a course; nothing is written.
    /// - [`ReportError::RecomputeFailed`] when the row was written but the
    ///   enrollment could not be refreshed.
    #[instrument(skip(self, now), err(Display))]
    pub fn report_lesson_progress_at(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        watch_time_seconds: i64,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<ProgressReport, ReportError> {
        if watch_time_seconds < 0 {
            return Err(ProgressError::Validation(format!(
                "watch_time must be non-negative, got {watch_time_seconds}"
            ))
            .into());
        }

        let course_id = self.catalog.course_of_lesson(lesson_id)?;

        let lesson_progress = self.store.upsert_lesson_progress(&LessonProgressUpdate {
            student_id,
            lesson_id,
            watch_time: watch_time_seconds,
            completed,
            at: now,
        })?;
        debug!(course_id, "lesson progress stored");

        if !completed {
            return Ok(ProgressReport {
                lesson_progress,
                enrollment: None,
            });
        }

        match self.recompute_course_progress_at(student_id, course_id, now) {
            Ok(enrollment) => Ok(ProgressReport {
                lesson_progress,
                enrollment: Some(enrollment),
            }),
            Err(source) => {
                warn!(course_id, error = %source, "lesson stored but course recompute failed");
                Err(ReportError::RecomputeFailed {
                    lesson_progress: Box::new(lesson_progress),
                    course_id,
                    source,
                })
            }
        }
    }

    /// [`Self::recompute_course_progress_at`] stamped with the current time.
    pub fn recompute_course_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Enrollment, ProgressError> {
        self.recompute_course_progress_at(student_id, course_id, Utc::now())
    }

    /// Refresh the enrollment snapshot from the stored lesson rows.
    ///
    /// Sets `progress` to the completed share of the course's lessons and, if
    /// that reaches 100, stamps `completed_at` with `now`. A result below 100
    /// leaves `completed_at` as it was. Safe to retry: the outcome depends
    /// only on stored rows.
    ///
    /// Errors: `CourseNotFound`, `EnrollmentNotFound` (nothing written), or a
    /// store failure.
    #[instrument(skip(self, now), err(Display))]
    pub fn recompute_course_progress_at(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, ProgressError> {
        let lessons = self.catalog.lessons_of_course(course_id)?;

        let completed = if lessons.is_empty() {
            0
        } else {
            let in_course: HashSet<LessonId> = lessons.iter().copied().collect();
            self.store
                .completed_lessons(student_id, &lessons)?
                .into_iter()
                .filter(|id| in_course.contains(id))
                .collect::<HashSet<_>>()
                .len()
        };

        let completion = Completion::from_counts(completed, lessons.len());
        let enrollment = self.store.update_enrollment_progress(
            student_id,
            course_id,
            completion.percentage,
            completion.complete.then_some(now),
        )?;

        info!(
            completed,
            total = lessons.len(),
            progress = completion.percentage,
            course_complete = completion.complete,
            "course progress recomputed"
        );
        Ok(enrollment)
    }

    /// The student's lesson progress for a course with lesson/chapter metadata.
    pub fn course_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<LessonProgressView>, ProgressError> {
        self.store.lesson_progress_for_course(student_id, course_id)
    }

    /// [`Self::enroll_at`] stamped with the current time.
    pub fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Enrollment, ProgressError> {
        self.enroll_at(student_id, course_id, Utc::now())
    }

    /// Register the student in the course (idempotent).
    #[instrument(skip(self, now), err(Display))]
    pub fn enroll_at(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, ProgressError> {
        let enrollment = self.store.enroll(student_id, course_id, now)?;
        debug!(progress = enrollment.progress, "enrollment ready");
        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        store: MemoryStore,
        student: StudentId,
        course: CourseId,
        lessons: Vec<LessonId>,
    }

    fn course_with_lessons(n: usize) -> Fixture {
        let store = MemoryStore::new();
        let student = store.add_student("Ada", "ada@example.com");
        let course = store.add_course("rust-101");
        let chapter = store.add_chapter(course, "Basics");
        let lessons = (0..n)
            .map(|i| store.add_lesson(chapter, &format!("Lesson {i}")))
            .collect();
        Fixture {
            store,
            student,
            course,
            lessons,
        }
    }

    #[test]
    fn end_to_end_completion_and_decompletion_asymmetry() {
        let f = course_with_lessons(2);
        let agg = ProgressAggregator::new(&f.store, &f.store);
        agg.enroll_at(f.student, f.course, t0()).unwrap();

        let r1 = agg
            .report_lesson_progress_at(f.student, f.lessons[0], 300, true, t0())
            .unwrap();
        let e1 = r1.enrollment.expect("recomputed");
        assert_eq!(e1.progress, 50.0);
        assert!(e1.completed_at.is_none());

        let t1 = t0() + Duration::minutes(10);
        let r2 = agg
            .report_lesson_progress_at(f.student, f.lessons[1], 600, true, t1)
            .unwrap();
        let e2 = r2.enrollment.expect("recomputed");
        assert_eq!(e2.progress, 100.0);
        assert_eq!(e2.completed_at, Some(t1));

        let t2 = t1 + Duration::minutes(5);
        let r3 = agg
            .report_lesson_progress_at(f.student, f.lessons[0], 10, false, t2)
            .unwrap();
        assert!(r3.enrollment.is_none());
        assert!(!r3.lesson_progress.completed);
        assert!(r3.lesson_progress.completed_at.is_none());

        let e3 = f.store.enrollment(f.student, f.course).unwrap().unwrap();
        assert_eq!(e3.progress, 100.0);
        assert_eq!(e3.completed_at, Some(t1));
    }

    #[test]
    fn negative_watch_time_writes_nothing() {
        let f = course_with_lessons(1);
        let agg = ProgressAggregator::new(&f.store, &f.store);
        let err = agg
            .report_lesson_progress_at(f.student, f.lessons[0], -1, true, t0())
            .unwrap_err();
        assert_eq!(err.cause().kind(), ErrorKind::Validation);
        assert!(!err.is_partial_success());
        assert_eq!(f.store.lesson_progress_rows(), 0);
    }

    #[test]
    fn unknown_lesson_writes_nothing() {
        let f = course_with_lessons(1);
        let agg = ProgressAggregator::new(&f.store, &f.store);
        let err = agg
            .report_lesson_progress_at(f.student, 9_999, 10, true, t0())
            .unwrap_err();
        assert!(matches!(
            err.cause(),
            ProgressError::LessonNotFound { lesson_id: 9_999 }
        ));
        assert_eq!(f.store.lesson_progress_rows(), 0);
    }

    #[test]
    fn recompute_below_one_hundred_keeps_earlier_completion() {
        let f = course_with_lessons(2);
        let agg = ProgressAggregator::new(&f.store, &f.store);
        agg.enroll_at(f.student, f.course, t0()).unwrap();
        for &l in &f.lessons {
            agg.report_lesson_progress_at(f.student, l, 60, true, t0())
                .unwrap();
        }
        agg.report_lesson_progress_at(f.student, f.lessons[1], 60, false, t0())
            .unwrap();

        let later = t0() + Duration::hours(1);
        let e = agg
            .recompute_course_progress_at(f.student, f.course, later)
            .unwrap();
        assert_eq!(e.progress, 50.0);
        assert_eq!(e.completed_at, Some(t0()));
    }

    #[test]
    fn non_completing_report_does_not_require_enrollment() {
        let f = course_with_lessons(1);
        let agg = ProgressAggregator::new(&f.store, &f.store);
        let r = agg
            .report_lesson_progress_at(f.student, f.lessons[0], 42, false, t0())
            .unwrap();
        assert_eq!(r.lesson_progress.watch_time, 42);
        assert!(r.enrollment.is_none());
    }
}
