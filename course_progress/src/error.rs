//! Error taxonomy for the progress aggregator and its stores.
//!
//! [`ProgressError`] is what every store and aggregator operation returns.
//! [`ReportError`] wraps it for `report_lesson_progress`, adding the
//! partial-success case where the lesson row was written but the course
//! recompute was not.

use serde::Serialize;

use crate::progress::{CourseId, LessonId, LessonProgress, StudentId};

/// Result alias used by the collaborator traits and their implementations.
pub type StoreResult<T> = Result<T, ProgressError>;

/// Coarse classification of a [`ProgressError`], stable for callers that
/// only need to branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; nothing was written.
    Validation,
    /// No caller identity was supplied.
    Unauthorized,
    /// A referenced lesson, course, student or enrollment does not exist.
    NotFound,
    /// Stored rows contradict each other (dangling chapter/course references).
    DataIntegrity,
    /// A concurrent write the store could not resolve.
    Conflict,
    /// The store or catalog is unreachable or failing.
    Dependency,
}

/// Errors raised by the aggregator, the course catalog, and the persistence store.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("invalid input: {0}")]
    /// Malformed input (missing lesson id, negative watch time, ...).
    Validation(String),

    #[error("no authenticated student identity supplied")]
    /// The request carried no student identity.
    Unauthorized,

    #[error("lesson {lesson_id} not found")]
    /// The reported lesson does not exist (bad input).
    LessonNotFound {
        /// Lesson that was looked up.
        lesson_id: LessonId,
    },

    #[error("course {course_id} not found")]
    /// The course does not exist.
    CourseNotFound {
        /// Course that was looked up.
        course_id: CourseId,
    },

    #[error("student {student_id} not found")]
    /// The student does not exist.
    StudentNotFound {
        /// Student that was looked up.
        student_id: StudentId,
    },

    #[error("student {student_id} is not enrolled in course {course_id}")]
    /// Progress was aggregated for a course the student never enrolled in.
    EnrollmentNotFound {
        /// Student of the missing enrollment.
        student_id: StudentId,
        /// Course of the missing enrollment.
        course_id: CourseId,
    },

    #[error("data integrity violation: {0}")]
    /// Catalog or progress rows reference rows that do not exist.
    DataIntegrity(String),

    #[error("write conflict: {0}")]
    /// Concurrent write the store could not resolve; retryable.
    Conflict(String),

    #[error("storage dependency failed: {0}")]
    /// Store unreachable or erroring; retryable.
    Dependency(#[source] anyhow::Error),
}

impl ProgressError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProgressError::Validation(_) => ErrorKind::Validation,
            ProgressError::Unauthorized => ErrorKind::Unauthorized,
            ProgressError::LessonNotFound { .. }
            | ProgressError::CourseNotFound { .. }
            | ProgressError::StudentNotFound { .. }
            | ProgressError::EnrollmentNotFound { .. } => ErrorKind::NotFound,
            ProgressError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            ProgressError::Conflict(_) => ErrorKind::Conflict,
            ProgressError::Dependency(_) => ErrorKind::Dependency,
        }
    }

    /// Whether retrying the same call may succeed without changing the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Dependency)
    }

    /// HTTP-equivalent status code for the inbound boundary.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::DataIntegrity => 500,
            ErrorKind::Dependency => 503,
        }
    }
}

impl From<diesel::result::Error> for ProgressError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match e {
            Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::SerializationFailure,
                info,
            ) => ProgressError::Conflict(info.message().to_string()),
            Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation | DatabaseErrorKind::CheckViolation,
                info,
            ) => ProgressError::DataIntegrity(info.message().to_string()),
            other => ProgressError::Dependency(anyhow::Error::new(other)),
        }
    }
}

impl From<diesel::ConnectionError> for ProgressError {
    fn from(e: diesel::ConnectionError) -> Self {
        ProgressError::Dependency(anyhow::Error::new(e))
    }
}

/// Failure of `report_lesson_progress`.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Nothing was written, or the lesson write itself failed.
    #[error(transparent)]
    Rejected(#[from] ProgressError),

    /// The lesson progress row is persisted but the course aggregate is stale.
    /// The recompute is a pure function of stored rows and may be retried on
    /// its own.
    #[error("lesson progress saved but recompute of course {course_id} failed: {source}")]
    RecomputeFailed {
        /// Row persisted by the upsert.
        lesson_progress: Box<LessonProgress>,
        /// Course whose enrollment was not updated.
        course_id: CourseId,
        /// Why the recompute failed.
        #[source]
        source: ProgressError,
    },
}

impl ReportError {
    /// The underlying cause regardless of whether the lesson write landed.
    pub fn cause(&self) -> &ProgressError {
        match self {
            ReportError::Rejected(e) => e,
            ReportError::RecomputeFailed { source, .. } => source,
        }
    }

    /// True when the lesson row was written and only the aggregate is pending.
    pub fn is_partial_success(&self) -> bool {
        matches!(self, ReportError::RecomputeFailed { .. })
    }

    /// HTTP-equivalent status code. A partial success is a server-side failure
    /// regardless of the cause, since the input was accepted.
    pub fn status_code(&self) -> u16 {
        match self {
            ReportError::Rejected(e) => e.status_code(),
            ReportError::RecomputeFailed { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_share_a_kind_but_stay_distinct() {
        let lesson = ProgressError::LessonNotFound { lesson_id: 3 };
        let enrollment = ProgressError::EnrollmentNotFound {
            student_id: 1,
            course_id: 2,
        };
        assert_eq!(lesson.kind(), ErrorKind::NotFound);
        assert_eq!(enrollment.kind(), ErrorKind::NotFound);
        assert_eq!(lesson.to_string(), "lesson 3 not found");
        assert_eq!(
            enrollment.to_string(),
            "student 1 is not enrolled in course 2"
        );
    }

    #[test]
    fn only_conflict_and_dependency_are_retryable() {
        assert!(ProgressError::Conflict("busy".into()).is_retryable());
        assert!(ProgressError::Dependency(anyhow::anyhow!("down")).is_retryable());
        assert!(!ProgressError::Validation("x".into()).is_retryable());
        assert!(!ProgressError::Unauthorized.is_retryable());
        assert!(!ProgressError::DataIntegrity("x".into()).is_retryable());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ProgressError::Validation("x".into()).status_code(), 400);
        assert_eq!(ProgressError::Unauthorized.status_code(), 401);
        assert_eq!(ProgressError::CourseNotFound { course_id: 1 }.status_code(), 404);
        assert_eq!(ProgressError::Conflict("x".into()).status_code(), 409);
        assert_eq!(
            ProgressError::Dependency(anyhow::anyhow!("x")).status_code(),
            503
        );
    }

    #[test]
    fn diesel_not_found_is_a_dependency_failure() {
        let e: ProgressError = diesel::result::Error::NotFound.into();
        assert_eq!(e.kind(), ErrorKind::Dependency);
    }
}
