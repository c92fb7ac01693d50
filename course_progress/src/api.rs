//! Handler bodies for the progress endpoints.
//!
//! Transport is someone else's job: these functions take the decoded request
//! plus the caller identity resolved by the auth layer and return either the
//! response payload or an error carrying its HTTP-equivalent status.
//!
//! - `POST progress` -> [`post_progress`]
//! - `GET progress?course_id=..` -> [`get_progress`]

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProgressError, ReportError};
use crate::progress::{
    CourseCatalog, CourseId, LessonId, LessonProgress, LessonProgressView, ProgressAggregator,
    ProgressStore, StudentId,
};

/// Body of `POST progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRequest {
    /// Lesson being reported; required.
    pub lesson_id: Option<LessonId>,
    /// Seconds watched; defaults to 0, must be non-negative.
    #[serde(default)]
    pub watch_time: i64,
    /// Whether the lesson is finished; defaults to false.
    #[serde(default)]
    pub completed: bool,
}

/// Query of `GET progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressQuery {
    /// Course to list progress for; required.
    pub course_id: Option<CourseId>,
}

/// JSON error payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Error category.
    pub kind: ErrorKind,
    /// Whether the same request may succeed on retry.
    pub retryable: bool,
    /// The lesson row was saved; only the course recompute needs retrying.
    pub retry_recompute: bool,
}

impl From<&ProgressError> for ErrorBody {
    fn from(e: &ProgressError) -> Self {
        ErrorBody {
            error: e.to_string(),
            kind: e.kind(),
            retryable: e.is_retryable(),
            retry_recompute: false,
        }
    }
}

impl From<&ReportError> for ErrorBody {
    fn from(e: &ReportError) -> Self {
        let cause = e.cause();
        ErrorBody {
            error: e.to_string(),
            kind: cause.kind(),
            retryable: !e.is_partial_success() && cause.is_retryable(),
            retry_recompute: e.is_partial_success(),
        }
    }
}

/// Decode a `POST progress` body; malformed JSON is a validation error.
pub fn parse_progress_request(body: &str) -> Result<ProgressRequest, ProgressError> {
    serde_json::from_str(body)
        .map_err(|e| ProgressError::Validation(format!("malformed progress body: {e}")))
}

fn require_identity(identity: Option<StudentId>) -> Result<StudentId, ProgressError> {
    identity.ok_or(ProgressError::Unauthorized)
}

/// `POST progress`: store the caller's watch state and return the stored row.
pub fn post_progress<C, S>(
    aggregator: &ProgressAggregator<C, S>,
    identity: Option<StudentId>,
    request: ProgressRequest,
) -> Result<LessonProgress, ReportError>
where
    C: CourseCatalog,
    S: ProgressStore,
{
    let student_id = require_identity(identity)?;
    let lesson_id = request
        .lesson_id
        .ok_or_else(|| ProgressError::Validation("lesson_id is required".into()))?;
    if request.watch_time < 0 {
        return Err(ProgressError::Validation(format!(
            "watch_time must be non-negative, got {}",
            request.watch_time
        ))
        .into());
    }

    let report = aggregator.report_lesson_progress(
        student_id,
        lesson_id,
        request.watch_time,
        request.completed,
    )?;
    Ok(report.lesson_progress)
}

/// `GET progress?course_id=`: the caller's progress rows under a course.
pub fn get_progress<C, S>(
    aggregator: &ProgressAggregator<C, S>,
    identity: Option<StudentId>,
    query: ProgressQuery,
) -> Result<Vec<LessonProgressView>, ProgressError>
where
    C: CourseCatalog,
    S: ProgressStore,
{
    let student_id = require_identity(identity)?;
    let course_id = query
        .course_id
        .ok_or_else(|| ProgressError::Validation("course_id is required".into()))?;
    aggregator.course_progress(student_id, course_id)
}
