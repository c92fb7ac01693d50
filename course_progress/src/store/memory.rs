//! In-memory [`CourseCatalog`] + [`ProgressStore`].
//!
//! Used by unit tests and anywhere a throwaway store is handy. All state sits
//! behind one mutex, so every trait call is atomic with respect to the others.
//! No referential checks are made when seeding lessons or chapters, which lets
//! tests build dangling rows on purpose. Progress rows are checked against
//! their student and lesson, matching the foreign keys of the SQLite schema.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{ProgressError, StoreResult};
use crate::progress::{
    ChapterId, CourseCatalog, CourseId, Enrollment, LessonId, LessonProgress,
    LessonProgressUpdate, LessonProgressView, ProgressStore, StudentId, check_progress_range,
};

#[derive(Debug)]
struct MemCourse {
    slug: String,
}

#[derive(Debug)]
struct MemChapter {
    course_id: CourseId,
    title: String,
    position: i32,
}

#[derive(Debug)]
struct MemLesson {
    chapter_id: ChapterId,
    title: String,
    position: i32,
    duration_seconds: i64,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    students: BTreeMap<StudentId, String>,
    courses: BTreeMap<CourseId, MemCourse>,
    chapters: BTreeMap<ChapterId, MemChapter>,
    lessons: BTreeMap<LessonId, MemLesson>,
    enrollments: HashMap<(StudentId, CourseId), Enrollment>,
    progress: HashMap<(StudentId, LessonId), LessonProgress>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a student; returns its id.
    pub fn add_student(&self, name: &str, email: &str) -> StudentId {
        let mut st = self.state.lock();
        let id = st.next_id();
        st.students.insert(id, format!("{name} <{email}>"));
        id
    }

    /// Register a course; returns its id.
    pub fn add_course(&self, slug: &str) -> CourseId {
        let mut st = self.state.lock();
        let id = st.next_id();
        st.courses.insert(
            id,
            MemCourse {
                slug: slug.to_string(),
            },
        );
        id
    }

    /// Append a chapter to `course_id` (not checked to exist); returns its id.
    pub fn add_chapter(&self, course_id: CourseId, title: &str) -> ChapterId {
        let mut st = self.state.lock();
        let position = st
            .chapters
            .values()
            .filter(|c| c.course_id == course_id)
            .count() as i32
            + 1;
        let id = st.next_id();
        st.chapters.insert(
            id,
            MemChapter {
                course_id,
                title: title.to_string(),
                position,
            },
        );
        id
    }

    /// Append a lesson to `chapter_id` (not checked to exist); returns its id.
    pub fn add_lesson(&self, chapter_id: ChapterId, title: &str) -> LessonId {
        let mut st = self.state.lock();
        let position = st
            .lessons
            .values()
            .filter(|l| l.chapter_id == chapter_id)
            .count() as i32
            + 1;
        let id = st.next_id();
        st.lessons.insert(
            id,
            MemLesson {
                chapter_id,
                title: title.to_string(),
                position,
                duration_seconds: 0,
            },
        );
        id
    }

    /// Slug of a course, if registered.
    pub fn course_slug(&self, course_id: CourseId) -> Option<String> {
        self.state
            .lock()
            .courses
            .get(&course_id)
            .map(|c| c.slug.clone())
    }

    /// Number of stored lesson progress rows across all students.
    pub fn lesson_progress_rows(&self) -> usize {
        self.state.lock().progress.len()
    }
}

impl CourseCatalog for MemoryStore {
    fn course_of_lesson(&self, lesson_id: LessonId) -> StoreResult<CourseId> {
        let st = self.state.lock();
        let lesson = st
            .lessons
            .get(&lesson_id)
            .ok_or(ProgressError::LessonNotFound { lesson_id })?;
        let chapter = st.chapters.get(&lesson.chapter_id).ok_or_else(|| {
            ProgressError::DataIntegrity(format!(
                "lesson {lesson_id} references missing chapter {}",
                lesson.chapter_id
            ))
        })?;
        if !st.courses.contains_key(&chapter.course_id) {
            return Err(ProgressError::DataIntegrity(format!(
                "chapter {} references missing course {}",
                lesson.chapter_id, chapter.course_id
            )));
        }
        Ok(chapter.course_id)
    }

    fn lessons_of_course(&self, course_id: CourseId) -> StoreResult<Vec<LessonId>> {
        let st = self.state.lock();
        if !st.courses.contains_key(&course_id) {
            return Err(ProgressError::CourseNotFound { course_id });
        }
        let mut lessons: Vec<(i32, i32, LessonId)> = st
            .lessons
            .iter()
            .filter_map(|(id, l)| {
                let ch = st.chapters.get(&l.chapter_id)?;
                (ch.course_id == course_id).then_some((ch.position, l.position, *id))
            })
            .collect();
        lessons.sort_unstable();
        Ok(lessons.into_iter().map(|(_, _, id)| id).collect())
    }
}

impl ProgressStore for MemoryStore {
    fn upsert_lesson_progress(&self, update: &LessonProgressUpdate) -> StoreResult<LessonProgress> {
        if update.watch_time < 0 {
            return Err(ProgressError::Validation(format!(
                "watch_time must be non-negative, got {}",
                update.watch_time
            )));
        }
        let mut st = self.state.lock();
        if !st.students.contains_key(&update.student_id) {
            return Err(ProgressError::DataIntegrity(format!(
                "lesson progress references missing student {}",
                update.student_id
            )));
        }
        if !st.lessons.contains_key(&update.lesson_id) {
            return Err(ProgressError::DataIntegrity(format!(
                "lesson progress references missing lesson {}",
                update.lesson_id
            )));
        }
        let row = update.to_progress();
        st.progress.insert((update.student_id, update.lesson_id), row.clone());
        Ok(row)
    }

    fn completed_lessons(
        &self,
        student_id: StudentId,
        lesson_ids: &[LessonId],
    ) -> StoreResult<Vec<LessonId>> {
        let st = self.state.lock();
        Ok(lesson_ids
            .iter()
            .copied()
            .filter(|l| st.progress.get(&(student_id, *l)).is_some_and(|p| p.completed))
            .collect())
    }

    fn enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .state
            .lock()
            .enrollments
            .get(&(student_id, course_id))
            .cloned())
    }

    fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        let mut st = self.state.lock();
        if !st.students.contains_key(&student_id) {
            return Err(ProgressError::StudentNotFound { student_id });
        }
        if !st.courses.contains_key(&course_id) {
            return Err(ProgressError::CourseNotFound { course_id });
        }
        Ok(st
            .enrollments
            .entry((student_id, course_id))
            .or_insert_with(|| Enrollment {
                student_id,
                course_id,
                progress: 0.0,
                enrolled_at: at,
                completed_at: None,
            })
            .clone())
    }

    fn update_enrollment_progress(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        progress: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Enrollment> {
        check_progress_range(progress)?;
        let mut st = self.state.lock();
        let enrollment = st
            .enrollments
            .get_mut(&(student_id, course_id))
            .ok_or(ProgressError::EnrollmentNotFound {
                student_id,
                course_id,
            })?;
        enrollment.progress = progress;
        if completed_at.is_some() {
            enrollment.completed_at = completed_at;
        }
        Ok(enrollment.clone())
    }

    fn lesson_progress_for_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Vec<LessonProgressView>> {
        let st = self.state.lock();
        if !st.courses.contains_key(&course_id) {
            return Err(ProgressError::CourseNotFound { course_id });
        }
        let mut views: Vec<LessonProgressView> = st
            .progress
            .values()
            .filter(|p| p.student_id == student_id)
            .filter_map(|p| {
                let lesson = st.lessons.get(&p.lesson_id)?;
                let chapter = st.chapters.get(&lesson.chapter_id)?;
                (chapter.course_id == course_id).then(|| LessonProgressView {
                    lesson_id: p.lesson_id,
                    lesson_title: lesson.title.clone(),
                    lesson_position: lesson.position,
                    duration_seconds: lesson.duration_seconds,
                    chapter_id: lesson.chapter_id,
                    chapter_title: chapter.title.clone(),
                    chapter_position: chapter.position,
                    watch_time: p.watch_time,
                    completed: p.completed,
                    completed_at: p.completed_at,
                    updated_at: p.updated_at,
                })
            })
            .collect();
        views.sort_by_key(|v| (v.chapter_position, v.lesson_position));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    #[test]
    fn dangling_chapter_is_a_data_integrity_error() {
        let store = MemoryStore::new();
        let lesson = store.add_lesson(4_242, "orphan");
        let err = store.course_of_lesson(lesson).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn dangling_course_is_a_data_integrity_error() {
        let store = MemoryStore::new();
        let chapter = store.add_chapter(777, "lost");
        let lesson = store.add_lesson(chapter, "orphan");
        let err = store.course_of_lesson(lesson).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn lessons_span_all_chapters_in_position_order() {
        let store = MemoryStore::new();
        let course = store.add_course("c");
        let ch1 = store.add_chapter(course, "one");
        let ch2 = store.add_chapter(course, "two");
        let b = store.add_lesson(ch2, "b");
        let a = store.add_lesson(ch1, "a");
        let other = store.add_course("d");
        let ch3 = store.add_chapter(other, "x");
        store.add_lesson(ch3, "x");
        assert_eq!(store.lessons_of_course(course).unwrap(), vec![a, b]);
        assert_eq!(store.course_slug(course).as_deref(), Some("c"));
    }

    #[test]
    fn progress_for_unknown_student_or_lesson_is_refused() {
        let store = MemoryStore::new();
        let student = store.add_student("s", "s@example.com");
        let course = store.add_course("c");
        let ch = store.add_chapter(course, "ch");
        let lesson = store.add_lesson(ch, "l");

        let update = |student_id, lesson_id| LessonProgressUpdate {
            student_id,
            lesson_id,
            watch_time: 30,
            completed: true,
            at: Utc::now(),
        };
        let err = store
            .upsert_lesson_progress(&update(student + 1_000, lesson))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        let err = store
            .upsert_lesson_progress(&update(student, lesson + 1_000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
        assert_eq!(store.lesson_progress_rows(), 0);

        store.upsert_lesson_progress(&update(student, lesson)).unwrap();
        assert_eq!(store.lesson_progress_rows(), 1);
    }

    #[test]
    fn concurrent_reports_for_one_pair_leave_one_row() {
        let store = Arc::new(MemoryStore::new());
        let student = store.add_student("s", "s@example.com");
        let course = store.add_course("c");
        let ch = store.add_chapter(course, "ch");
        let lesson = store.add_lesson(ch, "l");

        std::thread::scope(|s| {
            for i in 0..16 {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    store
                        .upsert_lesson_progress(&LessonProgressUpdate {
                            student_id: student,
                            lesson_id: lesson,
                            watch_time: i * 10,
                            completed: i % 2 == 0,
                            at: Utc::now(),
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(store.lesson_progress_rows(), 1);
        let views = store.lesson_progress_for_course(student, course).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].completed, views[0].completed_at.is_some());
    }
}
