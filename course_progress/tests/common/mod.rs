#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use course_progress::catalog::config::{Catalog, ChapterCfg, CourseCfg, LessonCfg};
use course_progress::catalog::{SyncOptions, sync_catalog};
use course_progress::db::{connection, migrate};
use course_progress::progress::{CourseCatalog, CourseId, LessonId, StudentId};
use course_progress::schema::course;
use course_progress::store::SqliteStore;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use indexmap::IndexMap;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    n: i64,
}
#[derive(QueryableByName)]
struct FkViolation {
    #[diesel(sql_type = Text)]
    table: String,
    #[diesel(sql_type = Text)]
    parent: String,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

impl TestDb {
    /// A second, independent store over the same file.
    pub fn open_store(&self) -> SqliteStore {
        SqliteStore::open(&self.path).expect("open store")
    }
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn setup_store() -> (TestDb, SqliteStore) {
    let (db, conn) = setup_db();
    (db, SqliteStore::from_connection(conn))
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table}"))
        .get_result::<Count>(conn)
        .unwrap()
        .n
}

pub fn fk_check_empty(conn: &mut SqliteConnection) {
    let rows: Vec<FkViolation> = diesel::sql_query("PRAGMA foreign_key_check;")
        .load(conn)
        .unwrap();
    let offenders: Vec<String> = rows
        .iter()
        .map(|r| format!("{} -> {}", r.table, r.parent))
        .collect();
    assert!(offenders.is_empty(), "foreign key violations: {offenders:?}");
}

/// Catalog with one course whose chapters hold the given number of lessons.
pub fn course_catalog(slug: &str, lessons_per_chapter: &[usize]) -> Catalog {
    let chapters = lessons_per_chapter
        .iter()
        .enumerate()
        .map(|(c, &n)| ChapterCfg {
            title: format!("Chapter {}", c + 1),
            lessons: (0..n)
                .map(|l| LessonCfg {
                    title: format!("Lesson {}.{}", c + 1, l + 1),
                    duration_seconds: Some(300),
                })
                .collect(),
        })
        .collect();
    let mut courses = IndexMap::new();
    courses.insert(
        slug.to_string(),
        CourseCfg {
            title: format!("Course {slug}"),
            teacher: "Ferris".into(),
            published: true,
            chapters,
        },
    );
    Catalog { courses }
}

/// Sync a course into the store; returns its id and lesson ids in position order.
pub fn seed_course(
    store: &SqliteStore,
    slug: &str,
    lessons_per_chapter: &[usize],
) -> (CourseId, Vec<LessonId>) {
    sync_catalog(
        &mut store.lock(),
        course_catalog(slug, lessons_per_chapter),
        SyncOptions::default(),
    )
    .expect("seed catalog");
    let course_id: i64 = course::table
        .filter(course::slug.eq(slug))
        .select(course::id)
        .first(&mut *store.lock())
        .expect("seeded course");
    let lessons = store.lessons_of_course(course_id).expect("lessons");
    (course_id, lessons)
}

pub fn seed_student(store: &SqliteStore, name: &str) -> StudentId {
    store
        .add_student(name, &format!("{}@example.com", name.to_lowercase()))
        .expect("seed student")
}
