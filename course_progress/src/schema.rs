//! Diesel table definitions mirroring the embedded migrations.
//!
//! Integer keys are declared `BigInt` so they surface as `i64` on the Rust side.

diesel::table! {
    student (id) {
        id -> BigInt,
        name -> Text,
        email -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    course (id) {
        id -> BigInt,
        slug -> Text,
        title -> Text,
        teacher_name -> Text,
        published -> Bool,
    }
}

diesel::table! {
    chapter (id) {
        id -> BigInt,
        course_id -> BigInt,
        title -> Text,
        position -> Integer,
    }
}

diesel::table! {
    lesson (id) {
        id -> BigInt,
        chapter_id -> BigInt,
        title -> Text,
        position -> Integer,
        duration_seconds -> BigInt,
    }
}

diesel::table! {
    enrollment (id) {
        id -> BigInt,
        student_id -> BigInt,
        course_id -> BigInt,
        progress -> Double,
        enrolled_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    lesson_progress (id) {
        id -> BigInt,
        student_id -> BigInt,
        lesson_id -> BigInt,
        watch_time -> BigInt,
        completed -> Bool,
        completed_at -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::joinable!(chapter -> course (course_id));
diesel::joinable!(lesson -> chapter (chapter_id));
diesel::joinable!(enrollment -> student (student_id));
diesel::joinable!(enrollment -> course (course_id));
diesel::joinable!(lesson_progress -> student (student_id));
diesel::joinable!(lesson_progress -> lesson (lesson_id));

diesel::allow_tables_to_appear_in_same_query!(
    student,
    course,
    chapter,
    lesson,
    enrollment,
    lesson_progress,
);
