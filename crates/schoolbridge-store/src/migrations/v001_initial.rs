//! v001 -- Initial schema creation.
//!
//! Creates `users`, `students`, `assignments` and `threads`. List-valued
//! document fields are JSON arrays in TEXT columns.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,        -- trimmed, lowercase
    password_hash TEXT NOT NULL,               -- argon2 PHC string
    role          TEXT NOT NULL,               -- admin | teacher | parent | student
    created_at    TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Students
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS students (
    id                  TEXT PRIMARY KEY NOT NULL,
    first_name          TEXT NOT NULL,
    last_name           TEXT NOT NULL DEFAULT '',
    class_name          TEXT NOT NULL DEFAULT '',
    roll_number         TEXT NOT NULL DEFAULT '',
    dob                 TEXT,                      -- YYYY-MM-DD
    parent_name         TEXT,
    parent_email        TEXT,                      -- trimmed, lowercase
    guardians           TEXT NOT NULL DEFAULT '[]', -- [user id]
    assignments         TEXT NOT NULL DEFAULT '[]', -- [assignment id]
    behaviour_notes     TEXT NOT NULL DEFAULT '[]',
    assignment_progress TEXT NOT NULL DEFAULT '[]',
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name);
CREATE INDEX IF NOT EXISTS idx_students_parent_email ON students(parent_email);

-- ----------------------------------------------------------------
-- Assignments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS assignments (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    subject     TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    due_date    TEXT,
    max_marks   REAL NOT NULL,
    assigned_to TEXT NOT NULL DEFAULT '[]',     -- [student id]
    created_by  TEXT NOT NULL,                  -- user id
    grades      TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assignments_subject ON assignments(subject);

-- ----------------------------------------------------------------
-- Message threads (one per student)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS threads (
    id           TEXT PRIMARY KEY NOT NULL,
    student_id   TEXT NOT NULL UNIQUE,
    teacher_name TEXT,
    messages     TEXT NOT NULL DEFAULT '[]',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL                  -- last activity
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
