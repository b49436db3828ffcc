use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meetings (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    student_id       TEXT NOT NULL,
    title            TEXT NOT NULL,
    agenda           TEXT NOT NULL DEFAULT '',
    starts_at        TEXT NOT NULL,               -- RFC-3339, fixed width
    duration_minutes INTEGER NOT NULL DEFAULT 30,
    status           TEXT NOT NULL DEFAULT 'scheduled',
    created_by       TEXT NOT NULL,
    meeting_link     TEXT NOT NULL DEFAULT '',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_meetings_student_start ON meetings(student_id, starts_at);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
