//! Message threads: one per student, created on the first message.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use schoolbridge_shared::{MessageThread, ThreadMessage};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{collect, id_list, json_at, to_json, ts, ts_at, uuid_at};

const THREAD_COLUMNS: &str = "id, student_id, teacher_name, messages, created_at, updated_at";

impl Database {
    pub fn get_thread(&self, id: Uuid) -> Result<MessageThread> {
        Ok(self.conn().query_row(
            &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
            params![id.to_string()],
            row_to_thread,
        )?)
    }

    pub fn find_thread_for_student(&self, student_id: Uuid) -> Result<Option<MessageThread>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE student_id = ?1"),
                params![student_id.to_string()],
                row_to_thread,
            )
            .optional()?)
    }

    /// Append a message to the student's thread, creating the thread first
    /// if the student has none.
    ///
    /// `teacher_name` is recorded only while the thread has no teacher name.
    pub fn append_message(
        &self,
        student_id: Uuid,
        teacher_name: Option<&str>,
        message: ThreadMessage,
    ) -> Result<MessageThread> {
        let now = Utc::now();
        let created = self.conn().execute(
            "INSERT OR IGNORE INTO threads (id, student_id, teacher_name, messages, created_at, updated_at)
             VALUES (?1, ?2, NULL, '[]', ?3, ?3)",
            params![Uuid::new_v4().to_string(), student_id.to_string(), ts(&now)],
        )?;
        if created > 0 {
            tracing::debug!(student = %student_id, "opened message thread");
        }

        let mut thread = self
            .find_thread_for_student(student_id)?
            .ok_or(StoreError::NotFound)?;

        if thread.teacher_name.is_none() {
            thread.teacher_name = teacher_name.map(str::to_string);
        }
        thread.updated_at = message.created_at;
        thread.messages.push(message);

        self.conn().execute(
            "UPDATE threads SET teacher_name = ?2, messages = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                thread.id.to_string(),
                thread.teacher_name,
                to_json(&thread.messages)?,
                ts(&thread.updated_at),
            ],
        )?;
        Ok(thread)
    }

    /// List threads, most recent activity first. `None` lists every thread,
    /// `Some` restricts to the given students.
    pub fn list_threads(&self, students: Option<&[Uuid]>) -> Result<Vec<MessageThread>> {
        match students {
            None => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {THREAD_COLUMNS} FROM threads ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map([], row_to_thread)?;
                collect(rows)
            }
            Some(ids) => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {THREAD_COLUMNS} FROM threads
                     WHERE student_id IN (SELECT value FROM json_each(?1))
                     ORDER BY updated_at DESC"
                ))?;
                let rows = stmt.query_map(params![id_list(ids)], row_to_thread)?;
                collect(rows)
            }
        }
    }

    /// Empty a thread's message list.
    pub fn clear_thread(&self, id: Uuid) -> Result<MessageThread> {
        let affected = self.conn().execute(
            "UPDATE threads SET messages = '[]', updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(&Utc::now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_thread(id)
    }

    pub fn delete_thread_for_student(&self, student_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM threads WHERE student_id = ?1",
            params![student_id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageThread> {
    Ok(MessageThread {
        id: uuid_at(row, 0)?,
        student: uuid_at(row, 1)?,
        teacher_name: row.get(2)?,
        messages: json_at(row, 3)?,
        created_at: ts_at(row, 4)?,
        updated_at: ts_at(row, 5)?,
    })
}
