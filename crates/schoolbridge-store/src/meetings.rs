//! CRUD operations for [`Meeting`] records.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use schoolbridge_shared::{Meeting, MeetingStatus};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{collect, id_list, parsed_at, ts, ts_at, uuid_at};

const MEETING_COLUMNS: &str = "id, student_id, title, agenda, starts_at, duration_minutes, \
     status, created_by, meeting_link, created_at, updated_at";

impl Database {
    pub fn insert_meeting(&self, meeting: &Meeting) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO meetings ({MEETING_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                meeting.id.to_string(),
                meeting.student.to_string(),
                meeting.title,
                meeting.agenda,
                ts(&meeting.starts_at),
                meeting.duration_minutes,
                meeting.status.as_str(),
                meeting.created_by.to_string(),
                meeting.meeting_link,
                ts(&meeting.created_at),
                ts(&meeting.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_meeting(&self, id: Uuid) -> Result<Meeting> {
        Ok(self.conn().query_row(
            &format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?1"),
            params![id.to_string()],
            row_to_meeting,
        )?)
    }

    /// List meetings by start time. `None` lists every meeting, `Some`
    /// restricts to the given students.
    pub fn list_meetings(&self, students: Option<&[Uuid]>) -> Result<Vec<Meeting>> {
        match students {
            None => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {MEETING_COLUMNS} FROM meetings ORDER BY starts_at ASC"
                ))?;
                let rows = stmt.query_map([], row_to_meeting)?;
                collect(rows)
            }
            Some(ids) => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {MEETING_COLUMNS} FROM meetings
                     WHERE student_id IN (SELECT value FROM json_each(?1))
                     ORDER BY starts_at ASC"
                ))?;
                let rows = stmt.query_map(params![id_list(ids)], row_to_meeting)?;
                collect(rows)
            }
        }
    }

    /// Move a meeting from `expected` to `next` in one statement.
    ///
    /// Returns `false` when the meeting is no longer in `expected`, so two
    /// concurrent transitions cannot both succeed.
    pub fn transition_meeting(
        &self,
        id: Uuid,
        expected: MeetingStatus,
        next: MeetingStatus,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE meetings SET status = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?2",
            params![
                id.to_string(),
                expected.as_str(),
                next.as_str(),
                ts(&Utc::now()),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_meeting(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM meetings WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Delete every meeting of a student. Returns how many were removed.
    pub fn delete_meetings_for_student(&self, student_id: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM meetings WHERE student_id = ?1",
            params![student_id.to_string()],
        )?;
        Ok(affected)
    }

    /// Like [`Database::get_meeting`] but maps a missing row to `None`.
    pub fn find_meeting(&self, id: Uuid) -> Result<Option<Meeting>> {
        match self.get_meeting(id) {
            Ok(m) => Ok(Some(m)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn row_to_meeting(row: &rusqlite::Row<'_>) -> rusqlite::Result<Meeting> {
    Ok(Meeting {
        id: uuid_at(row, 0)?,
        student: uuid_at(row, 1)?,
        title: row.get(2)?,
        agenda: row.get(3)?,
        starts_at: ts_at(row, 4)?,
        duration_minutes: row.get(5)?,
        status: parsed_at(row, 6)?,
        created_by: uuid_at(row, 7)?,
        meeting_link: row.get(8)?,
        created_at: ts_at(row, 9)?,
        updated_at: ts_at(row, 10)?,
    })
}
