//! CRUD operations for [`Assignment`] documents.

use chrono::Utc;
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use schoolbridge_shared::Assignment;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{collect, id_list, json_at, opt_ts_at, to_json, ts, ts_at, uuid_at};

const ASSIGNMENT_COLUMNS: &str = "id, title, subject, description, due_date, max_marks, \
     assigned_to, created_by, grades, created_at, updated_at";

/// Filters for [`Database::list_assignments`].
#[derive(Debug, Clone, Default)]
pub struct AssignmentQuery {
    pub subject: Option<String>,
    /// Only assignments given to this student.
    pub student: Option<Uuid>,
    /// Only assignments given to at least one of these students.
    pub any_student: Option<Vec<Uuid>>,
}

impl Database {
    pub fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO assignments ({ASSIGNMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                assignment.id.to_string(),
                assignment.title,
                assignment.subject,
                assignment.description,
                assignment.due_date.as_ref().map(ts),
                assignment.max_marks,
                to_json(&assignment.assigned_to)?,
                assignment.created_by.to_string(),
                to_json(&assignment.grades)?,
                ts(&assignment.created_at),
                ts(&assignment.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_assignment(&self, id: Uuid) -> Result<Assignment> {
        Ok(self.conn().query_row(
            &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?1"),
            params![id.to_string()],
            row_to_assignment,
        )?)
    }

    /// List assignments, newest first.
    pub fn list_assignments(&self, query: &AssignmentQuery) -> Result<Vec<Assignment>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(subject) = &query.subject {
            values.push(subject.clone());
            clauses.push(format!("subject = ?{}", values.len()));
        }
        if let Some(student) = query.student {
            values.push(student.to_string());
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(assignments.assigned_to) t WHERE t.value = ?{})",
                values.len()
            ));
        }
        if let Some(students) = &query.any_student {
            values.push(id_list(students));
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(assignments.assigned_to) t
                         WHERE t.value IN (SELECT value FROM json_each(?{})))",
                values.len()
            ));
        }

        let mut sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_assignment)?;
        collect(rows)
    }

    /// Ids of assignments whose `assignedTo` or `grades` mention this student.
    pub fn assignments_referencing_student(&self, student_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM assignments
             WHERE EXISTS (SELECT 1 FROM json_each(assignments.assigned_to) t WHERE t.value = ?1)
                OR EXISTS (SELECT 1 FROM json_each(assignments.grades) g
                           WHERE json_extract(g.value, '$.student') = ?1)",
        )?;
        let rows = stmt.query_map(params![student_id.to_string()], |row| uuid_at(row, 0))?;
        collect(rows)
    }

    /// Replace the stored document with `assignment`, bumping `updated_at`.
    pub fn save_assignment(&self, assignment: &mut Assignment) -> Result<()> {
        assignment.updated_at = Utc::now();
        let affected = self.conn().execute(
            "UPDATE assignments SET
                title = ?2, subject = ?3, description = ?4, due_date = ?5, max_marks = ?6,
                assigned_to = ?7, grades = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                assignment.id.to_string(),
                assignment.title,
                assignment.subject,
                assignment.description,
                assignment.due_date.as_ref().map(ts),
                assignment.max_marks,
                to_json(&assignment.assigned_to)?,
                to_json(&assignment.grades)?,
                ts(&assignment.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Drop a student from an assignment's targets and grades. Returns
    /// whether anything changed.
    pub fn remove_student_from_assignment(&self, assignment_id: Uuid, student_id: Uuid) -> Result<bool> {
        let mut assignment = self.get_assignment(assignment_id)?;
        let before = (assignment.assigned_to.len(), assignment.grades.len());
        assignment.assigned_to.retain(|s| *s != student_id);
        assignment.grades.retain(|g| g.student != student_id);
        if before == (assignment.assigned_to.len(), assignment.grades.len()) {
            return Ok(false);
        }
        self.save_assignment(&mut assignment)?;
        Ok(true)
    }

    pub fn delete_assignment(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM assignments WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_assignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        subject: row.get(2)?,
        description: row.get(3)?,
        due_date: opt_ts_at(row, 4)?,
        max_marks: row.get(5)?,
        assigned_to: json_at(row, 6)?,
        created_by: uuid_at(row, 7)?,
        grades: json_at(row, 8)?,
        created_at: ts_at(row, 9)?,
        updated_at: ts_at(row, 10)?,
    })
}
