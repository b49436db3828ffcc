//! CRUD operations for [`Student`] documents, plus the per-student halves of
//! the assignment fan-out and the guardian auto-heal.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use schoolbridge_shared::{
    normalize_email, AssignmentProgress, BehaviourNote, ProgressStatus, Role, Student,
};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{collect, id_list, json_at, opt_date_at, to_json, ts, ts_at, uuid_at};

const STUDENT_COLUMNS: &str = "id, first_name, last_name, class_name, roll_number, dob, \
     parent_name, parent_email, guardians, assignments, behaviour_notes, assignment_progress, \
     created_at, updated_at";

/// Filters for [`Database::list_students`]. Every field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub class_name: Option<String>,
    pub behaviour_tag: Option<String>,
    /// Only students whose guardians list contains this user.
    pub guardian: Option<Uuid>,
    pub limit: Option<u32>,
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn insert_student(&self, student: &Student) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO students ({STUDENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                student.id.to_string(),
                student.first_name,
                student.last_name,
                student.class_name,
                student.roll_number,
                student.dob.map(|d| d.format("%Y-%m-%d").to_string()),
                student.parent_name,
                student.parent_email.as_deref().map(normalize_email),
                to_json(&student.guardians)?,
                to_json(&student.assignments)?,
                to_json(&student.behaviour_notes)?,
                to_json(&student.assignment_progress)?,
                ts(&student.created_at),
                ts(&student.updated_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_student(&self, id: Uuid) -> Result<Student> {
        Ok(self.conn().query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"),
            params![id.to_string()],
            row_to_student,
        )?)
    }

    /// List students in creation order.
    pub fn list_students(&self, query: &StudentQuery) -> Result<Vec<Student>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(class_name) = &query.class_name {
            values.push(class_name.clone());
            clauses.push(format!("class_name = ?{}", values.len()));
        }
        if let Some(tag) = &query.behaviour_tag {
            values.push(tag.clone());
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(students.behaviour_notes) n
                         WHERE json_extract(n.value, '$.tag') = ?{})",
                values.len()
            ));
        }
        if let Some(guardian) = query.guardian {
            values.push(guardian.to_string());
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(students.guardians) g WHERE g.value = ?{})",
                values.len()
            ));
        }

        let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at ASC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_student)?;
        collect(rows)
    }

    /// Fetch the given students; unknown ids are skipped.
    pub fn students_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Student>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE id IN (SELECT value FROM json_each(?1))
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![id_list(ids)], row_to_student)?;
        collect(rows)
    }

    pub fn all_student_ids(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM students ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], |row| uuid_at(row, 0))?;
        collect(rows)
    }

    /// Ids of the students this user is a guardian of.
    pub fn student_ids_for_guardian(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM students
             WHERE EXISTS (SELECT 1 FROM json_each(students.guardians) g WHERE g.value = ?1)
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| uuid_at(row, 0))?;
        collect(rows)
    }

    /// Ids of students whose `assignments` or `assignmentProgress` mention this assignment.
    pub fn students_referencing_assignment(&self, assignment_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM students
             WHERE EXISTS (SELECT 1 FROM json_each(students.assignments) a WHERE a.value = ?1)
                OR EXISTS (SELECT 1 FROM json_each(students.assignment_progress) p
                           WHERE json_extract(p.value, '$.assignment') = ?1)",
        )?;
        let rows = stmt.query_map(params![assignment_id.to_string()], |row| uuid_at(row, 0))?;
        collect(rows)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the stored document with `student`, bumping `updated_at`.
    pub fn save_student(&self, student: &mut Student) -> Result<()> {
        student.updated_at = Utc::now();
        let affected = self.conn().execute(
            "UPDATE students SET
                first_name = ?2, last_name = ?3, class_name = ?4, roll_number = ?5, dob = ?6,
                parent_name = ?7, parent_email = ?8, guardians = ?9, assignments = ?10,
                behaviour_notes = ?11, assignment_progress = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                student.id.to_string(),
                student.first_name,
                student.last_name,
                student.class_name,
                student.roll_number,
                student.dob.map(|d| d.format("%Y-%m-%d").to_string()),
                student.parent_name,
                student.parent_email.as_deref().map(normalize_email),
                to_json(&student.guardians)?,
                to_json(&student.assignments)?,
                to_json(&student.behaviour_notes)?,
                to_json(&student.assignment_progress)?,
                ts(&student.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Link students that carry a parent email but no guardian to the
    /// parent account with that email. Returns how many were linked.
    ///
    /// Safe to run repeatedly: a linked student no longer matches.
    pub fn heal_guardian_links(&self) -> Result<usize> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students
             WHERE parent_email IS NOT NULL AND parent_email <> ''
               AND json_array_length(guardians) = 0"
        ))?;
        let orphans = collect(stmt.query_map([], row_to_student)?)?;
        drop(stmt);

        let mut healed = 0;
        for mut student in orphans {
            let Some(email) = student.parent_email.clone() else {
                continue;
            };
            match self.find_user_by_email(&email)? {
                Some(user) if user.role == Role::Parent => {
                    student.guardians.push(user.id);
                    self.save_student(&mut student)?;
                    tracing::info!(student = %student.id, guardian = %user.id, "linked guardian by parent email");
                    healed += 1;
                }
                _ => {}
            }
        }
        Ok(healed)
    }

    /// Add `assignment_id` to the student's assignments and an `assigned`
    /// progress entry, unless already present.
    pub fn link_assignment(&self, student_id: Uuid, assignment_id: Uuid) -> Result<()> {
        let mut student = self.get_student(student_id)?;
        if !student.assignments.contains(&assignment_id) {
            student.assignments.push(assignment_id);
        }
        if student.progress_for(assignment_id).is_none() {
            student
                .assignment_progress
                .push(AssignmentProgress::assigned(assignment_id));
        }
        self.save_student(&mut student)
    }

    /// Remove every trace of `assignment_id` from the student. Returns
    /// whether anything changed.
    pub fn unlink_assignment(&self, student_id: Uuid, assignment_id: Uuid) -> Result<bool> {
        let mut student = self.get_student(student_id)?;
        let before = (student.assignments.len(), student.assignment_progress.len());
        student.assignments.retain(|a| *a != assignment_id);
        student
            .assignment_progress
            .retain(|p| p.assignment != assignment_id);
        if before == (student.assignments.len(), student.assignment_progress.len()) {
            return Ok(false);
        }
        self.save_student(&mut student)?;
        Ok(true)
    }

    /// Mark the student's progress on an assignment as completed with marks.
    pub fn record_grade(
        &self,
        student_id: Uuid,
        assignment_id: Uuid,
        marks: f64,
        graded_by: Uuid,
        graded_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut student = self.get_student(student_id)?;
        if !student.assignments.contains(&assignment_id) {
            student.assignments.push(assignment_id);
        }
        let entry = match student
            .assignment_progress
            .iter()
            .position(|p| p.assignment == assignment_id)
        {
            Some(idx) => &mut student.assignment_progress[idx],
            None => {
                student
                    .assignment_progress
                    .push(AssignmentProgress::assigned(assignment_id));
                let last = student.assignment_progress.len() - 1;
                &mut student.assignment_progress[last]
            }
        };
        entry.status = ProgressStatus::Completed;
        entry.marks = Some(marks);
        entry.graded_at = Some(graded_at);
        entry.graded_by = Some(graded_by);
        self.save_student(&mut student)
    }

    pub fn add_behaviour_note(&self, student_id: Uuid, note: BehaviourNote) -> Result<Student> {
        let mut student = self.get_student(student_id)?;
        student.behaviour_notes.push(note);
        self.save_student(&mut student)?;
        Ok(student)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a student document. Returns `true` if a row was deleted.
    /// References held by other collections are not touched here.
    pub fn delete_student(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM students WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: uuid_at(row, 0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        class_name: row.get(3)?,
        roll_number: row.get(4)?,
        dob: opt_date_at(row, 5)?,
        parent_name: row.get(6)?,
        parent_email: row.get(7)?,
        guardians: json_at(row, 8)?,
        assignments: json_at(row, 9)?,
        behaviour_notes: json_at(row, 10)?,
        assignment_progress: json_at(row, 11)?,
        created_at: ts_at(row, 12)?,
        updated_at: ts_at(row, 13)?,
    })
}
