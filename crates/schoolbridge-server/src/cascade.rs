//! Cleanup of references left behind by a delete.
//!
//! Each step is an independent write. A failed step is logged and reported
//! but does not stop the remaining steps or undo the delete.

use std::fmt::Display;

use tracing::{info, warn};
use uuid::Uuid;

use schoolbridge_shared::api::CleanupReport;
use schoolbridge_store::Database;

fn record_failure(report: &mut CleanupReport, step: String, err: impl Display) {
    warn!(step = %step, error = %err, "Cleanup step failed");
    report.failures.push(format!("{step}: {err}"));
}

/// Remove a deleted student from assignments, and drop their meetings and
/// message thread.
pub fn after_student_deleted(db: &Database, student_id: Uuid) -> CleanupReport {
    let mut report = CleanupReport::default();

    match db.assignments_referencing_student(student_id) {
        Ok(ids) => {
            for id in ids {
                match db.remove_student_from_assignment(id, student_id) {
                    Ok(true) => report.assignments_updated += 1,
                    Ok(false) => {}
                    Err(e) => record_failure(&mut report, format!("assignment {id}"), e),
                }
            }
        }
        Err(e) => record_failure(&mut report, "assignments".into(), e),
    }

    match db.delete_meetings_for_student(student_id) {
        Ok(n) => report.meetings_removed = n,
        Err(e) => record_failure(&mut report, "meetings".into(), e),
    }

    match db.delete_thread_for_student(student_id) {
        Ok(removed) => report.thread_removed = removed,
        Err(e) => record_failure(&mut report, "thread".into(), e),
    }

    info!(
        student = %student_id,
        assignments = report.assignments_updated,
        meetings = report.meetings_removed,
        thread = report.thread_removed,
        failures = report.failures.len(),
        "Student cleanup finished"
    );
    report
}

/// Remove a deleted assignment from every student that still lists it.
pub fn after_assignment_deleted(db: &Database, assignment_id: Uuid) -> CleanupReport {
    let mut report = CleanupReport::default();

    match db.students_referencing_assignment(assignment_id) {
        Ok(ids) => {
            for id in ids {
                match db.unlink_assignment(id, assignment_id) {
                    Ok(true) => report.students_updated += 1,
                    Ok(false) => {}
                    Err(e) => record_failure(&mut report, format!("student {id}"), e),
                }
            }
        }
        Err(e) => record_failure(&mut report, "students".into(), e),
    }

    info!(
        assignment = %assignment_id,
        students = report.students_updated,
        failures = report.failures.len(),
        "Assignment cleanup finished"
    );
    report
}
