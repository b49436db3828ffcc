//! Role-aware screens built from fetched documents.
//!
//! Every builder is a pure function of data the API already returned, so a
//! front end can re-render after each call without extra round trips.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use schoolbridge_shared::api::{DashboardSummary, MeetingView, StudentRef, ThreadView};
use schoolbridge_shared::{Assignment, MeetingStatus, ProgressStatus, Role, SenderRole, Student};

const PREVIEW_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Dashboards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRow {
    pub class_name: String,
    pub students: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeacherDashboard {
    pub summary: DashboardSummary,
    /// Students per class, by class name. Unassigned students are listed as "-".
    pub classes: Vec<ClassRow>,
    /// Assigned (student, assignment) pairs still waiting for a grade.
    pub awaiting_grades: usize,
    pub next_meetings: Vec<MeetingRow>,
}

pub fn teacher_dashboard(
    summary: DashboardSummary,
    students: &[Student],
    assignments: &[Assignment],
    meetings: &[MeetingView],
    now: DateTime<Utc>,
) -> TeacherDashboard {
    let mut per_class: HashMap<&str, usize> = HashMap::new();
    for student in students {
        let class = if student.class_name.is_empty() { "-" } else { student.class_name.as_str() };
        *per_class.entry(class).or_default() += 1;
    }
    let mut classes: Vec<ClassRow> = per_class
        .into_iter()
        .map(|(class_name, students)| ClassRow {
            class_name: class_name.to_string(),
            students,
        })
        .collect();
    classes.sort_by(|a, b| a.class_name.cmp(&b.class_name));

    let awaiting_grades = assignments
        .iter()
        .map(|a| a.assigned_to.iter().filter(|s| a.grade_for(**s).is_none()).count())
        .sum();

    let mut next_meetings = meeting_scheduler(meetings, now).upcoming;
    next_meetings.truncate(5);

    TeacherDashboard {
        summary,
        classes,
        awaiting_grades,
        next_meetings,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildCard {
    pub student: StudentRef,
    pub pending: usize,
    pub completed: usize,
    /// Mean of graded percentages, if anything is graded.
    pub average_percent: Option<f64>,
    pub next_meeting: Option<DateTime<Utc>>,
    pub last_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParentDashboard {
    pub greeting: String,
    pub children: Vec<ChildCard>,
}

pub fn parent_dashboard(
    parent_name: &str,
    children: &[Student],
    assignments: &[Assignment],
    meetings: &[MeetingView],
    threads: &[ThreadView],
    now: DateTime<Utc>,
) -> ParentDashboard {
    let max_marks: HashMap<Uuid, f64> = assignments.iter().map(|a| (a.id, a.max_marks)).collect();

    let cards = children
        .iter()
        .map(|child| {
            let pending = child
                .assignment_progress
                .iter()
                .filter(|p| p.status == ProgressStatus::Assigned)
                .count();
            let percents: Vec<f64> = child
                .assignment_progress
                .iter()
                .filter_map(|p| Some(percent(p.marks?, *max_marks.get(&p.assignment)?)))
                .collect();
            let next_meeting = meetings
                .iter()
                .filter(|m| m.meeting.student == child.id && is_upcoming(m, now))
                .map(|m| m.meeting.starts_at)
                .min();
            let last_message = threads
                .iter()
                .find(|t| t.thread.student == child.id)
                .and_then(|t| t.thread.last_message())
                .map(|m| preview(&m.text));

            ChildCard {
                student: StudentRef::from(child),
                pending,
                completed: child.assignment_progress.len() - pending,
                average_percent: mean(&percents),
                next_meeting,
                last_message,
            }
        })
        .collect();

    let name = parent_name.trim();
    ParentDashboard {
        greeting: format!("Welcome, {}", if name.is_empty() { "there" } else { name }),
        children: cards,
    }
}

// ---------------------------------------------------------------------------
// Student detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRow {
    pub assignment: Uuid,
    pub title: String,
    pub subject: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: ProgressStatus,
    pub marks: Option<f64>,
    pub max_marks: Option<f64>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub date: DateTime<Utc>,
    pub tag: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentDetail {
    pub name: String,
    pub class_name: String,
    pub roll_number: String,
    pub dob: Option<NaiveDate>,
    pub parent_name: Option<String>,
    pub parent_email: Option<String>,
    pub progress: Vec<ProgressRow>,
    /// Newest first.
    pub notes: Vec<NoteRow>,
}

/// Progress entries whose assignment is not in `assignments` still show up,
/// titled "(removed assignment)".
pub fn student_detail(student: &Student, assignments: &[Assignment]) -> StudentDetail {
    let by_id: HashMap<Uuid, &Assignment> = assignments.iter().map(|a| (a.id, a)).collect();

    let mut progress: Vec<ProgressRow> = student
        .assignment_progress
        .iter()
        .map(|p| {
            let assignment = by_id.get(&p.assignment);
            ProgressRow {
                assignment: p.assignment,
                title: assignment.map_or_else(|| "(removed assignment)".to_string(), |a| a.title.clone()),
                subject: assignment.map(|a| a.subject.clone()).unwrap_or_default(),
                due_date: assignment.and_then(|a| a.due_date),
                status: p.status,
                marks: p.marks,
                max_marks: assignment.map(|a| a.max_marks),
                remarks: assignment
                    .and_then(|a| a.grade_for(student.id))
                    .and_then(|g| g.remarks.clone()),
            }
        })
        .collect();
    progress.sort_by_key(|row| (row.due_date.is_none(), row.due_date));

    let mut notes: Vec<NoteRow> = student
        .behaviour_notes
        .iter()
        .map(|n| NoteRow {
            date: n.date,
            tag: n.tag.clone(),
            note: n.note.clone(),
        })
        .collect();
    notes.sort_by(|a, b| b.date.cmp(&a.date));

    StudentDetail {
        name: student.full_name(),
        class_name: student.class_name.clone(),
        roll_number: student.roll_number.clone(),
        dob: student.dob,
        parent_name: student.parent_name.clone(),
        parent_email: student.parent_email.clone(),
        progress,
        notes,
    }
}

// ---------------------------------------------------------------------------
// Assignments table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRow {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_marks: f64,
    /// Names of assigned students still present in `students`.
    pub assigned: Vec<String>,
    pub graded: usize,
    pub average_percent: Option<f64>,
}

pub fn assignments_table(assignments: &[Assignment], students: &[Student]) -> Vec<AssignmentRow> {
    let names: HashMap<Uuid, String> = students.iter().map(|s| (s.id, s.full_name())).collect();

    assignments
        .iter()
        .map(|a| {
            let percents: Vec<f64> = a.grades.iter().map(|g| percent(g.score, a.max_marks)).collect();
            AssignmentRow {
                id: a.id,
                title: a.title.clone(),
                subject: a.subject.clone(),
                due_date: a.due_date,
                max_marks: a.max_marks,
                assigned: a.assigned_to.iter().filter_map(|id| names.get(id).cloned()).collect(),
                graded: a.grades.len(),
                average_percent: mean(&percents),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Meeting scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MeetingRow {
    pub id: Uuid,
    pub title: String,
    pub student: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: MeetingStatus,
    pub meeting_link: Option<String>,
    /// Only scheduled meetings can still be completed or cancelled.
    pub can_update: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeetingSchedule {
    /// Scheduled and not yet started, soonest first.
    pub upcoming: Vec<MeetingRow>,
    /// Everything else, most recent first.
    pub past: Vec<MeetingRow>,
}

pub fn meeting_scheduler(meetings: &[MeetingView], now: DateTime<Utc>) -> MeetingSchedule {
    let mut schedule = MeetingSchedule::default();
    for view in meetings {
        let m = &view.meeting;
        let row = MeetingRow {
            id: m.id,
            title: m.title.clone(),
            student: view
                .student_info
                .as_ref()
                .map_or_else(|| "(removed student)".to_string(), StudentRef::full_name),
            starts_at: m.starts_at,
            ends_at: m.starts_at + chrono::Duration::minutes(i64::from(m.duration_minutes)),
            status: m.status,
            meeting_link: Some(m.meeting_link.clone()).filter(|l| !l.is_empty()),
            can_update: !m.status.is_terminal(),
        };
        if is_upcoming(view, now) {
            schedule.upcoming.push(row);
        } else {
            schedule.past.push(row);
        }
    }
    schedule.upcoming.sort_by_key(|r| r.starts_at);
    schedule.past.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
    schedule
}

fn is_upcoming(view: &MeetingView, now: DateTime<Utc>) -> bool {
    view.meeting.status == MeetingStatus::Scheduled && view.meeting.starts_at >= now
}

// ---------------------------------------------------------------------------
// Message inbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct InboxRow {
    pub thread: Uuid,
    pub student_id: Uuid,
    pub student: String,
    pub teacher_name: Option<String>,
    pub preview: Option<String>,
    pub last_sender: Option<SenderRole>,
    pub updated_at: DateTime<Utc>,
    pub messages: usize,
    /// The last message came from the other side of the conversation.
    pub awaiting_reply: bool,
}

/// Threads ordered by last activity, flagged from the viewer's side.
pub fn message_inbox(threads: &[ThreadView], viewer: Role) -> Vec<InboxRow> {
    let own = viewer.sender_role();
    let mut rows: Vec<InboxRow> = threads
        .iter()
        .map(|view| {
            let t = &view.thread;
            let last = t.last_message();
            InboxRow {
                thread: t.id,
                student_id: t.student,
                student: view
                    .student_info
                    .as_ref()
                    .map_or_else(|| "(removed student)".to_string(), StudentRef::full_name),
                teacher_name: t.teacher_name.clone(),
                preview: last.map(|m| preview(&m.text)),
                last_sender: last.map(|m| m.sender_role),
                updated_at: t.updated_at,
                messages: t.messages.len(),
                awaiting_reply: match (last, own) {
                    (Some(m), Some(role)) => m.sender_role != role,
                    _ => false,
                },
            }
        })
        .collect();
    rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    rows
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn percent(score: f64, max_marks: f64) -> f64 {
    if max_marks > 0.0 {
        score / max_marks * 100.0
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
