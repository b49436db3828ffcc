//! Portal documents.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names, so the same types travel through the store, the HTTP API and the
//! client without DTO copies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MeetingStatus, ProgressStatus, Role, SenderRole};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account that can log in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Trimmed, lowercase. Unique across all users.
    pub email: String,
    /// Argon2 PHC string. Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Public view of a [`User`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Student
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BehaviourNote {
    pub id: Uuid,
    pub note: String,
    pub tag: Option<String>,
    /// User id of the staff member who wrote the note.
    pub author: Uuid,
    pub date: DateTime<Utc>,
}

/// Per-student tracking of one assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentProgress {
    pub assignment: Uuid,
    pub status: ProgressStatus,
    pub marks: Option<f64>,
    pub graded_at: Option<DateTime<Utc>>,
    pub graded_by: Option<Uuid>,
}

impl AssignmentProgress {
    pub fn assigned(assignment: Uuid) -> Self {
        Self {
            assignment,
            status: ProgressStatus::Assigned,
            marks: None,
            graded_at: None,
            graded_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub roll_number: String,
    pub dob: Option<NaiveDate>,
    pub parent_name: Option<String>,
    /// Parent contact email. Used to create or resolve the guardian link,
    /// never as an access check on its own.
    pub parent_email: Option<String>,
    #[serde(default)]
    pub guardians: Vec<Uuid>,
    #[serde(default)]
    pub assignments: Vec<Uuid>,
    #[serde(default)]
    pub behaviour_notes: Vec<BehaviourNote>,
    #[serde(default)]
    pub assignment_progress: Vec<AssignmentProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    pub fn has_guardian(&self, user_id: Uuid) -> bool {
        self.guardians.contains(&user_id)
    }

    pub fn progress_for(&self, assignment: Uuid) -> Option<&AssignmentProgress> {
        self.assignment_progress
            .iter()
            .find(|p| p.assignment == assignment)
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub student: Uuid,
    pub score: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub max_marks: f64,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
    pub created_by: Uuid,
    #[serde(default)]
    pub grades: Vec<Grade>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn grade_for(&self, student: Uuid) -> Option<&Grade> {
        self.grades.iter().find(|g| g.student == student)
    }
}

// ---------------------------------------------------------------------------
// Meeting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: Uuid,
    pub student: Uuid,
    pub title: String,
    #[serde(default)]
    pub agenda: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: MeetingStatus,
    pub created_by: Uuid,
    #[serde(default)]
    pub meeting_link: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message thread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub sender_role: SenderRole,
    pub sender: Uuid,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The single message history of one student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageThread {
    pub id: Uuid,
    pub student: Uuid,
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    pub created_at: DateTime<Utc>,
    /// Last activity on the thread.
    pub updated_at: DateTime<Utc>,
}

impl MessageThread {
    pub fn last_message(&self) -> Option<&ThreadMessage> {
        self.messages.last()
    }
}
