use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchoolBridgeError;

/// Account role. Fixed when the user is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
            Role::Student => "student",
        }
    }

    /// Teachers and admins manage every record in the portal.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }

    /// The role a message from this account is tagged with, if it may post at all.
    pub fn sender_role(&self) -> Option<SenderRole> {
        match self {
            Role::Admin | Role::Teacher => Some(SenderRole::Teacher),
            Role::Parent => Some(SenderRole::Parent),
            Role::Student => None,
        }
    }
}

impl FromStr for Role {
    type Err = SchoolBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            "student" => Ok(Role::Student),
            other => Err(SchoolBridgeError::Validation(format!("unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a meeting.
///
/// `Scheduled` is the only non-terminal state: it may move to `Completed` or
/// `Cancelled`, and nothing moves out of those.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        matches!(
            (self, next),
            (MeetingStatus::Scheduled, MeetingStatus::Completed)
                | (MeetingStatus::Scheduled, MeetingStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MeetingStatus::Scheduled)
    }
}

impl FromStr for MeetingStatus {
    type Err = SchoolBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MeetingStatus::Scheduled),
            "completed" => Ok(MeetingStatus::Completed),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            other => Err(SchoolBridgeError::Validation(format!(
                "invalid meeting status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Assigned,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Teacher,
    Parent,
}
