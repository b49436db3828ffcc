//! Which students a session may see.
//!
//! Staff see every student. A parent sees exactly the students whose
//! guardians list contains their user id. Other roles see nothing.

use uuid::Uuid;

use schoolbridge_shared::{Role, Student};
use schoolbridge_store::Database;

use crate::error::ServerError;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Children(Vec<Uuid>),
}

impl Scope {
    pub fn resolve(db: &Database, session: &Session) -> Result<Self, ServerError> {
        match session.role() {
            Role::Admin | Role::Teacher => Ok(Scope::All),
            Role::Parent => Ok(Scope::Children(
                db.student_ids_for_guardian(session.user_id())?,
            )),
            Role::Student => Err(ServerError::Forbidden(
                "student accounts have no portal access".into(),
            )),
        }
    }

    /// Id filter for store listings: `None` means unrestricted.
    pub fn filter(&self) -> Option<&[Uuid]> {
        match self {
            Scope::All => None,
            Scope::Children(ids) => Some(ids.as_slice()),
        }
    }

    pub fn allows(&self, student: Uuid) -> bool {
        match self {
            Scope::All => true,
            Scope::Children(ids) => ids.contains(&student),
        }
    }
}

pub fn can_access_student(session: &Session, student: &Student) -> bool {
    session.is_staff() || (session.role() == Role::Parent && student.has_guardian(session.user_id()))
}
