//! Populate a store with a demo teacher, parent, two students and one
//! assignment. Running it twice is a no-op.

use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use schoolbridge_shared::password::hash_password;
use schoolbridge_shared::{Assignment, Role, Student, User};
use schoolbridge_store::Database;

const TEACHER_EMAIL: &str = "teacher@example.com";
const PARENT_EMAIL: &str = "parent@example.com";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db = match std::env::var("DATABASE_PATH") {
        Ok(path) if !path.trim().is_empty() => Database::open_at(std::path::Path::new(path.trim()))?,
        _ => Database::new()?,
    };

    if db.find_user_by_email(TEACHER_EMAIL)?.is_some() {
        info!(path = ?db.path(), "Seed data already present, nothing to do");
        return Ok(());
    }

    let now = Utc::now();
    let teacher = account("Ms. Sharma", TEACHER_EMAIL, "teacher123", Role::Teacher)?;
    let parent = account("Priya K", PARENT_EMAIL, "parent123", Role::Parent)?;
    db.create_user(&teacher)?;
    db.create_user(&parent)?;

    let students = [("Aarav", "K", "1"), ("Maya", "P", "2")].map(|(first, last, roll)| Student {
        id: Uuid::new_v4(),
        first_name: first.into(),
        last_name: last.into(),
        class_name: "7A".into(),
        roll_number: roll.into(),
        dob: None,
        parent_name: Some(parent.name.clone()),
        parent_email: Some(parent.email.clone()),
        guardians: vec![parent.id],
        assignments: vec![],
        behaviour_notes: vec![],
        assignment_progress: vec![],
        created_at: now,
        updated_at: now,
    });
    for student in &students {
        db.insert_student(student)?;
    }

    let assignment = Assignment {
        id: Uuid::new_v4(),
        title: "Math Test 1".into(),
        subject: "Math".into(),
        description: "Fractions and decimals".into(),
        due_date: Some(now + chrono::Duration::days(7)),
        max_marks: 100.0,
        assigned_to: students.iter().map(|s| s.id).collect(),
        created_by: teacher.id,
        grades: vec![],
        created_at: now,
        updated_at: now,
    };
    db.insert_assignment(&assignment)?;
    for student in &students {
        db.link_assignment(student.id, assignment.id)?;
    }

    info!(
        path = ?db.path(),
        teacher = TEACHER_EMAIL,
        parent = PARENT_EMAIL,
        students = students.len(),
        "Seeded demo data"
    );
    Ok(())
}

fn account(name: &str, email: &str, password: &str, role: Role) -> anyhow::Result<User> {
    Ok(User {
        id: Uuid::new_v4(),
        name: name.into(),
        email: email.into(),
        password_hash: hash_password(password)?,
        role,
        created_at: Utc::now(),
    })
}
