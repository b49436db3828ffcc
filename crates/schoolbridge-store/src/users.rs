//! CRUD operations for [`User`] records.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use schoolbridge_shared::{normalize_email, User};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{parsed_at, ts, ts_at, uuid_at};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

impl Database {
    /// Insert a new user. A duplicate email is a [`StoreError::Conflict`].
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, name, email, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    user.name,
                    normalize_email(&user.email),
                    user.password_hash,
                    user.role.as_str(),
                    ts(&user.created_at),
                ],
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => StoreError::Conflict("Email already used".into()),
                other => other,
            })?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        Ok(self.conn().query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            row_to_user,
        )?)
    }

    /// Look a user up by email, case-insensitively.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![normalize_email(email)],
                row_to_user,
            )
            .optional()?)
    }

    /// Overwrite a user's credential.
    pub fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: parsed_at(row, 4)?,
        created_at: ts_at(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use schoolbridge_shared::Role;

    use super::*;

    fn user(email: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ms. Sharma".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_find_by_email_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let u = user("Teacher@Example.com", Role::Teacher);
        db.create_user(&u).unwrap();

        let found = db.find_user_by_email(" teacher@example.COM").unwrap().unwrap();
        assert_eq!(found.id, u.id);
        assert_eq!(found.email, "teacher@example.com");
        assert_eq!(found.role, Role::Teacher);
        assert!(db.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_conflicts() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("p@x.com", Role::Parent)).unwrap();
        let err = db.create_user(&user("P@X.com", Role::Parent)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn password_hash_overwrite() {
        let db = Database::open_in_memory().unwrap();
        let u = user("p@x.com", Role::Parent);
        db.create_user(&u).unwrap();

        db.set_password_hash(u.id, "$argon2id$new").unwrap();
        assert_eq!(db.get_user(u.id).unwrap().password_hash, "$argon2id$new");

        assert!(matches!(
            db.set_password_hash(Uuid::new_v4(), "x"),
            Err(StoreError::NotFound)
        ));
    }
}
