use chrono::Utc;
use tracing::info;

use super::{filter_users, UserFilter};
use crate::error::{Error, Result, ValidationErrorBuilder};
use crate::models::{email_in_use, Role, User};
use crate::storage::{Storage, StorageKey};
use crate::validation::{validate_email, validate_name};

pub struct UsersView {
    storage: Storage,
}

impl UsersView {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn list(&self) -> Result<Vec<User>> {
        Ok(self.storage.get_or_default(&StorageKey::Users)?)
    }

    pub fn filtered(&self, filter: &UserFilter) -> Result<Vec<User>> {
        Ok(filter_users(&self.list()?, filter))
    }

    fn save(&self, users: &[User]) -> Result<()> {
        self.storage.set(&StorageKey::Users, users)?;
        Ok(())
    }

    /// Apply `edit` to one user under the storage lock. `edit` also sees
    /// the full list so it can check against the other users.
    fn replace<F>(&self, user_id: &str, edit: F) -> Result<User>
    where
        F: FnOnce(&mut User, &[User]) -> Result<()>,
    {
        let _guard = self.storage.lock();
        let mut users = self.list()?;
        let index = users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or_else(|| Error::not_found(format!("User '{user_id}'")))?;
        let mut user = users[index].clone();
        edit(&mut user, &users)?;
        user.updated_at = Utc::now();
        users[index] = user.clone();
        self.save(&users)?;
        Ok(user)
    }

    /// Admin edit of name, email and role
    pub fn update(&self, edited: &User) -> Result<User> {
        let mut errors = ValidationErrorBuilder::new();
        if let Err(msg) = validate_name(&edited.name) {
            errors.add("name", msg);
        }
        if let Err(msg) = validate_email(&edited.email) {
            errors.add("email", msg);
        }
        errors.finish()?;

        let updated = self.replace(&edited.id, |user, users| {
            let email = edited.email.trim();
            if email_in_use(users, email, Some(&edited.id)) {
                return Err(Error::Conflict(format!(
                    "An account for {email} already exists"
                )));
            }
            user.name = edited.name.trim().to_string();
            user.email = email.to_string();
            user.role = edited.role;
            Ok(())
        })?;
        info!(user_id = %updated.id, "User updated by admin");
        Ok(updated)
    }

    pub fn set_role(&self, user_id: &str, role: Role) -> Result<User> {
        let updated = self.replace(user_id, |user, _| {
            user.role = role;
            Ok(())
        })?;
        info!(user_id, %role, "User role changed");
        Ok(updated)
    }

    pub fn delete(&self, user_id: &str) -> Result<()> {
        let _guard = self.storage.lock();
        let mut users = self.list()?;
        let before = users.len();
        users.retain(|u| u.id != user_id);
        if users.len() == before {
            return Err(Error::not_found(format!("User '{user_id}'")));
        }
        self.save(&users)?;

        info!(user_id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (UsersView, User) {
        let storage = Storage::in_memory();
        let user = User::new("Lucas Oliveira", "lucas@example.com", Role::Student);
        storage.set(&StorageKey::Users, &vec![user.clone()]).unwrap();
        (UsersView::new(storage), user)
    }

    #[test]
    fn test_set_role() {
        let (view, user) = seeded();
        let updated = view.set_role(&user.id, Role::Teacher).unwrap();
        assert_eq!(updated.role, Role::Teacher);
        assert_eq!(view.list().unwrap()[0].role, Role::Teacher);
        assert!(updated.updated_at >= user.updated_at);
    }

    #[test]
    fn test_update_validates() {
        let (view, user) = seeded();
        let mut edited = user.clone();
        edited.email = "broken".to_string();
        assert!(matches!(view.update(&edited), Err(Error::Validation(_))));

        edited.email = "lucas.o@example.com".to_string();
        edited.role = Role::Admin;
        let updated = view.update(&edited).unwrap();
        assert_eq!(updated.email, "lucas.o@example.com");
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.created_at, user.created_at);
    }

    #[test]
    fn test_update_rejects_email_of_another_user() {
        let (view, lucas) = seeded();
        let ana = User::new("Ana Costa", "ana@example.com", Role::Student);
        view.save(&[lucas.clone(), ana.clone()]).unwrap();

        let mut edited = ana.clone();
        edited.email = " LUCAS@example.com ".to_string();
        assert!(matches!(view.update(&edited), Err(Error::Conflict(_))));
        assert_eq!(view.list().unwrap()[1].email, "ana@example.com");

        let mut edited = lucas.clone();
        edited.email = "Lucas@Example.com".to_string();
        assert_eq!(view.update(&edited).unwrap().email, "Lucas@Example.com");
    }

    #[test]
    fn test_delete() {
        let (view, user) = seeded();
        view.delete(&user.id).unwrap();
        assert!(view.list().unwrap().is_empty());
        assert!(matches!(view.delete(&user.id), Err(Error::NotFound(_))));
        assert!(matches!(view.set_role(&user.id, Role::Admin), Err(Error::NotFound(_))));
    }
}
