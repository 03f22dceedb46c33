use chrono::Utc;
use tracing::info;

use super::{count_registrations, filter_registrations, RegistrationCounts, RegistrationFilter, RegistrationRow};
use crate::error::{Error, Result};
use crate::models::{Event, EventRegistration, RegistrationStatus, User};
use crate::storage::{Storage, StorageKey};

pub struct RegistrationsView {
    storage: Storage,
}

impl RegistrationsView {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn list(&self) -> Result<Vec<EventRegistration>> {
        Ok(self.storage.get_or_default(&StorageKey::Registrations)?)
    }

    pub fn filtered(&self, filter: &RegistrationFilter) -> Result<Vec<RegistrationRow>> {
        let registrations = self.list()?;
        let events: Vec<Event> = self.storage.get_or_default(&StorageKey::Events)?;
        Ok(filter_registrations(&registrations, &events, filter))
    }

    pub fn counts(&self) -> Result<RegistrationCounts> {
        Ok(count_registrations(&self.list()?))
    }

    fn save(&self, registrations: &[EventRegistration]) -> Result<()> {
        self.storage.set(&StorageKey::Registrations, registrations)?;
        Ok(())
    }

    /// Sign `user` up for an event; the registration starts out pending
    pub fn register(&self, user: &User, event_id: &str) -> Result<EventRegistration> {
        let _guard = self.storage.lock();
        let events: Vec<Event> = self.storage.get_or_default(&StorageKey::Events)?;
        if !events.iter().any(|e| e.id == event_id) {
            return Err(Error::not_found(format!("Event '{event_id}'")));
        }

        let mut registrations = self.list()?;
        if registrations.iter().any(|r| r.matches(&user.id, event_id)) {
            return Err(Error::Conflict(format!(
                "{} is already registered for this event",
                user.email
            )));
        }

        let registration = EventRegistration {
            user_id: user.id.clone(),
            event_id: event_id.to_string(),
            user_name: user.name.clone(),
            user_email: user.email.clone(),
            status: RegistrationStatus::Pending,
            registered_at: Utc::now(),
        };
        registrations.push(registration.clone());
        self.save(&registrations)?;

        info!(user_id = %user.id, event_id, "Registered for event");
        Ok(registration)
    }

    fn set_status(
        &self,
        user_id: &str,
        event_id: &str,
        status: RegistrationStatus,
    ) -> Result<Vec<EventRegistration>> {
        let _guard = self.storage.lock();
        let mut registrations = self.list()?;
        let registration = registrations
            .iter_mut()
            .find(|r| r.matches(user_id, event_id))
            .ok_or_else(|| Error::not_found("Registration"))?;
        let previous = registration.status;
        registration.status = status;
        self.save(&registrations)?;

        info!(user_id, event_id, from = %previous, to = %status, "Registration status changed");
        Ok(registrations)
    }

    pub fn confirm(&self, user_id: &str, event_id: &str) -> Result<Vec<EventRegistration>> {
        self.set_status(user_id, event_id, RegistrationStatus::Confirmed)
    }

    pub fn cancel(&self, user_id: &str, event_id: &str) -> Result<Vec<EventRegistration>> {
        self.set_status(user_id, event_id, RegistrationStatus::Canceled)
    }

    pub fn delete(&self, user_id: &str, event_id: &str) -> Result<Vec<EventRegistration>> {
        let _guard = self.storage.lock();
        let mut registrations = self.list()?;
        let before = registrations.len();
        registrations.retain(|r| !r.matches(user_id, event_id));
        if registrations.len() == before {
            return Err(Error::not_found("Registration"));
        }
        self.save(&registrations)?;

        info!(user_id, event_id, "Registration deleted");
        Ok(registrations)
    }
}
