use tracing::info;

use crate::error::{Error, Result, ValidationErrorBuilder};
use crate::models::{Event, NewEvent};
use crate::storage::{Storage, StorageKey};

/// Community event list. Deleting an event leaves its registrations alone.
pub struct EventsView {
    storage: Storage,
}

impl EventsView {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn list(&self) -> Result<Vec<Event>> {
        Ok(self.storage.get_or_default(&StorageKey::Events)?)
    }

    fn save(&self, events: &[Event]) -> Result<()> {
        self.storage.set(&StorageKey::Events, events)?;
        Ok(())
    }

    fn validate(title: &str, date: &str) -> Result<()> {
        let mut errors = ValidationErrorBuilder::new();
        errors
            .require("title", title, "Title is required")
            .require("date", date, "Date is required");
        errors.finish()
    }

    pub fn create(&self, new: NewEvent) -> Result<Event> {
        Self::validate(&new.title, &new.date)?;
        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            title: new.title.trim().to_string(),
            date: new.date.trim().to_string(),
            location: new.location.trim().to_string(),
            description: new.description,
        };
        let _guard = self.storage.lock();
        let mut events = self.list()?;
        events.push(event.clone());
        self.save(&events)?;

        info!(event_id = %event.id, title = %event.title, "Event created");
        Ok(event)
    }

    pub fn update(&self, event: Event) -> Result<Event> {
        Self::validate(&event.title, &event.date)?;
        let event = Event {
            title: event.title.trim().to_string(),
            date: event.date.trim().to_string(),
            location: event.location.trim().to_string(),
            ..event
        };
        let _guard = self.storage.lock();
        let mut events = self.list()?;
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| Error::not_found(format!("Event '{}'", event.id)))?;
        *slot = event.clone();
        self.save(&events)?;
        Ok(event)
    }

    pub fn delete(&self, event_id: &str) -> Result<()> {
        let _guard = self.storage.lock();
        let mut events = self.list()?;
        let before = events.len();
        events.retain(|e| e.id != event_id);
        if events.len() == before {
            return Err(Error::not_found(format!("Event '{event_id}'")));
        }
        self.save(&events)?;

        info!(event_id, "Event deleted");
        Ok(())
    }
}
