//! Admin views over users, community events and event registrations.
//!
//! Filtering is a full rescan of the source list on every call. Mutations
//! load a list, transform it and write the whole list back as one value.

mod events;
mod registrations;
mod users;

pub use events::EventsView;
pub use registrations::RegistrationsView;
pub use users::UsersView;

use serde::Serialize;

use crate::models::{Event, EventRegistration, RegistrationStatus, Role, User};

/// Title shown for registrations whose event no longer exists
pub const UNKNOWN_EVENT: &str = "Unknown Event";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(RegistrationStatus),
}

impl StatusFilter {
    pub fn accepts(self, status: RegistrationStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse().map(StatusFilter::Only)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub search: String,
    pub status: StatusFilter,
}

/// A registration joined with the title of its event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRow {
    #[serde(flatten)]
    pub registration: EventRegistration,
    pub event_title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationCounts {
    pub total: usize,
    pub confirmed: usize,
    pub pending: usize,
    pub canceled: usize,
}

pub fn event_title<'a>(events: &'a [Event], event_id: &str) -> &'a str {
    events
        .iter()
        .find(|e| e.id == event_id)
        .map(|e| e.title.as_str())
        .unwrap_or(UNKNOWN_EVENT)
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Registrations matching the status filter and, case-insensitively, the
/// search term against user name, user email or event title. Source order
/// is preserved.
pub fn filter_registrations(
    registrations: &[EventRegistration],
    events: &[Event],
    filter: &RegistrationFilter,
) -> Vec<RegistrationRow> {
    let needle = filter.search.trim().to_lowercase();
    registrations
        .iter()
        .filter(|r| filter.status.accepts(r.status))
        .map(|r| RegistrationRow {
            registration: r.clone(),
            event_title: event_title(events, &r.event_id).to_string(),
        })
        .filter(|row| {
            needle.is_empty()
                || contains_ci(&row.registration.user_name, &needle)
                || contains_ci(&row.registration.user_email, &needle)
                || contains_ci(&row.event_title, &needle)
        })
        .collect()
}

pub fn count_registrations(registrations: &[EventRegistration]) -> RegistrationCounts {
    registrations
        .iter()
        .fold(RegistrationCounts::default(), |mut counts, r| {
            counts.total += 1;
            match r.status {
                RegistrationStatus::Confirmed => counts.confirmed += 1,
                RegistrationStatus::Pending => counts.pending += 1,
                RegistrationStatus::Canceled => counts.canceled += 1,
            }
            counts
        })
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: String,
    pub role: Option<Role>,
}

/// Users matching the role filter and, case-insensitively, the search term
/// against name or email
pub fn filter_users(users: &[User], filter: &UserFilter) -> Vec<User> {
    let needle = filter.search.trim().to_lowercase();
    users
        .iter()
        .filter(|u| filter.role.map_or(true, |role| u.role == role))
        .filter(|u| needle.is_empty() || contains_ci(&u.name, &needle) || contains_ci(&u.email, &needle))
        .cloned()
        .collect()
}
