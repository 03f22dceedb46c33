//! Community events and registrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    /// Free-form date label as entered by the admin
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Confirmed,
    Pending,
    Canceled,
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Pending => write!(f, "pending"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirmed" => Ok(Self::Confirmed),
            "pending" => Ok(Self::Pending),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(format!("Unknown registration status: {}", s)),
        }
    }
}

/// Registration of a user for an event, keyed by `(user_id, event_id)`.
///
/// `event_id` is not checked against the event list; the event may have
/// been deleted since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRegistration {
    pub user_id: String,
    pub event_id: String,
    pub user_name: String,
    pub user_email: String,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
}

impl EventRegistration {
    pub fn matches(&self, user_id: &str, event_id: &str) -> bool {
        self.user_id == user_id && self.event_id == event_id
    }
}
