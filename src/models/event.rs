use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use super::UnknownVariant;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub payment_currency: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub payment_currency: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

/// Per-event role held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventRole {
    Organizer,
    Coorganizer,
}

impl EventRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventRole::Organizer => "organizer",
            EventRole::Coorganizer => "coorganizer",
        }
    }
}

impl FromStr for EventRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(EventRole::Organizer),
            "coorganizer" => Ok(EventRole::Coorganizer),
            other => Err(UnknownVariant { kind: "event role", value: other.to_string() }),
        }
    }
}
