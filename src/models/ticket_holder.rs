use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Attendee record; one per purchased seat.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketHolder {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub ticket_id: i64,
    pub order_id: Option<i64>,
    pub pdf_url: Option<String>,
}

impl TicketHolder {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

#[derive(Debug, Clone)]
pub struct NewTicketHolder {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub ticket_id: i64,
}
