use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A ticket type on sale for an event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub is_fee_absorbed: bool,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub event_id: i64,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub is_fee_absorbed: bool,
}

/// Platform service fee for one currency.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TicketFees {
    pub currency: String,
    /// Percentage of the ticket line.
    pub service_fee: Decimal,
    pub maximum_fee: Decimal,
}
