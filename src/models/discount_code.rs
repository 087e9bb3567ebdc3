use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use super::UnknownVariant;

/// Fixed textual format of discount validity timestamps.
pub const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a discount code is redeemable against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountScope {
    /// Specific ticket types of one event.
    Ticket,
    /// Every ticket of the owning event.
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// Flat reduction per ticket.
    Amount,
    /// Percentage of the ticket line.
    Percent,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: i64,
    pub code: String,
    pub event_id: i64,
    pub value: Decimal,
    #[sqlx(try_from = "String")]
    pub kind: DiscountKind,
    pub is_active: bool,
    pub valid_from: NaiveDateTime,
    pub valid_till: NaiveDateTime,
    pub tickets_number: Option<i32>,
    pub min_quantity: i32,
    pub max_quantity: Option<i32>,
    /// Ticket ids a ticket-scoped code applies to.
    pub tickets: Vec<i64>,
    #[sqlx(try_from = "String")]
    pub used_for: DiscountScope,
}

impl DiscountCode {
    pub fn applies_to(&self, ticket_id: i64) -> bool {
        match self.used_for {
            DiscountScope::Event => true,
            DiscountScope::Ticket => self.tickets.contains(&ticket_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDiscountCode {
    pub code: String,
    pub event_id: i64,
    pub value: Decimal,
    pub kind: DiscountKind,
    pub is_active: bool,
    pub valid_from: NaiveDateTime,
    pub valid_till: NaiveDateTime,
    pub tickets_number: Option<i32>,
    pub min_quantity: i32,
    pub max_quantity: Option<i32>,
    pub tickets: Vec<i64>,
    pub used_for: DiscountScope,
}

/// Parses a `valid-from` / `valid-till` value.
pub fn parse_window_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, WINDOW_FORMAT)
}

impl DiscountScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountScope::Ticket => "ticket",
            DiscountScope::Event => "event",
        }
    }
}

impl FromStr for DiscountScope {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticket" => Ok(DiscountScope::Ticket),
            "event" => Ok(DiscountScope::Event),
            other => Err(UnknownVariant { kind: "discount scope", value: other.to_string() }),
        }
    }
}

impl TryFrom<String> for DiscountScope {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Amount => "amount",
            DiscountKind::Percent => "percent",
        }
    }
}

impl FromStr for DiscountKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount" => Ok(DiscountKind::Amount),
            "percent" => Ok(DiscountKind::Percent),
            other => Err(UnknownVariant { kind: "discount kind", value: other.to_string() }),
        }
    }
}

impl TryFrom<String> for DiscountKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
