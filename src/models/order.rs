use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Placed,
    Completed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Placed => "placed",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }

    /// Orders in these states no longer hold their tickets.
    pub fn is_void(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Expired)
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "placed" => Ok(OrderStatus::Placed),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(UnknownVariant { kind: "order status", value: other.to_string() }),
        }
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Public identifier used in URLs.
    pub identifier: String,
    pub event_id: i64,
    pub user_id: Option<i64>,
    pub discount_code_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub amount: Option<Decimal>,
    pub quantity: i32,
    pub payment_mode: Option<String>,
    pub paid_via: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// Order row as submitted, before the fan-out fills in quantity and amount.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub identifier: String,
    pub event_id: i64,
    pub discount_code_id: Option<i64>,
    pub status: OrderStatus,
    pub amount: Option<Decimal>,
    pub payment_mode: Option<String>,
    pub ticket_holder_ids: Vec<i64>,
}

/// Quantity of one ticket type inside an order.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderTicket {
    pub order_id: i64,
    pub ticket_id: i64,
    pub quantity: i32,
}
