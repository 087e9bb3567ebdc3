use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use super::orders;
use super::payment::ChargeRequest;
use crate::error::{AppError, AppResult, ErrorSource};
use crate::middleware::AuthUser;
use crate::models::{Order, OrderStatus};
use crate::AppState;

pub const STRIPE: &str = "stripe";

/// Settles `identifier` with a Stripe token and marks the order completed.
pub async fn charge_order(
    state: &AppState,
    user: &AuthUser,
    identifier: &str,
    stripe_token: Option<String>,
) -> AppResult<Order> {
    let mut order = orders::get_order(state, user, identifier).await?;

    if order.status == OrderStatus::Completed {
        return Err(AppError::Conflict(format!("order {} is already paid", order.identifier)));
    }
    if order.payment_mode.as_deref() != Some(STRIPE) {
        return Err(AppError::unprocessable(
            ErrorSource::field("payment_mode"),
            "Order payment mode must be stripe",
        ));
    }
    let token = stripe_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::unprocessable(ErrorSource::empty(), "stripe token is missing"))?;

    let amount = order.amount.unwrap_or(Decimal::ZERO);
    if amount <= Decimal::ZERO {
        return Err(AppError::unprocessable(ErrorSource::field("amount"), "Order has nothing to charge"));
    }
    let amount_cents = (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::Internal(format!("amount {amount} does not fit a charge")))?;

    let event = state
        .store
        .get_event(order.event_id)
        .await?
        .ok_or_else(|| AppError::not_found(ErrorSource::field("event_id"), "Event not found"))?;

    let outcome = state
        .payments
        .charge(&ChargeRequest {
            amount_cents,
            currency: event.payment_currency.clone(),
            token,
            description: format!("Order {} for {}", order.identifier, event.name),
        })
        .await?;

    order.status = OrderStatus::Completed;
    order.paid_via = Some(STRIPE.to_string());
    order.transaction_id = Some(outcome.transaction_id);
    order.completed_at = Some(Utc::now().naive_utc());
    state.store.update_order(&order).await?;

    info!(order = %order.identifier, %amount, "order charged");
    Ok(order)
}
