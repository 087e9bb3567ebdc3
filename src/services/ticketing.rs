use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult, ErrorSource};
use crate::models::{DiscountCode, DiscountKind, Order, Ticket, TicketFees, TicketHolder};
use crate::store::Store;

/// Counts attendees per ticket type, keyed by ticket id.
pub fn tally_by_ticket(holders: &[TicketHolder]) -> BTreeMap<i64, i32> {
    let mut counts = BTreeMap::new();
    for holder in holders {
        *counts.entry(holder.ticket_id).or_insert(0) += 1;
    }
    counts
}

/// One priced line of an order.
#[derive(Debug, Clone)]
pub struct OrderLine<'a> {
    pub ticket: &'a Ticket,
    pub quantity: i32,
}

/// Total due for `lines`, service fees and discount included.
pub fn compute_amount(
    lines: &[OrderLine<'_>],
    fees: Option<&TicketFees>,
    discount: Option<&DiscountCode>,
) -> Decimal {
    let hundred = Decimal::ONE_HUNDRED;
    let mut amount = Decimal::ZERO;
    let mut total_discount = Decimal::ZERO;

    for line in lines {
        let quantity = Decimal::from(line.quantity);
        let base = line.ticket.price * quantity;

        let fee = match fees {
            Some(fees) if !line.ticket.is_fee_absorbed => {
                (fees.service_fee * base / hundred).min(fees.maximum_fee)
            }
            _ => Decimal::ZERO,
        };
        let line_amount = base + fee;
        amount += line_amount;

        if let Some(code) = discount.filter(|c| c.applies_to(line.ticket.id)) {
            total_discount += match code.kind {
                DiscountKind::Amount => code.value * quantity,
                DiscountKind::Percent => code.value * line_amount / hundred,
            };
        }
    }

    (amount - total_discount)
        .max(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Recomputes what an order costs.
#[async_trait]
pub trait PricingEngine: Send + Sync + 'static {
    /// Recalculates `order.amount` from its order tickets and saves it.
    async fn calculate_update_amount(&self, store: &dyn Store, order: &mut Order) -> AppResult<()>;
}

/// Default pricing from ticket prices, platform fees and the order's code.
#[derive(Debug, Clone, Default)]
pub struct TicketingManager;

#[async_trait]
impl PricingEngine for TicketingManager {
    async fn calculate_update_amount(&self, store: &dyn Store, order: &mut Order) -> AppResult<()> {
        let order_tickets = store.order_tickets(order.id).await?;
        let ids: Vec<i64> = order_tickets.iter().map(|ot| ot.ticket_id).collect();
        let tickets = store.get_tickets(&ids).await?;

        let lines = order_tickets
            .iter()
            .map(|ot| {
                tickets
                    .iter()
                    .find(|t| t.id == ot.ticket_id)
                    .map(|ticket| OrderLine { ticket, quantity: ot.quantity })
                    .ok_or_else(|| {
                        AppError::not_found(ErrorSource::field("ticket_id"), format!("Ticket {} not found", ot.ticket_id))
                    })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let event = store.get_event(order.event_id).await?.ok_or_else(|| {
            AppError::not_found(ErrorSource::field("event_id"), "Event not found")
        })?;
        let fees = store.get_ticket_fees(&event.payment_currency).await?;

        let discount = match order.discount_code_id {
            Some(id) => store.get_discount_code(id).await?,
            None => None,
        };

        let amount = compute_amount(&lines, fees.as_ref(), discount.as_ref());
        tracing::info!(order = %order.identifier, %amount, "order amount recalculated");

        order.amount = Some(amount);
        store.update_order(order).await
    }
}
