//! Discount code eligibility.
//!
//! The gate runs as an ordered list of checks; the first failing check
//! decides the rejection reason. Order and reason strings are part of the
//! public API.

use chrono::NaiveDateTime;

use crate::error::{AppError, ErrorSource};
use crate::models::{DiscountCode, DiscountScope, TicketHolder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountRejection {
    Inactive,
    UsageExceeded,
    Invalid,
}

impl DiscountRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            DiscountRejection::Inactive => "Inactive Discount Code",
            DiscountRejection::UsageExceeded => "Discount Usage Exceeded",
            DiscountRejection::Invalid => "Invalid Discount Code",
        }
    }
}

impl From<DiscountRejection> for AppError {
    fn from(rejection: DiscountRejection) -> Self {
        AppError::unprocessable(ErrorSource::field("discount_code_id"), rejection.reason())
    }
}

/// Facts about the order being placed that the checks look at.
#[derive(Debug, Clone)]
pub struct DiscountContext<'a> {
    pub order_event_id: i64,
    pub holders: &'a [TicketHolder],
    /// Attendees already redeemed on live orders with this code.
    pub previously_redeemed: i64,
    pub now: NaiveDateTime,
}

type Check = fn(&DiscountCode, &DiscountContext<'_>) -> Result<(), DiscountRejection>;

const CHECKS: [Check; 4] = [check_active_flag, check_window, check_usage, check_scope];

pub fn validate(code: &DiscountCode, ctx: &DiscountContext<'_>) -> Result<(), DiscountRejection> {
    CHECKS.iter().try_for_each(|check| check(code, ctx))
}

fn check_active_flag(code: &DiscountCode, _: &DiscountContext<'_>) -> Result<(), DiscountRejection> {
    if code.is_active {
        Ok(())
    } else {
        Err(DiscountRejection::Inactive)
    }
}

fn check_window(code: &DiscountCode, ctx: &DiscountContext<'_>) -> Result<(), DiscountRejection> {
    if within_window(code.valid_from, code.valid_till, ctx.now) {
        Ok(())
    } else {
        Err(DiscountRejection::Inactive)
    }
}

fn check_usage(code: &DiscountCode, ctx: &DiscountContext<'_>) -> Result<(), DiscountRejection> {
    if matches_quantity(code, ctx.holders, ctx.previously_redeemed) {
        Ok(())
    } else {
        Err(DiscountRejection::UsageExceeded)
    }
}

fn check_scope(code: &DiscountCode, ctx: &DiscountContext<'_>) -> Result<(), DiscountRejection> {
    if code.used_for == DiscountScope::Ticket && code.event_id != ctx.order_event_id {
        Err(DiscountRejection::Invalid)
    } else {
        Ok(())
    }
}

/// Both boundaries are inclusive.
pub fn within_window(valid_from: NaiveDateTime, valid_till: NaiveDateTime, now: NaiveDateTime) -> bool {
    valid_from <= now && now <= valid_till
}

/// Whether redeeming the code for `holders` stays inside its quantity limits.
pub fn matches_quantity(code: &DiscountCode, holders: &[TicketHolder], previously_redeemed: i64) -> bool {
    let applicable = holders.iter().filter(|h| code.applies_to(h.ticket_id)).count();
    let qty = i64::try_from(applicable).unwrap_or(i64::MAX);

    let under_total = code
        .tickets_number
        .map_or(true, |limit| qty.saturating_add(previously_redeemed) <= i64::from(limit));
    let above_min = qty >= i64::from(code.min_quantity);
    let below_max = code.max_quantity.map_or(true, |max| qty <= i64::from(max));

    under_total && above_min && below_max
}
