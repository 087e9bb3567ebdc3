//! Order workflow.
//!
//! [`create_order`] runs the whole checkout for one request: relationship
//! validation, the discount gate, the insert, and then the post-creation
//! fan-out (ticket PDFs, order tickets, quantity, pricing, attendee mail and
//! the creator stamp). The fan-out is inline and not compensated: if a later
//! step fails the order row and the steps before it stay committed and the
//! error is returned to the caller.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::discount::{self, DiscountContext};
use super::pdf::AttendeeTicket;
use super::ticketing::tally_by_ticket;
use crate::error::{AppError, AppResult, ErrorSource};
use crate::jsonapi::{Linkage, Page, ResourceIdentifier};
use crate::middleware::AuthUser;
use crate::models::{Event, NewOrder, Order, OrderStatus, OrderTicket, TicketHolder};
use crate::permissions::{require, AccessScope, Capability};
use crate::AppState;

/// An order as submitted by the client, before any checks.
#[derive(Debug, Clone, Default)]
pub struct OrderDraft {
    pub event_id: Option<i64>,
    /// `None` when the relationship is absent.
    pub ticket_holder_ids: Option<Vec<i64>>,
    pub discount_code_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub amount: Option<Decimal>,
    pub payment_mode: Option<String>,
}

/// Attribute changes accepted by `PATCH /orders/{identifier}`.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_mode: Option<String>,
}

/// Relationships of an order reachable under `/relationships/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRelationship {
    Event,
    User,
    DiscountCode,
    TicketHolders,
}

impl OrderRelationship {
    pub fn parse(name: &str) -> AppResult<Self> {
        match name {
            "event" => Ok(OrderRelationship::Event),
            "user" => Ok(OrderRelationship::User),
            "discount-code" => Ok(OrderRelationship::DiscountCode),
            "ticket-holders" => Ok(OrderRelationship::TicketHolders),
            other => Err(AppError::not_found(
                ErrorSource::pointer("/relationships"),
                format!("Order has no relationship '{other}'"),
            )),
        }
    }
}

async fn is_coorganizer(state: &AppState, user: &AuthUser, event_id: i64) -> AppResult<bool> {
    state
        .access
        .has_access(user, Capability::IsCoorganizer, AccessScope::Event(event_id))
        .await
}

async fn load_event(state: &AppState, event_id: i64) -> AppResult<Event> {
    state.store.get_event(event_id).await?.ok_or_else(|| {
        AppError::not_found(
            ErrorSource::pointer("/data/relationships/event"),
            format!("Event {event_id} not found"),
        )
    })
}

/// Holders for `ids`, failing on the first id that does not exist.
async fn load_holders(state: &AppState, ids: &[i64]) -> AppResult<Vec<TicketHolder>> {
    let holders = state.store.get_ticket_holders(ids).await?;
    if let Some(missing) = ids.iter().find(|id| !holders.iter().any(|h| h.id == **id)) {
        return Err(AppError::not_found(
            ErrorSource::pointer("/data/relationships/ticket-holders"),
            format!("Ticket holder {missing} not found"),
        ));
    }
    Ok(holders)
}

fn dedup(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[instrument(skip(state, draft), fields(user_id = user.user_id))]
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    draft: OrderDraft,
    path_event_id: Option<i64>,
) -> AppResult<Order> {
    let event_id = draft.event_id.ok_or(AppError::MissingRelationship("event"))?;
    let holder_ids = draft
        .ticket_holder_ids
        .filter(|ids| !ids.is_empty())
        .map(dedup)
        .ok_or(AppError::MissingRelationship("ticket-holders"))?;

    if let Some(path_event_id) = path_event_id {
        if path_event_id != event_id {
            return Err(AppError::unprocessable(
                ErrorSource::pointer("/data/relationships/event"),
                "Event relationship does not match the event in the URL",
            ));
        }
    }

    let coorganizer = is_coorganizer(state, user, event_id).await?;
    let status = if coorganizer {
        draft.status.unwrap_or(OrderStatus::Pending)
    } else {
        OrderStatus::Pending
    };

    let event = load_event(state, event_id).await?;
    let holders = load_holders(state, &holder_ids).await?;

    let ticket_ids: Vec<i64> = tally_by_ticket(&holders).into_keys().collect();
    let tickets = state.store.get_tickets(&ticket_ids).await?;
    for holder in &holders {
        match tickets.iter().find(|t| t.id == holder.ticket_id) {
            Some(ticket) if ticket.event_id == event_id => {}
            Some(_) => {
                return Err(AppError::unprocessable(
                    ErrorSource::pointer("/data/relationships/ticket-holders"),
                    format!("Ticket holder {} has a ticket for another event", holder.id),
                ))
            }
            None => {
                return Err(AppError::not_found(
                    ErrorSource::field("ticket_id"),
                    format!("Ticket {} not found", holder.ticket_id),
                ))
            }
        }
    }

    let code = match draft.discount_code_id {
        Some(code_id) => Some(state.store.get_discount_code(code_id).await?.ok_or_else(|| {
            AppError::not_found(ErrorSource::field("discount_code_id"), "Discount code not found")
        })?),
        None => None,
    };

    // co-organizers attach codes without the eligibility checks
    if let (Some(code), false) = (&code, coorganizer) {
        // TODO: lock the code row while counting; concurrent checkouts can both pass the usage check
        let previously_redeemed = state.store.count_discount_redemptions(code.id).await?;
        let context = DiscountContext {
            order_event_id: event_id,
            holders: &holders,
            previously_redeemed,
            now: Utc::now().naive_utc(),
        };
        discount::validate(code, &context)?;
        debug!(code = %code.code, "discount code accepted");
    }

    let mut order = state
        .store
        .insert_order(NewOrder {
            identifier: Uuid::new_v4().to_string(),
            event_id,
            discount_code_id: code.as_ref().map(|c| c.id),
            status,
            amount: draft.amount,
            payment_mode: draft.payment_mode,
            ticket_holder_ids: holder_ids,
        })
        .await?;
    info!(order = %order.identifier, event_id, holders = holders.len(), "order created");

    let mut holders = holders;
    for holder in holders.iter_mut() {
        holder.order_id = Some(order.id);
        let ticket = tickets.iter().find(|t| t.id == holder.ticket_id);
        let url = state
            .documents
            .create_ticket_pdf(AttendeeTicket { order: &order, event: &event, holder: &*holder, ticket })
            .await?;
        holder.pdf_url = Some(url);
        state.store.save_ticket_holder(holder).await?;
    }

    let counts = tally_by_ticket(&holders);
    for (&ticket_id, &quantity) in &counts {
        state
            .store
            .insert_order_ticket(&OrderTicket { order_id: order.id, ticket_id, quantity })
            .await?;
    }
    order.quantity = counts.values().sum();
    state.store.update_order(&order).await?;

    if !coorganizer {
        state.pricing.calculate_update_amount(state.store.as_ref(), &mut order).await?;
    }

    state.mailer.send_email_to_attendees(&order, &event, &holders).await?;

    order.user_id = Some(user.user_id);
    state.store.update_order(&order).await?;

    Ok(order)
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    event_id: Option<i64>,
    page: Page,
) -> AppResult<(Vec<Order>, i64)> {
    match event_id {
        None => {
            require(
                state.access.as_ref(),
                user,
                Capability::IsAdmin,
                AccessScope::Global,
                ErrorSource::empty(),
                "Admin Access Required",
            )
            .await?
        }
        Some(event_id) => {
            require(
                state.access.as_ref(),
                user,
                Capability::IsCoorganizer,
                AccessScope::Event(event_id),
                ErrorSource::empty(),
                "Co-Organizer Access Required",
            )
            .await?
        }
    }
    state.store.list_orders(event_id, page).await
}

pub async fn find_order(state: &AppState, identifier: &str) -> AppResult<Order> {
    state.store.get_order_by_identifier(identifier).await?.ok_or_else(|| {
        AppError::not_found(ErrorSource::field("order_identifier"), format!("Order {identifier} not found"))
    })
}

/// The order, if `user` bought it or co-organizes its event.
pub async fn get_order(state: &AppState, user: &AuthUser, identifier: &str) -> AppResult<Order> {
    let order = find_order(state, identifier).await?;
    if order.user_id == Some(user.user_id) || is_coorganizer(state, user, order.event_id).await? {
        Ok(order)
    } else {
        Err(AppError::forbidden(
            ErrorSource::empty(),
            "Only the buyer or an event co-organizer can access this order",
        ))
    }
}

pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    identifier: &str,
    patch: OrderPatch,
) -> AppResult<Order> {
    let mut order = get_order(state, user, identifier).await?;

    if let Some(status) = patch.status {
        if !is_coorganizer(state, user, order.event_id).await? {
            return Err(AppError::forbidden(
                ErrorSource::pointer("data/status"),
                "To update status minimum Co-organizer access required",
            ));
        }
        if status == OrderStatus::Completed && order.completed_at.is_none() {
            order.completed_at = Some(Utc::now().naive_utc());
        }
        order.status = status;
    }
    if let Some(payment_mode) = patch.payment_mode {
        order.payment_mode = Some(payment_mode);
    }

    state.store.update_order(&order).await?;
    info!(order = %order.identifier, status = order.status.as_str(), "order updated");
    Ok(order)
}

pub async fn delete_order(state: &AppState, user: &AuthUser, identifier: &str) -> AppResult<()> {
    let order = get_order(state, user, identifier).await?;
    state.store.delete_order(order.id).await?;
    info!(order = %order.identifier, "order deleted");
    Ok(())
}

pub async fn relationship_linkage(
    state: &AppState,
    identifier: &str,
    relationship: OrderRelationship,
) -> AppResult<Linkage> {
    let order = find_order(state, identifier).await?;
    linkage_of(state, &order, relationship).await
}

pub async fn linkage_of(state: &AppState, order: &Order, relationship: OrderRelationship) -> AppResult<Linkage> {
    Ok(match relationship {
        OrderRelationship::Event => Linkage::One(Some(ResourceIdentifier::new("event", order.event_id))),
        OrderRelationship::User => Linkage::One(order.user_id.map(|id| ResourceIdentifier::new("user", id))),
        OrderRelationship::DiscountCode => Linkage::One(
            order.discount_code_id.map(|id| ResourceIdentifier::new("discount-code", id)),
        ),
        OrderRelationship::TicketHolders => Linkage::Many(
            state
                .store
                .order_ticket_holders(order.id)
                .await?
                .iter()
                .map(|h| ResourceIdentifier::new("attendee", h.id))
                .collect(),
        ),
    })
}

/// How a relationship request changes a to-many list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageChange {
    Replace,
    Add,
    Remove,
}

fn read_only(relationship: OrderRelationship) -> AppError {
    let name = match relationship {
        OrderRelationship::Event => "event",
        OrderRelationship::User => "user",
        OrderRelationship::DiscountCode => "discount-code",
        OrderRelationship::TicketHolders => "ticket-holders",
    };
    AppError::forbidden(
        ErrorSource::pointer("/data"),
        format!("Relationship {name} cannot be changed this way"),
    )
}

pub async fn change_ticket_holders(
    state: &AppState,
    identifier: &str,
    change: LinkageChange,
    ids: Vec<i64>,
) -> AppResult<Linkage> {
    let order = find_order(state, identifier).await?;
    let ids = dedup(ids);
    load_holders(state, &ids).await?;

    match change {
        LinkageChange::Add => state.store.attach_ticket_holders(order.id, &ids).await?,
        LinkageChange::Remove => state.store.detach_ticket_holders(order.id, &ids).await?,
        LinkageChange::Replace => {
            let stale: Vec<i64> = state
                .store
                .order_ticket_holders(order.id)
                .await?
                .iter()
                .map(|h| h.id)
                .filter(|id| !ids.contains(id))
                .collect();
            state.store.detach_ticket_holders(order.id, &stale).await?;
            state.store.attach_ticket_holders(order.id, &ids).await?;
        }
    }

    debug!(order = %order.identifier, ?change, count = ids.len(), "ticket holders changed");
    linkage_of(state, &order, OrderRelationship::TicketHolders).await
}

pub async fn set_discount_code(state: &AppState, identifier: &str, code_id: Option<i64>) -> AppResult<Linkage> {
    let mut order = find_order(state, identifier).await?;
    if let Some(id) = code_id {
        state.store.get_discount_code(id).await?.ok_or_else(|| {
            AppError::not_found(ErrorSource::pointer("/data/id"), format!("Discount code {id} not found"))
        })?;
    }
    order.discount_code_id = code_id;
    state.store.update_order(&order).await?;
    linkage_of(state, &order, OrderRelationship::DiscountCode).await
}

/// Relationship writes other than to ticket holders and the discount code.
pub fn reject_relationship_write(relationship: OrderRelationship) -> AppResult<()> {
    match relationship {
        OrderRelationship::TicketHolders | OrderRelationship::DiscountCode => Ok(()),
        other => Err(read_only(other)),
    }
}
