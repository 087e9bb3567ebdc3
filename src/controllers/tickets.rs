use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{required_one, self_link, validate_attributes};
use crate::error::{AppError, AppResult, ErrorSource};
use crate::jsonapi::{Document, JsonApi, JsonApiBody, Linkage, Resource, ResourceIdentifier, ToOne};
use crate::middleware::AuthUser;
use crate::models::{NewTicket, Ticket};
use crate::permissions::{require, AccessScope, Capability};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets", post(create_ticket))
        .route("/tickets/{ticket_id}", get(get_ticket))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
struct TicketAttributes {
    #[validate(length(min = 1, message = "Ticket name is required"))]
    name: String,
    price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    quantity: i32,
    #[serde(default)]
    is_fee_absorbed: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TicketRelationships {
    event: Option<ToOne>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TicketOut {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub is_fee_absorbed: bool,
}

fn ticket_resource(ticket: &Ticket) -> Resource<TicketOut> {
    Resource::new(
        "ticket",
        ticket.id,
        self_link("tickets", ticket.id),
        TicketOut {
            name: ticket.name.clone(),
            price: ticket.price,
            quantity: ticket.quantity,
            is_fee_absorbed: ticket.is_fee_absorbed,
        },
    )
    .relationship(
        "event",
        self_link("events", ticket.event_id),
        Linkage::One(Some(ResourceIdentifier::new("event", ticket.event_id))),
    )
}

// POST /v1/tickets
async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonApiBody(doc): JsonApiBody<Document<TicketAttributes, TicketRelationships>>,
) -> AppResult<JsonApi<Resource<TicketOut>>> {
    let event_id = required_one(doc.data.relationships.event, "event")?;
    let attrs = doc.data.attributes;
    validate_attributes(&attrs)?;
    if attrs.price < Decimal::ZERO {
        return Err(AppError::unprocessable(
            ErrorSource::pointer("/data/attributes/price"),
            "Price must not be negative",
        ));
    }

    require(
        state.access.as_ref(),
        &user,
        Capability::IsCoorganizer,
        AccessScope::Event(event_id),
        ErrorSource::empty(),
        "Co-Organizer Access Required",
    )
    .await?;

    let ticket = state
        .store
        .create_ticket(NewTicket {
            event_id,
            name: attrs.name,
            price: attrs.price,
            quantity: attrs.quantity,
            is_fee_absorbed: attrs.is_fee_absorbed,
        })
        .await?;

    Ok(JsonApi::created(ticket_resource(&ticket)))
}

// GET /v1/tickets/{ticket_id}
async fn get_ticket(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(ticket_id): Path<i64>,
) -> AppResult<JsonApi<Resource<TicketOut>>> {
    let ticket = state
        .store
        .get_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found(ErrorSource::field("ticket_id"), format!("Ticket {ticket_id} not found")))?;
    Ok(JsonApi::ok(ticket_resource(&ticket)))
}
