use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{required_one, self_link, validate_attributes};
use crate::error::{AppError, AppResult, ErrorSource};
use crate::jsonapi::{Document, JsonApi, JsonApiBody, Linkage, Resource, ResourceIdentifier, ToOne};
use crate::middleware::AuthUser;
use crate::models::{NewTicketHolder, TicketHolder};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/attendees", post(create_attendee))
        .route("/attendees/{attendee_id}", get(get_attendee))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
struct AttendeeAttributes {
    #[validate(length(min = 1, message = "First name is required"))]
    firstname: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    lastname: String,
    #[validate(email(message = "Invalid email address"))]
    email: String,
}

#[derive(Debug, Default, Deserialize)]
struct AttendeeRelationships {
    ticket: Option<ToOne>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttendeeOut {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub pdf_url: Option<String>,
}

pub fn attendee_resource(holder: &TicketHolder) -> Resource<AttendeeOut> {
    Resource::new(
        "attendee",
        holder.id,
        self_link("attendees", holder.id),
        AttendeeOut {
            firstname: holder.firstname.clone(),
            lastname: holder.lastname.clone(),
            email: holder.email.clone(),
            pdf_url: holder.pdf_url.clone(),
        },
    )
    .relationship(
        "ticket",
        self_link("tickets", holder.ticket_id),
        Linkage::One(Some(ResourceIdentifier::new("ticket", holder.ticket_id))),
    )
}

// POST /v1/attendees
async fn create_attendee(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    JsonApiBody(doc): JsonApiBody<Document<AttendeeAttributes, AttendeeRelationships>>,
) -> AppResult<JsonApi<Resource<AttendeeOut>>> {
    let ticket_id = required_one(doc.data.relationships.ticket, "ticket")?;
    let attrs = doc.data.attributes;
    validate_attributes(&attrs)?;

    state.store.get_ticket(ticket_id).await?.ok_or_else(|| {
        AppError::not_found(ErrorSource::pointer("/data/relationships/ticket"), format!("Ticket {ticket_id} not found"))
    })?;

    let holder = state
        .store
        .create_ticket_holder(NewTicketHolder {
            firstname: attrs.firstname,
            lastname: attrs.lastname,
            email: attrs.email,
            ticket_id,
        })
        .await?;

    Ok(JsonApi::created(attendee_resource(&holder)))
}

// GET /v1/attendees/{attendee_id}
async fn get_attendee(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(attendee_id): Path<i64>,
) -> AppResult<JsonApi<Resource<AttendeeOut>>> {
    let holder = state.store.get_ticket_holder(attendee_id).await?.ok_or_else(|| {
        AppError::not_found(ErrorSource::field("attendee_id"), format!("Attendee {attendee_id} not found"))
    })?;
    Ok(JsonApi::ok(attendee_resource(&holder)))
}
