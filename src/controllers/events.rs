use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{required_one, self_link, validate_attributes};
use crate::error::{AppError, AppResult, ErrorSource};
use crate::jsonapi::{Document, JsonApi, JsonApiBody, Linkage, Resource, ResourceIdentifier, ToOne};
use crate::middleware::AuthUser;
use crate::models::{Event, EventRole, NewEvent};
use crate::permissions::{require, AccessScope, Capability};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(create_event))
        .route("/events/{event_id}", get(get_event))
        .route("/events/{event_id}/roles", post(grant_role))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
struct EventAttributes {
    #[validate(length(min = 1, message = "Event name is required"))]
    name: String,
    #[validate(length(equal = 3, message = "Currency must be a 3 letter code"))]
    payment_currency: String,
    starts_at: Option<NaiveDateTime>,
    ends_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventOut {
    pub name: String,
    pub payment_currency: String,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

pub fn event_resource(event: &Event) -> Resource<EventOut> {
    Resource::new(
        "event",
        event.id,
        self_link("events", event.id),
        EventOut {
            name: event.name.clone(),
            payment_currency: event.payment_currency.clone(),
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            created_at: event.created_at,
        },
    )
}

// POST /v1/events
async fn create_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonApiBody(doc): JsonApiBody<Document<EventAttributes>>,
) -> AppResult<JsonApi<Resource<EventOut>>> {
    let attrs = doc.data.attributes;
    validate_attributes(&attrs)?;

    let starts_at = attrs.starts_at.ok_or_else(|| {
        AppError::unprocessable(ErrorSource::pointer("/data/attributes/starts-at"), "Start time is required")
    })?;
    let ends_at = attrs.ends_at.ok_or_else(|| {
        AppError::unprocessable(ErrorSource::pointer("/data/attributes/ends-at"), "End time is required")
    })?;
    if ends_at < starts_at {
        return Err(AppError::unprocessable(
            ErrorSource::pointer("/data/attributes/ends-at"),
            "End time must not be before the start time",
        ));
    }

    let event = state
        .store
        .create_event(
            NewEvent {
                name: attrs.name,
                payment_currency: attrs.payment_currency.to_uppercase(),
                starts_at,
                ends_at,
            },
            user.user_id,
        )
        .await?;
    tracing::info!(event_id = event.id, organizer = user.user_id, "event created");

    Ok(JsonApi::created(event_resource(&event)))
}

// GET /v1/events/{event_id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(event_id): Path<i64>,
) -> AppResult<JsonApi<Resource<EventOut>>> {
    let event = state
        .store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::not_found(ErrorSource::field("event_id"), format!("Event {event_id} not found")))?;
    Ok(JsonApi::ok(event_resource(&event)))
}

/* ---------- ROLES ---------- */

#[derive(Debug, Default, Deserialize)]
struct RoleAttributes {
    role: String,
}

#[derive(Debug, Default, Deserialize)]
struct RoleRelationships {
    user: Option<ToOne>,
}

#[derive(Debug, Serialize)]
struct RoleOut {
    role: &'static str,
}

// POST /v1/events/{event_id}/roles
async fn grant_role(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    JsonApiBody(doc): JsonApiBody<Document<RoleAttributes, RoleRelationships>>,
) -> AppResult<JsonApi<Resource<RoleOut>>> {
    require(
        state.access.as_ref(),
        &user,
        Capability::IsOrganizer,
        AccessScope::Event(event_id),
        ErrorSource::empty(),
        "Organizer access is required",
    )
    .await?;

    let role: EventRole = doc.data.attributes.role.parse().map_err(|e| {
        AppError::unprocessable(ErrorSource::pointer("/data/attributes/role"), format!("{e}"))
    })?;
    let grantee = required_one(doc.data.relationships.user, "user")?;
    state.store.get_user(grantee).await?.ok_or_else(|| {
        AppError::not_found(ErrorSource::pointer("/data/relationships/user"), format!("User {grantee} not found"))
    })?;

    state.store.grant_event_role(grantee, event_id, role).await?;
    tracing::info!(event_id, grantee, role = role.as_str(), "event role granted");

    let id = format!("{event_id}-{grantee}");
    let link = self_link(&format!("events/{event_id}/roles"), grantee);
    let resource = Resource::new("users-events-role", id, link, RoleOut { role: role.as_str() })
        .relationship(
            "user",
            self_link("users", grantee),
            Linkage::One(Some(ResourceIdentifier::new("user", grantee))),
        )
        .relationship(
            "event",
            self_link("events", event_id),
            Linkage::One(Some(ResourceIdentifier::new("event", event_id))),
        );
    Ok(JsonApi::created(resource))
}
