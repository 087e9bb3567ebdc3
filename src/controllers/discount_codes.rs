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
use crate::models::discount_code::{parse_window_timestamp, WINDOW_FORMAT};
use crate::models::{DiscountCode, DiscountKind, DiscountScope, NewDiscountCode};
use crate::permissions::{require, AccessScope, Capability};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/discount-codes", post(create_discount_code))
        .route("/discount-codes/{discount_code_id}", get(get_discount_code))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "kebab-case")]
struct DiscountCodeAttributes {
    #[validate(length(min = 1, max = 64, message = "Code must be 1 to 64 characters"))]
    code: String,
    value: Decimal,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_true")]
    is_active: bool,
    valid_from: String,
    valid_till: String,
    #[validate(range(min = 0, message = "Tickets number must not be negative"))]
    tickets_number: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Minimum quantity must not be negative"))]
    min_quantity: i32,
    max_quantity: Option<i32>,
    /// Comma separated ticket ids.
    #[serde(default)]
    tickets: String,
    used_for: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiscountCodeRelationships {
    event: Option<ToOne>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscountCodeOut {
    pub code: String,
    pub value: Decimal,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub is_active: bool,
    pub valid_from: String,
    pub valid_till: String,
    pub tickets_number: Option<i32>,
    pub min_quantity: i32,
    pub max_quantity: Option<i32>,
    pub tickets: String,
    pub used_for: &'static str,
}

fn discount_code_resource(code: &DiscountCode) -> Resource<DiscountCodeOut> {
    let tickets = code.tickets.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    Resource::new(
        "discount-code",
        code.id,
        self_link("discount-codes", code.id),
        DiscountCodeOut {
            code: code.code.clone(),
            value: code.value,
            kind: code.kind.as_str(),
            is_active: code.is_active,
            valid_from: code.valid_from.format(WINDOW_FORMAT).to_string(),
            valid_till: code.valid_till.format(WINDOW_FORMAT).to_string(),
            tickets_number: code.tickets_number,
            min_quantity: code.min_quantity,
            max_quantity: code.max_quantity,
            tickets,
            used_for: code.used_for.as_str(),
        },
    )
    .relationship(
        "event",
        self_link("events", code.event_id),
        Linkage::One(Some(ResourceIdentifier::new("event", code.event_id))),
    )
}

fn attribute_error(attribute: &str, detail: impl Into<String>) -> AppError {
    AppError::unprocessable(ErrorSource::pointer(format!("/data/attributes/{attribute}")), detail)
}

fn parse_ticket_ids(raw: &str) -> AppResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|_| attribute_error("tickets", format!("Invalid ticket id '{s}'"))))
        .collect()
}

fn into_new_code(attrs: DiscountCodeAttributes, event_id: i64) -> AppResult<NewDiscountCode> {
    let kind: DiscountKind = attrs.kind.parse().map_err(|e| attribute_error("type", format!("{e}")))?;
    let used_for: DiscountScope = attrs.used_for.parse().map_err(|e| attribute_error("used-for", format!("{e}")))?;

    let valid_from = parse_window_timestamp(&attrs.valid_from)
        .map_err(|_| attribute_error("valid-from", format!("Expected a timestamp like {WINDOW_FORMAT}")))?;
    let valid_till = parse_window_timestamp(&attrs.valid_till)
        .map_err(|_| attribute_error("valid-till", format!("Expected a timestamp like {WINDOW_FORMAT}")))?;
    if valid_till < valid_from {
        return Err(attribute_error("valid-till", "Validity must not end before it starts"));
    }

    if attrs.value < Decimal::ZERO {
        return Err(attribute_error("value", "Value must not be negative"));
    }
    if kind == DiscountKind::Percent && attrs.value > Decimal::ONE_HUNDRED {
        return Err(attribute_error("value", "Percent value must not exceed 100"));
    }
    if let Some(max) = attrs.max_quantity {
        if max < attrs.min_quantity {
            return Err(attribute_error("max-quantity", "Maximum quantity must not be below the minimum"));
        }
    }

    let tickets = parse_ticket_ids(&attrs.tickets)?;
    if used_for == DiscountScope::Ticket && tickets.is_empty() {
        return Err(attribute_error("tickets", "A ticket discount needs at least one ticket"));
    }

    Ok(NewDiscountCode {
        code: attrs.code,
        event_id,
        value: attrs.value,
        kind,
        is_active: attrs.is_active,
        valid_from,
        valid_till,
        tickets_number: attrs.tickets_number,
        min_quantity: attrs.min_quantity,
        max_quantity: attrs.max_quantity,
        tickets,
        used_for,
    })
}

// POST /v1/discount-codes
async fn create_discount_code(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonApiBody(doc): JsonApiBody<Document<DiscountCodeAttributes, DiscountCodeRelationships>>,
) -> AppResult<JsonApi<Resource<DiscountCodeOut>>> {
    let event_id = required_one(doc.data.relationships.event, "event")?;
    validate_attributes(&doc.data.attributes)?;
    let new_code = into_new_code(doc.data.attributes, event_id)?;

    require(
        state.access.as_ref(),
        &user,
        Capability::IsCoorganizer,
        AccessScope::Event(event_id),
        ErrorSource::empty(),
        "Co-Organizer Access Required",
    )
    .await?;

    let code = state.store.create_discount_code(new_code).await?;
    tracing::info!(discount_code_id = code.id, event_id, "discount code created");
    Ok(JsonApi::created(discount_code_resource(&code)))
}

// GET /v1/discount-codes/{discount_code_id}
async fn get_discount_code(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(discount_code_id): Path<i64>,
) -> AppResult<JsonApi<Resource<DiscountCodeOut>>> {
    let code = state.store.get_discount_code(discount_code_id).await?.ok_or_else(|| {
        AppError::not_found(ErrorSource::field("discount_code_id"), "Discount code not found")
    })?;
    Ok(JsonApi::ok(discount_code_resource(&code)))
}
