use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::{optional_one, self_link};
use crate::error::{AppError, AppResult, ErrorSource};
use crate::jsonapi::{
    Document, JsonApi, JsonApiBody, JsonApiList, Linkage, PageParams, Resource, ResourceIdentifier, ToMany,
    ToOne, JSONAPI_CONTENT_TYPE,
};
use crate::middleware::AuthUser;
use crate::models::{Order, OrderStatus};
use crate::services::orders::{self, LinkageChange, OrderDraft, OrderPatch, OrderRelationship};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/events/{event_id}/orders", post(create_event_order).get(list_event_orders))
        .route(
            "/orders/{order_identifier}",
            get(get_order).patch(update_order).delete(delete_order),
        )
        .route(
            "/orders/{order_identifier}/relationships/{relationship}",
            get(get_relationship)
                .patch(replace_relationship)
                .post(add_to_relationship)
                .delete(remove_from_relationship),
        )
}

/* ---------- payloads ---------- */

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OrderAttributes {
    status: Option<String>,
    amount: Option<Decimal>,
    payment_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OrderRelationships {
    event: Option<ToOne>,
    ticket_holders: Option<ToMany>,
    #[serde(alias = "discount")]
    discount_code: Option<ToOne>,
}

fn parse_status(raw: Option<String>) -> AppResult<Option<OrderStatus>> {
    raw.map(|s| {
        s.parse::<OrderStatus>()
            .map_err(|e| AppError::unprocessable(ErrorSource::pointer("/data/attributes/status"), format!("{e}")))
    })
    .transpose()
}

fn into_draft(doc: Document<OrderAttributes, OrderRelationships>) -> AppResult<OrderDraft> {
    let attrs = doc.data.attributes;
    let rels = doc.data.relationships;

    let event_id = optional_one(rels.event, "event")?;
    let ticket_holder_ids = rels
        .ticket_holders
        .map(|holders| holders.numeric_ids("ticket-holders"))
        .transpose()?;

    Ok(OrderDraft {
        event_id,
        ticket_holder_ids,
        discount_code_id: optional_one(rels.discount_code, "discount-code")?,
        status: parse_status(attrs.status)?,
        amount: attrs.amount,
        payment_mode: attrs.payment_mode,
    })
}

/* ---------- rendering ---------- */

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderOut {
    pub identifier: String,
    pub status: OrderStatus,
    pub amount: Option<Decimal>,
    pub quantity: i32,
    pub payment_mode: Option<String>,
    pub paid_via: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

pub fn order_resource(order: &Order, ticket_holders: Linkage) -> Resource<OrderOut> {
    let id = &order.identifier;
    Resource::new(
        "order",
        id,
        self_link("orders", id),
        OrderOut {
            identifier: order.identifier.clone(),
            status: order.status,
            amount: order.amount,
            quantity: order.quantity,
            payment_mode: order.payment_mode.clone(),
            paid_via: order.paid_via.clone(),
            transaction_id: order.transaction_id.clone(),
            created_at: order.created_at,
            completed_at: order.completed_at,
        },
    )
    .relationship(
        "event",
        self_link("events", order.event_id),
        Linkage::One(Some(ResourceIdentifier::new("event", order.event_id))),
    )
    .relationship(
        "user",
        order.user_id.map(|u| self_link("users", u)).unwrap_or_default(),
        Linkage::One(order.user_id.map(|u| ResourceIdentifier::new("user", u))),
    )
    .relationship(
        "discount-code",
        order.discount_code_id.map(|d| self_link("discount-codes", d)).unwrap_or_default(),
        Linkage::One(order.discount_code_id.map(|d| ResourceIdentifier::new("discount-code", d))),
    )
    .relationship("ticket-holders", format!("{}/relationships/ticket-holders", self_link("orders", id)), ticket_holders)
}

async fn render(state: &AppState, order: &Order) -> AppResult<Resource<OrderOut>> {
    let holders = orders::linkage_of(state, order, OrderRelationship::TicketHolders).await?;
    Ok(order_resource(order, holders))
}

async fn render_list(state: &AppState, rows: Vec<Order>, total: i64) -> AppResult<JsonApiList<Resource<OrderOut>>> {
    let mut data = Vec::with_capacity(rows.len());
    for order in &rows {
        data.push(render(state, order).await?);
    }
    Ok(JsonApiList(data, total))
}

/* ---------- ORDERS ---------- */

// POST /v1/orders
async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonApiBody(doc): JsonApiBody<Document<OrderAttributes, OrderRelationships>>,
) -> AppResult<JsonApi<Resource<OrderOut>>> {
    let order = orders::create_order(&state, &user, into_draft(doc)?, None).await?;
    Ok(JsonApi::created(render(&state, &order).await?))
}

// POST /v1/events/{event_id}/orders
async fn create_event_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    JsonApiBody(doc): JsonApiBody<Document<OrderAttributes, OrderRelationships>>,
) -> AppResult<JsonApi<Resource<OrderOut>>> {
    let order = orders::create_order(&state, &user, into_draft(doc)?, Some(event_id)).await?;
    Ok(JsonApi::created(render(&state, &order).await?))
}

// GET /v1/orders
async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> AppResult<JsonApiList<Resource<OrderOut>>> {
    let (rows, total) = orders::list_orders(&state, &user, None, params.page()).await?;
    render_list(&state, rows, total).await
}

// GET /v1/events/{event_id}/orders
async fn list_event_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> AppResult<JsonApiList<Resource<OrderOut>>> {
    let (rows, total) = orders::list_orders(&state, &user, Some(event_id), params.page()).await?;
    render_list(&state, rows, total).await
}

// GET /v1/orders/{order_identifier}
async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(identifier): Path<String>,
) -> AppResult<JsonApi<Resource<OrderOut>>> {
    let order = orders::get_order(&state, &user, &identifier).await?;
    Ok(JsonApi::ok(render(&state, &order).await?))
}

// PATCH /v1/orders/{order_identifier}
async fn update_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(identifier): Path<String>,
    JsonApiBody(doc): JsonApiBody<Document<OrderAttributes>>,
) -> AppResult<JsonApi<Resource<OrderOut>>> {
    if let Some(id) = doc.data.id.as_deref() {
        if id != identifier {
            return Err(AppError::unprocessable(
                ErrorSource::pointer("/data/id"),
                "Resource id does not match the URL",
            ));
        }
    }
    let attrs = doc.data.attributes;
    let patch = OrderPatch { status: parse_status(attrs.status)?, payment_mode: attrs.payment_mode };

    let order = orders::update_order(&state, &user, &identifier, patch).await?;
    Ok(JsonApi::ok(render(&state, &order).await?))
}

// DELETE /v1/orders/{order_identifier}
async fn delete_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(identifier): Path<String>,
) -> AppResult<Response> {
    orders::delete_order(&state, &user, &identifier).await?;
    let body = json!({
        "meta": { "message": "Object successfully deleted" },
        "jsonapi": { "version": "1.0" }
    });
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, JSONAPI_CONTENT_TYPE)], Json(body)).into_response())
}

/* ---------- RELATIONSHIPS ---------- */

#[derive(Debug, Deserialize)]
struct LinkageBody {
    #[serde(default)]
    data: serde_json::Value,
}

fn linkage_error(detail: String) -> AppError {
    AppError::unprocessable(ErrorSource::pointer("/data"), detail)
}

fn holder_ids(body: LinkageBody) -> AppResult<Vec<i64>> {
    let identifiers: Vec<ResourceIdentifier> =
        serde_json::from_value(body.data).map_err(|e| linkage_error(format!("Expected a list of attendees: {e}")))?;
    ToMany { data: Some(identifiers) }.numeric_ids("ticket-holders")
}

// GET /v1/orders/{order_identifier}/relationships/{relationship}
async fn get_relationship(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((identifier, relationship)): Path<(String, String)>,
) -> AppResult<JsonApi<Linkage>> {
    let relationship = OrderRelationship::parse(&relationship)?;
    Ok(JsonApi::ok(orders::relationship_linkage(&state, &identifier, relationship).await?))
}

// PATCH /v1/orders/{order_identifier}/relationships/{relationship}
async fn replace_relationship(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((identifier, relationship)): Path<(String, String)>,
    JsonApiBody(body): JsonApiBody<LinkageBody>,
) -> AppResult<JsonApi<Linkage>> {
    let relationship = OrderRelationship::parse(&relationship)?;
    orders::reject_relationship_write(relationship)?;

    let linkage = match relationship {
        OrderRelationship::DiscountCode => {
            let target: Option<ResourceIdentifier> = serde_json::from_value(body.data)
                .map_err(|e| linkage_error(format!("Expected a discount code or null: {e}")))?;
            let code_id = target.map(|t| t.numeric_id("discount-code")).transpose()?;
            orders::set_discount_code(&state, &identifier, code_id).await?
        }
        _ => orders::change_ticket_holders(&state, &identifier, LinkageChange::Replace, holder_ids(body)?).await?,
    };
    Ok(JsonApi::ok(linkage))
}

fn to_many_only(relationship: &str) -> AppResult<()> {
    match OrderRelationship::parse(relationship)? {
        OrderRelationship::TicketHolders => Ok(()),
        _ => Err(AppError::forbidden(
            ErrorSource::pointer("/data"),
            "Only to-many relationships accept POST and DELETE",
        )),
    }
}

// POST /v1/orders/{order_identifier}/relationships/ticket-holders
async fn add_to_relationship(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((identifier, relationship)): Path<(String, String)>,
    JsonApiBody(body): JsonApiBody<LinkageBody>,
) -> AppResult<JsonApi<Linkage>> {
    to_many_only(&relationship)?;
    let linkage = orders::change_ticket_holders(&state, &identifier, LinkageChange::Add, holder_ids(body)?).await?;
    Ok(JsonApi::ok(linkage))
}

// DELETE /v1/orders/{order_identifier}/relationships/ticket-holders
async fn remove_from_relationship(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((identifier, relationship)): Path<(String, String)>,
    JsonApiBody(body): JsonApiBody<LinkageBody>,
) -> AppResult<JsonApi<Linkage>> {
    to_many_only(&relationship)?;
    let linkage = orders::change_ticket_holders(&state, &identifier, LinkageChange::Remove, holder_ids(body)?).await?;
    Ok(JsonApi::ok(linkage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_reads_dasherized_relationships() {
        let doc: Document<OrderAttributes, OrderRelationships> = serde_json::from_value(json!({
            "data": {
                "type": "order",
                "attributes": { "status": "completed", "payment-mode": "stripe" },
                "relationships": {
                    "event": { "data": { "type": "event", "id": "4" } },
                    "ticket-holders": { "data": [{ "type": "attendee", "id": "8" }, { "type": "attendee", "id": "9" }] },
                    "discount-code": { "data": { "type": "discount-code", "id": "2" } }
                }
            }
        }))
        .unwrap();

        let draft = into_draft(doc).unwrap();
        assert_eq!(draft.event_id, Some(4));
        assert_eq!(draft.ticket_holder_ids, Some(vec![8, 9]));
        assert_eq!(draft.discount_code_id, Some(2));
        assert_eq!(draft.status, Some(OrderStatus::Completed));
        assert_eq!(draft.payment_mode.as_deref(), Some("stripe"));
    }

    #[test]
    fn unknown_status_is_unprocessable() {
        let err = parse_status(Some("shipped".into())).unwrap_err();
        assert_eq!(err.source(), Some(ErrorSource::pointer("/data/attributes/status")));
    }
}
