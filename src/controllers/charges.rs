use axum::{
    extract::{Path, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::self_link;
use crate::error::{AppError, AppResult};
use crate::jsonapi::{Document, JsonApi, JsonApiBody, Linkage, Resource, ResourceIdentifier, ToOne};
use crate::middleware::AuthUser;
use crate::models::{Order, OrderStatus};
use crate::services::charges;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/charges", post(create_charge))
        .route("/orders/{order_identifier}/charge", post(charge_order))
}

#[derive(Debug, Default, Deserialize)]
struct ChargeAttributes {
    stripe: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChargeRelationships {
    order: Option<ToOne>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct ChargeOut {
    status: OrderStatus,
    paid_via: Option<String>,
    transaction_id: Option<String>,
}

fn charge_resource(order: &Order) -> Resource<ChargeOut> {
    Resource::new(
        "charge",
        &order.identifier,
        format!("{}/charge", self_link("orders", &order.identifier)),
        ChargeOut {
            status: order.status,
            paid_via: order.paid_via.clone(),
            transaction_id: order.transaction_id.clone(),
        },
    )
    .relationship(
        "order",
        self_link("orders", &order.identifier),
        Linkage::One(Some(ResourceIdentifier::new("order", &order.identifier))),
    )
}

// POST /v1/orders/{order_identifier}/charge
async fn charge_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(identifier): Path<String>,
    JsonApiBody(doc): JsonApiBody<Document<ChargeAttributes>>,
) -> AppResult<JsonApi<Resource<ChargeOut>>> {
    let order = charges::charge_order(&state, &user, &identifier, doc.data.attributes.stripe).await?;
    Ok(JsonApi::created(charge_resource(&order)))
}

// POST /v1/charges
async fn create_charge(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonApiBody(doc): JsonApiBody<Document<ChargeAttributes, ChargeRelationships>>,
) -> AppResult<JsonApi<Resource<ChargeOut>>> {
    // orders are addressed by identifier, not by numeric id
    let identifier = doc
        .data
        .relationships
        .order
        .and_then(|r| r.data)
        .map(|r| r.id)
        .ok_or(AppError::MissingRelationship("order"))?;

    let order = charges::charge_order(&state, &user, &identifier, doc.data.attributes.stripe).await?;
    Ok(JsonApi::created(charge_resource(&order)))
}
