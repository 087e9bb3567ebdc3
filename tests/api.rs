use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use event_orders::config::Config;
use event_orders::error::AppResult;
use event_orders::middleware::issue_token;
use event_orders::models::discount_code::parse_window_timestamp;
use event_orders::models::{
    DiscountKind, DiscountScope, Event, EventRole, NewDiscountCode, NewEvent, NewTicket, NewTicketHolder, NewUser,
    Order, TicketHolder,
};
use event_orders::permissions::StoreAccessPolicy;
use event_orders::services::mail::Mailer;
use event_orders::services::payment::StripeClient;
use event_orders::services::pdf::{AttendeeTicket, TicketDocuments};
use event_orders::services::ticketing::{PricingEngine, TicketingManager};
use event_orders::store::{MemoryStore, Store};
use event_orders::{app, AppState};

/* ---------- collaborators ---------- */

struct FakeDocuments;

#[async_trait]
impl TicketDocuments for FakeDocuments {
    async fn create_ticket_pdf(&self, ticket: AttendeeTicket<'_>) -> AppResult<String> {
        Ok(format!("/static/media/tickets/{}-{}.pdf", ticket.order.identifier, ticket.holder.id))
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email_to_attendees(&self, _order: &Order, _event: &Event, holders: &[TicketHolder]) -> AppResult<()> {
        let mut sent = self.sent.lock().unwrap();
        sent.extend(holders.iter().map(|h| h.email.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct CountingPricing {
    calls: AtomicUsize,
}

#[async_trait]
impl PricingEngine for CountingPricing {
    async fn calculate_update_amount(&self, store: &dyn Store, order: &mut Order) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TicketingManager.calculate_update_amount(store, order).await
    }
}

/* ---------- fixtures ---------- */

struct World {
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
    pricing: Arc<CountingPricing>,
    mailer: Arc<RecordingMailer>,
    event: Event,
    other_event: Event,
    ticket_a: i64,
    ticket_b: i64,
    organizer: i64,
    coorganizer: i64,
    buyer: i64,
    admin: i64,
}

impl World {
    async fn new() -> Self {
        Self::with_gateway("http://127.0.0.1:9", None).await
    }

    async fn with_gateway(gateway_url: &str, secret_key: Option<&str>) -> Self {
        let mut config = Config::for_tests();
        config.payment.gateway_url = gateway_url.to_string();
        config.payment.stripe_secret_key = secret_key.map(str::to_string);

        let store = Arc::new(MemoryStore::new());
        let pricing = Arc::new(CountingPricing::default());
        let mailer = Arc::new(RecordingMailer::default());
        let payments = StripeClient::from_config(&config.payment, &config.circuit_breaker).unwrap();

        let state = Arc::new(AppState {
            store: store.clone(),
            access: Arc::new(StoreAccessPolicy::new(store.clone())),
            documents: Arc::new(FakeDocuments),
            mailer: mailer.clone(),
            pricing: pricing.clone(),
            payments: Arc::new(payments),
            config,
        });

        let organizer = user(&store, false).await;
        let coorganizer = user(&store, false).await;
        let buyer = user(&store, false).await;
        let admin = user(&store, true).await;

        let start = NaiveDate::from_ymd_opt(2027, 6, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let new_event = |name: &str| NewEvent {
            name: name.to_string(),
            payment_currency: "USD".into(),
            starts_at: start,
            ends_at: start + Duration::hours(8),
        };
        let event = store.create_event(new_event("RustFest"), organizer).await.unwrap();
        let other_event = store.create_event(new_event("GopherCon"), organizer).await.unwrap();
        store.grant_event_role(coorganizer, event.id, EventRole::Coorganizer).await.unwrap();

        let ticket = |name: &str, price: i64| NewTicket {
            event_id: event.id,
            name: name.to_string(),
            price: Decimal::from(price),
            quantity: 100,
            is_fee_absorbed: false,
        };
        let ticket_a = store.create_ticket(ticket("Standard", 10)).await.unwrap().id;
        let ticket_b = store.create_ticket(ticket("VIP", 20)).await.unwrap().id;

        World {
            state,
            store,
            pricing,
            mailer,
            event,
            other_event,
            ticket_a,
            ticket_b,
            organizer,
            coorganizer,
            buyer,
            admin,
        }
    }

    fn app(&self) -> Router {
        app(self.state.clone())
    }

    fn token(&self, user_id: i64) -> String {
        issue_token(&self.state.config.jwt, user_id).unwrap()
    }

    /// Attendees on ticket A and ticket B.
    async fn holders(&self, on_a: usize, on_b: usize) -> Vec<i64> {
        let mut ids = Vec::new();
        for ticket_id in std::iter::repeat(self.ticket_a).take(on_a).chain(std::iter::repeat(self.ticket_b).take(on_b)) {
            let holder = self
                .store
                .create_ticket_holder(NewTicketHolder {
                    firstname: FirstName().fake(),
                    lastname: LastName().fake(),
                    email: SafeEmail().fake(),
                    ticket_id,
                })
                .await
                .unwrap();
            ids.push(holder.id);
        }
        ids
    }

    async fn discount(&self, tweak: impl FnOnce(&mut NewDiscountCode)) -> i64 {
        let now = Utc::now().naive_utc();
        let mut code = NewDiscountCode {
            code: "SAVE5".into(),
            event_id: self.event.id,
            value: Decimal::from(5),
            kind: DiscountKind::Amount,
            is_active: true,
            valid_from: now - Duration::days(1),
            valid_till: now + Duration::days(1),
            tickets_number: Some(10),
            min_quantity: 0,
            max_quantity: None,
            tickets: vec![self.ticket_a],
            used_for: DiscountScope::Ticket,
        };
        tweak(&mut code);
        self.store.create_discount_code(code).await.unwrap().id
    }
}

async fn user(store: &MemoryStore, is_admin: bool) -> i64 {
    store
        .create_user(NewUser {
            // unique local part, fake domain
            email: format!("{}+{}", uuid::Uuid::new_v4().simple(), SafeEmail().fake::<String>()),
            password_hash: "unused".into(),
            is_admin,
        })
        .await
        .unwrap()
        .id
}

fn order_body(event_id: Option<i64>, holders: &[i64], extra_attributes: Value, discount: Option<i64>) -> Value {
    let mut relationships = json!({});
    if let Some(event_id) = event_id {
        relationships["event"] = json!({ "data": { "type": "event", "id": event_id.to_string() } });
    }
    relationships["ticket-holders"] = json!({
        "data": holders.iter().map(|id| json!({ "type": "attendee", "id": id.to_string() })).collect::<Vec<_>>()
    });
    if let Some(code) = discount {
        relationships["discount-code"] = json!({ "data": { "type": "discount-code", "id": code.to_string() } });
    }
    json!({ "data": { "type": "order", "attributes": extra_attributes, "relationships": relationships } })
}

async fn call(app: Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/vnd.api+json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

fn first_error(body: &Value) -> &Value {
    &body["errors"][0]
}

/* ---------- order creation ---------- */

#[tokio::test]
async fn creating_an_order_requires_a_token() {
    let world = World::new().await;
    let holders = world.holders(1, 0).await;
    let (status, _) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        None,
        Some(order_body(Some(world.event.id), &holders, json!({}), None)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_relationships_are_rejected_before_anything_is_stored() {
    let world = World::new().await;
    let token = world.token(world.buyer);
    let holders = world.holders(1, 0).await;

    let (status, body) =
        call(world.app(), Method::POST, "/v1/orders", Some(&token), Some(order_body(None, &holders, json!({}), None))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["source"]["pointer"], "/data/relationships/event");
    assert_eq!(first_error(&body)["detail"], "A valid relationship with event resource is required");

    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&token),
        Some(order_body(Some(world.event.id), &[], json!({}), None)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["source"]["pointer"], "/data/relationships/ticket-holders");

    let mut null_holders = order_body(Some(world.event.id), &[], json!({}), None);
    null_holders["data"]["relationships"]["ticket-holders"] = json!({ "data": null });
    let (status, body) = call(world.app(), Method::POST, "/v1/orders", Some(&token), Some(null_holders)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["source"]["pointer"], "/data/relationships/ticket-holders");
    assert_eq!(first_error(&body)["detail"], "A valid relationship with ticket-holders resource is required");

    let (orders, total) = world.store.list_orders(None, event_orders::jsonapi::Page { limit: 10, offset: 0 }).await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(total, 0);
    assert_eq!(world.pricing.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn buyers_always_get_a_pending_order() {
    let world = World::new().await;
    let holders = world.holders(1, 0).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.buyer)),
        Some(order_body(Some(world.event.id), &holders, json!({ "status": "completed" }), None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["attributes"]["status"], "pending");
    assert_eq!(body["data"]["relationships"]["user"]["data"]["id"], world.buyer.to_string());
}

#[tokio::test]
async fn coorganizers_keep_the_submitted_status() {
    let world = World::new().await;
    let holders = world.holders(1, 0).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.coorganizer)),
        Some(order_body(Some(world.event.id), &holders, json!({ "status": "placed" }), None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["attributes"]["status"], "placed");
}

#[tokio::test]
async fn holders_are_tallied_into_order_tickets() {
    let world = World::new().await;
    let holders = world.holders(2, 3).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.buyer)),
        Some(order_body(Some(world.event.id), &holders, json!({}), None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["attributes"]["quantity"], 5);

    let identifier = body["data"]["id"].as_str().unwrap();
    let order = world.store.get_order_by_identifier(identifier).await.unwrap().unwrap();
    let mut lines: Vec<(i64, i32)> =
        world.store.order_tickets(order.id).await.unwrap().iter().map(|ot| (ot.ticket_id, ot.quantity)).collect();
    lines.sort();
    assert_eq!(lines, vec![(world.ticket_a, 2), (world.ticket_b, 3)]);

    let attached = world.store.order_ticket_holders(order.id).await.unwrap();
    assert_eq!(attached.len(), 5);
    assert!(attached.iter().all(|h| h.pdf_url.as_deref().is_some_and(|u| u.ends_with(".pdf"))));
    assert_eq!(world.mailer.sent.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn amount_is_recalculated_only_for_non_coorganizers() {
    let world = World::new().await;

    let holders = world.holders(2, 3).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.buyer)),
        Some(order_body(Some(world.event.id), &holders, json!({ "amount": "1.00" }), None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(world.pricing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(body["data"]["attributes"]["amount"], "80");

    let holders = world.holders(1, 1).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.organizer)),
        Some(order_body(Some(world.event.id), &holders, json!({ "amount": "1.00" }), None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(world.pricing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(body["data"]["attributes"]["amount"], "1.00");
}

#[tokio::test]
async fn nested_route_rejects_a_different_event() {
    let world = World::new().await;
    let holders = world.holders(1, 0).await;
    let uri = format!("/v1/events/{}/orders", world.other_event.id);
    let (status, body) = call(
        world.app(),
        Method::POST,
        &uri,
        Some(&world.token(world.buyer)),
        Some(order_body(Some(world.event.id), &holders, json!({}), None)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["source"]["pointer"], "/data/relationships/event");
}

/* ---------- discount codes ---------- */

async fn order_with_code(world: &World, code: i64, holders: &[i64]) -> (StatusCode, Value) {
    call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.buyer)),
        Some(order_body(Some(world.event.id), holders, json!({}), Some(code))),
    )
    .await
}

#[tokio::test]
async fn inactive_discount_code_is_rejected() {
    let world = World::new().await;
    let code = world.discount(|c| c.is_active = false).await;
    let holders = world.holders(1, 0).await;

    let (status, body) = order_with_code(&world, code, &holders).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["detail"], "Inactive Discount Code");
    assert_eq!(first_error(&body)["source"]["source"], "discount_code_id");
}

#[tokio::test]
async fn expired_discount_code_is_inactive() {
    let world = World::new().await;
    let till = parse_window_timestamp("2020-01-31 23:59:59").unwrap();
    let code = world
        .discount(|c| {
            c.valid_from = till - Duration::days(30);
            c.valid_till = till;
        })
        .await;
    let holders = world.holders(1, 0).await;

    let (status, body) = order_with_code(&world, code, &holders).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["detail"], "Inactive Discount Code");
}

#[tokio::test]
async fn discount_usage_limit_counts_earlier_orders() {
    let world = World::new().await;
    let code = world.discount(|c| c.tickets_number = Some(3)).await;

    let first = world.holders(2, 0).await;
    let (status, _) = order_with_code(&world, code, &first).await;
    assert_eq!(status, StatusCode::CREATED);

    let second = world.holders(2, 0).await;
    let (status, body) = order_with_code(&world, code, &second).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["detail"], "Discount Usage Exceeded");
}

#[tokio::test]
async fn ticket_code_from_another_event_is_invalid() {
    let world = World::new().await;
    let other = world.other_event.id;
    let code = world.discount(|c| c.event_id = other).await;
    let holders = world.holders(1, 0).await;

    let (status, body) = order_with_code(&world, code, &holders).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["detail"], "Invalid Discount Code");
}

#[tokio::test]
async fn unknown_discount_code_is_not_found() {
    let world = World::new().await;
    let holders = world.holders(1, 0).await;
    let (status, _) = order_with_code(&world, 9_999, &holders).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_discount_code_is_not_found_for_coorganizers_too() {
    let world = World::new().await;
    let holders = world.holders(1, 0).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.coorganizer)),
        Some(order_body(Some(world.event.id), &holders, json!({}), Some(987_654))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(first_error(&body)["source"]["source"], "discount_code_id");

    let (orders, _) = world.store.list_orders(None, event_orders::jsonapi::Page { limit: 10, offset: 0 }).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn coorganizers_attach_a_code_without_eligibility_checks() {
    let world = World::new().await;
    let code = world.discount(|c| c.is_active = false).await;
    let holders = world.holders(1, 0).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(world.coorganizer)),
        Some(order_body(Some(world.event.id), &holders, json!({}), Some(code))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["relationships"]["discount-code"]["data"]["id"], code.to_string());
}

#[tokio::test]
async fn valid_discount_lowers_the_amount() {
    let world = World::new().await;
    let code = world.discount(|_| {}).await;
    let holders = world.holders(2, 1).await;

    let (status, body) = order_with_code(&world, code, &holders).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    // 2 x 10 + 20, minus 5 on each of the two A tickets
    assert_eq!(body["data"]["attributes"]["amount"], "30");
}

/* ---------- listing & detail ---------- */

async fn place_order(world: &World, user_id: i64, attributes: Value) -> String {
    let holders = world.holders(1, 1).await;
    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/orders",
        Some(&world.token(user_id)),
        Some(order_body(Some(world.event.id), &holders, attributes, None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn listing_all_orders_needs_admin() {
    let world = World::new().await;
    place_order(&world, world.buyer, json!({})).await;

    let (status, body) = call(world.app(), Method::GET, "/v1/orders", Some(&world.token(world.buyer)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(first_error(&body)["detail"], "Admin Access Required");

    let (status, body) =
        call(world.app(), Method::GET, "/v1/orders?page%5Bsize%5D=10", Some(&world.token(world.admin)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn listing_event_orders_needs_coorganizer() {
    let world = World::new().await;
    place_order(&world, world.buyer, json!({})).await;
    let uri = format!("/v1/events/{}/orders", world.event.id);

    let (status, body) = call(world.app(), Method::GET, &uri, Some(&world.token(world.buyer)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(first_error(&body)["detail"], "Co-Organizer Access Required");

    let (status, body) = call(world.app(), Method::GET, &uri, Some(&world.token(world.coorganizer)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
}

#[tokio::test]
async fn status_changes_need_coorganizer() {
    let world = World::new().await;
    let identifier = place_order(&world, world.buyer, json!({})).await;
    let uri = format!("/v1/orders/{identifier}");
    let patch = json!({ "data": { "type": "order", "id": identifier, "attributes": { "status": "cancelled" } } });

    let (status, body) =
        call(world.app(), Method::PATCH, &uri, Some(&world.token(world.buyer)), Some(patch.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(first_error(&body)["source"]["pointer"], "data/status");
    assert_eq!(first_error(&body)["detail"], "To update status minimum Co-organizer access required");

    let (status, body) = call(world.app(), Method::PATCH, &uri, Some(&world.token(world.coorganizer)), Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["status"], "cancelled");
}

#[tokio::test]
async fn strangers_cannot_read_an_order() {
    let world = World::new().await;
    let identifier = place_order(&world, world.buyer, json!({})).await;
    let stranger = user(&world.store, false).await;
    let uri = format!("/v1/orders/{identifier}");

    let (status, _) = call(world.app(), Method::GET, &uri, Some(&world.token(stranger)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(world.app(), Method::GET, &uri, Some(&world.token(world.buyer)), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn ticket_holder_relationship_can_be_edited() {
    let world = World::new().await;
    let identifier = place_order(&world, world.buyer, json!({})).await;
    let uri = format!("/v1/orders/{identifier}/relationships/ticket-holders");
    let token = world.token(world.buyer);

    let (status, body) = call(world.app(), Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let linked = body["data"].as_array().unwrap().clone();
    assert_eq!(linked.len(), 2);

    let removed = json!({ "data": [linked[0].clone()] });
    let (status, body) = call(world.app(), Method::DELETE, &uri, Some(&token), Some(removed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let extra = world.holders(1, 0).await;
    let added = json!({ "data": [{ "type": "attendee", "id": extra[0].to_string() }] });
    let (status, body) = call(world.app(), Method::POST, &uri, Some(&token), Some(added)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let event_uri = format!("/v1/orders/{identifier}/relationships/event");
    let (status, body) = call(world.app(), Method::GET, &event_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], world.event.id.to_string());
}

/* ---------- charges ---------- */

#[tokio::test]
async fn stripe_charge_completes_the_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ch_test_42", "paid": true })))
        .expect(1)
        .mount(&server)
        .await;

    let world = World::with_gateway(&server.uri(), Some("sk_test_key")).await;
    let identifier = place_order(&world, world.buyer, json!({ "payment-mode": "stripe" })).await;
    let token = world.token(world.buyer);

    let charge = json!({ "data": { "type": "charge", "attributes": { "stripe": "tok_visa" } } });
    let (status, body) =
        call(world.app(), Method::POST, &format!("/v1/orders/{identifier}/charge"), Some(&token), Some(charge)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["attributes"]["status"], "completed");

    let (_, body) = call(world.app(), Method::GET, &format!("/v1/orders/{identifier}"), Some(&token), None).await;
    assert_eq!(body["data"]["attributes"]["status"], "completed");
    assert_eq!(body["data"]["attributes"]["paid-via"], "stripe");
    assert_eq!(body["data"]["attributes"]["transaction-id"], "ch_test_42");
    assert!(body["data"]["attributes"]["completed-at"].is_string());
}

#[tokio::test]
async fn charge_without_token_is_unprocessable() {
    let world = World::new().await;
    let identifier = place_order(&world, world.buyer, json!({ "payment-mode": "stripe" })).await;

    let charge = json!({
        "data": {
            "type": "charge",
            "attributes": {},
            "relationships": { "order": { "data": { "type": "order", "id": identifier } } }
        }
    });
    let (status, body) = call(world.app(), Method::POST, "/v1/charges", Some(&world.token(world.buyer)), Some(charge)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["detail"], "stripe token is missing");
}

#[tokio::test]
async fn declined_card_points_at_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(402).set_body_json(json!({ "error": { "message": "Your card was declined." } })),
        )
        .mount(&server)
        .await;

    let world = World::with_gateway(&server.uri(), Some("sk_test_key")).await;
    let identifier = place_order(&world, world.buyer, json!({ "payment-mode": "stripe" })).await;

    let charge = json!({ "data": { "type": "charge", "attributes": { "stripe": "tok_chargeDeclined" } } });
    let (status, body) = call(
        world.app(),
        Method::POST,
        &format!("/v1/orders/{identifier}/charge"),
        Some(&world.token(world.buyer)),
        Some(charge),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["source"]["pointer"], "stripe_token_id");
    assert_eq!(first_error(&body)["detail"], "Your card was declined.");
}

/* ---------- surrounding resources ---------- */

#[tokio::test]
async fn health_is_public() {
    let world = World::new().await;
    let (status, _) = call(world.app(), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn session_issues_a_working_token() {
    let world = World::new().await;
    let hash = bcrypt::hash("correct horse", 4).unwrap();
    world
        .store
        .create_user(NewUser { email: "ada@example.com".into(), password_hash: hash, is_admin: false })
        .await
        .unwrap();

    let (status, _) = call(
        world.app(),
        Method::POST,
        "/v1/auth/session",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        world.app(),
        Method::POST,
        "/v1/auth/session",
        None,
        Some(json!({ "email": "ada@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap();

    let uri = format!("/v1/events/{}", world.event.id);
    let (status, body) = call(world.app(), Method::GET, &uri, Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["name"], "RustFest");
}

#[tokio::test]
async fn organizers_grant_roles_and_coorganizers_create_codes() {
    let world = World::new().await;
    let newcomer = user(&world.store, false).await;

    let grant = json!({
        "data": {
            "type": "users-events-role",
            "attributes": { "role": "coorganizer" },
            "relationships": { "user": { "data": { "type": "user", "id": newcomer.to_string() } } }
        }
    });
    let uri = format!("/v1/events/{}/roles", world.event.id);
    let (status, _) = call(world.app(), Method::POST, &uri, Some(&world.token(world.buyer)), Some(grant.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(world.app(), Method::POST, &uri, Some(&world.token(world.organizer)), Some(grant)).await;
    assert_eq!(status, StatusCode::CREATED);

    let code = json!({
        "data": {
            "type": "discount-code",
            "attributes": {
                "code": "LAUNCH",
                "value": "15",
                "type": "percent",
                "valid-from": "2027-01-01 00:00:00",
                "valid-till": "2027-02-01 00:00:00",
                "tickets": world.ticket_a.to_string(),
                "used-for": "ticket"
            },
            "relationships": { "event": { "data": { "type": "event", "id": world.event.id.to_string() } } }
        }
    });
    let (status, body) =
        call(world.app(), Method::POST, "/v1/discount-codes", Some(&world.token(newcomer)), Some(code)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["attributes"]["valid-till"], "2027-02-01 00:00:00");
}

#[tokio::test]
async fn attendees_are_created_against_a_ticket() {
    let world = World::new().await;
    let attendee = json!({
        "data": {
            "type": "attendee",
            "attributes": { "firstname": "Ada", "lastname": "Lovelace", "email": "ada@example.com" },
            "relationships": { "ticket": { "data": { "type": "ticket", "id": world.ticket_b.to_string() } } }
        }
    });
    let (status, body) =
        call(world.app(), Method::POST, "/v1/attendees", Some(&world.token(world.buyer)), Some(attendee)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["relationships"]["ticket"]["data"]["id"], world.ticket_b.to_string());

    let missing_ticket = json!({
        "data": { "type": "attendee", "attributes": { "firstname": "A", "lastname": "B", "email": "a@example.com" } }
    });
    let (status, body) =
        call(world.app(), Method::POST, "/v1/attendees", Some(&world.token(world.buyer)), Some(missing_ticket)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(first_error(&body)["source"]["pointer"], "/data/relationships/ticket");
}
