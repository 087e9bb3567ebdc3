//! Persistence seam.
//!
//! Handlers and services talk to [`Store`] only. [`postgres::PgStore`] is the
//! production backend; [`memory::MemoryStore`] keeps the same tables in
//! process memory for local runs without a database and for tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::jsonapi::Page;
use crate::models::{
    DiscountCode, Event, EventRole, NewDiscountCode, NewEvent, NewOrder, NewTicket,
    NewTicketHolder, NewUser, Order, OrderTicket, Ticket, TicketFees, TicketHolder, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // --- users & roles ---
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn get_user(&self, id: i64) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn grant_event_role(&self, user_id: i64, event_id: i64, role: EventRole) -> AppResult<()>;
    async fn event_role(&self, user_id: i64, event_id: i64) -> AppResult<Option<EventRole>>;

    // --- events & tickets ---
    /// Creates the event and makes `organizer_id` its organizer.
    async fn create_event(&self, event: NewEvent, organizer_id: i64) -> AppResult<Event>;
    async fn get_event(&self, id: i64) -> AppResult<Option<Event>>;
    async fn create_ticket(&self, ticket: NewTicket) -> AppResult<Ticket>;
    async fn get_ticket(&self, id: i64) -> AppResult<Option<Ticket>>;
    async fn get_tickets(&self, ids: &[i64]) -> AppResult<Vec<Ticket>>;
    async fn get_ticket_fees(&self, currency: &str) -> AppResult<Option<TicketFees>>;

    // --- attendees ---
    async fn create_ticket_holder(&self, holder: NewTicketHolder) -> AppResult<TicketHolder>;
    async fn get_ticket_holder(&self, id: i64) -> AppResult<Option<TicketHolder>>;
    /// Rows for the ids that exist, in id order.
    async fn get_ticket_holders(&self, ids: &[i64]) -> AppResult<Vec<TicketHolder>>;
    async fn order_ticket_holders(&self, order_id: i64) -> AppResult<Vec<TicketHolder>>;
    async fn save_ticket_holder(&self, holder: &TicketHolder) -> AppResult<()>;
    async fn attach_ticket_holders(&self, order_id: i64, holder_ids: &[i64]) -> AppResult<()>;
    async fn detach_ticket_holders(&self, order_id: i64, holder_ids: &[i64]) -> AppResult<()>;

    // --- discount codes ---
    async fn create_discount_code(&self, code: NewDiscountCode) -> AppResult<DiscountCode>;
    async fn get_discount_code(&self, id: i64) -> AppResult<Option<DiscountCode>>;
    /// Attendees already attached to live orders that used this code.
    async fn count_discount_redemptions(&self, discount_code_id: i64) -> AppResult<i64>;

    // --- orders ---
    /// Inserts the order and attaches its ticket holders in one step.
    async fn insert_order(&self, order: NewOrder) -> AppResult<Order>;
    async fn get_order(&self, id: i64) -> AppResult<Option<Order>>;
    async fn get_order_by_identifier(&self, identifier: &str) -> AppResult<Option<Order>>;
    async fn update_order(&self, order: &Order) -> AppResult<()>;
    async fn delete_order(&self, id: i64) -> AppResult<()>;
    /// Newest first; `event_id` narrows to one event.
    async fn list_orders(&self, event_id: Option<i64>, page: Page) -> AppResult<(Vec<Order>, i64)>;
    async fn insert_order_ticket(&self, order_ticket: &OrderTicket) -> AppResult<()>;
    async fn order_tickets(&self, order_id: i64) -> AppResult<Vec<OrderTicket>>;
}
