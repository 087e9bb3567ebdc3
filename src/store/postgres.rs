use async_trait::async_trait;

use super::Store;
use crate::database::Database;
use crate::error::AppResult;
use crate::jsonapi::Page;
use crate::models::{
    DiscountCode, Event, EventRole, NewDiscountCode, NewEvent, NewOrder, NewTicket,
    NewTicketHolder, NewUser, Order, OrderTicket, Ticket, TicketFees, TicketHolder, User,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, is_admin, COALESCE(is_super_admin, FALSE) AS is_super_admin, created_at";

const ORDER_COLUMNS: &str = "id, identifier, event_id, user_id, discount_code_id, status, amount, \
     quantity, payment_mode, paid_via, transaction_id, created_at, completed_at";

const DISCOUNT_COLUMNS: &str = "id, code, event_id, value, kind, is_active, valid_from, valid_till, \
     tickets_number, min_quantity, max_quantity, tickets, used_for";

const HOLDER_COLUMNS: &str = "id, firstname, lastname, email, ticket_id, order_id, pdf_url";

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    /* ---------- users & roles ---------- */

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let row = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, is_admin, is_super_admin)
             VALUES ($1, $2, $3, FALSE)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn grant_event_role(&self, user_id: i64, event_id: i64, role: EventRole) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO users_events_roles (user_id, event_id, role)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, event_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(user_id)
        .bind(event_id)
        .bind(role.as_str())
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn event_role(&self, user_id: i64, event_id: i64) -> AppResult<Option<EventRole>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM users_events_roles WHERE user_id = $1 AND event_id = $2",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.db.pool)
        .await?;

        // Unknown role names grant nothing.
        Ok(role.and_then(|r| r.parse().ok()))
    }

    /* ---------- events & tickets ---------- */

    async fn create_event(&self, event: NewEvent, organizer_id: i64) -> AppResult<Event> {
        let mut tx = self.db.pool.begin().await?;

        let row = sqlx::query_as::<_, Event>(
            "INSERT INTO events (name, payment_currency, starts_at, ends_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, payment_currency, starts_at, ends_at, created_at",
        )
        .bind(&event.name)
        .bind(&event.payment_currency)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO users_events_roles (user_id, event_id, role) VALUES ($1, $2, $3)")
            .bind(organizer_id)
            .bind(row.id)
            .bind(EventRole::Organizer.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn get_event(&self, id: i64) -> AppResult<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(
            "SELECT id, name, payment_currency, starts_at, ends_at, created_at FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn create_ticket(&self, ticket: NewTicket) -> AppResult<Ticket> {
        let row = sqlx::query_as::<_, Ticket>(
            "INSERT INTO tickets (event_id, name, price, quantity, is_fee_absorbed)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, event_id, name, price, quantity, is_fee_absorbed",
        )
        .bind(ticket.event_id)
        .bind(&ticket.name)
        .bind(ticket.price)
        .bind(ticket.quantity)
        .bind(ticket.is_fee_absorbed)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn get_ticket(&self, id: i64) -> AppResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, Ticket>(
            "SELECT id, event_id, name, price, quantity, is_fee_absorbed FROM tickets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn get_tickets(&self, ids: &[i64]) -> AppResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, Ticket>(
            "SELECT id, event_id, name, price, quantity, is_fee_absorbed
             FROM tickets WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows)
    }

    async fn get_ticket_fees(&self, currency: &str) -> AppResult<Option<TicketFees>> {
        let row = sqlx::query_as::<_, TicketFees>(
            "SELECT currency, service_fee, maximum_fee FROM ticket_fees WHERE currency = $1",
        )
        .bind(currency)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    /* ---------- attendees ---------- */

    async fn create_ticket_holder(&self, holder: NewTicketHolder) -> AppResult<TicketHolder> {
        let row = sqlx::query_as::<_, TicketHolder>(&format!(
            "INSERT INTO ticket_holders (firstname, lastname, email, ticket_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {HOLDER_COLUMNS}"
        ))
        .bind(&holder.firstname)
        .bind(&holder.lastname)
        .bind(&holder.email)
        .bind(holder.ticket_id)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn get_ticket_holder(&self, id: i64) -> AppResult<Option<TicketHolder>> {
        let row = sqlx::query_as::<_, TicketHolder>(&format!(
            "SELECT {HOLDER_COLUMNS} FROM ticket_holders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn get_ticket_holders(&self, ids: &[i64]) -> AppResult<Vec<TicketHolder>> {
        let rows = sqlx::query_as::<_, TicketHolder>(&format!(
            "SELECT {HOLDER_COLUMNS} FROM ticket_holders WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows)
    }

    async fn order_ticket_holders(&self, order_id: i64) -> AppResult<Vec<TicketHolder>> {
        let rows = sqlx::query_as::<_, TicketHolder>(&format!(
            "SELECT {HOLDER_COLUMNS} FROM ticket_holders WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows)
    }

    async fn save_ticket_holder(&self, holder: &TicketHolder) -> AppResult<()> {
        sqlx::query(
            "UPDATE ticket_holders
             SET firstname = $2, lastname = $3, email = $4, ticket_id = $5, order_id = $6, pdf_url = $7
             WHERE id = $1",
        )
        .bind(holder.id)
        .bind(&holder.firstname)
        .bind(&holder.lastname)
        .bind(&holder.email)
        .bind(holder.ticket_id)
        .bind(holder.order_id)
        .bind(&holder.pdf_url)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn attach_ticket_holders(&self, order_id: i64, holder_ids: &[i64]) -> AppResult<()> {
        sqlx::query("UPDATE ticket_holders SET order_id = $1 WHERE id = ANY($2)")
            .bind(order_id)
            .bind(holder_ids)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn detach_ticket_holders(&self, order_id: i64, holder_ids: &[i64]) -> AppResult<()> {
        sqlx::query("UPDATE ticket_holders SET order_id = NULL WHERE order_id = $1 AND id = ANY($2)")
            .bind(order_id)
            .bind(holder_ids)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    /* ---------- discount codes ---------- */

    async fn create_discount_code(&self, code: NewDiscountCode) -> AppResult<DiscountCode> {
        let row = sqlx::query_as::<_, DiscountCode>(&format!(
            "INSERT INTO discount_codes
                (code, event_id, value, kind, is_active, valid_from, valid_till,
                 tickets_number, min_quantity, max_quantity, tickets, used_for)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {DISCOUNT_COLUMNS}"
        ))
        .bind(&code.code)
        .bind(code.event_id)
        .bind(code.value)
        .bind(code.kind.as_str())
        .bind(code.is_active)
        .bind(code.valid_from)
        .bind(code.valid_till)
        .bind(code.tickets_number)
        .bind(code.min_quantity)
        .bind(code.max_quantity)
        .bind(&code.tickets)
        .bind(code.used_for.as_str())
        .fetch_one(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn get_discount_code(&self, id: i64) -> AppResult<Option<DiscountCode>> {
        let row = sqlx::query_as::<_, DiscountCode>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discount_codes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn count_discount_redemptions(&self, discount_code_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(th.id)
             FROM ticket_holders th
             JOIN orders o ON o.id = th.order_id
             WHERE o.discount_code_id = $1
               AND o.status NOT IN ('cancelled', 'expired')",
        )
        .bind(discount_code_id)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(count)
    }

    /* ---------- orders ---------- */

    async fn insert_order(&self, order: NewOrder) -> AppResult<Order> {
        let mut tx = self.db.pool.begin().await?;

        let row = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders (identifier, event_id, discount_code_id, status, amount, payment_mode)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.identifier)
        .bind(order.event_id)
        .bind(order.discount_code_id)
        .bind(order.status.as_str())
        .bind(order.amount)
        .bind(&order.payment_mode)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE ticket_holders SET order_id = $1 WHERE id = ANY($2)")
            .bind(row.id)
            .bind(&order.ticket_holder_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn get_order(&self, id: i64) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row)
    }

    async fn get_order_by_identifier(&self, identifier: &str) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE identifier = $1"
        ))
        .bind(identifier)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row)
    }

    async fn update_order(&self, order: &Order) -> AppResult<()> {
        sqlx::query(
            "UPDATE orders
             SET user_id = $2, discount_code_id = $3, status = $4, amount = $5, quantity = $6,
                 payment_mode = $7, paid_via = $8, transaction_id = $9, completed_at = $10
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.discount_code_id)
        .bind(order.status.as_str())
        .bind(order.amount)
        .bind(order.quantity)
        .bind(&order.payment_mode)
        .bind(&order.paid_via)
        .bind(&order.transaction_id)
        .bind(order.completed_at)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn delete_order(&self, id: i64) -> AppResult<()> {
        // orders_tickets cascade, ticket_holders.order_id is set to NULL
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn list_orders(&self, event_id: Option<i64>, page: Page) -> AppResult<(Vec<Order>, i64)> {
        let rows = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE ($1::BIGINT IS NULL OR event_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(event_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE ($1::BIGINT IS NULL OR event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.db.pool)
        .await?;

        Ok((rows, total))
    }

    async fn insert_order_ticket(&self, order_ticket: &OrderTicket) -> AppResult<()> {
        sqlx::query("INSERT INTO orders_tickets (order_id, ticket_id, quantity) VALUES ($1, $2, $3)")
            .bind(order_ticket.order_id)
            .bind(order_ticket.ticket_id)
            .bind(order_ticket.quantity)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn order_tickets(&self, order_id: i64) -> AppResult<Vec<OrderTicket>> {
        let rows = sqlx::query_as::<_, OrderTicket>(
            "SELECT order_id, ticket_id, quantity FROM orders_tickets WHERE order_id = $1 ORDER BY ticket_id",
        )
        .bind(order_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows)
    }
}
