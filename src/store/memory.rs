use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::Store;
use crate::error::{AppError, AppResult};
use crate::jsonapi::Page;
use crate::models::{
    DiscountCode, Event, EventRole, NewDiscountCode, NewEvent, NewOrder, NewTicket,
    NewTicketHolder, NewUser, Order, OrderTicket, Ticket, TicketFees, TicketHolder, User,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    roles: BTreeMap<(i64, i64), EventRole>,
    events: BTreeMap<i64, Event>,
    tickets: BTreeMap<i64, Ticket>,
    fees: BTreeMap<String, TicketFees>,
    holders: BTreeMap<i64, TicketHolder>,
    discounts: BTreeMap<i64, DiscountCode>,
    orders: BTreeMap<i64, Order>,
    order_tickets: Vec<OrderTicket>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store with the same semantics as the Postgres tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fee rows have no HTTP resource; seed them directly.
    pub async fn put_ticket_fees(&self, fees: TicketFees) {
        let mut t = self.tables.write().await;
        t.fees.insert(fees.currency.clone(), fees);
    }

    pub async fn set_super_admin(&self, user_id: i64, value: bool) {
        let mut t = self.tables.write().await;
        if let Some(user) = t.users.get_mut(&user_id) {
            user.is_super_admin = value;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict(format!("email {} is already registered", user.email)));
        }
        let id = t.next_id();
        let row = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            is_super_admin: false,
            created_at: Utc::now().naive_utc(),
        };
        t.users.insert(id, row.clone());
        Ok(row)
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn grant_event_role(&self, user_id: i64, event_id: i64, role: EventRole) -> AppResult<()> {
        self.tables.write().await.roles.insert((user_id, event_id), role);
        Ok(())
    }

    async fn event_role(&self, user_id: i64, event_id: i64) -> AppResult<Option<EventRole>> {
        Ok(self.tables.read().await.roles.get(&(user_id, event_id)).copied())
    }

    async fn create_event(&self, event: NewEvent, organizer_id: i64) -> AppResult<Event> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let row = Event {
            id,
            name: event.name,
            payment_currency: event.payment_currency,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            created_at: Utc::now().naive_utc(),
        };
        t.events.insert(id, row.clone());
        t.roles.insert((organizer_id, id), EventRole::Organizer);
        Ok(row)
    }

    async fn get_event(&self, id: i64) -> AppResult<Option<Event>> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> AppResult<Ticket> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let row = Ticket {
            id,
            event_id: ticket.event_id,
            name: ticket.name,
            price: ticket.price,
            quantity: ticket.quantity,
            is_fee_absorbed: ticket.is_fee_absorbed,
        };
        t.tickets.insert(id, row.clone());
        Ok(row)
    }

    async fn get_ticket(&self, id: i64) -> AppResult<Option<Ticket>> {
        Ok(self.tables.read().await.tickets.get(&id).cloned())
    }

    async fn get_tickets(&self, ids: &[i64]) -> AppResult<Vec<Ticket>> {
        let t = self.tables.read().await;
        Ok(t.tickets.values().filter(|tk| ids.contains(&tk.id)).cloned().collect())
    }

    async fn get_ticket_fees(&self, currency: &str) -> AppResult<Option<TicketFees>> {
        Ok(self.tables.read().await.fees.get(currency).cloned())
    }

    async fn create_ticket_holder(&self, holder: NewTicketHolder) -> AppResult<TicketHolder> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let row = TicketHolder {
            id,
            firstname: holder.firstname,
            lastname: holder.lastname,
            email: holder.email,
            ticket_id: holder.ticket_id,
            order_id: None,
            pdf_url: None,
        };
        t.holders.insert(id, row.clone());
        Ok(row)
    }

    async fn get_ticket_holder(&self, id: i64) -> AppResult<Option<TicketHolder>> {
        Ok(self.tables.read().await.holders.get(&id).cloned())
    }

    async fn get_ticket_holders(&self, ids: &[i64]) -> AppResult<Vec<TicketHolder>> {
        let t = self.tables.read().await;
        Ok(t.holders.values().filter(|h| ids.contains(&h.id)).cloned().collect())
    }

    async fn order_ticket_holders(&self, order_id: i64) -> AppResult<Vec<TicketHolder>> {
        let t = self.tables.read().await;
        Ok(t.holders.values().filter(|h| h.order_id == Some(order_id)).cloned().collect())
    }

    async fn save_ticket_holder(&self, holder: &TicketHolder) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if let Some(row) = t.holders.get_mut(&holder.id) {
            *row = holder.clone();
        }
        Ok(())
    }

    async fn attach_ticket_holders(&self, order_id: i64, holder_ids: &[i64]) -> AppResult<()> {
        let mut t = self.tables.write().await;
        for id in holder_ids {
            if let Some(holder) = t.holders.get_mut(id) {
                holder.order_id = Some(order_id);
            }
        }
        Ok(())
    }

    async fn detach_ticket_holders(&self, order_id: i64, holder_ids: &[i64]) -> AppResult<()> {
        let mut t = self.tables.write().await;
        for id in holder_ids {
            if let Some(holder) = t.holders.get_mut(id) {
                if holder.order_id == Some(order_id) {
                    holder.order_id = None;
                }
            }
        }
        Ok(())
    }

    async fn create_discount_code(&self, code: NewDiscountCode) -> AppResult<DiscountCode> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let row = DiscountCode {
            id,
            code: code.code,
            event_id: code.event_id,
            value: code.value,
            kind: code.kind,
            is_active: code.is_active,
            valid_from: code.valid_from,
            valid_till: code.valid_till,
            tickets_number: code.tickets_number,
            min_quantity: code.min_quantity,
            max_quantity: code.max_quantity,
            tickets: code.tickets,
            used_for: code.used_for,
        };
        t.discounts.insert(id, row.clone());
        Ok(row)
    }

    async fn get_discount_code(&self, id: i64) -> AppResult<Option<DiscountCode>> {
        Ok(self.tables.read().await.discounts.get(&id).cloned())
    }

    async fn count_discount_redemptions(&self, discount_code_id: i64) -> AppResult<i64> {
        let t = self.tables.read().await;
        let count = t
            .holders
            .values()
            .filter_map(|h| h.order_id.and_then(|oid| t.orders.get(&oid)))
            .filter(|o| o.discount_code_id == Some(discount_code_id) && !o.status.is_void())
            .count();
        Ok(count as i64)
    }

    async fn insert_order(&self, order: NewOrder) -> AppResult<Order> {
        let mut t = self.tables.write().await;
        if t.orders.values().any(|o| o.identifier == order.identifier) {
            return Err(AppError::Conflict(format!("order {} already exists", order.identifier)));
        }
        let id = t.next_id();
        let row = Order {
            id,
            identifier: order.identifier,
            event_id: order.event_id,
            user_id: None,
            discount_code_id: order.discount_code_id,
            status: order.status,
            amount: order.amount,
            quantity: 0,
            payment_mode: order.payment_mode,
            paid_via: None,
            transaction_id: None,
            created_at: Utc::now().naive_utc(),
            completed_at: None,
        };
        t.orders.insert(id, row.clone());
        for holder_id in &order.ticket_holder_ids {
            if let Some(holder) = t.holders.get_mut(holder_id) {
                holder.order_id = Some(id);
            }
        }
        Ok(row)
    }

    async fn get_order(&self, id: i64) -> AppResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn get_order_by_identifier(&self, identifier: &str) -> AppResult<Option<Order>> {
        let t = self.tables.read().await;
        Ok(t.orders.values().find(|o| o.identifier == identifier).cloned())
    }

    async fn update_order(&self, order: &Order) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if let Some(row) = t.orders.get_mut(&order.id) {
            *row = order.clone();
        }
        Ok(())
    }

    async fn delete_order(&self, id: i64) -> AppResult<()> {
        let mut t = self.tables.write().await;
        t.orders.remove(&id);
        t.order_tickets.retain(|ot| ot.order_id != id);
        for holder in t.holders.values_mut() {
            if holder.order_id == Some(id) {
                holder.order_id = None;
            }
        }
        Ok(())
    }

    async fn list_orders(&self, event_id: Option<i64>, page: Page) -> AppResult<(Vec<Order>, i64)> {
        let t = self.tables.read().await;
        let mut matching: Vec<&Order> = t
            .orders
            .values()
            .filter(|o| event_id.map_or(true, |eid| o.event_id == eid))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as i64;
        let rows = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((rows, total))
    }

    async fn insert_order_ticket(&self, order_ticket: &OrderTicket) -> AppResult<()> {
        let mut t = self.tables.write().await;
        if t
            .order_tickets
            .iter()
            .any(|ot| ot.order_id == order_ticket.order_id && ot.ticket_id == order_ticket.ticket_id)
        {
            return Err(AppError::Conflict(format!(
                "ticket {} is already on order {}",
                order_ticket.ticket_id, order_ticket.order_id
            )));
        }
        t.order_tickets.push(order_ticket.clone());
        Ok(())
    }

    async fn order_tickets(&self, order_id: i64) -> AppResult<Vec<OrderTicket>> {
        let t = self.tables.read().await;
        let mut rows: Vec<OrderTicket> =
            t.order_tickets.iter().filter(|ot| ot.order_id == order_id).cloned().collect();
        rows.sort_by_key(|ot| ot.ticket_id);
        Ok(rows)
    }
}
