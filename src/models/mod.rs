pub mod user;
pub mod event;
pub mod ticket;
pub mod ticket_holder;
pub mod discount_code;
pub mod order;

pub use user::{NewUser, User};
pub use event::{Event, EventRole, NewEvent};
pub use ticket::{NewTicket, Ticket, TicketFees};
pub use ticket_holder::{NewTicketHolder, TicketHolder};
pub use discount_code::{DiscountCode, DiscountKind, DiscountScope, NewDiscountCode};
pub use order::{NewOrder, Order, OrderStatus, OrderTicket};

use std::fmt;

/// Raised when a text column holds a value outside its enum.
#[derive(Debug)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}
