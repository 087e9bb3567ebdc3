//! Attendee ticket documents.
//!
//! Tickets are rendered to a handful of text lines and laid out on a single
//! A4 page using the built-in Helvetica font, so no font files or external
//! renderer are needed.

use async_trait::async_trait;

use super::storage::LocalStorage;
use crate::error::AppResult;
use crate::models::{Event, Order, Ticket, TicketHolder};

/// Everything printed on one attendee's ticket.
#[derive(Debug, Clone, Copy)]
pub struct AttendeeTicket<'a> {
    pub order: &'a Order,
    pub event: &'a Event,
    pub holder: &'a TicketHolder,
    pub ticket: Option<&'a Ticket>,
}

#[async_trait]
pub trait TicketDocuments: Send + Sync + 'static {
    /// Renders and stores the attendee's ticket, returning its URL.
    async fn create_ticket_pdf(&self, ticket: AttendeeTicket<'_>) -> AppResult<String>;
}

pub struct PdfTicketWriter {
    storage: LocalStorage,
}

impl PdfTicketWriter {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl TicketDocuments for PdfTicketWriter {
    async fn create_ticket_pdf(&self, ticket: AttendeeTicket<'_>) -> AppResult<String> {
        let bytes = render_pdf(&ticket_lines(&ticket));
        self.storage.save("tickets", "pdf", &bytes).await
    }
}

/// Text of the attendee ticket, title first.
pub fn ticket_lines(t: &AttendeeTicket<'_>) -> Vec<String> {
    let mut lines = vec![
        t.event.name.clone(),
        format!("Starts: {}", t.event.starts_at.format("%Y-%m-%d %H:%M")),
        format!("Ends: {}", t.event.ends_at.format("%Y-%m-%d %H:%M")),
        String::new(),
        format!("Attendee: {}", t.holder.full_name()),
        format!("Email: {}", t.holder.email),
    ];
    if let Some(ticket) = t.ticket {
        lines.push(format!("Ticket: {}", ticket.name));
        lines.push(format!("Price: {} {}", ticket.price, t.event.payment_currency));
    }
    lines.push(String::new());
    lines.push(format!("Order: {}", t.order.identifier));
    lines.push(format!("Attendee #{}", t.holder.id));
    lines
}

// PDF string literal escaping; anything outside printable ASCII becomes '?'
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Single-page PDF 1.4 document showing `lines`.
pub fn render_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 18 Tf\n50 790 Td\n22 TL\n");
    for (i, line) in lines.iter().enumerate() {
        if i == 1 {
            content.push_str("/F1 12 Tf\n16 TL\n");
        }
        content.push_str(&format!("({}) Tj T*\n", escape_text(line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.into_bytes()
}
