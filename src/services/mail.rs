use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Event, Order, TicketHolder};

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Sends every attendee of `order` a link to their ticket.
    async fn send_email_to_attendees(
        &self,
        order: &Order,
        event: &Event,
        holders: &[TicketHolder],
    ) -> AppResult<()>;
}

pub fn attendee_subject(event: &Event) -> String {
    format!("Your ticket for {}", event.name)
}

pub fn attendee_body(order: &Order, event: &Event, holder: &TicketHolder) -> String {
    let link = holder.pdf_url.as_deref().unwrap_or("(not available yet)");
    format!(
        "Hi {},\n\n\
         you are registered for {} starting {}.\n\
         Order: {}\n\
         Ticket: {}\n\n\
         Please bring the ticket with you to the event.\n",
        holder.full_name(),
        event.name,
        event.starts_at.format("%Y-%m-%d %H:%M"),
        order.identifier,
        link,
    )
}

/// SMTP delivery through lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig, host: &str) -> AppResult<Self> {
        let mut builder = SmtpTransport::relay(host)
            .map_err(|e| AppError::Mail(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port);
        if let (Some(user), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: format!("{} <{}>", config.from_name, config.from_email),
        })
    }

    fn message(&self, order: &Order, event: &Event, holder: &TicketHolder) -> AppResult<Message> {
        Message::builder()
            .from(self.from.parse().map_err(|e| AppError::Mail(format!("invalid from address: {e}")))?)
            .to(holder
                .email
                .parse()
                .map_err(|e| AppError::Mail(format!("invalid attendee address {}: {e}", holder.email)))?)
            .subject(attendee_subject(event))
            .header(ContentType::TEXT_PLAIN)
            .body(attendee_body(order, event, holder))
            .map_err(|e| AppError::Mail(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email_to_attendees(
        &self,
        order: &Order,
        event: &Event,
        holders: &[TicketHolder],
    ) -> AppResult<()> {
        let messages = holders
            .iter()
            .map(|holder| self.message(order, event, holder))
            .collect::<AppResult<Vec<_>>>()?;
        let count = messages.len();

        // SmtpTransport is blocking
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            messages
                .iter()
                .try_for_each(|message| transport.send(message).map(|_| ()))
                .map_err(|e| AppError::Mail(format!("failed to send email: {e}")))
        })
        .await
        .map_err(|e| AppError::Mail(format!("email task failed: {e}")))??;

        info!(order = %order.identifier, count, "attendee emails sent");
        Ok(())
    }
}

/// Writes the mail to the log instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email_to_attendees(
        &self,
        order: &Order,
        event: &Event,
        holders: &[TicketHolder],
    ) -> AppResult<()> {
        for holder in holders {
            info!(
                to = %holder.email,
                subject = %attendee_subject(event),
                order = %order.identifier,
                pdf = holder.pdf_url.as_deref().unwrap_or(""),
                "attendee email (not sent, SMTP disabled)"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::OrderStatus;
    use chrono::NaiveDate;

    fn fixtures() -> (Order, Event, TicketHolder) {
        let t = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap().and_hms_opt(18, 30, 0).unwrap();
        let order = Order {
            id: 1,
            identifier: "a1b2".into(),
            event_id: 1,
            user_id: None,
            discount_code_id: None,
            status: OrderStatus::Pending,
            amount: None,
            quantity: 1,
            payment_mode: None,
            paid_via: None,
            transaction_id: None,
            created_at: t,
            completed_at: None,
        };
        let event = Event {
            id: 1,
            name: "RustConf".into(),
            payment_currency: "USD".into(),
            starts_at: t,
            ends_at: t,
            created_at: t,
        };
        let holder = TicketHolder {
            id: 3,
            firstname: "Grace".into(),
            lastname: "Hopper".into(),
            email: "grace@example.com".into(),
            ticket_id: 1,
            order_id: Some(1),
            pdf_url: Some("/static/media/tickets/abc.pdf".into()),
        };
        (order, event, holder)
    }

    #[test]
    fn body_links_the_ticket_pdf() {
        let (order, event, holder) = fixtures();
        let body = attendee_body(&order, &event, &holder);
        assert!(body.starts_with("Hi Grace Hopper,"));
        assert!(body.contains("RustConf starting 2026-05-02 18:30"));
        assert!(body.contains("/static/media/tickets/abc.pdf"));
        assert_eq!(attendee_subject(&event), "Your ticket for RustConf");
    }

    #[test]
    fn smtp_message_is_addressed_to_the_attendee() {
        let (order, event, holder) = fixtures();
        let config = Config::for_tests().mail;
        let mailer = SmtpMailer::new(&config, "localhost").unwrap();
        let raw = String::from_utf8(mailer.message(&order, &event, &holder).unwrap().formatted()).unwrap();
        assert!(raw.contains("To: grace@example.com"));
        assert!(raw.contains("Subject: Your ticket for RustConf"));
    }

    #[test]
    fn invalid_attendee_address_is_a_mail_error() {
        let (order, event, mut holder) = fixtures();
        holder.email = "not an address".into();
        let mailer = SmtpMailer::new(&Config::for_tests().mail, "localhost").unwrap();
        assert!(matches!(mailer.message(&order, &event, &holder), Err(AppError::Mail(_))));
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let (order, event, holder) = fixtures();
        LogMailer.send_email_to_attendees(&order, &event, &[holder]).await.unwrap();
    }
}
