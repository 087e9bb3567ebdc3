pub mod attendees;
pub mod auth;
pub mod charges;
pub mod discount_codes;
pub mod events;
pub mod orders;
pub mod tickets;

use axum::Router;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult, ErrorSource};
use crate::jsonapi::ToOne;

/// Prefix for `links.self` values; routes are nested under it in `app()`.
pub const API_PREFIX: &str = "/v1";

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(events::routes())
        .merge(tickets::routes())
        .merge(attendees::routes())
        .merge(discount_codes::routes())
        .merge(orders::routes())
        .merge(charges::routes())
}

/* ---------- helpers ---------- */

/// Runs `validator` rules; the first failing field becomes a 422.
pub(crate) fn validate_attributes<T: Validate>(attributes: &T) -> AppResult<()> {
    attributes.validate().map_err(|errors| {
        let (field, detail) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid value for {field}"));
                (field.to_string(), message)
            })
            .unwrap_or_else(|| (String::new(), "Invalid attributes".to_string()));
        AppError::unprocessable(
            ErrorSource::pointer(format!("/data/attributes/{}", field.replace('_', "-"))),
            detail,
        )
    })
}

/// Id behind a to-one relationship that must be present.
pub(crate) fn required_one(relationship: Option<ToOne>, name: &'static str) -> AppResult<i64> {
    relationship
        .and_then(|r| r.data)
        .ok_or(AppError::MissingRelationship(name))?
        .numeric_id(name)
}

pub(crate) fn optional_one(relationship: Option<ToOne>, name: &str) -> AppResult<Option<i64>> {
    relationship
        .and_then(|r| r.data)
        .map(|r| r.numeric_id(name))
        .transpose()
}

pub(crate) fn self_link(collection: &str, id: impl std::fmt::Display) -> String {
    format!("{API_PREFIX}/{collection}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonapi::ResourceIdentifier;

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "Invalid email address"))]
        email: String,
    }

    #[test]
    fn validation_failure_points_at_the_dasherized_attribute() {
        let err = validate_attributes(&Signup { email: "nope".into() }).unwrap_err();
        assert_eq!(err.to_string(), "Invalid email address");
        assert_eq!(err.source(), Some(ErrorSource::pointer("/data/attributes/email")));
    }

    #[test]
    fn required_relationship_rejects_null_linkage() {
        let err = required_one(Some(ToOne { data: None }), "event").unwrap_err();
        assert!(matches!(err, AppError::MissingRelationship("event")));

        let id = required_one(Some(ToOne { data: Some(ResourceIdentifier::new("event", 4)) }), "event");
        assert_eq!(id.unwrap(), 4);
    }
}
