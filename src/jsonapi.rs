//! JSON:API documents as used by the HTTP layer.
//!
//! Incoming bodies are parsed into [`Document`] with a typed attribute struct
//! and a typed relationships struct per resource. Outgoing bodies are built
//! from [`Resource`] values and rendered by [`JsonApi`], which sets the
//! `application/vnd.api+json` media type.

use axum::extract::{FromRequest, Request};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult, ErrorSource};

pub const JSONAPI_CONTENT_TYPE: &str = "application/vnd.api+json";

/* ---------- incoming ---------- */

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default, R: Deserialize<'de> + Default"))]
pub struct Document<A, R = NoRelationships> {
    pub data: ResourceObject<A, R>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "A: Deserialize<'de> + Default, R: Deserialize<'de> + Default"))]
pub struct ResourceObject<A, R> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: A,
    #[serde(default)]
    pub relationships: R,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoRelationships {}

/// JSON request body whose rejections render as JSON:API errors.
pub struct JsonApiBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonApiBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::unprocessable(ErrorSource::pointer("/data"), rejection.body_text()))?;
        Ok(JsonApiBody(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_id")]
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(kind: &str, id: impl ToString) -> Self {
        ResourceIdentifier { kind: kind.to_string(), id: id.to_string() }
    }

    /// Numeric primary key of the referenced row.
    pub fn numeric_id(&self, relationship: &str) -> AppResult<i64> {
        self.id.parse::<i64>().map_err(|_| {
            AppError::unprocessable(
                ErrorSource::pointer(format!("/data/relationships/{relationship}/data/id")),
                format!("Invalid id '{}' for {relationship}", self.id),
            )
        })
    }
}

/// To-one relationship object. `data` is `None` for an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToOne {
    #[serde(default)]
    pub data: Option<ResourceIdentifier>,
}

/// To-many relationship object. An explicit `null` reads like an empty list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToMany {
    #[serde(default)]
    pub data: Option<Vec<ResourceIdentifier>>,
}

impl ToMany {
    pub fn numeric_ids(&self, relationship: &str) -> AppResult<Vec<i64>> {
        self.data.iter().flatten().map(|r| r.numeric_id(relationship)).collect()
    }
}

// Clients send ids as strings per the JSON:API rules, some send bare numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn string_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

/* ---------- outgoing ---------- */

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Option<ResourceIdentifier>),
    Many(Vec<ResourceIdentifier>),
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub related: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub links: RelationshipLinks,
    pub data: Linkage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resource<A> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub attributes: A,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<&'static str, Relationship>,
    pub links: ResourceLinks,
}

impl<A> Resource<A> {
    pub fn new(kind: &'static str, id: impl ToString, self_link: String, attributes: A) -> Self {
        Resource {
            kind,
            id: id.to_string(),
            attributes,
            relationships: BTreeMap::new(),
            links: ResourceLinks { self_link },
        }
    }

    pub fn relationship(mut self, name: &'static str, related: String, data: Linkage) -> Self {
        let self_link = format!("{}/relationships/{name}", self.links.self_link);
        self.relationships.insert(
            name,
            Relationship { links: RelationshipLinks { self_link, related }, data },
        );
        self
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentOut<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub jsonapi: serde_json::Value,
}

/// Response body with the JSON:API media type.
pub struct JsonApi<T>(pub StatusCode, pub T);

impl<T: Serialize> JsonApi<T> {
    pub fn ok(data: T) -> Self {
        JsonApi(StatusCode::OK, data)
    }

    pub fn created(data: T) -> Self {
        JsonApi(StatusCode::CREATED, data)
    }
}

impl<T: Serialize> IntoResponse for JsonApi<T> {
    fn into_response(self) -> Response {
        let body = DocumentOut {
            data: self.1,
            meta: None,
            jsonapi: serde_json::json!({ "version": "1.0" }),
        };
        (self.0, [(header::CONTENT_TYPE, JSONAPI_CONTENT_TYPE)], Json(body)).into_response()
    }
}

/// Collection body carrying a `meta.count`.
pub struct JsonApiList<T>(pub Vec<T>, pub i64);

impl<T: Serialize> IntoResponse for JsonApiList<T> {
    fn into_response(self) -> Response {
        let body = DocumentOut {
            data: self.0,
            meta: Some(serde_json::json!({ "count": self.1 })),
            jsonapi: serde_json::json!({ "version": "1.0" }),
        };
        (StatusCode::OK, [(header::CONTENT_TYPE, JSONAPI_CONTENT_TYPE)], Json(body)).into_response()
    }
}

/// `page[number]` / `page[size]` query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(rename = "page[number]")]
    pub number: Option<u32>,
    #[serde(rename = "page[size]")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl PageParams {
    pub fn page(&self) -> Page {
        let size = i64::from(self.size.unwrap_or(30).clamp(1, 100));
        let number = i64::from(self.number.unwrap_or(1).max(1));
        Page { limit: size, offset: (number - 1) * size }
    }
}
