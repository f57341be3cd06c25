use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::schema::AttributeValue;

// -- Envelope --

/// `{success, data, message}` wrapper every endpoint answers with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub success: Option<bool>,
    pub data: Value,
    pub message: Option<String>,
    pub status: Option<u16>,
    pub error_code: Option<String>,
}

impl Envelope {
    /// Lenient decode: a body that is not a JSON object reads as `{}`.
    pub fn from_body(body: &[u8]) -> Self {
        let json: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let Value::Object(mut obj) = json else {
            return Self::default();
        };
        Self {
            success: obj.get("success").and_then(Value::as_bool),
            message: obj
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(String::from),
            status: obj
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            error_code: obj
                .get("errorCode")
                .or_else(|| obj.get("code"))
                .and_then(Value::as_str)
                .map(String::from),
            data: obj.remove("data").unwrap_or(Value::Null),
        }
    }

    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.data).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

// -- Record ids --

#[derive(Deserialize)]
struct RawId {
    #[serde(rename = "_id", default)]
    mongo: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

/// Reads a record id from `_id` or `id`, whichever is usable first.
/// Records may carry both keys.
fn record_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = RawId::deserialize(deserializer)?;
    [raw.mongo, raw.id]
        .into_iter()
        .flatten()
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| serde::de::Error::missing_field("_id"))
}

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(flatten, deserialize_with = "record_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenPair {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RegisterOutcome {
    Pending {
        #[serde(rename = "pendingId")]
        pending_id: String,
    },
    Registered(User),
}

// -- Shops --

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    #[serde(flatten, deserialize_with = "record_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub theme_color: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub product_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShop {
    pub name: String,
    pub address: String,
    pub description: String,
    pub theme_color: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubcategoryRef {
    #[serde(flatten, deserialize_with = "record_id")]
    pub id: String,
    pub name: String,
}

// -- Products --

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoryField {
    Named {
        #[serde(default)]
        name: String,
    },
    Id(String),
}

impl CategoryField {
    pub fn display(&self) -> &str {
        match self {
            CategoryField::Named { name } => name,
            CategoryField::Id(id) => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    #[serde(flatten, deserialize_with = "record_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryField>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    pub price: f64,
    pub stock: i64,
    pub description: String,
    /// Serialized as `category`, which is what the backend reads.
    #[serde(rename = "category")]
    pub category_id: String,
    pub subcategory_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub images: Vec<String>,
}

// -- Lists --

/// Query for owner-side lists (`/shops/me`, `/products/shop/:id`).
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
        }
    }
}

/// Query for the public catalog (`/shops/:id/products`).
#[derive(Debug, Clone, PartialEq)]
pub struct PublicQuery {
    pub page: u32,
    pub limit: u32,
    pub q: Option<String>,
    pub price_from: Option<f64>,
    pub price_to: Option<f64>,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
}

impl Default for PublicQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            q: None,
            price_from: None,
            price_to: None,
            category_id: None,
            subcategory_id: None,
        }
    }
}

/// The one list shape the rest of the crate sees.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl<T: serde::de::DeserializeOwned> Page<T> {
    /// Accepts `{items, total, ...}`, the same nested under `data`,
    /// `{data: [...]}` or a bare array. Anything else is a decode error.
    pub fn from_data(data: Value) -> Result<Self, ApiError> {
        let (items, meta) = match data {
            Value::Array(items) => (items, Value::Null),
            Value::Object(mut obj) => match obj.remove("items") {
                Some(Value::Array(items)) => (items, Value::Object(obj)),
                Some(other) => {
                    return Err(ApiError::Decode(format!("items is not a list: {}", other)))
                }
                None => match obj.remove("data") {
                    Some(inner @ (Value::Array(_) | Value::Object(_))) => {
                        let mut page = Self::from_data(inner)?;
                        if let Some(total) = obj.get("total").and_then(Value::as_u64) {
                            page.total = total;
                        }
                        return Ok(page);
                    }
                    _ => return Err(ApiError::Decode("expected a paginated list".into())),
                },
            },
            Value::Null => (Vec::new(), Value::Null),
            other => return Err(ApiError::Decode(format!("expected a paginated list, got {}", other))),
        };

        let items: Vec<T> = items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let len = items.len();
        let total = meta
            .get("total")
            .and_then(Value::as_u64)
            .unwrap_or(len as u64);
        let page = meta.get("page").and_then(Value::as_u64).unwrap_or(1) as u32;
        let page_size = meta
            .get("pageSize")
            .or_else(|| meta.get("limit"))
            .and_then(Value::as_u64)
            .unwrap_or(len as u64) as u32;
        let has_more = meta
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| (page as u64) * (page_size.max(1) as u64) < total);
        Ok(Page {
            items,
            total,
            page,
            page_size,
            has_more,
        })
    }
}
