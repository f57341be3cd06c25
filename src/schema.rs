//! Category taxonomy and per-subcategory attribute schemas.
//!
//! The backend is loose about how it names things: a subcategory may list its
//! attributes under `dynamicFields`, `fields` or `attributes`, and each record
//! may spell its key, label and type several ways. Everything past this module
//! only sees the strict [`FieldSchema`].

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Select { options: Vec<String> },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Select { .. } => "select",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub placeholder: Option<String>,
}

/// A value entered for a dynamic field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl AttributeValue {
    /// Whether a required field counts as filled. Booleans only need to exist.
    pub fn is_filled(&self) -> bool {
        match self {
            AttributeValue::Text(s) => !s.is_empty(),
            AttributeValue::Number(_) | AttributeValue::Bool(_) => true,
        }
    }
}

impl FieldSchema {
    /// Convert raw command-line input into a typed value for this field.
    pub fn parse_input(&self, raw: &str) -> Result<AttributeValue, String> {
        let raw = raw.trim();
        match &self.kind {
            FieldKind::Text => Ok(AttributeValue::Text(raw.to_string())),
            FieldKind::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(AttributeValue::Number)
                .ok_or_else(|| format!("{} must be a number", self.label)),
            FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(AttributeValue::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(AttributeValue::Bool(false)),
                _ => Err(format!("{} must be yes or no", self.label)),
            },
            FieldKind::Select { options } => {
                if options.iter().any(|o| o == raw) {
                    Ok(AttributeValue::Text(raw.to_string()))
                } else {
                    Err(format!(
                        "{} must be one of: {}",
                        self.label,
                        options.join(", ")
                    ))
                }
            }
        }
    }
}

fn first_str<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

fn id_of(v: &Value) -> Option<String> {
    ["_id", "id"].iter().find_map(|k| match v.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn option_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) => first_str(v, &["value", "label", "name"]).map(String::from),
        _ => None,
    }
}

/// Pick the attribute list off a subcategory record.
pub fn raw_fields(subcategory: &Value) -> &[Value] {
    ["dynamicFields", "fields", "attributes"]
        .iter()
        .find_map(|k| subcategory.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Normalize loosely-shaped field records. Records without a key get a
/// positional `field_<idx>` key.
pub fn normalize_fields(raw: &[Value]) -> Vec<FieldSchema> {
    raw.iter()
        .enumerate()
        .map(|(idx, f)| {
            let key = first_str(f, &["key", "name", "slug", "_id"])
                .map(String::from)
                .unwrap_or_else(|| format!("field_{}", idx));
            let label = first_str(f, &["label", "name", "title"])
                .map(String::from)
                .unwrap_or_else(|| format!("Field {}", idx + 1));
            let listed = f
                .get("options")
                .or_else(|| f.get("values"))
                .and_then(Value::as_array);
            let options: Vec<String> = listed
                .map(|opts| opts.iter().filter_map(option_text).collect())
                .unwrap_or_default();
            let kind = match first_str(f, &["inputType", "type"]) {
                Some(t) => match t.to_ascii_lowercase().as_str() {
                    "number" | "numeric" | "integer" => FieldKind::Number,
                    "boolean" | "bool" | "checkbox" | "switch" => FieldKind::Boolean,
                    "select" | "enum" | "dropdown" => FieldKind::Select { options },
                    _ => FieldKind::Text,
                },
                None if listed.is_some() => FieldKind::Select { options },
                None => FieldKind::Text,
            };
            let flag = |k: &str| f.get(k).and_then(Value::as_bool) == Some(true);
            FieldSchema {
                key,
                label,
                kind,
                required: flag("required") || flag("isRequired"),
                placeholder: first_str(f, &["placeholder"]).map(String::from),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub subcategories: Vec<Subcategory>,
}

impl Category {
    /// Build from one raw `/categories` record. Records without an id are skipped.
    pub fn from_value(v: &Value) -> Option<Self> {
        let id = id_of(v)?;
        let name = first_str(v, &["name", "title"]).unwrap_or(&id).to_string();
        let subcategories = v
            .get("subcategories")
            .and_then(Value::as_array)
            .map(|subs| {
                subs.iter()
                    .filter_map(|s| {
                        let id = id_of(s)?;
                        Some(Subcategory {
                            name: first_str(s, &["name", "title"]).unwrap_or(&id).to_string(),
                            fields: normalize_fields(raw_fields(s)),
                            id,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Category {
            id,
            name,
            subcategories,
        })
    }

    pub fn subcategory(&self, id: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.id == id)
    }
}

pub fn categories_from_data(data: &Value) -> Vec<Category> {
    data.as_array()
        .map(|cats| cats.iter().filter_map(Category::from_value).collect())
        .unwrap_or_default()
}
