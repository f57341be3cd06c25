//! Two-step product creation: pick a leaf subcategory, then fill the core
//! fields, the subcategory's dynamic attributes and the images.
//!
//! The attribute schema is a pure function of the chosen subcategory, so any
//! change of category or subcategory throws away attribute values and their
//! errors. All errors share one map; attribute errors are keyed
//! `attributes.<key>` so they never collide with core fields.

use std::collections::BTreeMap;

use crate::api::SahliClient;
use crate::error::ValidationIssue;
use crate::field_errors::FieldErrors;
use crate::images::{ImageFile, ImageSet, PreviewPool, Progress};
use crate::schema::{AttributeValue, Category, FieldKind, FieldSchema};
use crate::types::{NewProduct, Product};

pub const CATEGORY_REQUIRED: &str = "Category & subcategory are required";

const ATTRIBUTE_PREFIX: &str = "attributes.";
const CORE_KEYS: [&str; 6] = ["title", "price", "stock", "description", "images", "category"];

/// Error-map key for a dynamic attribute.
pub fn attribute_key(key: &str) -> String {
    format!("{}{}", ATTRIBUTE_PREFIX, key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Category,
    Details,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreField {
    Title,
    Price,
    Stock,
    Description,
}

impl CoreField {
    pub fn key(self) -> &'static str {
        match self {
            CoreField::Title => "title",
            CoreField::Price => "price",
            CoreField::Stock => "stock",
            CoreField::Description => "description",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreFields {
    pub title: String,
    pub price: String,
    pub stock: String,
    pub description: String,
}

/// Why a submit attempt did not produce a product. The details are also
/// left on the form (`errors`, `general_error`) for display.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitFailure {
    /// Client-side validation failed; nothing was sent.
    Invalid,
    /// An image upload failed; no product was created.
    Upload(String),
    /// The server rejected specific fields.
    Rejected,
    /// Any other create failure.
    General(String),
}

#[derive(Debug)]
pub struct ProductForm {
    categories: Vec<Category>,
    step: Step,
    category_id: Option<String>,
    subcategory_id: Option<String>,
    fields: Vec<FieldSchema>,
    attributes: BTreeMap<String, AttributeValue>,
    pub core: CoreFields,
    pub images: ImageSet,
    errors: FieldErrors,
    general_error: Option<String>,
    progress: Option<Progress>,
}

impl ProductForm {
    pub fn new(categories: Vec<Category>, pool: PreviewPool) -> Self {
        Self {
            categories,
            step: Step::Category,
            category_id: None,
            subcategory_id: None,
            fields: Vec::new(),
            attributes: BTreeMap::new(),
            core: CoreFields::default(),
            images: ImageSet::new(pool),
            errors: FieldErrors::new(),
            general_error: None,
            progress: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn current_category(&self) -> Option<&Category> {
        let id = self.category_id.as_deref()?;
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn attribute_error(&self, key: &str) -> Option<&str> {
        self.errors.get(&attribute_key(key))
    }

    pub fn has_attribute_errors(&self) -> bool {
        self.errors.iter().any(|(k, _)| k.starts_with(ATTRIBUTE_PREFIX))
    }

    pub fn general_error(&self) -> Option<&str> {
        self.general_error.as_deref()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    /// `"Clothing · Shirts"` once both levels are chosen.
    pub fn selection_label(&self) -> Option<String> {
        let cat = self.current_category()?;
        let sub = cat.subcategory(self.subcategory_id.as_deref()?)?;
        Some(format!("{} · {}", cat.name, sub.name))
    }

    fn reset_schema(&mut self) {
        self.fields.clear();
        self.attributes.clear();
        self.errors.clear_prefix(ATTRIBUTE_PREFIX);
    }

    /// Choosing a category always lands on step one with no subcategory.
    pub fn select_category(&mut self, id: &str) -> Result<(), String> {
        if !self.categories.iter().any(|c| c.id == id) {
            return Err(format!("Unknown category '{}'", id));
        }
        self.category_id = Some(id.to_string());
        self.subcategory_id = None;
        self.reset_schema();
        self.step = Step::Category;
        Ok(())
    }

    pub fn select_subcategory(&mut self, id: &str) -> Result<(), String> {
        let category = self
            .current_category()
            .ok_or_else(|| "Pick a category first".to_string())?;
        let fields = category
            .subcategory(id)
            .ok_or_else(|| format!("Unknown subcategory '{}' in {}", id, category.name))?
            .fields
            .clone();
        self.subcategory_id = Some(id.to_string());
        self.reset_schema();
        self.fields = fields;
        self.errors.clear_key("category");
        tracing::debug!(subcategory = id, fields = self.fields.len(), "resolved field schema");
        Ok(())
    }

    pub fn can_advance(&self) -> bool {
        self.category_id.is_some() && self.subcategory_id.is_some()
    }

    pub fn advance(&mut self) -> bool {
        if self.can_advance() {
            self.errors.clear_key("category");
            self.step = Step::Details;
            true
        } else {
            self.errors.set("category", CATEGORY_REQUIRED);
            false
        }
    }

    pub fn back(&mut self) {
        self.step = Step::Category;
    }

    pub fn set_core(&mut self, field: CoreField, value: impl Into<String>) {
        let value = value.into();
        match field {
            CoreField::Title => self.core.title = value,
            CoreField::Price => self.core.price = value,
            CoreField::Stock => self.core.stock = value,
            CoreField::Description => self.core.description = value,
        }
        self.errors.clear_key(field.key());
    }

    pub fn set_attribute(&mut self, key: &str, value: AttributeValue) -> Result<(), String> {
        if !self.fields.iter().any(|f| f.key == key) {
            return Err(format!("'{}' is not a field of this subcategory", key));
        }
        self.attributes.insert(key.to_string(), value);
        self.errors.clear_key(&attribute_key(key));
        Ok(())
    }

    /// Parse raw input with the field's own rules, then set it.
    pub fn set_attribute_input(&mut self, key: &str, raw: &str) -> Result<(), String> {
        let field = self
            .fields
            .iter()
            .find(|f| f.key == key)
            .ok_or_else(|| format!("'{}' is not a field of this subcategory", key))?;
        let value = field.parse_input(raw)?;
        self.set_attribute(key, value)
    }

    pub fn stage_images(&mut self, files: Vec<ImageFile>) -> usize {
        match self.images.stage(files) {
            Ok(n) => {
                if n > 0 {
                    self.errors.clear_key("images");
                }
                n
            }
            Err(msg) => {
                self.errors.set("images", msg);
                0
            }
        }
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageFile> {
        self.images.remove(index)
    }

    /// Unstage later copies of an already staged file; returns their names.
    pub fn drop_duplicate_images(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        let mut i = 1;
        while i < self.images.len() {
            let staged = self.images.images();
            let seen = staged[..i].iter().any(|s| s.file.bytes == staged[i].file.bytes);
            if !seen {
                i += 1;
                continue;
            }
            if let Some(file) = self.remove_image(i) {
                dropped.push(file.name);
            }
        }
        dropped
    }

    fn validate_attributes(&self, errs: &mut FieldErrors) {
        for f in self.fields.iter().filter(|f| f.required) {
            let filled = match (self.attributes.get(&f.key), &f.kind) {
                (None, _) => false,
                (Some(_), FieldKind::Boolean) => true,
                (Some(v), _) => v.is_filled(),
            };
            if !filled {
                errs.set(attribute_key(&f.key), format!("{} is required", f.label));
            }
        }
    }

    fn validate_core(&self, errs: &mut FieldErrors) {
        if self.core.title.trim().is_empty() {
            errs.set("title", "Product title is required");
        }
        if parse_price(&self.core.price).is_none() {
            errs.set("price", "Valid price is required");
        }
        if self.images.is_empty() {
            errs.set("images", "Please add at least one product image");
        }
    }

    /// Every violation at once, core fields and attributes in one map.
    pub fn validate(&self) -> FieldErrors {
        let mut errs = FieldErrors::new();
        self.validate_core(&mut errs);
        self.validate_attributes(&mut errs);
        errs
    }

    /// Server issues land on attribute keys when they name a schema field.
    fn server_errors(&self, issues: &[ValidationIssue]) -> FieldErrors {
        let mut errs = FieldErrors::new();
        for issue in issues {
            let (Some(field), Some(message)) = (&issue.field, &issue.message) else {
                continue;
            };
            let names_attribute =
                !CORE_KEYS.contains(&field.as_str()) && self.fields.iter().any(|f| &f.key == field);
            let key = if names_attribute { attribute_key(field) } else { field.clone() };
            errs.insert_first(key, message.as_str());
        }
        errs
    }

    /// Payload for the create call from the current values.
    pub fn payload(&self, image_paths: Vec<String>) -> Option<NewProduct> {
        Some(NewProduct {
            title: self.core.title.trim().to_string(),
            price: parse_price(&self.core.price)?,
            stock: parse_stock(&self.core.stock),
            description: self.core.description.trim().to_string(),
            category_id: self.category_id.clone()?,
            subcategory_id: self.subcategory_id.clone()?,
            attributes: self.attributes.clone(),
            images: image_paths,
        })
    }

    pub async fn submit(
        &mut self,
        client: &SahliClient,
        shop_id: &str,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<Product, SubmitFailure> {
        self.general_error = None;
        self.errors.clear();
        self.progress = None;

        if !self.can_advance() {
            self.errors.set("category", CATEGORY_REQUIRED);
            self.step = Step::Category;
            return Err(SubmitFailure::Invalid);
        }

        let errs = self.validate();
        if !errs.is_empty() {
            tracing::debug!(errors = errs.len(), "product form has validation errors");
            self.errors = errs;
            self.step = Step::Details;
            return Err(SubmitFailure::Invalid);
        }

        let mut last = None;
        let uploaded = self
            .images
            .upload_all(client, |p| {
                last = Some(p);
                on_progress(p);
            })
            .await;
        self.progress = last;
        let paths = match uploaded {
            Ok(paths) => paths,
            Err(e) => {
                let msg = non_empty(e.to_string()).unwrap_or_else(|| "Failed to upload images".into());
                tracing::debug!(error = %msg, "image upload failed, product not created");
                self.errors.set("images", msg.clone());
                return Err(SubmitFailure::Upload(msg));
            }
        };

        let Some(payload) = self.payload(paths) else {
            self.general_error = Some("Failed to create product".into());
            return Err(SubmitFailure::General("Failed to create product".into()));
        };

        match client.create_product(shop_id, &payload).await {
            Ok(product) => {
                self.images.clear();
                Ok(product)
            }
            Err(e) => match e.validation_issues() {
                Some(issues) => {
                    self.errors = self.server_errors(&issues);
                    Err(SubmitFailure::Rejected)
                }
                None => {
                    let msg = non_empty(e.to_string()).unwrap_or_else(|| "Failed to create product".into());
                    self.general_error = Some(msg.clone());
                    Err(SubmitFailure::General(msg))
                }
            },
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

/// Whole-string numeric parse after trimming; finite values only.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Integer stock; blank or unparsable input is 0.
pub fn parse_stock(raw: &str) -> i64 {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n.trunc() as i64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::categories_from_data;
    use crate::session::MemorySessionStore;
    use crate::transport::fake::ScriptedTransport;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn taxonomy() -> Vec<Category> {
        categories_from_data(&json!([
            {"_id": "c1", "name": "Clothing", "subcategories": [
                {"_id": "shirts", "name": "Shirts", "dynamicFields": [
                    {"key": "size", "label": "Size", "type": "select", "options": ["S", "M", "L"], "required": true},
                    {"key": "organic", "label": "Organic", "type": "boolean", "required": true},
                    {"key": "fit", "label": "Fit"}
                ]},
                {"_id": "shoes", "name": "Shoes", "fields": [
                    {"name": "eu_size", "label": "EU size", "type": "number", "required": true}
                ]}
            ]},
            {"_id": "c2", "name": "Home", "subcategories": [
                {"_id": "mugs", "name": "Mugs"}
            ]}
        ]))
    }

    fn image(name: &str) -> ImageFile {
        ImageFile::from_bytes(Path::new(name), vec![0xFF, 0xD8])
    }

    fn filled_form() -> ProductForm {
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        form.select_category("c1").unwrap();
        form.select_subcategory("shirts").unwrap();
        assert!(form.advance());
        form.set_core(CoreField::Title, "  Linen shirt ");
        form.set_core(CoreField::Price, "29.5");
        form.set_core(CoreField::Description, " Breathable ");
        form.set_attribute_input("size", "M").unwrap();
        form.set_attribute("organic", AttributeValue::Bool(false)).unwrap();
        form
    }

    fn client(transport: &Arc<ScriptedTransport>) -> SahliClient {
        SahliClient::new(transport.clone(), Arc::new(MemorySessionStore::with_pair("a", "r")))
    }

    #[test]
    fn advance_requires_both_ids() {
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        assert!(!form.advance());
        assert_eq!(form.errors().get("category"), Some(CATEGORY_REQUIRED));
        assert_eq!(form.step(), Step::Category);

        form.select_category("c1").unwrap();
        assert!(!form.advance());

        form.select_subcategory("shirts").unwrap();
        assert!(form.errors().get("category").is_none());
        assert!(form.advance());
        assert_eq!(form.step(), Step::Details);
        assert_eq!(form.selection_label().as_deref(), Some("Clothing · Shirts"));
    }

    #[test]
    fn switching_subcategory_drops_previous_schema_state() {
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        form.select_category("c1").unwrap();
        form.select_subcategory("shirts").unwrap();
        form.set_attribute_input("size", "L").unwrap();
        form.advance();
        assert!(form.validate().contains("attributes.organic"));

        form.select_subcategory("shoes").unwrap();
        assert!(form.attributes().is_empty());
        assert!(!form.has_attribute_errors());
        let keys: Vec<_> = form.fields().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["eu_size"]);
        assert!(form.set_attribute_input("size", "L").is_err());
    }

    #[tokio::test]
    async fn attribute_errors_do_not_survive_a_subcategory_change() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        form.select_category("c1").unwrap();
        form.select_subcategory("shirts").unwrap();
        form.set_core(CoreField::Title, "Linen shirt");
        form.set_core(CoreField::Price, "29.5");
        form.stage_images(vec![image("1.jpg")]);
        form.set_attribute("organic", AttributeValue::Bool(true)).unwrap();

        let result = form.submit(&client(&transport), "shop-1", |_| {}).await;
        assert_eq!(result.unwrap_err(), SubmitFailure::Invalid);
        assert_eq!(form.attribute_error("size"), Some("Size is required"));

        form.select_subcategory("shoes").unwrap();
        assert!(form.attribute_error("size").is_none());
        assert!(!form.has_attribute_errors());
        assert!(form.attributes().is_empty());
        assert_eq!(form.errors().get("title"), None);
    }

    #[tokio::test]
    async fn server_attribute_errors_do_not_survive_a_subcategory_change() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "data": {"path": "/uploads/1.jpg"}}));
        transport.reply(
            422,
            json!({"success": false, "message": "Validation failed", "data": [
                {"field": "size", "message": "Size S is sold out"},
                {"field": "attributes.fit", "message": "Unknown fit"},
                {"field": "price", "message": "Too expensive"}
            ]}),
        );
        let mut form = filled_form();
        form.stage_images(vec![image("1.jpg")]);

        let result = form.submit(&client(&transport), "shop-1", |_| {}).await;
        assert_eq!(result.unwrap_err(), SubmitFailure::Rejected);
        assert_eq!(form.attribute_error("size"), Some("Size S is sold out"));
        assert_eq!(form.attribute_error("fit"), Some("Unknown fit"));
        assert!(form.errors().get("size").is_none());

        form.select_subcategory("shoes").unwrap();
        assert!(form.attribute_error("size").is_none());
        assert!(form.attribute_error("fit").is_none());
        assert!(!form.has_attribute_errors());
        assert!(form.attributes().is_empty());
        assert_eq!(form.errors().get("price"), Some("Too expensive"));
    }

    #[test]
    fn editing_an_attribute_clears_its_error() {
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        form.select_category("c1").unwrap();
        form.select_subcategory("shirts").unwrap();
        form.errors = form.validate();
        assert!(form.attribute_error("size").is_some());
        form.set_attribute_input("size", "S").unwrap();
        assert!(form.attribute_error("size").is_none());
        assert!(form.attribute_error("organic").is_some());
    }

    #[test]
    fn attribute_named_like_a_core_field_keeps_both_errors() {
        let mut form = ProductForm::new(
            categories_from_data(&json!([
                {"_id": "c1", "name": "Books", "subcategories": [
                    {"_id": "novels", "name": "Novels", "dynamicFields": [
                        {"key": "title", "label": "Original title", "type": "text", "required": true}
                    ]}
                ]}
            ])),
            PreviewPool::new(),
        );
        form.select_category("c1").unwrap();
        form.select_subcategory("novels").unwrap();
        let errs = form.validate();
        assert_eq!(errs.get("title"), Some("Product title is required"));
        assert_eq!(errs.get("attributes.title"), Some("Original title is required"));
    }

    #[test]
    fn changing_category_returns_to_step_one_and_clears() {
        let mut form = filled_form();
        form.select_category("c2").unwrap();
        assert_eq!(form.step(), Step::Category);
        assert!(form.fields().is_empty());
        assert!(form.attributes().is_empty());
        assert!(!form.can_advance());
        // Core fields survive a category change.
        assert_eq!(form.core.price, "29.5");
    }

    #[test]
    fn back_keeps_state() {
        let mut form = filled_form();
        form.back();
        assert_eq!(form.step(), Step::Category);
        assert_eq!(form.attributes().len(), 2);
        assert!(form.advance());
    }

    #[test]
    fn boolean_false_satisfies_required() {
        let mut form = filled_form();
        form.stage_images(vec![image("a.jpg")]);
        assert!(form.validate().is_empty());
    }

    #[test]
    fn empty_text_fails_required() {
        let mut form = filled_form();
        form.set_attribute("size", AttributeValue::Text(String::new())).unwrap();
        assert_eq!(form.validate().get("attributes.size"), Some("Size is required"));
    }

    #[test]
    fn price_and_stock_parsing() {
        assert_eq!(parse_price("12.50"), Some(12.5));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("abc"), None);
        assert_eq!(parse_price("inf"), None);
        assert_eq!(parse_stock(""), 0);
        assert_eq!(parse_stock("7"), 7);
        assert_eq!(parse_stock("7.9"), 7);
        assert_eq!(parse_stock("lots"), 0);
    }

    #[test]
    fn rejected_image_batch_sets_images_error() {
        let mut form = filled_form();
        assert_eq!(form.stage_images(vec![image("a.jpg"), image("b.bmp")]), 0);
        assert_eq!(
            form.errors().get("images"),
            Some(crate::images::INVALID_TYPE_MESSAGE)
        );
        assert_eq!(form.stage_images(vec![image("a.jpg")]), 1);
        assert!(form.errors().get("images").is_none());
    }

    #[test]
    fn duplicate_images_are_unstaged() {
        let pool = PreviewPool::new();
        let mut form = ProductForm::new(taxonomy(), pool.clone());
        form.stage_images(vec![
            ImageFile::from_bytes(Path::new("a.jpg"), vec![1]),
            ImageFile::from_bytes(Path::new("b.jpg"), vec![2]),
            ImageFile::from_bytes(Path::new("a-copy.jpg"), vec![1]),
            ImageFile::from_bytes(Path::new("b.jpg"), vec![2]),
        ]);
        assert_eq!(form.drop_duplicate_images(), vec!["a-copy.jpg", "b.jpg"]);
        let names: Vec<_> = form.images.images().iter().map(|s| s.file.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg"]);
        assert_eq!(pool.live(), 2);
        assert!(form.remove_image(5).is_none());
    }

    #[tokio::test]
    async fn all_errors_reported_at_once_without_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        form.select_category("c1").unwrap();
        form.select_subcategory("shirts").unwrap();
        form.set_core(CoreField::Price, "10");
        form.stage_images(vec![image("a.png")]);
        form.back();

        let result = form.submit(&client(&transport), "shop-1", |_| {}).await;
        assert_eq!(result.unwrap_err(), SubmitFailure::Invalid);
        assert_eq!(form.errors().get("title"), Some("Product title is required"));
        assert_eq!(form.attribute_error("size"), Some("Size is required"));
        assert_eq!(form.attribute_error("organic"), Some("Organic is required"));
        assert!(form.attribute_error("fit").is_none());
        assert_eq!(form.step(), Step::Details);
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn missing_subcategory_goes_back_to_step_one() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut form = ProductForm::new(taxonomy(), PreviewPool::new());
        form.select_category("c1").unwrap();
        let result = form.submit(&client(&transport), "shop-1", |_| {}).await;
        assert_eq!(result.unwrap_err(), SubmitFailure::Invalid);
        assert_eq!(form.errors().get("category"), Some(CATEGORY_REQUIRED));
        assert_eq!(form.step(), Step::Category);
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn failed_second_upload_blocks_creation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "data": {"path": "/uploads/1.jpg"}}));
        transport.reply(413, json!({"success": false, "message": "File too large"}));
        let mut form = filled_form();
        form.stage_images(vec![image("1.jpg"), image("2.jpg"), image("3.jpg")]);

        let mut progress = Vec::new();
        let result = form
            .submit(&client(&transport), "shop-1", |p| progress.push(p.completed))
            .await;
        assert_eq!(result.unwrap_err(), SubmitFailure::Upload("File too large".into()));
        assert_eq!(form.errors().get("images"), Some("File too large"));
        assert!(form.general_error().is_none());
        assert_eq!(progress, vec![1]);
        assert_eq!(transport.paths(), vec!["/uploads", "/uploads"]);
    }

    #[tokio::test]
    async fn successful_submit_sends_normalized_payload() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "data": {"path": "/uploads/1.jpg"}}));
        transport.reply(200, json!({"success": true, "data": {"path": "/uploads/2.png"}}));
        transport.reply(200, json!({"success": true, "data": {"_id": "p1", "title": "Linen shirt", "price": 29.5}}));
        let pool = PreviewPool::new();
        let mut form = ProductForm::new(taxonomy(), pool.clone());
        form.select_category("c1").unwrap();
        form.select_subcategory("shirts").unwrap();
        form.advance();
        form.set_core(CoreField::Title, "  Linen shirt ");
        form.set_core(CoreField::Price, "29.5");
        form.set_attribute_input("size", "M").unwrap();
        form.set_attribute_input("organic", "yes").unwrap();
        form.stage_images(vec![image("1.jpg"), image("2.png")]);

        let product = form.submit(&client(&transport), "shop-1", |_| {}).await.unwrap();
        assert_eq!(product.id, "p1");
        assert_eq!(form.progress(), Some(Progress { completed: 2, total: 2 }));
        assert_eq!(pool.live(), 0);

        let crate::transport::RequestBody::Json(body) = &transport.requests()[2].body else {
            panic!("expected JSON body");
        };
        assert_eq!(
            body,
            &json!({
                "title": "Linen shirt",
                "price": 29.5,
                "stock": 0,
                "description": "",
                "category": "c1",
                "subcategoryId": "shirts",
                "attributes": {"organic": true, "size": "M"},
                "images": ["/uploads/1.jpg", "/uploads/2.png"],
                "shop": "shop-1"
            })
        );
    }

    #[tokio::test]
    async fn server_validation_maps_to_field_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "data": {"path": "/uploads/1.jpg"}}));
        transport.reply(
            422,
            json!({"success": false, "message": "Validation failed", "data": [
                {"field": "title", "message": "Title already used"},
                {"path": "title", "msg": "Second complaint"},
                {"path": "price", "msg": "Too expensive"}
            ]}),
        );
        let mut form = filled_form();
        form.stage_images(vec![image("1.jpg")]);

        let result = form.submit(&client(&transport), "shop-1", |_| {}).await;
        assert_eq!(result.unwrap_err(), SubmitFailure::Rejected);
        assert_eq!(form.errors().get("title"), Some("Title already used"));
        assert_eq!(form.errors().get("price"), Some("Too expensive"));
        assert!(form.general_error().is_none());
    }

    #[tokio::test]
    async fn other_create_failure_is_general() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "data": {"path": "/uploads/1.jpg"}}));
        transport.reply(500, json!({"success": false, "message": "Database unavailable"}));
        let mut form = filled_form();
        form.stage_images(vec![image("1.jpg")]);

        let result = form.submit(&client(&transport), "shop-1", |_| {}).await;
        assert_eq!(result.unwrap_err(), SubmitFailure::General("Database unavailable".into()));
        assert_eq!(form.general_error(), Some("Database unavailable"));
        assert!(form.errors().is_empty());
    }
}
