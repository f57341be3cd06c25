use crate::api::SahliClient;
use crate::field_errors::{classify_message, FieldErrors};
use crate::images::{is_allowed_mime, ImageFile, PreviewPool, StagedImage, INVALID_TYPE_MESSAGE};
use crate::product_form::SubmitFailure;
use crate::types::{NewShop, Shop};

pub const DEFAULT_THEME_COLOR: &str = "#8CCDAD";
pub const MAX_LOGO_BYTES: usize = 5 * 1024 * 1024;
pub const LOGO_TOO_LARGE: &str = "Image must be less than 5MB";

const MESSAGE_RULES: &[(&str, &[&str])] = &[
    ("name", &["name"]),
    ("address", &["address", "location"]),
    ("image", &["image", "logo"]),
];

#[derive(Debug)]
pub struct ShopDraft {
    pub name: String,
    pub address: String,
    pub description: String,
    pub theme_color: String,
    logo: Option<StagedImage>,
    pool: PreviewPool,
    errors: FieldErrors,
    general_error: Option<String>,
}

impl ShopDraft {
    pub fn new(pool: PreviewPool) -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            description: String::new(),
            theme_color: DEFAULT_THEME_COLOR.to_string(),
            logo: None,
            pool,
            errors: FieldErrors::new(),
            general_error: None,
        }
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn general_error(&self) -> Option<&str> {
        self.general_error.as_deref()
    }

    pub fn logo(&self) -> Option<&StagedImage> {
        self.logo.as_ref()
    }

    /// Replaces any previous logo. A rejected file leaves the old one in place.
    pub fn set_logo(&mut self, file: ImageFile) -> Result<(), String> {
        let problem = if !is_allowed_mime(&file.mime) {
            Some(INVALID_TYPE_MESSAGE)
        } else if file.size() > MAX_LOGO_BYTES {
            Some(LOGO_TOO_LARGE)
        } else {
            None
        };
        if let Some(msg) = problem {
            self.errors.set("image", msg);
            return Err(msg.to_string());
        }
        self.errors.clear_key("image");
        self.logo = Some(StagedImage {
            file,
            preview: self.pool.issue(),
        });
        Ok(())
    }

    pub fn payload(&self, image: Option<String>) -> NewShop {
        let color = self.theme_color.trim();
        NewShop {
            name: self.name.trim().to_string(),
            address: self.address.trim().to_string(),
            description: self.description.trim().to_string(),
            theme_color: if color.is_empty() {
                DEFAULT_THEME_COLOR.to_string()
            } else {
                color.to_string()
            },
            image,
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errs = FieldErrors::new();
        if self.name.trim().is_empty() {
            errs.set("name", "Shop name is required");
        }
        if self.address.trim().is_empty() {
            errs.set("address", "Address is required");
        }
        errs
    }

    /// Upload the logo (if any), then create the shop. On failure the
    /// reason is left in `errors` or `general_error`.
    pub async fn submit(&mut self, client: &SahliClient) -> Result<Shop, SubmitFailure> {
        self.general_error = None;
        self.errors = self.validate();
        if !self.errors.is_empty() {
            return Err(SubmitFailure::Invalid);
        }

        let image = match &self.logo {
            None => None,
            Some(logo) => match client.upload_file(logo.to_multipart()).await {
                Ok(path) => Some(path),
                Err(e) => {
                    let mut msg = e.to_string();
                    if msg.trim().is_empty() {
                        msg = "Failed to upload image".to_string();
                    }
                    tracing::debug!(error = %msg, "logo upload failed");
                    self.errors.set("image", msg.clone());
                    return Err(SubmitFailure::Upload(msg));
                }
            },
        };

        let payload = self.payload(image);
        match client.create_shop(&payload).await {
            Ok(shop) => {
                tracing::info!(shop = %shop.id, name = %shop.name, "created shop");
                self.logo = None;
                Ok(shop)
            }
            Err(e) => {
                if let Some(issues) = e.validation_issues() {
                    self.errors = FieldErrors::from_issues(&issues);
                    if !self.errors.is_empty() {
                        return Err(SubmitFailure::Rejected);
                    }
                }
                let mut msg = e.to_string();
                if let Some(field) = classify_message(&msg, MESSAGE_RULES) {
                    self.errors.set(field, msg);
                    return Err(SubmitFailure::Rejected);
                }
                if msg.trim().is_empty() {
                    msg = "Failed to create shop".to_string();
                }
                self.general_error = Some(msg.clone());
                Err(SubmitFailure::General(msg))
            }
        }
    }
}
