use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ApiError, HttpError};
use crate::schema::{self, Category};
use crate::session::SessionStore;
use crate::transport::{ApiRequest, MultipartFile, Transport};
use crate::types::*;
use crate::utils::urlencoded;

const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";

pub struct SahliClient {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionStore>,
    // Held for the duration of a refresh so concurrent 401s share one call.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl SahliClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<dyn SessionStore>) -> Self {
        Self {
            transport,
            session,
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    /// One round trip. Fails on a non-2xx status or a `success: false`
    /// envelope; otherwise returns the envelope untouched.
    pub async fn request(&self, req: ApiRequest) -> Result<Envelope, ApiError> {
        tracing::debug!(method = %req.method, path = %req.path, auth = req.token.is_some(), "request");
        let raw = self.transport.send(req).await?;
        let env = Envelope::from_body(&raw.body);

        let rejected = env.success == Some(false);
        if raw.is_success() && !rejected {
            return Ok(env);
        }

        let status = if env.error_code.as_deref() == Some(TOKEN_EXPIRED) {
            401
        } else if rejected {
            env.status
                .or_else(|| (!raw.is_success()).then_some(raw.status))
                .unwrap_or(400)
        } else {
            raw.status
        };
        let message = env
            .message
            .clone()
            .unwrap_or_else(|| format!("HTTP {}", status));
        let data = (!env.data.is_null()).then_some(env.data);
        Err(HttpError {
            status,
            message,
            data,
        }
        .into())
    }

    /// `request` with the stored access token, refreshing and retrying once
    /// on 401/403. When the refresh cannot produce a token, the original
    /// auth error is returned.
    pub async fn secure_request(&self, req: ApiRequest) -> Result<Envelope, ApiError> {
        let Some(token) = self.session.access() else {
            return Err(HttpError::unauthenticated().into());
        };

        let err = match self.request(req.clone().with_token(Some(token.clone()))).await {
            Ok(env) => return Ok(env),
            Err(e) if e.is_auth() => e,
            Err(e) => return Err(e),
        };

        let fresh = match self.refresh_access(&token).await {
            Ok(Some(access)) => access,
            Ok(None) => return Err(err),
            Err(refresh_err) => {
                tracing::debug!(error = %refresh_err, "refresh failed, surfacing original error");
                return Err(err);
            }
        };
        self.request(req.with_token(Some(fresh))).await
    }

    /// Exchange the refresh token for a new access token. `stale` is the
    /// access token the caller was rejected with; if another caller has
    /// already replaced it, that token is reused without a network call.
    pub async fn refresh_access(&self, stale: &str) -> Result<Option<String>, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.session.access() {
            if current != stale {
                return Ok(Some(current));
            }
        }

        match self.refresh_tokens().await? {
            Some(pair) => Ok(pair.access.filter(|a| !a.is_empty())),
            None => Ok(None),
        }
    }

    /// The raw refresh flow: `None` when there is no refresh token. Any
    /// failure clears the session before propagating.
    pub async fn refresh_tokens(&self) -> Result<Option<TokenPair>, ApiError> {
        let Some(refresh) = self.session.refresh() else {
            return Ok(None);
        };

        let result = async {
            let env = self
                .request(ApiRequest::post("/auth/refresh", json!({ "refresh": refresh })))
                .await?;
            env.decode::<TokenPair>()
        }
        .await;

        match result {
            Ok(pair) => {
                self.session
                    .set_pair(pair.access.as_deref(), pair.refresh.as_deref())?;
                tracing::info!(rotated = pair.refresh.is_some(), "access token refreshed");
                Ok(Some(pair))
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, clearing session");
                if let Err(clear_err) = self.session.clear() {
                    tracing::warn!(error = %clear_err, "failed to clear session");
                }
                Err(e)
            }
        }
    }

    // -- Auth --

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let env = self
            .request(ApiRequest::post(
                "/auth/login",
                json!({ "email": email, "password": password }),
            ))
            .await?;
        let login: LoginResponse = env.decode()?;
        self.session
            .set_pair(login.access.as_deref(), login.refresh.as_deref())?;
        Ok(login)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<RegisterOutcome, ApiError> {
        self.request(ApiRequest::post(
            "/auth/register",
            json!({ "name": name, "email": email, "password": password }),
        ))
        .await?
        .decode()
    }

    pub async fn verify_signup(&self, pending_id: &str, code: &str) -> Result<Value, ApiError> {
        let env = self
            .request(ApiRequest::post(
                "/auth/verify-code",
                json!({ "pendingId": pending_id, "code": code }),
            ))
            .await?;
        Ok(env.data)
    }

    /// Current user, or `None` when the session is missing or unrecoverable.
    pub async fn me(&self) -> Result<Option<User>, ApiError> {
        match self.secure_request(ApiRequest::get("/auth/me")).await {
            Ok(env) if env.data.is_null() => Ok(None),
            Ok(env) => env.decode().map(Some),
            Err(e) if e.is_auth() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.clear()
    }

    // -- Categories --

    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        let env = self.request(ApiRequest::get("/categories")).await?;
        Ok(schema::categories_from_data(&env.data))
    }

    // -- Shops --

    pub async fn my_shops(&self, params: &ListParams) -> Result<Page<Shop>, ApiError> {
        let path = format!("/shops/me?{}", list_query(params));
        let env = self.secure_request(ApiRequest::get(path)).await?;
        Page::from_data(env.data)
    }

    pub async fn create_shop(&self, shop: &NewShop) -> Result<Shop, ApiError> {
        self.secure_request(ApiRequest::post("/shops", serde_json::to_value(shop)?))
            .await?
            .decode()
    }

    pub async fn get_shop(&self, shop_id: &str) -> Result<Option<Shop>, ApiError> {
        let env = self
            .secure_request(ApiRequest::get(format!("/shops/{}", urlencoded(shop_id))))
            .await?;
        if env.data.is_null() {
            return Ok(None);
        }
        env.decode().map(Some)
    }

    pub async fn shop_subcategories(&self, shop_id: &str) -> Result<Vec<SubcategoryRef>, ApiError> {
        let env = self
            .secure_request(ApiRequest::get(format!(
                "/shops/{}/subcategories",
                urlencoded(shop_id)
            )))
            .await?;
        let list = match env.data {
            Value::Object(mut obj) => obj.remove("subcategories").unwrap_or(Value::Null),
            other => other,
        };
        if list.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(list).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // -- Products --

    /// Seller view of a shop's products.
    pub async fn shop_products(&self, shop_id: &str, params: &ListParams) -> Result<Page<Product>, ApiError> {
        let path = format!("/products/shop/{}?{}", urlencoded(shop_id), list_query(params));
        let env = self.secure_request(ApiRequest::get(path)).await?;
        Page::from_data(env.data)
    }

    pub async fn public_products(&self, shop_id: &str, query: &PublicQuery) -> Result<Page<Product>, ApiError> {
        let path = format!("/shops/{}/products?{}", urlencoded(shop_id), public_query(query));
        let env = self.secure_request(ApiRequest::get(path)).await?;
        Page::from_data(env.data)
    }

    pub async fn create_product(&self, shop_id: &str, product: &NewProduct) -> Result<Product, ApiError> {
        let mut body = serde_json::to_value(product)?;
        body["shop"] = Value::String(shop_id.to_string());
        self.secure_request(ApiRequest::post("/products", body))
            .await?
            .decode()
    }

    // -- Uploads --

    pub async fn upload_file(&self, file: MultipartFile) -> Result<String, ApiError> {
        let env = self.secure_request(ApiRequest::upload("/uploads", file)).await?;
        upload_path(&env.data)
            .ok_or_else(|| ApiError::Transport("Upload succeeded but no file path returned.".into()))
    }
}

fn upload_path(data: &Value) -> Option<String> {
    let s = |v: Option<&Value>| v.and_then(Value::as_str).filter(|p| !p.is_empty()).map(String::from);
    s(data.pointer("/data/path"))
        .or_else(|| s(data.get("path")))
        .or_else(|| s(data.pointer("/data/url")))
        .or_else(|| s(data.get("url")))
}

fn list_query(params: &ListParams) -> String {
    let mut parts = vec![format!("page={}", params.page), format!("limit={}", params.limit)];
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(format!("search={}", urlencoded(search)));
    }
    parts.join("&")
}

fn public_query(q: &PublicQuery) -> String {
    let mut parts = vec![format!("page={}", q.page), format!("limit={}", q.limit)];
    if let Some(text) = q.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(format!("q={}", urlencoded(text)));
    }
    if let Some(from) = q.price_from {
        parts.push(format!("priceFrom={}", from));
    }
    if let Some(to) = q.price_to {
        parts.push(format!("priceTo={}", to));
    }
    if let Some(ref id) = q.category_id {
        parts.push(format!("categoryId={}", urlencoded(id)));
    }
    if let Some(ref id) = q.subcategory_id {
        parts.push(format!("subcategoryId={}", urlencoded(id)));
    }
    parts.join("&")
}
