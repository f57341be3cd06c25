use async_trait::async_trait;
use reqwest::Method;

use crate::error::ApiError;

/// A single file sent as `multipart/form-data`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartFile),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    pub token: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: RequestBody::Empty,
            token: None,
            headers: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: RequestBody::Json(body),
            ..Self::get(path)
        }
    }

    pub fn upload(path: impl Into<String>, file: MultipartFile) -> Self {
        Self {
            method: Method::POST,
            body: RequestBody::Multipart(file),
            ..Self::get(path)
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: ApiRequest) -> Result<RawResponse, ApiError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: ApiRequest) -> Result<RawResponse, ApiError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = self.client.request(req.method.clone(), &url);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref token) = req.token {
            builder = builder.bearer_auth(token);
        }
        builder = match req.body {
            RequestBody::Empty => builder.header("Content-Type", "application/json"),
            RequestBody::Json(ref body) => builder.json(body),
            RequestBody::Multipart(file) => {
                // reqwest writes the multipart boundary into Content-Type itself.
                let part = reqwest::multipart::Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(&file.mime)
                    .map_err(|e| ApiError::Transport(format!("Invalid MIME type: {}", e)))?;
                builder.multipart(reqwest::multipart::Form::new().part(file.field, part))
            }
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to connect: {} {}: {}", req.method, req.path, e)))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read response: {}", e)))?
            .to_vec();
        Ok(RawResponse { status, body })
    }
}
