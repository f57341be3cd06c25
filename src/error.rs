use thiserror::Error;

/// Failure reported by the API, either by transport status or by a
/// `success: false` envelope.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(401, "Not authenticated")
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Transport(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unexpected response shape: {0}")]
    Decode(String),

    #[error("Credential store error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http(e) => Some(e.status),
            _ => None,
        }
    }

    /// 401 and 403 take the refresh-and-retry path instead of failing outright.
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Structured field errors carried in `data`, if the server sent any.
    pub fn validation_issues(&self) -> Option<Vec<ValidationIssue>> {
        let ApiError::Http(HttpError {
            data: Some(data), ..
        }) = self
        else {
            return None;
        };
        let items = data.as_array()?;
        Some(
            items
                .iter()
                .map(ValidationIssue::from_value)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: Option<String>,
    pub message: Option<String>,
}

impl ValidationIssue {
    /// Reads `{field|path, message|msg}`.
    pub fn from_value(v: &serde_json::Value) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| v.get(*k).and_then(|x| x.as_str()).filter(|s| !s.is_empty()))
                .map(String::from)
        };
        Self {
            field: text(&["field", "path"]),
            message: text(&["message", "msg"]),
        }
    }
}
