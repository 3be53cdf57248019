use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Shown whenever a mutating action is attempted without backend credentials.
pub const OFFLINE_NOTICE: &str =
    "Offline mode: configure SUPABASE_URL and SUPABASE_ANON_KEY to load and update cases.";

/// Application-specific error types.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Backend credentials are absent; the action was blocked locally.
    OfflineMode,
    /// The hosted backend failed or rejected the request.
    BackendError(String),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// The action conflicts with the current state or an in-flight action.
    Conflict(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// The innermost error, with context layers stripped.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Message safe to show to the volunteer.
    pub fn user_message(&self) -> String {
        match self {
            AppError::OfflineMode => OFFLINE_NOTICE.to_string(),
            AppError::BackendError(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::InternalError(_) => "Internal error".to_string(),
            AppError::WithContext { source, context } => {
                format!("{}: {}", context, source.user_message())
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::OfflineMode => write!(f, "Offline mode: {}", OFFLINE_NOTICE),
            AppError::BackendError(msg) => write!(f, "Backend error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each variant to a status code and a JSON body with a user-facing message.
    fn into_response(self) -> Response {
        let status = match self.root() {
            AppError::OfflineMode => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BackendError(msg) => {
                tracing::error!("Backend error: {}", msg);
                StatusCode::BAD_GATEWAY
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::WithContext { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let AppError::WithContext { ref context, ref source } = self {
            tracing::error!("Error with context: {} -> {}", context, source);
        }

        let body = Json(json!({
            "error": self.user_message(),
            "offline": matches!(self.root(), AppError::OfflineMode),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::BackendError(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
