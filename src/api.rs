//! HTTP surface.
//!
//! - `POST /api/payments/confirm` – customer records a mobile-money payment claim
//! - `POST /api/payments/verify`  – admin verifies or rejects a claim (`x-admin-token`)
//! - `GET  /health`               – liveness only
//!
//! Origin allow-list, per-caller rate limit and body size ceiling are all applied
//! before a body is parsed.
use crate::config::Config;
use crate::error::{FieldViolation, PaymentError};
use crate::gate::{self, RateLimiter};
use crate::service::PaymentService;
use crate::validation::{ConfirmRequest, VerifyRequest};
use axum::{
    Json, Router,
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, Request, State},
    http::{HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(service: PaymentService, config: Config) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_per_minute);
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
            limiter: Arc::new(limiter),
        }
    }
}

/// Success acknowledgement, `{"ok":true}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Error body, `{"error": ..., "details": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
}

impl From<&FieldViolation> for ErrorDetail {
    fn from(value: &FieldViolation) -> Self {
        Self {
            field: value.field.to_owned(),
            message: value.message.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<Vec<ErrorDetail>>,
    retry_after: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn invalid_body() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request body")
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
        }
    }

    /// Maps the workflow taxonomy onto a response. Store failures are logged in
    /// full and answered with `server_message` only.
    pub fn from_payment(err: PaymentError, server_message: &str) -> Self {
        match err {
            PaymentError::Validation(v) => Self {
                details: Some(v.violations.iter().map(ErrorDetail::from).collect()),
                ..Self::new(StatusCode::BAD_REQUEST, "Invalid request")
            },
            PaymentError::OrderMismatch => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            PaymentError::OrderNotFound | PaymentError::ConfirmationNotFound => {
                Self::new(StatusCode::NOT_FOUND, err.to_string())
            }
            PaymentError::DuplicateReceipt
            | PaymentError::AlreadyProcessed
            | PaymentError::OrderAlreadyPaid => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            }
            PaymentError::Unauthorized => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            PaymentError::Storage(_) | PaymentError::Codec(_) => {
                error!(error = %err, "{server_message}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, server_message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            details: self.details,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Extractor that admits only callers presenting the configured admin token.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if gate::token_matches(gate::admin_token(&parts.headers), &state.config.admin_token) {
            Ok(AdminAuth)
        } else {
            Err(ApiError::from_payment(PaymentError::Unauthorized, "Unauthorized"))
        }
    }
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(gate::ADMIN_TOKEN_HEADER),
        ]);

    let payments = Router::new()
        .route("/api/payments/confirm", post(confirm))
        .route("/api/payments/verify", post(verify))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .merge(payments)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = gate::caller_key(req.headers());
    if let Err(wait) = state.limiter.check(&key) {
        return ApiError::rate_limited(wait.as_secs().max(1)).into_response();
    }
    next.run(req).await
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::invalid_body())
}

async fn confirm(State(state): State<AppState>, body: Bytes) -> Result<Json<Ack>, ApiError> {
    let request: ConfirmRequest = parse_body(&body)?;
    state
        .service
        .confirm_payment(request)
        .map_err(|e| ApiError::from_payment(e, "Failed to submit receipt"))?;
    Ok(Json(Ack::ok()))
}

async fn verify(
    State(state): State<AppState>,
    _auth: AdminAuth,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    let request: VerifyRequest = parse_body(&body)?;
    state
        .service
        .verify_payment(request)
        .map_err(|e| ApiError::from_payment(e, "Failed to update confirmation"))?;
    Ok(Json(Ack::ok()))
}

async fn health() -> Json<Ack> {
    Json(Ack::ok())
}
