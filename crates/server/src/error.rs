use std::collections::BTreeMap;
use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Registry of wire-visible error codes. Every non-WebSocket endpoint maps
/// failures into one of these; the HTTP status is derived from the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RequestTimeout,
    Conflict,
    ContentTooLarge,
    TooManyRequests,
    InternalServerError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::ContentTooLarge => "CONTENT_TOO_LARGE",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Conflict => StatusCode::CONFLICT,
            Self::ContentTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::BadRequest => "Wrong data passed",
            Self::Unauthorized => "Not authorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not found",
            Self::RequestTimeout => "Request timed out",
            Self::Conflict => "Conflict",
            Self::ContentTooLarge => "Content too large",
            Self::TooManyRequests => "Too many requests, please try again later",
            Self::InternalServerError => "Something went wrong",
        }
    }
}

/// A structured API failure. Serializes to the uniform envelope
/// `{ok: false, code, message, errors?}` with the status from the registry.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), errors: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden() -> Self {
        Self::from_code(ErrorCode::Forbidden)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Log the underlying cause server-side and collapse it to a generic
    /// 500 envelope. Internal error text never reaches the client.
    pub fn internal(error: anyhow::Error) -> Self {
        tracing::error!(error = ?error, request_id = ?current_request_id(), "internal error");
        Self::from_code(ErrorCode::InternalServerError)
    }

    pub fn with_field_errors(mut self, errors: BTreeMap<String, Vec<String>>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "ok": false,
            "code": self.code.as_str(),
            "message": self.message,
        });
        if let Some(errors) = self.errors {
            body["errors"] = json!(errors);
        }

        let mut response = (self.code.status(), Json(body)).into_response();

        if let Some(request_id) = current_request_id() {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

/// Success envelope: `{ok: true, code: "OK", data}`.
pub fn ok_envelope(data: Value) -> Json<Value> {
    Json(json!({ "ok": true, "code": "OK", "data": data }))
}

/// Success envelope without a data payload (delete acknowledgements).
pub fn ok_empty_envelope() -> Json<Value> {
    Json(json!({ "ok": true, "code": "OK" }))
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
