// Input validation helpers.
//
// `ValidatedJson<T>` replaces `axum::Json<T>` in handlers so body
// failures surface as the structured 400 envelope instead of plain-text
// axum rejections. Handlers add their own semantic field errors via
// `field_errors`.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ErrorCode};

/// Maximum REST request body in bytes (20 MiB; attachment uploads ride
/// the same limit).
pub const MAX_REQUEST_BODY_BYTES: usize = 20 * 1024 * 1024;

pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                // An over-limit body keeps its own status and code.
                if rejection.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
                    return Err(ApiError::from_code(ErrorCode::ContentTooLarge).into_response());
                }
                let detail = match &rejection {
                    JsonRejection::JsonDataError(error) => format!("Invalid payload: {error}"),
                    JsonRejection::JsonSyntaxError(error) => format!("Malformed JSON: {error}"),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Expected Content-Type: application/json".to_owned()
                    }
                    other => format!("Request body error: {other}"),
                };
                Err(ApiError::bad_request("Wrong data passed")
                    .with_field_errors(field_errors([("body", detail.as_str())]))
                    .into_response())
            }
        }
    }
}

/// Build a field-error map for the 400 envelope.
pub fn field_errors<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (field, message) in entries {
        map.entry(field.to_owned()).or_default().push(message.to_owned());
    }
    map
}
