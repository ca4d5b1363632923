// Signup and login. Both answer with a redirect URL carrying a
// short-lived bootstrap token; the browser follows it to `/redirect`,
// which mints the actual session cookie.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use huddle_common::slug;

use crate::api::ApiState;
use crate::auth::token;
use crate::error::{ok_envelope, ApiError};
use crate::validation::{field_errors, ValidatedJson};

const PASSWORD_MIN_CHARS: usize = 8;
const PASSWORD_MAX_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    pub email: String,
    pub password: String,
}

pub async fn signup(
    State(state): State<ApiState>,
    ValidatedJson(payload): ValidatedJson<CredentialsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials(&payload)?;

    if state.store.email_exists(&payload.email).await.map_err(ApiError::internal)? {
        return Err(ApiError::conflict("User already exists with email"));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|error| ApiError::internal(anyhow::anyhow!("password hashing failed: {error}")))?
        .to_string();

    let username = slug::username_from_email(&payload.email);
    let signup = state
        .store
        .create_account(crate::store::NewAccount {
            workspace_name: slug::workspace_name_from_email(&payload.email),
            email: payload.email,
            password_hash,
            display_name: username,
            user_avatar_url: None,
            member_avatar_url: None,
        })
        .await
        .map_err(ApiError::internal)?;

    let token = token::issue(signup.user_id, &signup.workspace_slug, &state.config.token_secret);
    Ok((StatusCode::CREATED, ok_envelope(json!({ "redirect": redirect_url(&token) }))))
}

pub async fn login(
    State(state): State<ApiState>,
    ValidatedJson(payload): ValidatedJson<CredentialsPayload>,
) -> Result<Json<Value>, ApiError> {
    validate_credentials(&payload)?;

    let Some((user_id, password_hash)) =
        state.store.login_credentials(&payload.email).await.map_err(ApiError::internal)?
    else {
        return Err(incorrect_credentials());
    };

    // Wrong password and unknown email answer identically.
    let parsed = PasswordHash::new(&password_hash)
        .map_err(|error| ApiError::internal(anyhow::anyhow!("stored hash unreadable: {error}")))?;
    if Argon2::default().verify_password(payload.password.as_bytes(), &parsed).is_err() {
        return Err(incorrect_credentials());
    }

    let Some(workspace_slug) =
        state.store.default_workspace_slug(user_id).await.map_err(ApiError::internal)?
    else {
        return Err(incorrect_credentials());
    };

    let token = token::issue(user_id, &workspace_slug, &state.config.token_secret);
    Ok(ok_envelope(json!({ "redirect": redirect_url(&token) })))
}

fn redirect_url(token: &str) -> String {
    format!("/redirect?t={token}")
}

fn incorrect_credentials() -> ApiError {
    ApiError::bad_request("Incorrect email or password")
}

fn validate_credentials(payload: &CredentialsPayload) -> Result<(), ApiError> {
    let mut problems: Vec<(&str, &str)> = Vec::new();

    if payload.email.is_empty() {
        problems.push(("email", "Email is required"));
    } else if !is_plausible_email(&payload.email) {
        problems.push(("email", "Email is invalid"));
    }

    let password_chars = payload.password.chars().count();
    if password_chars < PASSWORD_MIN_CHARS {
        problems.push(("password", "Password must contain at least 8 character(s)"));
    } else if password_chars > PASSWORD_MAX_CHARS {
        problems.push(("password", "Password must contain at most 100 character(s)"));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request("Wrong data passed").with_field_errors(field_errors(problems)))
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && domain.contains('.') && !email.contains(' ')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        routing::post,
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{login, signup};
    use crate::api::ApiState;
    use crate::store::ChatStore;

    fn auth_app(state: ApiState) -> Router {
        Router::new()
            .route("/auth/signup", post(signup))
            .route("/auth/login", post(login))
            .with_state(state)
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .expect("request should build")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&body).expect("body should be valid json")
    }

    #[tokio::test]
    async fn signup_creates_an_account_and_returns_a_redirect() {
        let app = auth_app(ApiState::for_tests(ChatStore::in_memory()));

        let response = app
            .oneshot(json_request(
                "/auth/signup",
                r#"{"email":"ada@example.com","password":"correct horse"}"#,
            ))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let parsed = body_json(response).await;
        assert_eq!(parsed["ok"], true);
        let redirect = parsed["data"]["redirect"].as_str().expect("redirect should be a string");
        assert!(redirect.starts_with("/redirect?t="));
    }

    #[tokio::test]
    async fn signup_rejects_a_duplicate_email_with_conflict() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        let payload = r#"{"email":"ada@example.com","password":"correct horse"}"#;

        let first = auth_app(state.clone())
            .oneshot(json_request("/auth/signup", payload))
            .await
            .expect("request should return a response");
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = auth_app(state)
            .oneshot(json_request("/auth/signup", payload))
            .await
            .expect("request should return a response");
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let parsed = body_json(second).await;
        assert_eq!(parsed["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn signup_reports_field_errors_for_bad_input() {
        let app = auth_app(ApiState::for_tests(ChatStore::in_memory()));

        let response = app
            .oneshot(json_request("/auth/signup", r#"{"email":"not-an-email","password":"short"}"#))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(response).await;
        assert_eq!(parsed["errors"]["email"][0], "Email is invalid");
        assert_eq!(parsed["errors"]["password"][0], "Password must contain at least 8 character(s)");
    }

    #[tokio::test]
    async fn login_succeeds_with_the_signup_password() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        let payload = r#"{"email":"ada@example.com","password":"correct horse"}"#;

        auth_app(state.clone())
            .oneshot(json_request("/auth/signup", payload))
            .await
            .expect("signup should return a response");

        let response = auth_app(state)
            .oneshot(json_request("/auth/login", payload))
            .await
            .expect("login should return a response");

        assert_eq!(response.status(), StatusCode::OK);
        let parsed = body_json(response).await;
        assert!(parsed["data"]["redirect"]
            .as_str()
            .expect("redirect should be a string")
            .starts_with("/redirect?t="));
    }

    #[tokio::test]
    async fn login_answers_identically_for_unknown_email_and_wrong_password() {
        let state = ApiState::for_tests(ChatStore::in_memory());
        auth_app(state.clone())
            .oneshot(json_request(
                "/auth/signup",
                r#"{"email":"ada@example.com","password":"correct horse"}"#,
            ))
            .await
            .expect("signup should return a response");

        let wrong_password = auth_app(state.clone())
            .oneshot(json_request(
                "/auth/login",
                r#"{"email":"ada@example.com","password":"wrong password"}"#,
            ))
            .await
            .expect("login should return a response");
        let unknown_email = auth_app(state)
            .oneshot(json_request(
                "/auth/login",
                r#"{"email":"nobody@example.com","password":"correct horse"}"#,
            ))
            .await
            .expect("login should return a response");

        assert_eq!(wrong_password.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown_email.status(), StatusCode::BAD_REQUEST);
        let first = body_json(wrong_password).await;
        let second = body_json(unknown_email).await;
        assert_eq!(first, second);
    }
}
