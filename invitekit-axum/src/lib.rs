//! # Invitekit Axum
//!
//! Axum integration for the invitekit client-invitation service: the
//! router, the CORS contract and the error-to-response mapping.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use invitekit_core::{InviteError, InviteFlow, InviteRequest};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for the invitation routes.
#[derive(Clone)]
pub struct AppState {
    /// The provisioning flow behind `POST /invite-client`.
    pub flow: Arc<InviteFlow>,
}

impl AppState {
    /// State wrapping the given flow.
    pub fn new(flow: InviteFlow) -> Self {
        Self {
            flow: Arc::new(flow),
        }
    }
}

/// Successful invitation response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    /// Always `true`.
    pub success: bool,
    /// The one-time temporary password for the new account.
    pub temp_password: String,
    /// Id of the identity account that was linked.
    pub auth_user_id: String,
}

/// JSON error envelope: `{"error": "..."}` with the taxonomy status code.
pub struct ApiError(pub InviteError);

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        Self(err)
    }
}

fn status_for(err: &InviteError) -> StatusCode {
    match err {
        InviteError::MissingToken | InviteError::InvalidToken => StatusCode::UNAUTHORIZED,
        InviteError::MissingFields => StatusCode::BAD_REQUEST,
        InviteError::ClientNotFound => StatusCode::NOT_FOUND,
        InviteError::NotClientOwner => StatusCode::FORBIDDEN,
        InviteError::AlreadyLinked | InviteError::EmailTaken => StatusCode::CONFLICT,
        InviteError::LinkFailed | InviteError::Provider(_) | InviteError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            log::error!("invite request failed: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim())
}

/// `POST /invite-client` — provision login credentials for a client.
async fn invite_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    let bearer = extract_bearer_token(&headers);
    let outcome = state.flow.invite(bearer, request).await?;
    Ok(Json(InviteResponse {
        success: true,
        temp_password: outcome.temp_password,
        auth_user_id: outcome.auth_user_id,
    }))
}

/// Bare `OPTIONS` requests (no preflight headers, so the CORS layer lets
/// them through) still get a 200.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Any method other than POST/OPTIONS on a known path.
async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

/// CORS contract: any origin, the Supabase client headers, POST only.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .allow_methods([Method::POST, Method::OPTIONS])
}

/// Build the invitation router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invite-client", post(invite_client).options(preflight))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(cors())
        .with_state(state)
}
