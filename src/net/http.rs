use axum::{
    Json, Router,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::Registry;
use crate::error::{AppResult, DomainError, InfraError};
use crate::models::user::{CurrentUser, ProfileUpdate, ProfileView, SignupRequest};
use crate::net::auth::AuthUser;
use crate::username::AllocError;

#[derive(Clone)]
struct HttpAppCtx {
    registry: Arc<Registry>,
}

/// Routes for the user API, mounted under `/api/users`.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/api/users", post(signup))
        .route("/api/users/current", get(current))
        .route("/api/users/profile", patch(update_profile))
        .with_state(HttpAppCtx { registry })
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

/// Run the HTTP server
pub async fn serve(addr: std::net::SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(InfraError::from)?;
    axum::serve(listener, app).await.map_err(InfraError::from)?;
    Ok(())
}

#[derive(Serialize)]
struct Data<T> {
    data: T,
}

/// `Json` whose rejections go through [`ApiError`], so a body that does not
/// parse still gets a 400 with the usual `{ "error": ... }` shape.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

async fn signup(State(ctx): State<HttpAppCtx>, JsonBody(req): JsonBody<SignupRequest>) -> Result<Json<()>, ApiError> {
    ctx.registry.services.account.signup(&req).await?;
    Ok(Json(()))
}

async fn current(
    State(ctx): State<HttpAppCtx>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Data<CurrentUser>>, ApiError> {
    let user = ctx.registry.services.account.current(user_id).await?;
    Ok(Json(Data { data: user.into() }))
}

async fn update_profile(
    State(ctx): State<HttpAppCtx>,
    AuthUser(user_id): AuthUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<Json<Data<ProfileView>>, ApiError> {
    let user = ctx.registry.services.account.update_profile(user_id, &update).await?;
    Ok(Json(Data { data: user.into() }))
}

/// Error surface of the HTTP API. Rendered as `{ "error": "..." }`.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    /// Body missing, not JSON, or not the expected shape
    Body(JsonRejection),
    Domain(DomainError),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Body(e)
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Domain(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Body(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            ApiError::Domain(e) => match &e {
                DomainError::EmailInUse => (StatusCode::BAD_REQUEST, "Email already in use".to_string()),
                DomainError::UsernameTaken => (StatusCode::BAD_REQUEST, "Username already taken".to_string()),
                DomainError::ProfileUpdateFailed => {
                    (StatusCode::BAD_REQUEST, "Failed to update profile".to_string())
                }
                DomainError::Validation { field, message } => (StatusCode::BAD_REQUEST, format!("{field}: {message}")),
                DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
                DomainError::SignupFailed { .. } | DomainError::Alloc(AllocError::Exhausted { .. }) => {
                    tracing::warn!(error = %e, "signup failed");
                    (StatusCode::CONFLICT, "Signup failed".to_string())
                }
                other => {
                    tracing::error!(error = %other, "request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string())
                }
            },
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
