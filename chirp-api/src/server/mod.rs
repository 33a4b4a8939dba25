use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use chirp_common::model::{
    Id,
    auth::{TokenError, TokenService},
    password::PasswordHashError,
    post::PostMarker,
    user::Username,
};
use chirp_db::{DbError, Store};
use json::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower::Layer;
use tower_http::{
    normalize_path::{NormalizePath, NormalizePathLayer},
    trace::TraceLayer,
};
use tracing::{debug, error};

mod auth;
mod json;
mod payload;
mod query;
mod routes;
#[cfg(test)]
mod test_util;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenService>,
}

impl ServerState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete service. Trailing slashes are trimmed before routing, so
/// `/login/` and `/login` reach the same handler.
pub type App = NormalizePath<Router>;

pub fn app(state: ServerState) -> App {
    let router = routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    NormalizePathLayer::trim_trailing_slash().layer(router)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("The user this token was issued to no longer exists")]
    TokenUserGone,
    #[error("Token is blacklisted")]
    BlacklistedToken,
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Database(DbError),
    #[error("Passwords do not Match.")]
    PasswordMismatch,
    #[error("Password must not be empty.")]
    EmptyPassword,
    #[error("Username is Taken")]
    UsernameTaken(Username),
    #[error("No active account found with the given credentials")]
    InvalidCredentials,
    #[error("Refresh token required.")]
    MissingRefreshToken,
    #[error("Refresh token is invalid, expired or already blacklisted.")]
    InvalidLogoutToken,
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User {0} was not found.")]
    UserByUsernameNotFound(Username),
    #[error("You can only edit your own tweets.")]
    NotPostAuthor,
    #[error("You cannot follow yourself.")]
    SelfFollow,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByUsernameNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::Token(TokenError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Token(_)
            | ServerError::TokenUserGone
            | ServerError::BlacklistedToken
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::NotPostAuthor => StatusCode::FORBIDDEN,
            ServerError::UsernameTaken(_) => StatusCode::CONFLICT,
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::PasswordMismatch
            | ServerError::EmptyPassword
            | ServerError::MissingRefreshToken
            | ServerError::InvalidLogoutToken
            | ServerError::SelfFollow => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ServerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UsernameTaken(username) => ServerError::UsernameTaken(username),
            DbError::SelfFollow => ServerError::SelfFollow,
            DbError::MissingPost(post_id) => ServerError::PostByIdNotFound(post_id),
            err => ServerError::Database(err),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
            "Internal server error".to_owned()
        } else {
            debug!(error = %self, %status, "Replying with error");
            self.to_string()
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error: message,
        };
        (status, Json(error_response)).into_response()
    }
}
