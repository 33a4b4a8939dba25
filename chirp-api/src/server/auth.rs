use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::TypedHeader;
use chirp_common::model::{
    Id,
    auth::{TokenKind, TokenService},
    user::{User, UserMarker},
};
use chirp_db::Store;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user a request's bearer access token belongs to.
///
/// Use `Option<AuthenticatedUser>` on routes that work without logging in: a
/// missing header then yields `None`, while a present but invalid one is still
/// rejected.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Store>: FromRef<S>,
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = <AuthorizationHeader as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?;

        let claims =
            Arc::<TokenService>::from_ref(state).decode(header.token(), TokenKind::Access)?;

        let user = Arc::<dyn Store>::from_ref(state)
            .fetch_user(claims.user_id)
            .await?
            .ok_or(ServerError::TokenUserGone)?;

        Ok(Self { user })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Store>: FromRef<S>,
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }

        <Self as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}
