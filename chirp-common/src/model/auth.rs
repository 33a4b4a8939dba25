use crate::model::{
    Id,
    user::{UserMarker, UserRef},
};
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const TOKEN_ID_LEN: usize = 16;
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::minutes(5);
pub const DEFAULT_REFRESH_TOKEN_LIFETIME: Duration = Duration::days(1);
/// Keeps `exp` well inside the range `time` can represent.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::days(3650);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signing token failed: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("Token is invalid or expired: {0}")]
    Decode(jsonwebtoken::errors::Error),
    #[error("Expected a {expected} token but got a {found} token")]
    WrongKind { expected: TokenKind, found: TokenKind },
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Token lifetime must be positive and at most {max}: {0}", max = MAX_TOKEN_LIFETIME)]
pub struct InvalidTokenLifetimeError(Duration);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenKind,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub user_id: Id<UserMarker>,
    pub username: String,
}

impl Claims {
    /// Expiry as a timestamp, falling back to the unix epoch for values the
    /// `time` crate cannot represent.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl Debug for TokenPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"[redacted]")
            .field("refresh", &"[redacted]")
            .finish()
    }
}

/// A refresh token that has been revoked by logging out.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct BlacklistedToken {
    pub jti: String,
    pub user: Id<UserMarker>,
    pub expires_at: OffsetDateTime,
}

impl From<&Claims> for BlacklistedToken {
    fn from(claims: &Claims) -> Self {
        Self {
            jti: claims.jti.clone(),
            user: claims.user_id,
            expires_at: claims.expires_at(),
        }
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct TokenLifetime(Duration);

impl TokenLifetime {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        (duration.is_positive() && duration <= MAX_TOKEN_LIFETIME).then_some(Self(duration))
    }

    #[must_use]
    pub fn get(self) -> Duration {
        self.0
    }
}

impl TryFrom<Duration> for TokenLifetime {
    type Error = InvalidTokenLifetimeError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidTokenLifetimeError(value))
    }
}

/// Issues and verifies signed access/refresh tokens.
///
/// Revocation is not tracked here; callers check [`Claims::jti`] against their
/// blacklist.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_lifetime: TokenLifetime,
    refresh_lifetime: TokenLifetime,
}

impl TokenService {
    #[must_use]
    pub fn new(
        secret: &[u8],
        access_lifetime: TokenLifetime,
        refresh_lifetime: TokenLifetime,
    ) -> Self {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_lifetime,
            refresh_lifetime,
        }
    }

    pub fn issue_pair(&self, user: &UserRef) -> Result<TokenPair, TokenError> {
        let access = self.issue(TokenKind::Access, user.id, user.username.get())?;
        let refresh = self.issue(TokenKind::Refresh, user.id, user.username.get())?;

        Ok(TokenPair { access, refresh })
    }

    /// Mints a fresh access token for the holder of a verified refresh token.
    pub fn refresh_access(&self, refresh: &Claims) -> Result<String, TokenError> {
        if refresh.token_type != TokenKind::Refresh {
            return Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
                found: refresh.token_type,
            });
        }

        self.issue(TokenKind::Access, refresh.user_id, &refresh.username)
    }

    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(TokenError::Decode)?
            .claims;

        if claims.token_type == expected {
            Ok(claims)
        } else {
            Err(TokenError::WrongKind {
                expected,
                found: claims.token_type,
            })
        }
    }

    fn issue(
        &self,
        kind: TokenKind,
        user_id: Id<UserMarker>,
        username: &str,
    ) -> Result<String, TokenError> {
        let lifetime = match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        };
        let now = OffsetDateTime::now_utc();
        let jti: [u8; TOKEN_ID_LEN] = rand::random();

        let claims = Claims {
            token_type: kind,
            exp: (now + lifetime.get()).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: BASE64_URL_SAFE_NO_PAD.encode(jti),
            user_id,
            username: username.to_owned(),
        };

        jsonwebtoken::encode(&Header::new(TOKEN_ALGORITHM), &claims, &self.encoding_key)
            .map_err(TokenError::Encode)
    }
}

impl Debug for TokenService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("keys", &"[redacted]")
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}
