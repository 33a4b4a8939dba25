use crate::model::{Id, password::PasswordDigest};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::OffsetDateTime;

pub const USERNAME_MAX_LEN: usize = 150;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// The part of a user other entities point at.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct UserRef {
    pub id: Id<UserMarker>,
    pub username: Username,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUser {
    pub username: Username,
    pub password: PasswordDigest,
}

/// A user together with the secret needed to log them in.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Credentials {
    pub user: User,
    pub password: PasswordDigest,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct FollowCounts {
    pub followers: u64,
    pub following: u64,
}

impl User {
    #[must_use]
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Login name: 1 to 150 letters, digits or `@.+-_`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let len = username.chars().count();
        let allowed = username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));

        if len > 0 && len <= USERNAME_MAX_LEN && allowed {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}
