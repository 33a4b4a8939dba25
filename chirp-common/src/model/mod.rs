pub mod auth;
pub mod comment;
pub mod password;
pub mod post;
pub mod user;

use crate::model::{
    comment::InvalidCommentContentError, password::InvalidPasswordDigestError,
    post::InvalidPostContentError, user::InvalidUsernameError,
};
use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    PostContent(#[from] InvalidPostContentError),
    #[error(transparent)]
    CommentContent(#[from] InvalidCommentContentError),
    #[error(transparent)]
    PasswordDigest(#[from] InvalidPasswordDigestError),
}

/// Database id of an entity, tagged with the entity kind so ids of different
/// tables cannot be mixed up.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<Marker>(i64, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<i64> for Id<Marker> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for i64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}

/// Trims `text` and checks that what is left is non-empty and at most
/// `max_len` characters long.
pub(crate) fn bounded_text(text: &str, max_len: usize) -> Option<String> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();

    (len > 0 && len <= max_len).then(|| trimmed.to_owned())
}
