use crate::model::{Id, bounded_text, post::PostMarker, user::UserRef};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

pub const COMMENT_CONTENT_MAX_LEN: usize = 255;

/// What a comment reports as its parent once that post is gone.
pub const DELETED_POST_PLACEHOLDER: &str = "Post deleted.";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub main_post: ParentPost,
    pub commenter: UserRef,
    pub content: CommentContent,
    pub commented: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateComment {
    pub main_post: Id<PostMarker>,
    pub commenter: UserRef,
    pub content: CommentContent,
}

/// Parent of a comment. Deleting a post does not delete its comments, they
/// are re-pointed at the [`ParentPost::Deleted`] tombstone instead.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ParentPost {
    Post(Id<PostMarker>),
    Deleted,
}

impl ParentPost {
    #[must_use]
    pub fn post_id(self) -> Option<Id<PostMarker>> {
        match self {
            ParentPost::Post(id) => Some(id),
            ParentPost::Deleted => None,
        }
    }
}

impl From<Option<Id<PostMarker>>> for ParentPost {
    fn from(value: Option<Id<PostMarker>>) -> Self {
        value.map_or(ParentPost::Deleted, ParentPost::Post)
    }
}

impl Serialize for ParentPost {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ParentPost::Post(id) => id.serialize(serializer),
            ParentPost::Deleted => serializer.serialize_str(DELETED_POST_PLACEHOLDER),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentContent(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error(
    "Comment text must be between 1 and {max} characters: {0:?}",
    max = COMMENT_CONTENT_MAX_LEN
)]
pub struct InvalidCommentContentError(String);

impl CommentContent {
    pub fn new(content: String) -> Result<Self, InvalidCommentContentError> {
        bounded_text(&content, COMMENT_CONTENT_MAX_LEN)
            .map(CommentContent)
            .ok_or(InvalidCommentContentError(content))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for CommentContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentContent::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"CommentContent"))
    }
}
