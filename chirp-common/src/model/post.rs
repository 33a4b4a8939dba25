use crate::model::{
    Id, bounded_text,
    comment::Comment,
    user::{UserMarker, UserRef},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_CONTENT_MAX_LEN: usize = 255;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub poster: UserRef,
    pub content: PostContent,
    pub date_posted: OffsetDateTime,
    pub edited: bool,
    pub likers: Vec<UserRef>,
    /// Newest first.
    pub comments: Vec<Comment>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub poster: UserRef,
    pub content: PostContent,
}

impl Post {
    #[must_use]
    pub fn is_liked_by(&self, user_id: Id<UserMarker>) -> bool {
        self.likers.iter().any(|liker| liker.id == user_id)
    }

    #[must_use]
    pub fn likes_count(&self) -> usize {
        self.likers.len()
    }

    #[must_use]
    pub fn comments_count(&self) -> usize {
        self.comments.len()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PostContent(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Post text must be between 1 and {max} characters: {0:?}", max = POST_CONTENT_MAX_LEN)]
pub struct InvalidPostContentError(String);

impl PostContent {
    pub fn new(content: String) -> Result<Self, InvalidPostContentError> {
        bounded_text(&content, POST_CONTENT_MAX_LEN)
            .map(PostContent)
            .ok_or(InvalidPostContentError(content))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PostContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostContent::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"PostContent"))
    }
}

/// Which posts a listing covers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    /// Posts whose poster is followed by the given user.
    FollowedBy(Id<UserMarker>),
    AuthoredBy(Id<UserMarker>),
    LikedBy(Id<UserMarker>),
}

/// Ordering of a listing. Every ordering falls back to newest first, then
/// highest id, for ties.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub enum PostOrdering {
    #[default]
    Newest,
    MostLiked,
    MostCommented,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostQuery {
    pub filter: PostFilter,
    pub ordering: PostOrdering,
    /// `None` returns every remaining post.
    pub limit: Option<u64>,
    pub offset: u64,
}

impl PostQuery {
    #[must_use]
    pub fn all_of(filter: PostFilter) -> Self {
        Self {
            filter,
            ordering: PostOrdering::Newest,
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub fn top(ordering: PostOrdering, limit: u64) -> Self {
        Self {
            filter: PostFilter::All,
            ordering,
            limit: Some(limit),
            offset: 0,
        }
    }
}
