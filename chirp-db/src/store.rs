use async_trait::async_trait;
use chirp_common::model::{
    Id, ModelValidationError,
    auth::BlacklistedToken,
    comment::{Comment, CreateComment},
    post::{CreatePost, Post, PostContent, PostFilter, PostMarker, PostQuery},
    user::{CreateUser, Credentials, FollowCounts, User, UserMarker, Username},
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Username {0} is already taken")]
    UsernameTaken(Username),
    #[error("A user cannot follow themselves")]
    SelfFollow,
    #[error("Post with id {0} does not exist")]
    MissingPost(Id<PostMarker>),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Migrating the database failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Everything the request handlers read from and write to.
///
/// Every method is a single unit of work: writes either fully happen or not at
/// all, so toggles do not need any locking on the caller's side.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`DbError::UsernameTaken`] if the username exists.
    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>>;

    /// Removes the user along with their posts, comments, likes and follows.
    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool>;

    /// Follows `followed` if `follower` does not already, unfollows otherwise.
    /// Returns whether `follower` follows `followed` afterwards.
    async fn toggle_follow(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool>;

    async fn is_following(&self, follower: Id<UserMarker>, followed: Id<UserMarker>)
    -> Result<bool>;

    async fn follow_counts(&self, user_id: Id<UserMarker>) -> Result<FollowCounts>;

    async fn create_post(&self, post: &CreatePost) -> Result<Post>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// Replaces the text and marks the post as edited. `None` if the post does
    /// not exist.
    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>>;

    /// Removes the post and its likes. Its comments stay, pointing at the
    /// deleted-post tombstone.
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;

    async fn count_posts(&self, filter: PostFilter) -> Result<u64>;

    async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<Post>>;

    /// Likes the post if `user_id` has not yet, unlikes it otherwise. Returns
    /// whether the post is liked afterwards.
    async fn toggle_like(&self, post_id: Id<PostMarker>, user_id: Id<UserMarker>) -> Result<bool>;

    /// Fails with [`DbError::MissingPost`] if the post does not exist.
    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment>;

    /// Comments written by the user, newest first.
    async fn fetch_user_comments(&self, user_id: Id<UserMarker>) -> Result<Vec<Comment>>;

    /// Returns `false` if the token was already blacklisted.
    async fn blacklist_token(&self, token: &BlacklistedToken) -> Result<bool>;

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool>;
}
