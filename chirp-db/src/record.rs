use chirp_common::model::{
    Id, ModelValidationError,
    comment::{Comment, CommentContent, ParentPost},
    password::PasswordDigest,
    post::{Post, PostContent},
    user::{Credentials, FollowCounts, User, UserRef, Username},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub date_joined: OffsetDateTime,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub password: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FollowCountsRecord {
    pub followers: i64,
    pub following: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub tweet: String,
    pub poster_id: i64,
    pub poster_username: String,
    pub date_posted: OffsetDateTime,
    pub edited: bool,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct LikerRecord {
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_id: i64,
    pub main_post_id: Option<i64>,
    pub comment: String,
    pub commenter_id: i64,
    pub commenter_username: String,
    pub commented: OffsetDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.into(),
            username: Username::new(value.username)?,
            date_joined: value.date_joined,
            is_staff: value.is_staff,
            is_superuser: value.is_superuser,
        })
    }
}

impl TryFrom<CredentialsRecord> for Credentials {
    type Error = ModelValidationError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            password: PasswordDigest::from_phc(value.password)?,
        })
    }
}

impl From<FollowCountsRecord> for FollowCounts {
    fn from(value: FollowCountsRecord) -> Self {
        Self {
            followers: value.followers.cast_unsigned(),
            following: value.following.cast_unsigned(),
        }
    }
}

impl TryFrom<LikerRecord> for UserRef {
    type Error = ModelValidationError;

    fn try_from(value: LikerRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.into(),
            username: Username::new(value.username)?,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.comment_id.into(),
            main_post: ParentPost::from(value.main_post_id.map(Id::new)),
            commenter: UserRef {
                id: value.commenter_id.into(),
                username: Username::new(value.commenter_username)?,
            },
            content: CommentContent::new(value.comment)?,
            commented: value.commented,
        })
    }
}

impl PostRecord {
    /// Builds the post from its row plus the already loaded relations.
    pub fn into_post(
        self,
        likers: Vec<UserRef>,
        comments: Vec<Comment>,
    ) -> Result<Post, ModelValidationError> {
        Ok(Post {
            id: self.post_id.into(),
            poster: UserRef {
                id: self.poster_id.into(),
                username: Username::new(self.poster_username)?,
            },
            content: PostContent::new(self.tweet)?,
            date_posted: self.date_posted,
            edited: self.edited,
            likers,
            comments,
        })
    }
}
