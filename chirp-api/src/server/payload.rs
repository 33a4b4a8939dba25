//! Wire representations of the model, including the fields derived per
//! request (counts, whether the viewer liked a post).

use chirp_common::{
    model::{
        Id,
        comment::{Comment, CommentContent, CommentMarker, ParentPost},
        post::{Post, PostContent, PostMarker},
        user::{FollowCounts, User, UserMarker, Username},
    },
    pagination::Page,
};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PostPayload {
    pub id: Id<PostMarker>,
    pub tweet: PostContent,
    pub poster: Username,
    pub likers: Vec<Username>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_posted: OffsetDateTime,
    pub edited: bool,
    pub comments: Vec<CommentPayload>,
    pub likes_count: usize,
    pub comments_count: usize,
    pub is_liked: bool,
}

impl PostPayload {
    #[must_use]
    pub fn new(post: Post, viewer: Option<Id<UserMarker>>) -> Self {
        let likes_count = post.likes_count();
        let comments_count = post.comments_count();
        let is_liked = viewer.is_some_and(|viewer| post.is_liked_by(viewer));

        Self {
            id: post.id,
            tweet: post.content,
            poster: post.poster.username,
            likers: post.likers.into_iter().map(|liker| liker.username).collect(),
            date_posted: post.date_posted,
            edited: post.edited,
            comments: post.comments.into_iter().map(CommentPayload::from).collect(),
            likes_count,
            comments_count,
            is_liked,
        }
    }

    #[must_use]
    pub fn many(posts: Vec<Post>, viewer: Option<Id<UserMarker>>) -> Vec<Self> {
        posts
            .into_iter()
            .map(|post| Self::new(post, viewer))
            .collect()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct CommentPayload {
    pub id: Id<CommentMarker>,
    pub main_post: ParentPost,
    pub comment: CommentContent,
    pub commenter: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub commented: OffsetDateTime,
}

impl From<Comment> for CommentPayload {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            main_post: comment.main_post,
            comment: comment.content,
            commenter: comment.commenter.username,
            commented: comment.commented,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct HomePayload {
    pub recent_tweets: Vec<PostPayload>,
    pub most_liked_tweets: Vec<PostPayload>,
    pub most_commented_tweets: Vec<PostPayload>,
    pub current_page: u64,
    pub total_pages: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct FeedPayload {
    pub tweets: Vec<PostPayload>,
    pub current_page: u64,
    pub total_pages: u64,
}

impl FeedPayload {
    #[must_use]
    pub fn new(tweets: Vec<PostPayload>, page: Page) -> Self {
        Self {
            tweets,
            current_page: page.number,
            total_pages: page.total_pages,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct ProfileSummary {
    pub username: Username,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_following: bool,
    pub is_self_profile: bool,
}

impl ProfileSummary {
    #[must_use]
    pub fn new(
        user: User,
        counts: FollowCounts,
        is_following: bool,
        viewer: Id<UserMarker>,
    ) -> Self {
        Self {
            is_self_profile: user.id == viewer,
            username: user.username,
            date_joined: user.date_joined,
            followers_count: counts.followers,
            following_count: counts.following,
            is_following,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct ProfilePayload {
    pub user: ProfileSummary,
    pub tweets: Vec<PostPayload>,
    pub comments: Vec<CommentPayload>,
    pub liked_tweets: Vec<PostPayload>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize)]
pub struct LikePayload {
    pub success: bool,
    pub liked: bool,
    pub likes_count: usize,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct FollowPayload {
    pub following: bool,
    pub message: String,
    pub followers_count: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct AccessPayload {
    pub access: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct MessagePayload {
    pub message: &'static str,
}
