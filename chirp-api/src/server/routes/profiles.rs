use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::Json,
    payload::{CommentPayload, FollowPayload, PostPayload, ProfilePayload, ProfileSummary},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use chirp_common::model::{
    post::{PostFilter, PostQuery},
    user::Username,
};
use chirp_db::Store;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_profile)
        .typed_post(toggle_follow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}", rejection(ServerError))]
struct ProfilePath {
    username: Username,
}

async fn get_profile(
    ProfilePath { username }: ProfilePath,
    viewer: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<ProfilePayload>> {
    let user = store
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;
    let viewer_id = viewer.user_id();

    let counts = store.follow_counts(user.id).await?;
    let is_following = store.is_following(viewer_id, user.id).await?;
    let tweets = store
        .fetch_posts(&PostQuery::all_of(PostFilter::AuthoredBy(user.id)))
        .await?;
    let comments = store.fetch_user_comments(user.id).await?;
    let liked_tweets = store
        .fetch_posts(&PostQuery::all_of(PostFilter::LikedBy(user.id)))
        .await?;

    Ok(Json(ProfilePayload {
        user: ProfileSummary::new(user, counts, is_following, viewer_id),
        tweets: PostPayload::many(tweets, Some(viewer_id)),
        comments: comments.into_iter().map(CommentPayload::from).collect(),
        liked_tweets: PostPayload::many(liked_tweets, Some(viewer_id)),
    }))
}

async fn toggle_follow(
    ProfilePath { username }: ProfilePath,
    follower: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<FollowPayload>> {
    if follower.user().username == username {
        return Err(ServerError::SelfFollow);
    }

    let followed = store
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;

    let following = store.toggle_follow(follower.user_id(), followed.id).await?;
    let counts = store.follow_counts(followed.id).await?;

    let message = if following {
        format!("You are now following {}.", followed.username)
    } else {
        format!("You have unfollowed {}.", followed.username)
    };

    Ok(Json(FollowPayload {
        following,
        message,
        followers_count: counts.followers,
    }))
}
