use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Created, Json},
    payload::{CommentPayload, LikePayload, PostPayload},
};
use axum::{extract::State, routing::post};
use axum_extra::routing::{RouterExt, TypedPath};
use chirp_common::model::{
    Id,
    comment::{CommentContent, CreateComment},
    post::{CreatePost, PostContent, PostMarker},
};
use chirp_db::Store;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/tweet", post(create_tweet))
        .typed_get(get_tweet)
        .typed_put(update_tweet)
        .typed_post(toggle_like)
        .typed_post(create_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweet/{id}", rejection(ServerError))]
struct TweetPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweet/like-unlike/{id}", rejection(ServerError))]
struct LikePath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweet/comment/{id}", rejection(ServerError))]
struct CommentPath {
    id: Id<PostMarker>,
}

#[derive(Deserialize)]
struct TweetRequest {
    tweet: PostContent,
}

#[derive(Deserialize)]
struct CommentRequest {
    comment: CommentContent,
}

async fn create_tweet(
    user: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    Json(request): Json<TweetRequest>,
) -> Result<Created<PostPayload>> {
    let post = CreatePost {
        poster: user.user().to_ref(),
        content: request.tweet,
    };
    let post = store.create_post(&post).await?;

    Ok(Created(PostPayload::new(post, Some(user.user_id()))))
}

async fn get_tweet(
    TweetPath { id }: TweetPath,
    viewer: Option<AuthenticatedUser>,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<PostPayload>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(PostPayload::new(
        post,
        viewer.map(|viewer| viewer.user_id()),
    )))
}

async fn update_tweet(
    TweetPath { id }: TweetPath,
    user: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    Json(request): Json<TweetRequest>,
) -> Result<Json<PostPayload>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if post.poster.id != user.user_id() {
        debug!(post = %id, user = %user.user_id(), "Refusing edit by non-author");
        return Err(ServerError::NotPostAuthor);
    }

    let post = store
        .update_post(id, &request.tweet)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(PostPayload::new(post, Some(user.user_id()))))
}

async fn toggle_like(
    LikePath { id }: LikePath,
    user: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
) -> Result<Json<LikePayload>> {
    let liked = store.toggle_like(id, user.user_id()).await?;

    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(LikePayload {
        success: true,
        liked,
        likes_count: post.likes_count(),
    }))
}

async fn create_comment(
    CommentPath { id }: CommentPath,
    user: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    Json(request): Json<CommentRequest>,
) -> Result<Created<CommentPayload>> {
    let comment = CreateComment {
        main_post: id,
        commenter: user.user().to_ref(),
        content: request.comment,
    };
    let comment = store.create_comment(&comment).await?;

    Ok(Created(CommentPayload::from(comment)))
}
