use crate::server::{
    Result, ServerRouter,
    auth::AuthenticatedUser,
    json::Json,
    payload::{FeedPayload, HomePayload, PostPayload},
    query::Query,
};
use axum::{extract::State, routing::get};
use chirp_common::{
    model::post::{Post, PostFilter, PostOrdering, PostQuery},
    pagination::{PAGE_SIZE, Page},
};
use chirp_db::Store;
use std::sync::Arc;

/// Length of the most liked and most commented lists on the home feed.
pub const TOP_POSTS: u64 = 10;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/home", get(home))
        .route("/following-feed", get(following_feed))
}

/// Raw query pairs, so that neither garbage nor a repeated key rejects the
/// request. The last `page` wins.
type PageQuery = Vec<(String, String)>;

fn requested_page(query: &[(String, String)]) -> Option<&str> {
    query
        .iter()
        .rev()
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.as_str())
}

async fn paginate(
    store: &dyn Store,
    filter: PostFilter,
    requested: Option<&str>,
) -> Result<(Vec<Post>, Page)> {
    let total = store.count_posts(filter).await?;
    let page = Page::resolve(requested, total, PAGE_SIZE);

    let posts = store
        .fetch_posts(&PostQuery {
            limit: Some(page.limit()),
            offset: page.offset(),
            ..PostQuery::all_of(filter)
        })
        .await?;

    Ok((posts, page))
}

async fn home(
    viewer: Option<AuthenticatedUser>,
    State(store): State<Arc<dyn Store>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HomePayload>> {
    let viewer = viewer.map(|viewer| viewer.user_id());

    let (recent, page) =
        paginate(store.as_ref(), PostFilter::All, requested_page(&query)).await?;
    let most_liked = store
        .fetch_posts(&PostQuery::top(PostOrdering::MostLiked, TOP_POSTS))
        .await?;
    let most_commented = store
        .fetch_posts(&PostQuery::top(PostOrdering::MostCommented, TOP_POSTS))
        .await?;

    Ok(Json(HomePayload {
        recent_tweets: PostPayload::many(recent, viewer),
        most_liked_tweets: PostPayload::many(most_liked, viewer),
        most_commented_tweets: PostPayload::many(most_commented, viewer),
        current_page: page.number,
        total_pages: page.total_pages,
    }))
}

async fn following_feed(
    user: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FeedPayload>> {
    let filter = PostFilter::FollowedBy(user.user_id());
    let (posts, page) = paginate(store.as_ref(), filter, requested_page(&query)).await?;

    Ok(Json(FeedPayload::new(
        PostPayload::many(posts, Some(user.user_id())),
        page,
    )))
}
