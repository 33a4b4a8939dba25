use crate::server::ServerRouter;
use axum::Router;

mod feed;
mod profiles;
mod sessions;
mod tweets;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(sessions::routes())
        .merge(feed::routes())
        .merge(tweets::routes())
        .merge(profiles::routes())
}
