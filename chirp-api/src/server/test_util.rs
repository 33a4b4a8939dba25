use crate::server::{App, ServerState, app};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chirp_common::model::{
    auth::{TokenLifetime, TokenService},
    password::PasswordDigest,
    post::{CreatePost, Post, PostContent},
    user::{CreateUser, User, Username},
};
use chirp_db::{MemoryStore, Store};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use time::Duration;
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "password";

static TEST_DIGEST: LazyLock<PasswordDigest> =
    LazyLock::new(|| PasswordDigest::hash(TEST_PASSWORD).unwrap());

pub struct TestServer {
    app: App,
    store: Arc<MemoryStore>,
    tokens: Arc<TokenService>,
}

pub struct TestUser {
    pub user: User,
    pub access: String,
    pub refresh: String,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestServer {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenService::new(
            b"test secret",
            TokenLifetime::new(Duration::minutes(5)).unwrap(),
            TokenLifetime::new(Duration::days(1)).unwrap(),
        ));
        let app = app(ServerState::new(store.clone(), tokens.clone()));

        Self {
            app,
            store,
            tokens,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Registers a user with [`TEST_PASSWORD`] and logs them in.
    pub async fn user(&self, username: &str) -> TestUser {
        let user = self
            .store
            .create_user(&CreateUser {
                username: Username::new(username.to_owned()).unwrap(),
                password: TEST_DIGEST.clone(),
            })
            .await
            .unwrap();
        let pair = self.tokens.issue_pair(&user.to_ref()).unwrap();

        TestUser {
            user,
            access: pair.access,
            refresh: pair.refresh,
        }
    }

    pub async fn post_as(&self, author: &TestUser, content: &str) -> Post {
        self.store
            .create_post(&CreatePost {
                poster: author.user.to_ref(),
                content: PostContent::new(content.to_owned()).unwrap(),
            })
            .await
            .unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }
}
