use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Created, Json},
    payload::{AccessPayload, MessagePayload},
};
use axum::{extract::State, routing::post};
use chirp_common::model::{
    auth::{BlacklistedToken, TokenKind, TokenPair, TokenService},
    password::PasswordDigest,
    user::{CreateUser, Username},
};
use chirp_db::Store;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh))
        .route("/logout", post(logout))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: Username,
    password: String,
    confirmation: String,
}

async fn register(
    State(store): State<Arc<dyn Store>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Created<MessagePayload>> {
    if request.password != request.confirmation {
        return Err(ServerError::PasswordMismatch);
    }
    if request.password.is_empty() {
        return Err(ServerError::EmptyPassword);
    }

    let user = CreateUser {
        username: request.username,
        password: PasswordDigest::hash(&request.password)?,
    };
    let user = store.create_user(&user).await?;
    info!(user = %user.id, username = %user.username, "Registered user");

    Ok(Created(MessagePayload {
        message: "User Registered Successfully",
    }))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(store): State<Arc<dyn Store>>,
    State(tokens): State<Arc<TokenService>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>> {
    // An unparseable username cannot belong to anyone.
    let Ok(username) = Username::new(request.username) else {
        return Err(ServerError::InvalidCredentials);
    };

    let credentials = store
        .fetch_credentials(&username)
        .await?
        .filter(|credentials| credentials.password.verify(&request.password))
        .ok_or(ServerError::InvalidCredentials)?;

    Ok(Json(tokens.issue_pair(&credentials.user.to_ref())?))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh: String,
}

async fn refresh(
    State(store): State<Arc<dyn Store>>,
    State(tokens): State<Arc<TokenService>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AccessPayload>> {
    let claims = tokens.decode(&request.refresh, TokenKind::Refresh)?;
    if store.is_token_blacklisted(&claims.jti).await? {
        return Err(ServerError::BlacklistedToken);
    }

    let access = tokens.refresh_access(&claims)?;

    Ok(Json(AccessPayload { access }))
}

#[derive(Deserialize)]
struct LogoutRequest {
    refresh: Option<String>,
}

async fn logout(
    user: AuthenticatedUser,
    State(store): State<Arc<dyn Store>>,
    State(tokens): State<Arc<TokenService>>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<MessagePayload>> {
    let refresh = request.refresh.ok_or(ServerError::MissingRefreshToken)?;
    let claims = tokens
        .decode(&refresh, TokenKind::Refresh)
        .map_err(|_| ServerError::InvalidLogoutToken)?;

    if !store.blacklist_token(&BlacklistedToken::from(&claims)).await? {
        return Err(ServerError::InvalidLogoutToken);
    }
    info!(user = %user.user_id(), jti = %claims.jti, "Blacklisted refresh token");

    Ok(Json(MessagePayload {
        message: "Logout Successful.",
    }))
}

#[cfg(test)]
mod tests {
    use crate::server::test_util::{TEST_PASSWORD, TestServer};
    use axum::http::StatusCode;
    use chirp_common::model::{auth::TokenKind, user::Username};
    use chirp_db::Store;
    use serde_json::json;

    fn alice() -> Username {
        Username::new("alice".to_owned()).unwrap()
    }

    #[tokio::test]
    async fn register_creates_user() {
        let server = TestServer::new();

        let response = server
            .post(
                "/register",
                None,
                json!({"username": "alice", "password": "hunter2", "confirmation": "hunter2"}),
            )
            .await;

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body["message"], "User Registered Successfully");

        let credentials = server.store().fetch_credentials(&alice()).await.unwrap().unwrap();
        assert!(credentials.password.verify("hunter2"));
        assert!(!credentials.user.is_staff);
    }

    #[tokio::test]
    async fn register_mismatched_passwords() {
        let server = TestServer::new();

        let response = server
            .post(
                "/register",
                None,
                json!({"username": "alice", "password": "hunter2", "confirmation": "hunter3"}),
            )
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], "Passwords do not Match.");
        assert_eq!(server.store().fetch_user_by_username(&alice()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_mismatch_wins_over_taken_username() {
        let server = TestServer::new();
        server.user("alice").await;

        let response = server
            .post(
                "/register",
                None,
                json!({"username": "alice", "password": "a", "confirmation": "b"}),
            )
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let server = TestServer::new();
        let body = json!({"username": "alice", "password": "hunter2", "confirmation": "hunter2"});

        assert_eq!(
            server.post("/register", None, body.clone()).await.status,
            StatusCode::CREATED
        );
        let response = server.post("/register", None, body).await;

        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.body["error"], "Username is Taken");
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let server = TestServer::new();

        for body in [
            json!({"username": "alice", "password": "", "confirmation": ""}),
            json!({"username": "not valid", "password": "pw", "confirmation": "pw"}),
            json!({"username": "alice", "password": "pw"}),
        ] {
            let response = server.post("/register", None, body.clone()).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn login_issues_token_pair() {
        let server = TestServer::new();
        let alice = server.user("alice").await;

        let response = server
            .post(
                "/login",
                None,
                json!({"username": "alice", "password": TEST_PASSWORD}),
            )
            .await;

        assert_eq!(response.status, StatusCode::OK);
        let access = server
            .tokens()
            .decode(response.body["access"].as_str().unwrap(), TokenKind::Access)
            .unwrap();
        let refresh = server
            .tokens()
            .decode(response.body["refresh"].as_str().unwrap(), TokenKind::Refresh)
            .unwrap();
        assert_eq!(access.user_id, alice.user.id);
        assert_eq!(refresh.username, "alice");
    }

    #[tokio::test]
    async fn login_rejects_wrong_credentials() {
        let server = TestServer::new();
        server.user("alice").await;

        for body in [
            json!({"username": "alice", "password": "wrong"}),
            json!({"username": "bob", "password": TEST_PASSWORD}),
            json!({"username": "not valid", "password": TEST_PASSWORD}),
        ] {
            let response = server.post("/login", None, body.clone()).await;
            assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{body}");
        }
    }

    #[tokio::test]
    async fn refresh_issues_access_token() {
        let server = TestServer::new();
        let alice = server.user("alice").await;

        let response = server
            .post("/token/refresh", None, json!({"refresh": alice.refresh}))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        let access = response.body["access"].as_str().unwrap();
        assert_eq!(
            server.get("/following-feed", Some(access)).await.status,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let server = TestServer::new();
        let alice = server.user("alice").await;

        let response = server
            .post("/token/refresh", None, json!({"refresh": alice.access}))
            .await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_blacklists_refresh_token() {
        let server = TestServer::new();
        let alice = server.user("alice").await;

        let response = server
            .post("/logout", Some(&alice.access), json!({"refresh": alice.refresh}))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["message"], "Logout Successful.");

        let response = server
            .post("/token/refresh", None, json!({"refresh": alice.refresh}))
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let response = server
            .post("/logout", Some(&alice.access), json!({"refresh": alice.refresh}))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_requires_refresh_token() {
        let server = TestServer::new();
        let alice = server.user("alice").await;

        let response = server.post("/logout", Some(&alice.access), json!({})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], "Refresh token required.");

        let response = server
            .post("/logout", Some(&alice.access), json!({"refresh": "garbage"}))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_requires_authentication() {
        let server = TestServer::new();
        let alice = server.user("alice").await;

        let response = server
            .post("/logout", None, json!({"refresh": alice.refresh}))
            .await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
}
