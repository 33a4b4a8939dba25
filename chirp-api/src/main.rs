use chirp_common::model::auth::{
    DEFAULT_ACCESS_TOKEN_LIFETIME, DEFAULT_REFRESH_TOKEN_LIFETIME, InvalidTokenLifetimeError,
    TokenLifetime, TokenService,
};
use axum::{ServiceExt, extract::Request};
use chirp_db::{DbClient, DbError, MemoryStore, Store};
use serde::Deserialize;
use server::ServerState;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error connecting to the database: {0}")]
    Database(#[from] DbError),
    #[error("Invalid token lifetime: {0}")]
    InvalidTokenLifetime(#[from] InvalidTokenLifetimeError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_max_connections() -> u32 {
    5
}

fn default_access_token_lifetime() -> i64 {
    DEFAULT_ACCESS_TOKEN_LIFETIME.whole_seconds()
}

fn default_refresh_token_lifetime() -> i64 {
    DEFAULT_REFRESH_TOKEN_LIFETIME.whole_seconds()
}

#[derive(Clone, Eq, PartialEq, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    jwt_secret: String,
    /// Without a database everything is kept in memory and lost on shutdown.
    database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_access_token_lifetime")]
    access_token_lifetime_secs: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    refresh_token_lifetime_secs: i64,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chirp_api=debug,\
                chirp_db=debug,\
                chirp_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn connect_store(env: &Env) -> Result<Arc<dyn Store>, InitError> {
    match &env.database_url {
        Some(url) => {
            let client = DbClient::connect(url, env.database_max_connections).await?;
            info!("Connected to database");
            Ok(Arc::new(client))
        }
        None => {
            warn!("DATABASE_URL is not set, keeping all data in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn token_service(env: &Env) -> Result<TokenService, InitError> {
    let access = TokenLifetime::try_from(Duration::seconds(env.access_token_lifetime_secs))?;
    let refresh = TokenLifetime::try_from(Duration::seconds(env.refresh_token_lifetime_secs))?;

    Ok(TokenService::new(env.jwt_secret.as_bytes(), access, refresh))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(%err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let store = connect_store(&env).await?;
    let tokens = Arc::new(token_service(&env)?);
    let state = ServerState::new(store, tokens);

    let app = server::app(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
