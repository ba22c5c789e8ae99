//! Agora API server binary.
//!
//! Connects PostgreSQL and Redis, runs migrations, seeds the default roles,
//! optionally creates an administrator, then serves the REST API until
//! Ctrl-C.

use std::sync::Arc;

use agora_api::AppState;
use agora_api::config::ApiConfig;
use agora_core::auth::purge::spawn_token_purge;
use agora_core::auth::roles::{bootstrap_admin, seed_default_roles};
use agora_core::auth::{AuthService, RevocationStore, TokenKeys};
use agora_core::cache::RedisCache;
use agora_core::store::PgStore;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "agora_api_server", about = "Agora API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/agora"
    )]
    database_url: String,

    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agora_api=debug,agora_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = ApiConfig {
        bind_addr: args.bind_addr,
        pg_connection_url: args.database_url,
        redis_url: args.redis_url,
        ..ApiConfig::from_env()
    };

    info!(bind_addr = %config.bind_addr, "starting agora_api_server");
    info!(
        max_connections = args.max_connections,
        "configuring connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;
    let store = PgStore::new(pool);

    info!("running database migrations");
    store.migrate().await?;

    let cache = RedisCache::connect(&config.redis_url).await?;
    let revocation = RevocationStore::new(Arc::new(cache))
        .with_policy(config.blacklist_policy())
        .with_deadline(config.cache_timeout);
    info!(policy = ?revocation.policy(), "revocation store ready");

    let auth = AuthService::from_store(
        store,
        revocation,
        TokenKeys::new(config.jwt_secret.as_bytes()),
    );

    let default_roles = seed_default_roles(&auth).await?;
    if let Some(admin) = &config.admin {
        bootstrap_admin(
            &auth,
            &default_roles,
            &admin.username,
            &admin.email,
            &admin.password,
        )
        .await?;
    }

    let auth = Arc::new(auth);
    let shutdown = CancellationToken::new();
    let purge = spawn_token_purge(
        auth.clone(),
        config.token_purge_interval,
        shutdown.clone(),
    );

    let app = agora_api::router(AppState::new(auth, default_roles));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let api_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    shutdown.cancel();
    let _ = purge.await;

    api_result?;

    Ok(())
}
