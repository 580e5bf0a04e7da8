use color_eyre::eyre::WrapErr;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use std::sync::Arc;
use taskmgr_auth::api::start_webserver;
use taskmgr_auth::config::load_config;
use taskmgr_auth::oauth2::{OAuth2State, spawn_cleanup_task};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "taskmgr_auth=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_tracing();

    let config = load_config().wrap_err("Failed to load configuration")?;

    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .wrap_err("Failed to connect to database")?,
    );
    Migrator::up(db.as_ref(), None)
        .await
        .wrap_err("Failed to run migrations")?;

    tracing::info!(
        issuer = %config.oauth2.issuer_url,
        access_token_lifetime = config.oauth2.access_token_lifetime,
        refresh_token_lifetime = config.oauth2.refresh_token_lifetime,
        device_code_lifetime = config.oauth2.device_code_lifetime,
        "authorization server configuration"
    );

    let state = OAuth2State::new(db, config.oauth2.clone())?;
    spawn_cleanup_task(state.clone());

    start_webserver(state, &config.listen_addr).await?;
    Ok(())
}
