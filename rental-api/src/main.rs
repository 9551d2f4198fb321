use anyhow::Context;
use rental_api::{
    app,
    state::{AppState, AuthConfig},
    worker::{start_expiry_notifier, ExpiryNotifier},
};
use rental_store::app_config::Config;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rental_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting rental API on port {}", config.server.port);

    let stores = rental_store::open_stores(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    let mailer = rental_store::build_mailer(&config.mail).context("Failed to build mailer")?;

    if config.notifier.enabled {
        let notifier = ExpiryNotifier::new(stores.clone(), mailer.clone(), config.rules.clone());
        start_expiry_notifier(notifier, config.notifier.interval_seconds);
    }

    let app_state = AppState::new(
        stores,
        mailer,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            bcrypt_cost: config.auth.bcrypt_cost,
        },
        config.rules.clone(),
        config.server.public_url.clone(),
    );

    let app = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
