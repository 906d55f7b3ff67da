use posts_api::{config::Config, database};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env();
    info!(
        port = config.port,
        rate_limit_max = config.rate_limit_max,
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        body_limit = config.body_limit,
        "Starting posts-api"
    );

    // Exits non-zero when the database is unreachable; nothing is bound then.
    let connect = database::connect(&config);
    posts_api::run(config.clone(), connect).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("posts_api=debug,tower_http=info")),
        )
        .init();
}
