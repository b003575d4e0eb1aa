use mock_backend::{router, AppState};
use probe_core::{env, FixtureStore, Settings, UserDirectory, BUILD_INFO};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ADDR_VAR: &str = "MOCK_BACKEND_ADDR";
const DEFAULT_ADDR: &str = "0.0.0.0:8081";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter())),
        )
        .init();

    info!("Starting mock backend {}", BUILD_INFO);

    let users = FixtureStore::open(settings.test_data_dir.clone())
        .users()
        .unwrap_or_else(|e| {
            warn!("Starting without user profiles: {}", e);
            UserDirectory::default()
        });

    let access_token = settings.access_token.clone();
    if access_token.is_none() {
        warn!("{} is not set, only login sessions will be accepted", env::ACCESS_TOKEN);
    }

    let state = Arc::new(AppState::new(access_token, users));
    let app = router(state);

    let addr = std::env::var(ADDR_VAR).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Mock backend listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
