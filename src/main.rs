//! MedVoice server entry point.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medvoice::adapters::ai::{GeminiAgent, GeminiExtractor};
use medvoice::adapters::http::api_router;
use medvoice::adapters::speech::{DeepgramStt, DeepgramTts};
use medvoice::adapters::transport::{DailyRoomService, GatewayTransport, MockRoomService};
use medvoice::application::{LifecyclePolicy, SessionLifecycleManager, SessionRegistry};
use medvoice::config::AppConfig;
use medvoice::ports::RoomService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let registry = Arc::new(SessionRegistry::new());

    let rooms: Arc<dyn RoomService> = match DailyRoomService::new(&config.voice) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            warn!(error = %e, "Daily not configured, using in-memory rooms");
            Arc::new(MockRoomService::new())
        }
    };
    let transport = Arc::new(GatewayTransport::new(&config.voice));
    let stt = Arc::new(DeepgramStt::new(&config.voice)?);
    let tts = Arc::new(DeepgramTts::new(&config.voice)?);
    let agent = Arc::new(GeminiAgent::new(config.ai.clone())?);
    let extractor = Arc::new(GeminiExtractor::new(config.ai.clone())?);

    let lifecycle = Arc::new(SessionLifecycleManager::new(
        Arc::clone(&registry),
        transport,
        stt,
        tts,
        agent,
        extractor,
        LifecyclePolicy::from_config(&config.intake),
    ));

    spawn_cleanup_sweep(Arc::clone(&registry), &config);

    let app = api_router(
        Arc::clone(&registry),
        Arc::clone(&lifecycle),
        rooms,
        &config.server,
    );

    let addr = config.server.socket_addr()?;
    info!(%addr, environment = ?config.server.environment, "medvoice listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Periodically removes terminal sessions past the retention age.
fn spawn_cleanup_sweep(registry: Arc<SessionRegistry>, config: &AppConfig) {
    let interval = Duration::from_secs(config.intake.cleanup_interval_secs);
    let max_age = chrono::Duration::seconds(config.intake.session_max_age_secs as i64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_expired(max_age).await;
            if removed > 0 {
                info!(count = removed, "cleanup sweep removed expired sessions");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
