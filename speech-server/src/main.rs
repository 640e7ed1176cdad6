use clap::Parser;
use speech_server::{app, AppState, EngineManager};
use std::{net::SocketAddr, sync::Arc};
use synth::{KokoroPipeline, PipelineConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Host interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
    /// Base URL of the Kokoro engine runtime
    #[arg(long, env = "ENGINE_URL", default_value = "http://localhost:8880")]
    engine_url: String,
    /// Voice identity
    #[arg(long, env = "VOICE", default_value = "af_heart")]
    voice: String,
    /// Kokoro language code
    #[arg(long, env = "LANG_CODE", default_value = "a")]
    lang_code: String,
    /// Compute device the engine should load onto
    #[arg(long, env = "DEVICE", default_value = "cpu")]
    device: String,
    /// Default speech rate multiplier
    #[arg(long, env = "SPEED", default_value_t = 1.0)]
    speed: f32,
    /// Maximum simultaneous synthesis calls
    #[arg(long, default_value_t = 4)]
    max_inflight: usize,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let manager = Arc::new(EngineManager::new());
    let state = AppState::new(manager.clone(), "kokoro", cli.max_inflight);

    // Bind before loading so health checks reach us while the model loads.
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let config = PipelineConfig {
        base_url: cli.engine_url,
        voice: cli.voice,
        lang_code: cli.lang_code,
        device: cli.device,
        speed: cli.speed,
    };
    tokio::spawn(load_engine(manager.clone(), config));

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    manager.release().await;
    info!("engine released, shutting down");
    Ok(())
}

async fn load_engine(manager: Arc<EngineManager>, config: PipelineConfig) {
    info!(url = %config.base_url, voice = %config.voice, "loading speech pipeline");
    match KokoroPipeline::connect(config).await {
        Ok(pipeline) => {
            info!(sample_rate = pipeline.sample_rate(), "speech pipeline ready");
            manager.install(Arc::new(pipeline)).await;
        }
        Err(err) => {
            error!(%err, "speech pipeline failed to load");
            manager.fail(err.to_string()).await;
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
