use axum::Extension;
use learndeckify::gemini_client::GeminiClient;
use learndeckify::identity_client::IdentityClient;
use learndeckify::jobs::RunRegistry;
use learndeckify::media::FrameSpec;
use learndeckify::middleware;
use learndeckify::pipeline::{FfmpegMuxer, FfprobeDurationProbe, PdfiumRasterizer, Rasterizer};
use learndeckify::services::{QuizService, TutorService};
use learndeckify::tts_client::TextToSpeechClient;
use learndeckify::{api_router, AppConfig, AppState, DeckToVideoPipeline, PipelineServices};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const JANITOR_INTERVAL_SECS: u64 = 15 * 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env()?;
    log_configuration(&config);

    tokio::fs::create_dir_all(&config.work_dir).await?;
    tracing::info!("Work directory ready: {}", config.work_dir.display());

    if let Err(e) = learndeckify::utils::check_ffmpeg_available().await {
        tracing::warn!("{} Video assembly will fail until it is installed.", e);
    }

    let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::new(
        config.pdfium_lib_dir.clone(),
        config.render_width,
        config.soffice_bin.clone(),
    ));

    // Initialize Gemini client if API key is provided
    let gemini_client = match config.gemini_api_key.clone() {
        Some(api_key) => {
            tracing::info!("Initializing Gemini client ({})...", config.gemini_model);
            Some(Arc::new(GeminiClient::new(api_key, config.gemini_model.clone())))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not found. Video, quiz and chat features will be disabled.");
            None
        }
    };

    // Initialize Text-to-Speech client if API key is provided
    let tts_client = match config.tts_api_key.clone() {
        Some(api_key) => {
            tracing::info!("Initializing Text-to-Speech client ({})...", config.voice.language_code);
            Some(Arc::new(TextToSpeechClient::new(api_key)))
        }
        None => {
            tracing::warn!("TTS_API_KEY not found. Video generation will be disabled.");
            None
        }
    };

    let pipeline = match (&gemini_client, &tts_client) {
        (Some(gemini), Some(tts)) => Some(Arc::new(DeckToVideoPipeline::new(PipelineServices {
            rasterizer: rasterizer.clone(),
            text: gemini.clone(),
            speech: tts.clone(),
            probe: Arc::new(FfprobeDurationProbe),
            muxer: Arc::new(FfmpegMuxer::new(FrameSpec {
                width: config.render_width,
                height: config.video_height,
                ..FrameSpec::default()
            })),
            voice: config.voice.clone(),
            slide_concurrency: config.slide_concurrency,
        }))),
        _ => None,
    };

    let quiz = gemini_client
        .clone()
        .map(|gemini| QuizService::new(gemini, rasterizer.clone(), config.work_dir.clone()));
    let tutor = gemini_client.clone().map(|gemini| TutorService::new(gemini));

    let identity = IdentityClient::new(config.firebase_api_key.clone(), config.firebase_project_id.clone());
    if config.require_auth && !identity.can_verify() {
        return Err("REQUIRE_AUTH is set but FIREBASE_PROJECT_ID is missing".into());
    }

    let runs = Arc::new(RunRegistry::new());
    tracing::info!("🎬 Run registry initialized");

    let shared_state = Arc::new(AppState {
        config: config.clone(),
        pipeline,
        quiz,
        tutor,
        identity,
        runs: runs.clone(),
    });

    let app = api_router(&config)
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    // Remove finished runs and their directories once they exceed the retention window
    let retention_hours = config.run_retention_hours;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(JANITOR_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = runs.cleanup_old_runs(retention_hours).await;
            if removed > 0 {
                tracing::info!("🗑️ Removed {} expired runs", removed);
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

    Ok(())
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,learndeckify=trace,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,learndeckify=info,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    tracing::info!("🎬 Learndeckify starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}

fn log_configuration(config: &AppConfig) {
    let mark = |on: bool| if on { "✅" } else { "❌" };
    tracing::info!(
        "Configuration - Gemini AI: {}, Text-to-Speech: {}, Identity sign-in: {}, Token verification: {}, Auth required: {}",
        mark(config.gemini_api_key.is_some()),
        mark(config.tts_api_key.is_some()),
        mark(config.firebase_api_key.is_some()),
        mark(config.firebase_project_id.is_some()),
        config.require_auth
    );
    tracing::info!(
        "Pipeline - slide concurrency: {}, frame: {}x{}, retention: {}h",
        config.slide_concurrency,
        config.render_width,
        config.video_height,
        config.run_retention_hours
    );
}
