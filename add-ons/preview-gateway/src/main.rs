//! Preview Gateway: hosts the sandboxed preview surface and bridges it to the
//! intent dispatcher, page synthesizer and source sync manager over HTTP + SSE.

mod handlers;
mod shell;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use handlers::preview::{BroadcastEffects, GatewayEvent};
use preview_core::{
    ChannelSurface, InMemoryFileTree, IntentDispatcher, IntentExecutor, PageGenerator,
    PageSynthesizer, PreviewConfig, RenderSurfaceController, SandboxPolicy, SourceDocument,
    SourceSyncManager, SurfaceFrame, MAX_PAYLOAD_BYTES,
};
use preview_skills::{BackendExecutor, BackendMode, LlmMode, LlmPageGenerator};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const EVENT_BUFFER: usize = 256;
const SURFACE_BUFFER: usize = 64;
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Pre-flight check: config loads and the port is free.
fn run_verify() -> Result<(), String> {
    let config = PreviewConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    println!("Config OK ({}; llm_mode={}, backend_mode={})", config.app_name, config.llm_mode, config.backend_mode);

    let port = config.port;
    print!("Checking port {}... ", port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => return Err(format!("Port {} BLOCKED: {}", port, e)),
    }

    println!("\nReady to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[preview-gateway] .env not loaded: {} (using system environment)", e);
    }

    if std::env::args().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match PreviewConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[preview-gateway] config error: {}", e);
            std::process::exit(1);
        }
    };
    let executor = Arc::new(BackendExecutor::from_config(&config));
    let generator = Arc::new(LlmPageGenerator::with_mode(LlmMode::parse(&config.llm_mode)));
    tracing::info!(
        target: "preview::gateway",
        backend = ?executor.mode(),
        llm = ?generator.mode(),
        "collaborators ready"
    );

    let state = build_state(config, executor, generator);
    state.sync.edit_buffer(shell::STARTER_DOCUMENT);
    state.sync.flush_to_tree();
    tokio::spawn(sweep_loop(Arc::clone(&state.dispatcher)));

    let port = state.config.port;
    let app = build_app(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(target: "preview::gateway", "Preview Gateway listening on http://{}", addr);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[preview-gateway] cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(target: "preview::gateway", error = %e, "server stopped");
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<PreviewConfig>,
    pub(crate) dispatcher: Arc<IntentDispatcher>,
    pub(crate) surface: Arc<RenderSurfaceController>,
    pub(crate) sync: Arc<SourceSyncManager>,
    pub(crate) files: Arc<InMemoryFileTree>,
    pub(crate) synthesizer: Arc<PageSynthesizer>,
    pub(crate) events: broadcast::Sender<GatewayEvent>,
    /// Last document written to the surface, replayed to new SSE clients.
    pub(crate) last_document: Arc<RwLock<Option<String>>>,
    backend_mode: BackendMode,
}

/// Wires the protocol components around one channel-backed surface. Must run inside a runtime.
fn build_state(
    config: PreviewConfig,
    executor: Arc<BackendExecutor>,
    generator: Arc<dyn PageGenerator>,
) -> AppState {
    let config = Arc::new(config);
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let files = Arc::new(InMemoryFileTree::new());
    let (channel, frames) = ChannelSurface::new(SURFACE_BUFFER);

    let surface = RenderSurfaceController::with_files(Arc::new(channel), files.clone(), config.render_debounce());
    let synthesizer = Arc::new(PageSynthesizer::new(generator, config.style_excerpt_chars));
    let backend_mode = executor.mode();
    let executor: Arc<dyn IntentExecutor> = executor;
    let sync = SourceSyncManager::new(files.clone(), Some(Arc::clone(&surface)), config.sync_debounce());
    let dispatcher = Arc::new(
        IntentDispatcher::new(
            &config,
            Arc::clone(&surface),
            executor,
            Arc::clone(&synthesizer),
            files.clone(),
            Arc::new(BroadcastEffects::new(events.clone())),
        )
        .with_source(Arc::clone(&sync)),
    );

    let last_document = Arc::new(RwLock::new(None));
    tokio::spawn(forward_frames(frames, events.clone(), Arc::clone(&last_document)));
    tokio::spawn(forward_source(sync.subscribe(), events.clone()));

    AppState {
        config,
        dispatcher,
        surface,
        sync,
        files,
        synthesizer,
        events,
        last_document,
        backend_mode,
    }
}

async fn forward_frames(
    mut frames: mpsc::Receiver<SurfaceFrame>,
    events: broadcast::Sender<GatewayEvent>,
    last_document: Arc<RwLock<Option<String>>>,
) {
    while let Some(frame) = frames.recv().await {
        if let SurfaceFrame::Document { document } = &frame {
            if let Ok(mut slot) = last_document.write() {
                *slot = Some(document.clone());
            }
        }
        let _ = events.send(GatewayEvent::Frame(frame));
    }
    tracing::debug!(target: "preview::gateway", "surface channel closed");
}

async fn forward_source(mut updates: watch::Receiver<SourceDocument>, events: broadcast::Sender<GatewayEvent>) {
    while updates.changed().await.is_ok() {
        let doc = updates.borrow_and_update().clone();
        let _ = events.send(GatewayEvent::Source(doc));
    }
}

/// Drops surface commands whose replies never arrived.
async fn sweep_loop(dispatcher: Arc<IntentDispatcher>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let swept = dispatcher.sweep_expired();
        if swept > 0 {
            tracing::debug!(target: "preview::gateway", swept, "expired surface commands swept");
        }
    }
}

fn build_app(state: AppState) -> Router {
    // CORS: allow local UI (3001-3099) and API (8001-8099) port ranges.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &axum::http::HeaderValue, _| {
            let s = origin.to_str().unwrap_or("");
            let port = s
                .split(':')
                .last()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (3001..=3099).contains(&port) || (8001..=8099).contains(&port)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
        .expose_headers(tower_http::cors::Any);

    use handlers::{preview, workspace};
    Router::new()
        .route("/", get(preview::shell_page))
        .route("/v1/status", get(status))
        .route("/v1/preview/events", get(preview::events_stream))
        .route(
            "/v1/preview/messages",
            post(preview::post_message).layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES * 2)),
        )
        .route("/v1/source", get(workspace::get_source).put(workspace::put_source))
        .route("/v1/files", get(workspace::list_files))
        .route("/v1/files/*path", get(workspace::get_file).put(workspace::put_file))
        .route("/v1/classify", post(workspace::classify_label))
        .route("/v1/edit-mode", post(workspace::set_edit_mode))
        .route("/v1/elements/update", post(workspace::update_element))
        .route("/v1/pages", axum::routing::delete(workspace::clear_pages))
        .with_state(state)
        .layer(cors)
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let intents: serde_json::Map<String, serde_json::Value> = state
        .dispatcher
        .registry()
        .describe()
        .into_iter()
        .map(|(intent, handler)| (intent, json!(handler)))
        .collect();
    Json(json!({
        "app_name": state.config.app_name,
        "port": state.config.port,
        "llm_mode": state.config.llm_mode,
        "backend_mode": format!("{:?}", state.backend_mode).to_lowercase(),
        "sandbox": SandboxPolicy::attribute(),
        "edit_mode": state.surface.edit_mode(),
        "current_page": state.surface.current_page(),
        "selected": state.surface.selected(),
        "last_outcome": state.surface.last_outcome(),
        "renders": state.surface.render_count(),
        "cached_pages": state.synthesizer.cached_keys(),
        "pending_requests": state.dispatcher.pending_len(),
        "sync": state.sync.stats(),
        "intents": intents,
    }))
}
