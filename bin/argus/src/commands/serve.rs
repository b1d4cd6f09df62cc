use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use argus_capture::{start_plugins, CaptureHandle, CaptureService, ModelUpdate, Plugin, PluginContext};
use argus_core::{Config, Device, EventBus, Paths};

/// Lines of the log file served by /log.
const LOG_TAIL_LINES: usize = 20;

pub struct ServeOpts {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub pages: Option<String>,
    pub cookies: Option<String>,
    pub dir: Option<String>,
    pub engine: Option<String>,
    pub log: Option<String>,
    pub start_compare: bool,
}

// ---------------------------------------------------------------------------
// Shared state passed to HTTP/WS handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct GatewayState {
    capture: CaptureHandle,
    events: EventBus,
    log_file: Option<PathBuf>,
}

pub async fn run(opts: ServeOpts) -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;

    // CLI args override config values
    if let Some(host) = opts.host {
        config.gateway.host = host;
    }
    if let Some(port) = opts.port {
        config.gateway.port = port;
    }
    if opts.pages.is_some() {
        config.capture.pages_file = opts.pages;
    }
    if opts.cookies.is_some() {
        config.capture.cookies_file = opts.cookies;
    }
    if opts.dir.is_some() {
        config.capture.capture_dir = opts.dir;
    }
    if opts.engine.is_some() {
        config.capture.engine = opts.engine;
    }
    if opts.log.is_some() {
        config.log_file = opts.log;
    }
    config.start_compare |= opts.start_compare;

    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    info!(host = %host, port = port, "Starting argus gateway");

    // ── Create the event bus and the owning capture actor ──
    let events = EventBus::new(256);
    let (service, capture) = CaptureService::new(config.clone(), paths.clone(), events.clone())?;

    // ── Create shutdown channel ──
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(service.run(shutdown_tx.subscribe()));

    // ── Start plugins with a narrow, read-only context ──
    let plugins: Vec<Box<dyn Plugin>> = Vec::new();
    start_plugins(
        &plugins,
        &PluginContext {
            config: Arc::new(config.clone()),
            events: events.clone(),
            capture: capture.clone(),
        },
    );

    let state = GatewayState {
        capture,
        events,
        log_file: config.log_file_path(),
    };

    let app = Router::new()
        .route("/update/:env", get(handle_update))
        .route("/pages", get(handle_pages))
        .route("/queue", get(handle_queue))
        .route("/versions", get(handle_versions))
        .route("/results", get(handle_results))
        .route("/results/:device", get(handle_results_device))
        .route("/log", get(handle_log))
        .route("/compareall/:left/:right", get(handle_compare_all))
        .route("/ws", get(handle_ws_upgrade))
        .fallback(handle_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let http_shutdown_rx = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = http_shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
            .ok();
    });

    // ── Wait for shutdown signal ──
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
    let _ = http_handle.await;

    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

/// GET /update/{env} — expand and enqueue all three devices of one environment
async fn handle_update(
    AxumPath(env): AxumPath<String>,
    State(state): State<GatewayState>,
) -> Response {
    if state.capture.update_environment(&env).await {
        format!("Update {} in progress\n", env).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            format!("unknown environment: {}\n", env),
        )
            .into_response()
    }
}

async fn handle_pages(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.capture.pages().await)
}

async fn handle_queue(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.capture.queue().await)
}

async fn handle_versions(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.capture.versions().await)
}

async fn handle_results(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.capture.results().await)
}

async fn handle_results_device(
    AxumPath(device): AxumPath<String>,
    State(state): State<GatewayState>,
) -> Response {
    match device.parse::<Device>() {
        Ok(device) => Json(state.capture.results().await.device(device).clone()).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            format!("unknown device: {}\n", device),
        )
            .into_response(),
    }
}

/// GET /log — tail of the log file, or a fixed message when logging is off
async fn handle_log(State(state): State<GatewayState>) -> Response {
    let Some(path) = &state.log_file else {
        return "log mode not activated".into_response();
    };

    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let lines: Vec<&str> = content.trim().lines().collect();
            let start = lines.len().saturating_sub(LOG_TAIL_LINES);
            lines[start..].join("\n").into_response()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read log file");
            (StatusCode::INTERNAL_SERVER_ERROR, "log file unreadable").into_response()
        }
    }
}

/// GET /compareall/{left}/{right} — run a comparison right now
async fn handle_compare_all(
    AxumPath((left, right)): AxumPath<(String, String)>,
    State(state): State<GatewayState>,
) -> Response {
    if state.capture.compare_all(&left, &right).await {
        Json(serde_json::json!({"status": "Comparison started"})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            format!("unknown environment pair: {}/{}\n", left, right),
        )
            .into_response()
    }
}

async fn handle_not_found(uri: axum::http::Uri) -> impl IntoResponse {
    warn!(uri = %uri, "Error 404");
    (StatusCode::NOT_FOUND, "Not Found")
}

// ---------------------------------------------------------------------------
// WebSocket push channel
// ---------------------------------------------------------------------------

/// Messages clients push over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    #[serde(rename = "refreshOneScreen")]
    RefreshOneScreen {
        env: String,
        name: String,
        device: Device,
    },
    #[serde(rename = "refreshEnv")]
    RefreshEnv { env: String, device: Device },
    #[serde(rename = "updateModel")]
    UpdateModel { list: ModelUpdate },
    #[serde(rename = "updateResults")]
    UpdateResults {
        name: String,
        device: Device,
        percentage: String,
    },
    #[serde(rename = "updateEngine")]
    UpdateEngine { engine: String },
    #[serde(rename = "saveModel")]
    SaveModel,
}

async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: GatewayState) {
    info!("WebSocket client connected");

    use futures::{SinkExt, StreamExt};

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    // Task: forward typed events to this client
    let send_task = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Receive messages from this client
    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => handle_client_message(&state, message).await,
                Err(e) => debug!(error = %e, "Ignoring unrecognized client message"),
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    info!("WebSocket client disconnected");
}

async fn handle_client_message(state: &GatewayState, message: ClientMessage) {
    match message {
        ClientMessage::RefreshOneScreen { env, name, device } => {
            state.capture.refresh_page(&env, &name, device).await;
        }
        ClientMessage::RefreshEnv { env, device } => {
            state.capture.refresh_environment(&env, device).await;
        }
        ClientMessage::UpdateModel { list } => {
            state.capture.update_model(list).await;
        }
        ClientMessage::UpdateResults {
            name,
            device,
            percentage,
        } => {
            state.capture.update_results(&name, device, &percentage).await;
        }
        ClientMessage::UpdateEngine { engine } => {
            state.capture.set_engine(&engine).await;
        }
        ClientMessage::SaveModel => {
            state.capture.save_model().await;
        }
    }
}
